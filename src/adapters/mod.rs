//! 外部系統的具體實作：網站解析器、Google Sheets、挑戰求解器與預覽輸出

pub mod google_auth;
pub mod mamedica;
pub mod preview;
pub mod selector;
pub mod sheets;
pub mod shopify;
pub mod solver;
pub mod stock;

use crate::domain::model::{AdapterConfig, Potency};
use crate::domain::ports::SiteAdapter;
use crate::utils::error::ParseError;
use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

pub use mamedica::MamedicaAdapter;
pub use selector::SelectorAdapter;
pub use shopify::ShopifyAdapter;

static CANNABINOID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(THC|CBD)[\s:]*([\d.]+)%").expect("valid cannabinoid pattern")
});

static PERCENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid percent pattern"));

/// 依設定建立解析器
pub fn build_adapter(config: &AdapterConfig) -> Box<dyn SiteAdapter> {
    match config {
        AdapterConfig::Mamedica => Box::new(MamedicaAdapter::new()),
        AdapterConfig::Shopify { limit } => Box::new(ShopifyAdapter::new(*limit)),
        AdapterConfig::Selector(selectors) => Box::new(SelectorAdapter::new(selectors.clone())),
    }
}

/// 從描述文字抽出 THC / CBD 百分比，同一成分以最後一次出現為準
pub fn extract_potency(text: &str) -> Potency {
    let mut potency = Potency::default();
    for caps in CANNABINOID_PATTERN.captures_iter(text) {
        let value = format!("{}%", &caps[2]);
        if caps[1].eq_ignore_ascii_case("thc") {
            potency.thc = Some(value);
        } else {
            potency.cbd = Some(value);
        }
    }
    potency
}

/// 單一欄位中的百分比，例如 `22 %` → `22%`
pub fn extract_percent(text: &str) -> Option<String> {
    PERCENT_PATTERN
        .captures(text)
        .map(|caps| format!("{}%", &caps[1]))
}

pub(crate) fn compile_selector(adapter: &str, css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::UnrecognizedStructure {
        adapter: adapter.to_string(),
        reason: format!("invalid selector '{}': {}", css, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SelectorConfig;

    #[test]
    fn test_extract_potency_last_match_wins() {
        let potency = extract_potency("THC 18% ... updated batch thc: 21.5% and CBD:1%");
        assert_eq!(potency.thc.as_deref(), Some("21.5%"));
        assert_eq!(potency.cbd.as_deref(), Some("1%"));
        assert_eq!(extract_potency("no cannabinoids listed"), Potency::default());
    }

    #[test]
    fn test_extract_percent() {
        assert_eq!(extract_percent("22 %").as_deref(), Some("22%"));
        assert_eq!(extract_percent("THC <1.5%").as_deref(), Some("1.5%"));
        assert_eq!(extract_percent("n/a"), None);
    }

    #[test]
    fn test_build_adapter_by_kind() {
        assert_eq!(build_adapter(&AdapterConfig::Mamedica).name(), "mamedica");
        assert_eq!(build_adapter(&AdapterConfig::Shopify { limit: 50 }).name(), "shopify");
        let selector = AdapterConfig::Selector(SelectorConfig {
            container: ".product".into(),
            name: ".title".into(),
            price: None,
            category: None,
            link: None,
            thc: None,
            cbd: None,
            stock_text: None,
            purchase_control: None,
            quantity_attribute: None,
        });
        assert_eq!(build_adapter(&selector).name(), "selector");
    }
}
