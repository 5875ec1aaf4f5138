use crate::adapters::stock::StockSignals;
use crate::adapters::{compile_selector, extract_potency};
use crate::core::price::normalize_price;
use crate::domain::model::Product;
use crate::domain::ports::SiteAdapter;
use crate::utils::error::ParseError;
use scraper::{ElementRef, Html};

/// 處方下拉選單：每個 `<option value="名稱|價格">` 為一項商品
///
/// `optgroup` 的 label 作為分類；`disabled` 或文字含缺貨字樣代表缺貨。
#[derive(Debug, Default, Clone)]
pub struct MamedicaAdapter;

impl MamedicaAdapter {
    pub fn new() -> Self {
        Self
    }

    fn parse_option(option: ElementRef<'_>, source_url: &str) -> Option<Product> {
        let value = option.value().attr("value")?;
        let (raw_name, raw_price) = value.split_once('|')?;

        let name = raw_name.trim();
        if name.is_empty() {
            tracing::warn!("⚠️ Skipping option with empty product name: '{}'", value);
            return None;
        }

        let price = normalize_price(raw_price);
        if price.is_none() {
            tracing::debug!("No price in option '{}'", value);
        }

        let label: String = option.text().collect::<String>();
        let label = label.trim();
        let in_stock = StockSignals {
            text: Some(label),
            purchase_disabled: option.value().attr("disabled").is_some(),
            quantity: None,
        }
        .in_stock();

        let category = option
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|parent| parent.value().name() == "optgroup")
            .and_then(|group| group.value().attr("label"))
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());

        Some(
            Product::new(name, source_url)
                .with_price(price)
                .with_category(category)
                .with_potency(extract_potency(label))
                .with_stock(in_stock),
        )
    }
}

impl SiteAdapter for MamedicaAdapter {
    fn name(&self) -> &str {
        "mamedica"
    }

    fn parse(&self, body: &str, source_url: &str) -> Result<Vec<Product>, ParseError> {
        let select = compile_selector(self.name(), "select")?;
        let option_selector = compile_selector(self.name(), "select option")?;
        let document = Html::parse_document(body);

        if document.select(&select).next().is_none() {
            return Err(ParseError::UnrecognizedStructure {
                adapter: self.name().to_string(),
                reason: "no product <select> element on the page".to_string(),
            });
        }

        let mut products = Vec::new();
        for option in document.select(&option_selector) {
            let Some(value) = option.value().attr("value") else {
                continue;
            };
            // 佔位選項（例如「請選擇」）沒有分隔符號
            if !value.contains('|') {
                continue;
            }
            if let Some(product) = Self::parse_option(option, source_url) {
                products.push(product);
            }
        }

        tracing::debug!("Mamedica: parsed {} options", products.len());
        Ok(products)
    }
}
