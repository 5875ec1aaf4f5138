use crate::adapters::sheets::DEFAULT_API_BASE;
use crate::core::retry::RetryPolicy;
use crate::core::transport::TransportConfig;
use crate::domain::model::{AdapterConfig, DispensaryConfig};
use crate::utils::error::{Result, ScraperError};
use crate::utils::validation::{
    validate_css_selector, validate_non_empty_string, validate_positive_number, validate_range,
    validate_unique, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder pattern"));

/// 設定檔：執行參數、傳輸層、發佈端與藥局清單
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub dispensaries: Vec<DispensaryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 1 代表依序處理
    pub concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub api_base: String,
    /// 服務帳戶 JSON 金鑰路徑；設定 `GOOGLE_ACCESS_TOKEN` 時不需要
    pub credentials_path: Option<String>,
    pub timeout_seconds: u64,
    pub retry: RetryPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            credentials_path: None,
            timeout_seconds: 30,
            retry: RetryPolicy {
                max_attempts: 4,
                ..RetryPolicy::default()
            },
        }
    }
}

impl ScraperConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ScraperError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| ScraperError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${MONTU_SHEET_ID})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_PLACEHOLDER
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 依 `--only` / `--skip` 與 `enabled` 選出本次要處理的藥局
    pub fn select_dispensaries(&self, only: &[String], skip: &[String]) -> Result<Vec<DispensaryConfig>> {
        for name in only.iter().chain(skip) {
            if !self
                .dispensaries
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(name))
            {
                return Err(ScraperError::InvalidConfigValueError {
                    field: "dispensary filter".to_string(),
                    value: name.clone(),
                    reason: "No dispensary with this name is configured".to_string(),
                });
            }
        }

        let listed = |list: &[String], name: &str| list.iter().any(|n| n.eq_ignore_ascii_case(name));
        Ok(self
            .dispensaries
            .iter()
            .filter(|d| {
                if only.is_empty() {
                    d.is_enabled()
                } else {
                    listed(only, &d.name)
                }
            })
            .filter(|d| !listed(skip, &d.name))
            .cloned()
            .collect())
    }

    /// 未設定的環境變數只在藥局實際要執行時才算錯誤
    pub fn validate_selection(selected: &[DispensaryConfig]) -> Result<()> {
        for dispensary in selected {
            for (name, value) in [
                ("spreadsheet_id", &dispensary.spreadsheet_id),
                ("sheet_name", &dispensary.sheet_name),
            ] {
                if let Some(caps) = ENV_PLACEHOLDER.captures(value) {
                    return Err(ScraperError::MissingConfigError {
                        field: format!(
                            "{}.{} (environment variable {})",
                            dispensary.name, name, &caps[1]
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_dispensary(index: usize, dispensary: &DispensaryConfig) -> Result<()> {
        let field = |name: &str| format!("dispensaries[{}].{}", index, name);

        validate_non_empty_string(&field("name"), &dispensary.name)?;
        if dispensary.fetch_urls.is_empty() {
            return Err(ScraperError::MissingConfigError {
                field: field("fetch_urls"),
            });
        }
        for url in &dispensary.fetch_urls {
            validate_url(&field("fetch_urls"), url)?;
        }

        validate_non_empty_string(&field("spreadsheet_id"), &dispensary.spreadsheet_id)?;
        validate_non_empty_string(&field("sheet_name"), &dispensary.sheet_name)?;

        if dispensary.columns.is_empty() {
            return Err(ScraperError::MissingConfigError {
                field: field("columns"),
            });
        }
        validate_unique(
            &field("columns"),
            dispensary.columns.iter().map(|c| c.column.header()),
        )?;
        for spec in &dispensary.columns {
            if let Some(width) = spec.width {
                validate_range(&field("columns.width"), width, 20, 1000)?;
            }
        }

        for (name, color) in [
            ("stripe_color", dispensary.stripe_color),
            ("in_stock_color", dispensary.in_stock_color),
        ] {
            if let Some(color) = color {
                if color.components().iter().any(|c| !(0.0..=1.0).contains(c)) {
                    return Err(ScraperError::InvalidConfigValueError {
                        field: field(name),
                        value: format!("{:?}", color.components()),
                        reason: "Color components must be between 0.0 and 1.0".to_string(),
                    });
                }
            }
        }

        match &dispensary.adapter {
            AdapterConfig::Mamedica => {}
            AdapterConfig::Shopify { limit } => {
                validate_range(&field("adapter.limit"), *limit, 1, 250)?;
            }
            AdapterConfig::Selector(selectors) => {
                validate_css_selector(&field("adapter.container"), &selectors.container)?;
                validate_css_selector(&field("adapter.name"), &selectors.name)?;
                let optional = [
                    ("adapter.price", &selectors.price),
                    ("adapter.category", &selectors.category),
                    ("adapter.link", &selectors.link),
                    ("adapter.thc", &selectors.thc),
                    ("adapter.cbd", &selectors.cbd),
                    ("adapter.stock_text", &selectors.stock_text),
                    ("adapter.purchase_control", &selectors.purchase_control),
                ];
                for (name, css) in optional {
                    if let Some(css) = css {
                        validate_css_selector(&field(name), css)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Validate for ScraperConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("run.concurrency", self.run.concurrency, 1)?;

        validate_positive_number(
            "transport.timeout_seconds",
            self.transport.timeout_seconds as usize,
            1,
        )?;
        validate_range("transport.retry.max_attempts", self.transport.retry.max_attempts, 1, 10)?;
        if let Some((min, max)) = self.transport.politeness_delay_ms {
            if min > max {
                return Err(ScraperError::InvalidConfigValueError {
                    field: "transport.politeness_delay_ms".to_string(),
                    value: format!("[{}, {}]", min, max),
                    reason: "Minimum delay must not exceed maximum delay".to_string(),
                });
            }
        }
        if let Some(endpoint) = &self.transport.solver_endpoint {
            validate_url("transport.solver_endpoint", endpoint)?;
        }

        validate_url("publisher.api_base", &self.publisher.api_base)?;
        validate_range("publisher.retry.max_attempts", self.publisher.retry.max_attempts, 1, 10)?;

        if self.dispensaries.is_empty() {
            return Err(ScraperError::MissingConfigError {
                field: "dispensaries".to_string(),
            });
        }
        validate_unique(
            "dispensaries.name",
            self.dispensaries.iter().map(|d| d.name.as_str()),
        )?;
        for (index, dispensary) in self.dispensaries.iter().enumerate() {
            Self::validate_dispensary(index, dispensary)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Column, Rgb};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[run]
concurrency = 2

[transport]
timeout_seconds = 10
politeness_delay_ms = [1500, 3500]
[transport.retry]
max_attempts = 5

[[dispensaries]]
name = "Mamedica"
fetch_urls = ["https://mamedica.co.uk/repeat-prescription/"]
spreadsheet_id = "sheet-1"
sheet_name = "Mamedica List"
[dispensaries.adapter]
kind = "mamedica"

[[dispensaries]]
name = "Montu"
fetch_urls = ["https://store.montu.uk/products.json"]
spreadsheet_id = "sheet-2"
sheet_name = "Montu List"
enabled = false
[dispensaries.adapter]
kind = "shopify"
[[dispensaries.columns]]
column = "product"
width = 380
[[dispensaries.columns]]
column = "price"
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = ScraperConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.run.concurrency, 2);
        assert_eq!(config.transport.timeout_seconds, 10);
        assert_eq!(config.transport.politeness_delay_ms, Some((1500, 3500)));
        assert_eq!(config.transport.retry.max_attempts, 5);
        assert_eq!(config.transport.retry.base_delay_ms, 800);
        assert_eq!(config.publisher.api_base, DEFAULT_API_BASE);
        assert_eq!(config.publisher.retry.max_attempts, 4);

        assert_eq!(config.dispensaries.len(), 2);
        assert_eq!(config.dispensaries[0].adapter, AdapterConfig::Mamedica);
        assert_eq!(config.dispensaries[0].columns.len(), 6);
        assert_eq!(config.dispensaries[1].adapter, AdapterConfig::Shopify { limit: 250 });
        assert_eq!(config.dispensaries[1].columns[0].width, Some(380));
        assert_eq!(config.dispensaries[1].columns[1].column, Column::Price);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_DISPENSARY_SHEET_ID", "1AbCdEf");
        let toml_content = BASIC.replace("sheet-1", "${TEST_DISPENSARY_SHEET_ID}");

        let config = ScraperConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.dispensaries[0].spreadsheet_id, "1AbCdEf");

        std::env::remove_var("TEST_DISPENSARY_SHEET_ID");
    }

    #[test]
    fn test_unresolved_placeholder_fails_selected_dispensary() {
        let toml_content = BASIC.replace("sheet-1", "${SURELY_UNSET_SHEET_VARIABLE}");
        let config = ScraperConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_ok());

        let selected = config.select_dispensaries(&[], &[]).unwrap();
        match ScraperConfig::validate_selection(&selected) {
            Err(ScraperError::MissingConfigError { field }) => {
                assert!(field.starts_with("Mamedica.spreadsheet_id"));
                assert!(field.contains("SURELY_UNSET_SHEET_VARIABLE"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_placeholder_in_disabled_dispensary_is_ignored() {
        // Montu 在 BASIC 中 enabled = false
        let toml_content = BASIC.replace("sheet-2", "${SURELY_UNSET_MONTU_SHEET_VARIABLE}");
        let config = ScraperConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_ok());

        let selected = config.select_dispensaries(&[], &[]).unwrap();
        assert_eq!(selected.len(), 1);
        assert!(ScraperConfig::validate_selection(&selected).is_ok());
    }

    #[test]
    fn test_unresolved_placeholder_outside_only_filter_is_ignored() {
        let toml_content = BASIC
            .replace("enabled = false\n", "")
            .replace("sheet-2", "${SURELY_UNSET_MONTU_SHEET_VARIABLE}");
        let config = ScraperConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_ok());

        let only_mamedica = config.select_dispensaries(&["Mamedica".to_string()], &[]).unwrap();
        assert!(ScraperConfig::validate_selection(&only_mamedica).is_ok());

        let skip_montu = config.select_dispensaries(&[], &["montu".to_string()]).unwrap();
        assert!(ScraperConfig::validate_selection(&skip_montu).is_ok());

        let everything = config.select_dispensaries(&[], &[]).unwrap();
        assert!(ScraperConfig::validate_selection(&everything).is_err());
    }

    #[test]
    fn test_config_validation_errors() {
        let bad_url = ScraperConfig::from_toml_str(&BASIC.replace(
            "https://store.montu.uk/products.json",
            "store.montu.uk",
        ))
        .unwrap();
        assert!(bad_url.validate().is_err());

        let duplicate = ScraperConfig::from_toml_str(&BASIC.replace("name = \"Montu\"", "name = \"mamedica\"")).unwrap();
        assert!(duplicate.validate().is_err());

        let zero = ScraperConfig::from_toml_str(&BASIC.replace("concurrency = 2", "concurrency = 0")).unwrap();
        assert!(zero.validate().is_err());

        let no_dispensaries = ScraperConfig::from_toml_str("[run]\nconcurrency = 1\n").unwrap();
        assert!(matches!(
            no_dispensaries.validate(),
            Err(ScraperError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_row_colors_are_optional() {
        let config = ScraperConfig::from_toml_str(&BASIC.replace(
            "sheet_name = \"Montu List\"",
            "sheet_name = \"Montu List\"\nstripe_color = [0.97, 0.97, 0.97]\nin_stock_color = [0.85, 0.95, 0.85]",
        ))
        .unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.dispensaries[0].stripe_color, None);
        let layout = config.dispensaries[1].target().layout;
        assert_eq!(layout.stripe_color, Some(Rgb(0.97, 0.97, 0.97)));
        assert_eq!(layout.in_stock_color, Some(Rgb(0.85, 0.95, 0.85)));

        let out_of_range = ScraperConfig::from_toml_str(&BASIC.replace(
            "sheet_name = \"Montu List\"",
            "sheet_name = \"Montu List\"\nstripe_color = [230, 230, 230]",
        ))
        .unwrap();
        assert!(matches!(
            out_of_range.validate(),
            Err(ScraperError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_selector_adapter_is_validated() {
        let toml_content = r#"
[[dispensaries]]
name = "Clinic"
fetch_urls = ["https://clinic.example/shop"]
spreadsheet_id = "sheet-3"
sheet_name = "Clinic"
[dispensaries.adapter]
kind = "selector"
container = "li.product"
name = ".title"
price = ".price["
"#;
        let config = ScraperConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ScraperError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_unknown_adapter_kind_is_rejected() {
        let toml_content = BASIC.replace("kind = \"mamedica\"", "kind = \"woocommerce\"");
        assert!(matches!(
            ScraperConfig::from_toml_str(&toml_content),
            Err(ScraperError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_select_dispensaries() {
        let config = ScraperConfig::from_toml_str(BASIC).unwrap();
        let names = |list: Vec<DispensaryConfig>| list.into_iter().map(|d| d.name).collect::<Vec<_>>();

        assert_eq!(names(config.select_dispensaries(&[], &[]).unwrap()), vec!["Mamedica"]);
        assert_eq!(
            names(config.select_dispensaries(&["montu".to_string()], &[]).unwrap()),
            vec!["Montu"]
        );
        assert!(config
            .select_dispensaries(&[], &["Mamedica".to_string()])
            .unwrap()
            .is_empty());
        assert!(config.select_dispensaries(&["Nope".to_string()], &[]).is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = ScraperConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.dispensaries[0].name, "Mamedica");
    }
}
