use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 一筆抓取到的商品
///
/// `name` 與 `source_url` 永遠有值；其餘欄位缺失時為 `None`，
/// 不使用 0 或空字串之類的替代值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    #[serde(default)]
    pub potency: Potency,
    pub in_stock: bool,
    pub source_url: String,
}

impl Product {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: None,
            category: None,
            potency: Potency::default(),
            in_stock: true,
            source_url: source_url.into(),
        }
    }

    pub fn with_price(mut self, price: Option<Decimal>) -> Self {
        self.price = price;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_potency(mut self, potency: Potency) -> Self {
        self.potency = potency;
        self
    }

    pub fn with_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }

    /// 固定兩位小數的價格文字，例如 `12.50`
    pub fn price_text(&self) -> Option<String> {
        self.price.map(|p| crate::core::price::format_price(&p))
    }

    pub fn availability(&self) -> &'static str {
        if self.in_stock {
            AVAILABLE
        } else {
            NOT_AVAILABLE
        }
    }
}

pub const AVAILABLE: &str = "Available";
pub const NOT_AVAILABLE: &str = "Not Available";

/// 大麻素含量，保留網站原始百分比文字（例如 `22%`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Potency {
    pub thc: Option<String>,
    pub cbd: Option<String>,
}

/// 經過去重與排序、可直接發佈的表格
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    products: Vec<Product>,
}

impl CanonicalTable {
    pub(crate) fn from_sorted(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn out_of_stock_count(&self) -> usize {
        self.products.iter().filter(|p| !p.in_stock).count()
    }

    pub fn into_products(self) -> Vec<Product> {
        self.products
    }
}

/// 單一藥局的設定：抓取來源 + 目標試算表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispensaryConfig {
    pub name: String,
    pub fetch_urls: Vec<String>,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub adapter: AdapterConfig,
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSpec>,
    pub enabled: Option<bool>,
    /// 交錯列底色（偶數列）；未設定時不套用
    pub stripe_color: Option<Rgb>,
    /// 有貨列底色；未設定時有貨列只套用交錯底色
    pub in_stock_color: Option<Rgb>,
}

impl DispensaryConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn target(&self) -> SheetTarget {
        SheetTarget {
            spreadsheet_id: self.spreadsheet_id.clone(),
            sheet_name: self.sheet_name.clone(),
            layout: SheetLayout {
                columns: self.columns.clone(),
                stripe_color: self.stripe_color,
                in_stock_color: self.in_stock_color,
            },
        }
    }
}

/// 解析器選擇
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    Mamedica,
    Shopify {
        #[serde(default = "default_shopify_limit")]
        limit: u32,
    },
    Selector(SelectorConfig),
}

impl AdapterConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterConfig::Mamedica => "mamedica",
            AdapterConfig::Shopify { .. } => "shopify",
            AdapterConfig::Selector(_) => "selector",
        }
    }
}

fn default_shopify_limit() -> u32 {
    250
}

/// 通用 CSS 選擇器解析器設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub container: String,
    pub name: String,
    pub price: Option<String>,
    pub category: Option<String>,
    pub link: Option<String>,
    pub thc: Option<String>,
    pub cbd: Option<String>,
    pub stock_text: Option<String>,
    pub purchase_control: Option<String>,
    pub quantity_attribute: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Product,
    Category,
    Price,
    Thc,
    Cbd,
    Availability,
}

impl Column {
    pub fn header(&self) -> &'static str {
        match self {
            Column::Product => "Product",
            Column::Category => "Category",
            Column::Price => "Price",
            Column::Thc => "THC %",
            Column::Cbd => "CBD %",
            Column::Availability => "Availability",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column: Column,
    /// 像素寬度；未設定時自動調整
    pub width: Option<u32>,
}

impl ColumnSpec {
    pub fn auto(column: Column) -> Self {
        Self { column, width: None }
    }
}

pub fn default_columns() -> Vec<ColumnSpec> {
    [
        Column::Product,
        Column::Category,
        Column::Price,
        Column::Thc,
        Column::Cbd,
        Column::Availability,
    ]
    .into_iter()
    .map(ColumnSpec::auto)
    .collect()
}

/// 0.0 到 1.0 的 RGB 色彩，TOML 中寫成 `[r, g, b]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub f64, pub f64, pub f64);

impl Rgb {
    pub fn components(&self) -> [f64; 3] {
        [self.0, self.1, self.2]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub columns: Vec<ColumnSpec>,
    pub stripe_color: Option<Rgb>,
    pub in_stock_color: Option<Rgb>,
}

impl SheetLayout {
    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.column.header()).collect()
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| c.column == column)
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            stripe_color: None,
            in_stock_color: None,
        }
    }
}

/// 發佈目標
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub layout: SheetLayout,
}

/// 一次發佈的統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub rows_written: usize,
    pub format_directives: usize,
    /// batchUpdate 內的請求數
    pub requests: usize,
    /// 實際發出的遠端呼叫（含重試）
    pub api_calls: u32,
}
