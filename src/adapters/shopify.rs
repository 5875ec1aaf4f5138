use crate::adapters::extract_potency;
use crate::adapters::stock::StockSignals;
use crate::core::price::normalize_price;
use crate::domain::model::Product;
use crate::domain::ports::{FetchRequest, SiteAdapter};
use crate::utils::error::ParseError;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, Deserialize)]
struct Catalog {
    products: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ShopifyProduct {
    title: String,
    handle: Option<String>,
    product_type: Option<String>,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Deserialize)]
struct ShopifyVariant {
    /// Shopify 回傳字串（`"45.00"`），部分主題回傳數字
    price: Option<Value>,
    available: Option<bool>,
    inventory_quantity: Option<i64>,
}

/// Shopify 商店的 `products.json` 解析器
#[derive(Debug, Clone)]
pub struct ShopifyAdapter {
    limit: u32,
}

impl ShopifyAdapter {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    fn to_product(&self, raw: Value, base: Option<&Url>, source_url: &str) -> Option<Product> {
        let product: ShopifyProduct = match serde_json::from_value(raw) {
            Ok(product) => product,
            Err(e) => {
                tracing::warn!("⚠️ Skipping malformed Shopify product: {}", e);
                return None;
            }
        };

        let name = product.title.trim();
        if name.is_empty() {
            tracing::warn!("⚠️ Skipping Shopify product without title");
            return None;
        }
        let Some(variant) = product.variants.first() else {
            tracing::warn!("⚠️ Skipping '{}': no variants", name);
            return None;
        };

        let price = variant.price.as_ref().and_then(|value| match value {
            Value::String(s) => normalize_price(s),
            Value::Number(n) => normalize_price(&n.to_string()),
            _ => None,
        });

        let in_stock = StockSignals {
            text: None,
            purchase_disabled: variant.available == Some(false),
            quantity: variant.inventory_quantity.filter(|_| variant.available.is_none()),
        }
        .in_stock();

        let link = product
            .handle
            .as_deref()
            .filter(|h| !h.is_empty())
            .and_then(|handle| base?.join(&format!("/products/{}", handle)).ok())
            .map(String::from)
            .unwrap_or_else(|| source_url.to_string());

        let category = product
            .product_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Some(
            Product::new(name, link)
                .with_price(price)
                .with_category(category)
                .with_potency(extract_potency(product.body_html.as_deref().unwrap_or_default()))
                .with_stock(in_stock),
        )
    }
}

impl SiteAdapter for ShopifyAdapter {
    fn name(&self) -> &str {
        "shopify"
    }

    fn request_for(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url)
            .with_query("limit", self.limit.to_string())
            .with_header("Accept", "application/json")
    }

    fn parse(&self, body: &str, source_url: &str) -> Result<Vec<Product>, ParseError> {
        let catalog: Catalog =
            serde_json::from_str(body).map_err(|e| ParseError::UnrecognizedStructure {
                adapter: self.name().to_string(),
                reason: format!("expected a products.json document: {}", e),
            })?;

        let base = Url::parse(source_url).ok();
        let total = catalog.products.len();
        let products: Vec<Product> = catalog
            .products
            .into_iter()
            .filter_map(|raw| self.to_product(raw, base.as_ref(), source_url))
            .collect();

        if products.len() < total {
            tracing::warn!("⚠️ Skipped {} of {} Shopify products", total - products.len(), total);
        }
        Ok(products)
    }
}
