use crate::adapters::stock::{parse_quantity, StockSignals};
use crate::adapters::{compile_selector, extract_percent, extract_potency};
use crate::core::price::normalize_price;
use crate::domain::model::{Potency, Product, SelectorConfig};
use crate::domain::ports::SiteAdapter;
use crate::utils::error::ParseError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

struct CompiledSelectors {
    container: Selector,
    name: Selector,
    price: Option<Selector>,
    category: Option<Selector>,
    link: Option<Selector>,
    thc: Option<Selector>,
    cbd: Option<Selector>,
    stock_text: Option<Selector>,
    purchase_control: Option<Selector>,
}

/// 以設定的 CSS 選擇器解析一般商品列表頁
#[derive(Debug, Clone)]
pub struct SelectorAdapter {
    config: SelectorConfig,
}

impl SelectorAdapter {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    fn compile(&self) -> Result<CompiledSelectors, ParseError> {
        let name = self.name();
        let optional = |css: &Option<String>| -> Result<Option<Selector>, ParseError> {
            css.as_deref()
                .map(|css| compile_selector(name, css))
                .transpose()
        };
        Ok(CompiledSelectors {
            container: compile_selector(name, &self.config.container)?,
            name: compile_selector(name, &self.config.name)?,
            price: optional(&self.config.price)?,
            category: optional(&self.config.category)?,
            link: optional(&self.config.link)?,
            thc: optional(&self.config.thc)?,
            cbd: optional(&self.config.cbd)?,
            stock_text: optional(&self.config.stock_text)?,
            purchase_control: optional(&self.config.purchase_control)?,
        })
    }

    fn extract(
        &self,
        item: ElementRef<'_>,
        selectors: &CompiledSelectors,
        base: Option<&Url>,
        source_url: &str,
    ) -> Option<Product> {
        let name = text_of(item, &selectors.name).filter(|n| !n.is_empty());
        let Some(name) = name else {
            tracing::warn!("⚠️ Skipping listing entry without a name");
            return None;
        };

        let price = selectors
            .price
            .as_ref()
            .and_then(|s| text_of(item, s))
            .and_then(|text| normalize_price(&text));

        let category = selectors
            .category
            .as_ref()
            .and_then(|s| text_of(item, s))
            .filter(|c| !c.is_empty());

        let link = selectors
            .link
            .as_ref()
            .and_then(|s| item.select(s).next())
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| match base {
                Some(base) => base.join(href).ok().map(String::from),
                None => Some(href.to_string()),
            })
            .unwrap_or_else(|| source_url.to_string());

        let potency = self.potency(item, selectors);

        let stock_text = selectors.stock_text.as_ref().and_then(|s| text_of(item, s));
        let purchase_disabled = selectors
            .purchase_control
            .as_ref()
            .and_then(|s| item.select(s).next())
            .is_some_and(is_disabled);
        let quantity = self
            .config
            .quantity_attribute
            .as_deref()
            .and_then(|attr| item.value().attr(attr))
            .and_then(parse_quantity);

        let in_stock = StockSignals {
            text: stock_text.as_deref(),
            purchase_disabled,
            quantity,
        }
        .in_stock();

        Some(
            Product::new(name, link)
                .with_price(price)
                .with_category(category)
                .with_potency(potency)
                .with_stock(in_stock),
        )
    }

    fn potency(&self, item: ElementRef<'_>, selectors: &CompiledSelectors) -> Potency {
        let field = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|s| text_of(item, s))
                .and_then(|text| extract_percent(&text))
        };
        let mut potency = Potency {
            thc: field(&selectors.thc),
            cbd: field(&selectors.cbd),
        };
        if potency.thc.is_none() && potency.cbd.is_none() {
            // 未設定含量欄位時，從商品卡片全文找
            let text: String = item.text().collect::<Vec<_>>().join(" ");
            potency = extract_potency(&text);
        }
        potency
    }
}

impl SiteAdapter for SelectorAdapter {
    fn name(&self) -> &str {
        "selector"
    }

    fn parse(&self, body: &str, source_url: &str) -> Result<Vec<Product>, ParseError> {
        let selectors = self.compile()?;
        let document = Html::parse_document(body);
        let base = Url::parse(source_url).ok();

        let items: Vec<ElementRef> = document.select(&selectors.container).collect();
        if items.is_empty() {
            return Err(ParseError::UnrecognizedStructure {
                adapter: self.name().to_string(),
                reason: format!("no elements match container '{}'", self.config.container),
            });
        }

        let products: Vec<Product> = items
            .into_iter()
            .filter_map(|item| self.extract(item, &selectors, base.as_ref(), source_url))
            .collect();
        tracing::debug!("Selector adapter: parsed {} products", products.len());
        Ok(products)
    }
}

/// 元素文字，合併連續空白
fn text_of(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = item.select(selector).next()?;
    let text = element.text().collect::<Vec<_>>().join(" ");
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn is_disabled(control: ElementRef<'_>) -> bool {
    let element = control.value();
    element.attr("disabled").is_some()
        || element.attr("aria-disabled") == Some("true")
        || element.classes().any(|c| c == "disabled" || c == "sold-out")
}
