/// 網站上表示缺貨的常見字樣（小寫比對）
const OUT_OF_STOCK_MARKERS: &[&str] = &[
    "out of stock",
    "sold out",
    "unavailable",
    "not available",
    "no stock",
];

/// 從網站提供的線索推斷庫存狀態
///
/// 任一訊號即判定為缺貨：缺貨字樣、購買按鈕停用、數量為零或負數。
/// 沒有任何訊號時視為有貨。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSignals<'a> {
    pub text: Option<&'a str>,
    pub purchase_disabled: bool,
    pub quantity: Option<i64>,
}

impl StockSignals<'_> {
    pub fn in_stock(&self) -> bool {
        !(self.purchase_disabled
            || self.quantity.is_some_and(|q| q <= 0)
            || self.text.is_some_and(mentions_out_of_stock))
    }
}

pub fn mentions_out_of_stock(text: &str) -> bool {
    let lowered = text.to_lowercase();
    OUT_OF_STOCK_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// 解析數量屬性，例如 `data-qty="0"`；無法解析時忽略
pub fn parse_quantity(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}
