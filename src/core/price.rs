use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid price pattern"));

/// 將網站上的價格字串轉成兩位小數的 Decimal
///
/// 貨幣符號與千分位逗號會被移除；找不到數字（例如 `N/A`、`Sold out`）時回傳 `None`，
/// 不會以 0 代替。
pub fn normalize_price(raw: &str) -> Option<Decimal> {
    let matched = PRICE_PATTERN.find(raw.trim())?;
    let digits: String = matched.as_str().chars().filter(|c| *c != ',').collect();
    let value = Decimal::from_str(&digits).ok()?;
    Some(to_fixed(value))
}

/// 四捨五入到兩位並固定 scale，使 `12.5` 與 `12.50` 相等且顯示一致
pub fn to_fixed(value: Decimal) -> Decimal {
    let mut fixed = value.round_dp(2);
    fixed.rescale(2);
    fixed
}

pub fn format_price(value: &Decimal) -> String {
    to_fixed(*value).to_string()
}
