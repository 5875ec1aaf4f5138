use crate::core::price::to_fixed;
use crate::domain::model::{CanonicalTable, Product};
use std::cmp::Ordering;
use std::collections::HashSet;

/// 合併解析結果成為排序後的表格
///
/// - 相同 `(name, source_url)` 只保留第一次出現的項目
/// - 依 category（字典序，無分類排最前）再依 name（不分大小寫）穩定排序，
///   完全相同的鍵保持原始掃描順序
/// - 價格統一為兩位小數
pub fn reconcile(products: Vec<Product>) -> CanonicalTable {
    let mut seen = HashSet::new();
    let mut rows: Vec<Product> = Vec::with_capacity(products.len());

    for mut product in products {
        if !seen.insert((product.name.clone(), product.source_url.clone())) {
            tracing::debug!("Dropping duplicate product: {}", product.name);
            continue;
        }
        product.price = product.price.map(to_fixed);
        rows.push(product);
    }

    // sort_by 為穩定排序
    rows.sort_by(compare_rows);
    CanonicalTable::from_sorted(rows)
}

fn compare_rows(a: &Product, b: &Product) -> Ordering {
    a.category
        .cmp(&b.category)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}
