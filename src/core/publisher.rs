use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::model::{CanonicalTable, Column, Product, Rgb, SheetLayout, SheetTarget, WriteStats};
use crate::domain::ports::{SpreadsheetSink, TablePublisher};
use crate::utils::error::PublishError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};

const HEADER_BG: Rgb = Rgb(0.12, 0.24, 0.35);
const HEADER_TEXT: Rgb = Rgb(1.0, 1.0, 1.0);
const UNAVAILABLE_BG: Rgb = Rgb(1.0, 0.9, 0.9);
const UNAVAILABLE_TEXT: Rgb = Rgb(0.6, 0.0, 0.0);
const AVAILABLE_TEXT: Rgb = Rgb(0.0, 0.4, 0.0);
const TIMESTAMP_TEXT: Rgb = Rgb(0.5, 0.5, 0.5);
const TIMESTAMP_BG: Rgb = Rgb(0.95, 0.95, 0.95);
/// 資料表與更新時間列之間的空白列數
const TIMESTAMP_GAP: usize = 2;
const CURRENCY_PATTERN: &str = "£#,##0.00";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormatDirective {
    HeaderRow,
    ColumnWidth { column: usize, pixels: u32 },
    /// 自動調整 `[start, end)` 欄寬
    AutoResize { start: usize, end: usize },
    CurrencyColumn { column: usize },
    ColumnAlignment {
        column: usize,
        horizontal: &'static str,
        wrap: &'static str,
    },
    /// 資料區中工作表列號為偶數的列套用底色
    Stripes { color: Rgb },
    /// 有貨列 `[start_row, end_row)`
    InStockRows {
        start_row: usize,
        end_row: usize,
        color: Rgb,
    },
    /// 缺貨列 `[start_row, end_row)`，以工作表列索引表示
    OutOfStockRows { start_row: usize, end_row: usize },
    Borders,
    TimestampRow { row: usize },
}

/// 目標工作表：已存在或需在同一批次中建立
#[derive(Debug, Clone, PartialEq)]
pub enum SheetRef {
    Existing(i64),
    Create { sheet_id: i64, title: String },
}

impl SheetRef {
    pub fn sheet_id(&self) -> i64 {
        match self {
            SheetRef::Existing(id) => *id,
            SheetRef::Create { sheet_id, .. } => *sheet_id,
        }
    }

    /// 新工作表的 sheetId 避開試算表中已使用的值
    pub fn create(title: &str, taken_ids: &[i64]) -> Self {
        SheetRef::Create {
            sheet_id: free_sheet_id(derive_sheet_id(title), taken_ids),
            title: title.to_string(),
        }
    }
}

/// 一次發佈的暫存內容：數值列與平行的格式指令
#[derive(Debug, Clone, PartialEq)]
pub struct SheetWriteBatch {
    pub rows: Vec<Vec<CellValue>>,
    pub formats: Vec<FormatDirective>,
    pub data_rows: usize,
    pub column_count: usize,
}

impl SheetWriteBatch {
    pub fn build(table: &CanonicalTable, layout: &SheetLayout, updated_at: DateTime<Local>) -> Self {
        let column_count = layout.columns.len();
        let data_rows = table.len();

        let mut rows = Vec::with_capacity(data_rows + TIMESTAMP_GAP + 2);
        rows.push(
            layout
                .headers()
                .into_iter()
                .map(|h| CellValue::Text(h.to_string()))
                .collect(),
        );
        for product in table.products() {
            rows.push(
                layout
                    .columns
                    .iter()
                    .map(|spec| cell_for(product, spec.column))
                    .collect(),
            );
        }
        rows.extend(std::iter::repeat_with(Vec::new).take(TIMESTAMP_GAP));
        rows.push(vec![CellValue::Text(
            updated_at.format("Updated: %H:%M %d/%m/%Y").to_string(),
        )]);

        let mut batch = Self {
            rows,
            formats: Vec::new(),
            data_rows,
            column_count,
        };
        batch.formats = batch.build_formats(table, layout);
        batch
    }

    pub fn timestamp_row(&self) -> usize {
        self.data_rows + 1 + TIMESTAMP_GAP
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    fn build_formats(&self, table: &CanonicalTable, layout: &SheetLayout) -> Vec<FormatDirective> {
        let mut formats = vec![FormatDirective::HeaderRow];

        let mut auto_start: Option<usize> = None;
        for (index, spec) in layout.columns.iter().enumerate() {
            match spec.width {
                Some(pixels) => {
                    if let Some(start) = auto_start.take() {
                        formats.push(FormatDirective::AutoResize { start, end: index });
                    }
                    formats.push(FormatDirective::ColumnWidth {
                        column: index,
                        pixels,
                    });
                }
                None => {
                    auto_start.get_or_insert(index);
                }
            }
        }
        if let Some(start) = auto_start {
            formats.push(FormatDirective::AutoResize {
                start,
                end: layout.columns.len(),
            });
        }

        if let Some(column) = layout.position(Column::Price) {
            formats.push(FormatDirective::CurrencyColumn { column });
        }

        for (column, spec) in layout.columns.iter().enumerate() {
            let (horizontal, wrap) = match spec.column {
                Column::Product => ("LEFT", "WRAP"),
                Column::Price => ("RIGHT", "OVERFLOW_CELL"),
                _ => ("CENTER", "OVERFLOW_CELL"),
            };
            formats.push(FormatDirective::ColumnAlignment {
                column,
                horizontal,
                wrap,
            });
        }

        // 後面的底色指令覆蓋前面的：交錯底色 → 有貨 → 缺貨
        if let Some(color) = layout.stripe_color {
            formats.push(FormatDirective::Stripes { color });
        }
        if let Some(color) = layout.in_stock_color {
            formats.extend(stock_runs(table, true).into_iter().map(|(start_row, end_row)| {
                FormatDirective::InStockRows {
                    start_row,
                    end_row,
                    color,
                }
            }));
        }
        formats.extend(
            stock_runs(table, false)
                .into_iter()
                .map(|(start_row, end_row)| FormatDirective::OutOfStockRows { start_row, end_row }),
        );

        formats.push(FormatDirective::Borders);
        formats.push(FormatDirective::TimestampRow {
            row: self.timestamp_row(),
        });
        formats
    }

    /// 轉成單一 batchUpdate 的請求清單
    ///
    /// 順序：調整格線（或建立工作表）→ 清除舊值與格式 → 寫入數值 → 套用格式
    pub fn to_requests(&self, sheet: &SheetRef) -> Vec<Value> {
        let sheet_id = sheet.sheet_id();
        let grid = json!({
            "rowCount": self.total_rows(),
            "columnCount": self.column_count.max(1),
            "frozenRowCount": 1
        });

        let mut requests = Vec::with_capacity(self.formats.len() + 3);
        requests.push(match sheet {
            SheetRef::Create { title, .. } => json!({
                "addSheet": {
                    "properties": {
                        "sheetId": sheet_id,
                        "title": title,
                        "gridProperties": grid
                    }
                }
            }),
            SheetRef::Existing(_) => json!({
                "updateSheetProperties": {
                    "properties": {"sheetId": sheet_id, "gridProperties": grid},
                    "fields": "gridProperties(rowCount,columnCount,frozenRowCount)"
                }
            }),
        });

        requests.push(json!({
            "updateCells": {
                "range": {"sheetId": sheet_id},
                "fields": "userEnteredValue,userEnteredFormat"
            }
        }));

        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| json!({"values": row.iter().map(cell_json).collect::<Vec<_>>()}))
            .collect();
        requests.push(json!({
            "updateCells": {
                "start": {"sheetId": sheet_id, "rowIndex": 0, "columnIndex": 0},
                "rows": rows,
                "fields": "userEnteredValue"
            }
        }));

        requests.extend(self.formats.iter().map(|f| self.format_json(f, sheet_id)));
        requests
    }

    fn format_json(&self, directive: &FormatDirective, sheet_id: i64) -> Value {
        let columns = self.column_count;
        let data_end = self.data_rows + 1;
        match directive {
            FormatDirective::HeaderRow => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, 0, 1, 0, columns),
                    "cell": {"userEnteredFormat": {
                        "backgroundColor": color(HEADER_BG),
                        "textFormat": {"foregroundColor": color(HEADER_TEXT), "bold": true, "fontSize": 12},
                        "horizontalAlignment": "CENTER",
                        "wrapStrategy": "WRAP"
                    }},
                    "fields": "userEnteredFormat(backgroundColor,textFormat,horizontalAlignment,wrapStrategy)"
                }
            }),
            FormatDirective::ColumnWidth { column, pixels } => json!({
                "updateDimensionProperties": {
                    "range": {"sheetId": sheet_id, "dimension": "COLUMNS", "startIndex": column, "endIndex": column + 1},
                    "properties": {"pixelSize": pixels},
                    "fields": "pixelSize"
                }
            }),
            FormatDirective::AutoResize { start, end } => json!({
                "autoResizeDimensions": {
                    "dimensions": {"sheetId": sheet_id, "dimension": "COLUMNS", "startIndex": start, "endIndex": end}
                }
            }),
            FormatDirective::CurrencyColumn { column } => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, 1, data_end, *column, column + 1),
                    "cell": {"userEnteredFormat": {
                        "numberFormat": {"type": "CURRENCY", "pattern": CURRENCY_PATTERN}
                    }},
                    "fields": "userEnteredFormat.numberFormat"
                }
            }),
            FormatDirective::ColumnAlignment {
                column,
                horizontal,
                wrap,
            } => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, 1, data_end, *column, column + 1),
                    "cell": {"userEnteredFormat": {"horizontalAlignment": horizontal, "wrapStrategy": wrap}},
                    "fields": "userEnteredFormat(horizontalAlignment,wrapStrategy)"
                }
            }),
            FormatDirective::Stripes { color: stripe } => {
                let rows: Vec<Value> = (1..data_end)
                    .map(|row| {
                        // 工作表列號 = 索引 + 1
                        if (row + 1) % 2 == 0 {
                            let cell = json!({"userEnteredFormat": {"backgroundColor": color(*stripe)}});
                            json!({"values": vec![cell; columns]})
                        } else {
                            json!({"values": []})
                        }
                    })
                    .collect();
                json!({
                    "updateCells": {
                        "range": grid_range(sheet_id, 1, data_end, 0, columns),
                        "rows": rows,
                        "fields": "userEnteredFormat.backgroundColor"
                    }
                })
            }
            FormatDirective::InStockRows {
                start_row,
                end_row,
                color: background,
            } => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, *start_row, *end_row, 0, columns),
                    "cell": {"userEnteredFormat": {
                        "backgroundColor": color(*background),
                        "textFormat": {"foregroundColor": color(AVAILABLE_TEXT), "bold": true}
                    }},
                    "fields": "userEnteredFormat(backgroundColor,textFormat)"
                }
            }),
            FormatDirective::OutOfStockRows { start_row, end_row } => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, *start_row, *end_row, 0, columns),
                    "cell": {"userEnteredFormat": {
                        "backgroundColor": color(UNAVAILABLE_BG),
                        "textFormat": {"foregroundColor": color(UNAVAILABLE_TEXT), "bold": true}
                    }},
                    "fields": "userEnteredFormat(backgroundColor,textFormat)"
                }
            }),
            FormatDirective::Borders => {
                let solid = json!({"style": "SOLID", "width": 1});
                json!({
                    "updateBorders": {
                        "range": grid_range(sheet_id, 0, data_end, 0, columns),
                        "top": solid, "bottom": solid, "left": solid, "right": solid,
                        "innerHorizontal": solid, "innerVertical": solid
                    }
                })
            }
            FormatDirective::TimestampRow { row } => json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, *row, row + 1, 0, 1),
                    "cell": {"userEnteredFormat": {
                        "textFormat": {"italic": true, "fontSize": 10, "foregroundColor": color(TIMESTAMP_TEXT)},
                        "backgroundColor": color(TIMESTAMP_BG)
                    }},
                    "fields": "userEnteredFormat(textFormat,backgroundColor)"
                }
            }),
        }
    }
}

fn cell_for(product: &Product, column: Column) -> CellValue {
    let text = |value: Option<&String>| match value {
        Some(v) => CellValue::Text(v.clone()),
        None => CellValue::Empty,
    };
    match column {
        Column::Product => CellValue::Text(product.name.clone()),
        Column::Category => text(product.category.as_ref()),
        Column::Price => match product.price.and_then(|p| p.to_f64()) {
            Some(value) => CellValue::Number(value),
            None => CellValue::Empty,
        },
        Column::Thc => text(product.potency.thc.as_ref()),
        Column::Cbd => text(product.potency.cbd.as_ref()),
        Column::Availability => CellValue::Text(product.availability().to_string()),
    }
}

fn cell_json(cell: &CellValue) -> Value {
    match cell {
        CellValue::Text(s) => json!({"userEnteredValue": {"stringValue": s}}),
        CellValue::Number(n) => json!({"userEnteredValue": {"numberValue": n}}),
        CellValue::Empty => json!({}),
    }
}

fn grid_range(sheet_id: i64, start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Value {
    json!({
        "sheetId": sheet_id,
        "startRowIndex": start_row,
        "endRowIndex": end_row,
        "startColumnIndex": start_col,
        "endColumnIndex": end_col
    })
}

fn color(Rgb(red, green, blue): Rgb) -> Value {
    json!({"red": red, "green": green, "blue": blue})
}

/// 連續且庫存狀態相同的資料列合併為 `[start_row, end_row)` 範圍
fn stock_runs(table: &CanonicalTable, in_stock: bool) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;
    for (index, product) in table.products().iter().enumerate() {
        let row = index + 1;
        match (product.in_stock == in_stock, run_start) {
            (true, None) => run_start = Some(row),
            (false, Some(start)) => {
                runs.push((start, row));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start, table.len() + 1));
    }
    runs
}

/// 以標題推導新工作表的 sheetId（FNV-1a，落在正的 i32 範圍）
pub fn derive_sheet_id(title: &str) -> i64 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in title.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    i64::from((hash & 0x7fff_ffff).max(1))
}

fn free_sheet_id(mut candidate: i64, taken_ids: &[i64]) -> i64 {
    while taken_ids.contains(&candidate) {
        candidate = candidate % i64::from(i32::MAX) + 1;
    }
    candidate
}

/// 以單一 batchUpdate 完整覆寫工作表
pub struct SheetPublisher<S: SpreadsheetSink> {
    sink: S,
    retry: RetryPolicy,
}

impl<S: SpreadsheetSink> SheetPublisher<S> {
    pub fn new(sink: S, retry: RetryPolicy) -> Self {
        Self { sink, retry }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[async_trait]
impl<S: SpreadsheetSink> TablePublisher for SheetPublisher<S> {
    async fn publish(
        &self,
        table: &CanonicalTable,
        target: &SheetTarget,
    ) -> Result<WriteStats, PublishError> {
        let batch = SheetWriteBatch::build(table, &target.layout, Local::now());

        let resolved = retry_with_backoff(&self.retry, "resolve sheet", |_| {
            self.sink
                .resolve_sheet(&target.spreadsheet_id, &target.sheet_name)
        })
        .await?;

        let sheet = match resolved.value.sheet_id {
            Some(id) => SheetRef::Existing(id),
            None => {
                tracing::info!("📄 Worksheet '{}' not found, creating it", target.sheet_name);
                SheetRef::create(&target.sheet_name, &resolved.value.taken_ids)
            }
        };

        let requests = batch.to_requests(&sheet);
        tracing::debug!(
            "📝 Writing {} rows with {} format directives ({} requests)",
            batch.data_rows,
            batch.formats.len(),
            requests.len()
        );

        let written = retry_with_backoff(&self.retry, "batch update", |_| {
            self.sink.batch_update(&target.spreadsheet_id, &requests)
        })
        .await?;

        Ok(WriteStats {
            rows_written: batch.data_rows,
            format_directives: batch.formats.len(),
            requests: requests.len(),
            api_calls: resolved.attempts + written.attempts,
        })
    }
}
