use crate::core::publisher::{CellValue, SheetWriteBatch};
use crate::domain::model::{CanonicalTable, SheetTarget, WriteStats};
use crate::domain::ports::{Storage, TablePublisher};
use crate::utils::error::PublishError;
use async_trait::async_trait;
use chrono::Local;

/// 乾跑模式：把要寫入試算表的內容輸出成 TSV
pub struct PreviewPublisher<S: Storage> {
    storage: S,
}

impl<S: Storage> PreviewPublisher<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn file_name(target: &SheetTarget) -> String {
        let stem: String = target
            .sheet_name
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}.tsv", stem)
    }
}

pub fn render_tsv(batch: &SheetWriteBatch) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new());

    let width = batch.column_count.max(1);
    for row in &batch.rows {
        let mut fields: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                CellValue::Text(s) => s.clone(),
                CellValue::Number(n) => format!("{:.2}", n),
                CellValue::Empty => String::new(),
            })
            .collect();
        fields.resize(width.max(fields.len()), String::new());
        writer.write_record(&fields)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[async_trait]
impl<S: Storage> TablePublisher for PreviewPublisher<S> {
    async fn publish(
        &self,
        table: &CanonicalTable,
        target: &SheetTarget,
    ) -> Result<WriteStats, PublishError> {
        let batch = SheetWriteBatch::build(table, &target.layout, Local::now());
        let data = render_tsv(&batch).map_err(|e| PublishError::Storage(e.to_string()))?;
        let path = Self::file_name(target);

        self.storage
            .write_file(&path, &data)
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?;
        tracing::info!("📁 Preview for '{}' written to {}", target.sheet_name, path);

        Ok(WriteStats {
            rows_written: batch.data_rows,
            format_directives: batch.formats.len(),
            requests: 0,
            api_calls: 0,
        })
    }
}
