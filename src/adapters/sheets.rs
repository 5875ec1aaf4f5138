use crate::domain::ports::{SheetLookup, SpreadsheetSink, TokenProvider};
use crate::utils::error::PublishError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

impl SpreadsheetMetadata {
    /// 工作表名稱在 Google Sheets 中不分大小寫，完全相同者優先
    fn lookup(&self, sheet_name: &str) -> SheetLookup {
        let wanted = sheet_name.to_lowercase();
        let sheet_id = self
            .sheets
            .iter()
            .find(|s| s.properties.title == sheet_name)
            .or_else(|| {
                self.sheets
                    .iter()
                    .find(|s| s.properties.title.to_lowercase() == wanted)
            })
            .map(|s| s.properties.sheet_id);

        SheetLookup {
            sheet_id,
            taken_ids: self.sheets.iter().map(|s| s.properties.sheet_id).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateReply {
    #[serde(default)]
    replies: Vec<Value>,
}

/// Google Sheets v4 REST 客戶端
pub struct GoogleSheetsClient {
    client: Client,
    api_base: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleSheetsClient {
    pub fn new(
        api_base: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transient(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!("{}/v4/spreadsheets/{}", self.api_base, spreadsheet_id)
    }
}

#[async_trait]
impl SpreadsheetSink for GoogleSheetsClient {
    async fn resolve_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<SheetLookup, PublishError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.spreadsheet_url(spreadsheet_id))
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        let metadata: SpreadsheetMetadata = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Transient(format!("Invalid metadata response: {}", e)))?;

        let lookup = metadata.lookup(sheet_name);
        tracing::debug!("🔎 Worksheet '{}' resolved to {:?}", sheet_name, lookup.sheet_id);
        Ok(lookup)
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: &[Value],
    ) -> Result<usize, PublishError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id)))
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(network_error)?;

        let reply: BatchUpdateReply = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Transient(format!("Invalid batchUpdate response: {}", e)))?;
        Ok(reply.replies.len())
    }
}

fn network_error(err: reqwest::Error) -> PublishError {
    PublishError::Transient(format!("Spreadsheet API request failed: {}", err))
}

/// 將 HTTP 狀態碼對應到發佈錯誤
async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body).unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::PermissionDenied(message),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => PublishError::InvalidTarget(message),
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            PublishError::Transient(message)
        }
        _ => PublishError::InvalidTarget(message),
    })
}

fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error": {"code": 403, "message": "The caller does not have permission"}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("The caller does not have permission")
        );
        assert_eq!(api_error_message("<html>"), None);
    }

    #[test]
    fn test_lookup_ignores_title_case() {
        let metadata: SpreadsheetMetadata = serde_json::from_str(
            r#"{"sheets": [
                {"properties": {"sheetId": 0, "title": "Sheet1"}},
                {"properties": {"sheetId": 918273, "title": "montu list"}}
            ]}"#,
        )
        .unwrap();

        let lookup = metadata.lookup("Montu List");
        assert_eq!(lookup.sheet_id, Some(918273));
        assert_eq!(lookup.taken_ids, vec![0, 918273]);

        assert_eq!(metadata.lookup("Mamedica List").sheet_id, None);
    }

    #[test]
    fn test_lookup_prefers_exact_title() {
        let metadata: SpreadsheetMetadata = serde_json::from_str(
            r#"{"sheets": [
                {"properties": {"sheetId": 1, "title": "MONTU LIST"}},
                {"properties": {"sheetId": 2, "title": "Montu List"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(metadata.lookup("Montu List").sheet_id, Some(2));
    }
}
