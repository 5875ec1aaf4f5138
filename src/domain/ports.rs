use crate::domain::model::{CanonicalTable, Product, SheetTarget, WriteStats};
use crate::utils::error::{ParseError, PublishError, Result, TransportError};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 一次 HTTP 請求描述
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// 傳輸層：只負責取回頁面內容
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, TransportError>;
}

/// 挑戰頁面求解器（例如 FlareSolverr）
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, TransportError>;
}

/// 網站解析器：純函式，不做任何網路存取
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// 依據設定的網址建立請求（可加上查詢參數）
    fn request_for(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url)
    }

    fn parse(&self, body: &str, source_url: &str) -> std::result::Result<Vec<Product>, ParseError>;
}

/// 工作表查詢結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetLookup {
    /// 名稱相符（不分大小寫）的工作表
    pub sheet_id: Option<i64>,
    /// 試算表中已使用的所有 sheetId
    pub taken_ids: Vec<i64>,
}

/// 遠端試算表 API
#[async_trait]
pub trait SpreadsheetSink: Send + Sync {
    /// 以工作表名稱查詢數字 sheetId，並列出已使用的 sheetId
    async fn resolve_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> std::result::Result<SheetLookup, PublishError>;

    /// 單次 batchUpdate，回傳遠端回覆數量
    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: &[serde_json::Value],
    ) -> std::result::Result<usize, PublishError>;
}

#[async_trait]
pub trait TablePublisher: Send + Sync {
    async fn publish(
        &self,
        table: &CanonicalTable,
        target: &SheetTarget,
    ) -> std::result::Result<WriteStats, PublishError>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> std::result::Result<String, PublishError>;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
