use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::ports::{ChallengeSolver, FetchRequest, FetchResponse, Fetcher, HttpMethod};
use crate::utils::error::{is_transient_status, Retryable, ScraperError, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Cloudflare / DDoS-Guard 類挑戰頁面的特徵字串（小寫比對）
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-chl",
    "cf_chl_opt",
    "challenge-platform",
    "just a moment...",
    "checking your browser",
    "attention required! | cloudflare",
    "ddos-guard",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// 每次抓取前的隨機等待區間（毫秒）
    pub politeness_delay_ms: Option<(u64, u64)>,
    /// 挑戰頁面後，帶著新 cookie 重送前的等待時間
    pub challenge_wait_ms: u64,
    pub solver_endpoint: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 25,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            politeness_delay_ms: None,
            challenge_wait_ms: 5_000,
            solver_endpoint: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Challenge(&'static str),
    Transient,
    Permanent,
}

/// 依狀態碼與內容判斷回應的處理方式
pub fn classify(status: u16, body: &str) -> Disposition {
    if (200..300).contains(&status) {
        return Disposition::Success;
    }
    if matches!(status, 403 | 429 | 503) {
        if let Some(marker) = challenge_marker(body) {
            return Disposition::Challenge(marker);
        }
    }
    if is_transient_status(status) {
        Disposition::Transient
    } else {
        Disposition::Permanent
    }
}

fn challenge_marker(body: &str) -> Option<&'static str> {
    let lowered = body.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .copied()
        .find(|marker| lowered.contains(marker))
}

struct RawResponse {
    status: u16,
    retry_after: Option<Duration>,
    body: String,
}

/// 單次嘗試的錯誤，附帶伺服器的 Retry-After 提示
#[derive(Debug)]
struct AttemptError {
    error: TransportError,
    retry_after: Option<Duration>,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl Retryable for AttemptError {
    fn is_transient(&self) -> bool {
        self.error.is_transient()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<TransportError> for AttemptError {
    fn from(error: TransportError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// 共用連線池與 cookie jar 的 HTTP 傳輸層
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    solver: Option<Arc<dyn ChallengeSolver>>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> crate::utils::error::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(browser_headers(&config.user_agent)?)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScraperError::ConfigValidationError {
                field: "transport".to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            solver: None,
        })
    }

    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn politeness_pause(&self) {
        if let Some((min, max)) = self.config.politeness_delay_ms {
            if max > 0 && min <= max {
                let pause = Duration::from_millis(fastrand::u64(min..=max));
                tracing::debug!("⏳ Waiting {:?} before request", pause);
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<RawResponse, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        tracing::debug!("📡 {} -> {} ({} bytes)", request.url, status, body.len());
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<FetchResponse, AttemptError> {
        let raw = self.send_once(request).await?;
        match classify(raw.status, &raw.body) {
            Disposition::Success => Ok(FetchResponse {
                status: raw.status,
                body: raw.body,
            }),
            Disposition::Challenge(marker) => Ok(self.handle_challenge(request, marker).await?),
            Disposition::Transient | Disposition::Permanent => Err(AttemptError {
                error: TransportError::HttpStatus(raw.status),
                retry_after: raw.retry_after,
            }),
        }
    }

    /// 先帶著挑戰頁設下的 cookie 重送一次，仍失敗則交給求解器
    async fn handle_challenge(
        &self,
        request: &FetchRequest,
        marker: &'static str,
    ) -> Result<FetchResponse, TransportError> {
        tracing::warn!("🛡️ Bot challenge detected at {} ({})", request.url, marker);

        if self.config.challenge_wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.challenge_wait_ms)).await;
        }
        let second = self.send_once(request).await?;
        if classify(second.status, &second.body) == Disposition::Success {
            tracing::info!("🛡️ Challenge cleared with session cookies for {}", request.url);
            return Ok(FetchResponse {
                status: second.status,
                body: second.body,
            });
        }

        let Some(solver) = &self.solver else {
            return Err(TransportError::Blocked {
                url: request.url.clone(),
                reason: format!("challenge '{}' and no solver configured", marker),
            });
        };

        tracing::info!("🧩 Routing {} through challenge solver", request.url);
        let solved = solver
            .solve(request)
            .await
            .map_err(|e| TransportError::Blocked {
                url: request.url.clone(),
                reason: format!("solver failed: {}", e),
            })?;

        match classify(solved.status, &solved.body) {
            Disposition::Success => Ok(solved),
            _ => Err(TransportError::Blocked {
                url: request.url.clone(),
                reason: format!("solver returned status {}", solved.status),
            }),
        }
    }
}

#[async_trait]
impl Fetcher for HttpTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        self.politeness_pause().await;

        let label = format!("GET {}", request.url);
        retry_with_backoff(&self.config.retry, &label, |_| self.attempt(request))
            .await
            .map(|attempted| attempted.value)
            .map_err(|e| e.error)
    }
}

fn browser_headers(user_agent: &str) -> crate::utils::error::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).map_err(|e| ScraperError::InvalidConfigValueError {
            field: "transport.user_agent".to_string(),
            value: user_agent.to_string(),
            reason: e.to_string(),
        })?,
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    Ok(headers)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
