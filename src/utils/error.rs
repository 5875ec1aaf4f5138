use std::time::Duration;
use thiserror::Error;

/// 傳輸層錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Blocked by bot protection at {url}: {reason}")]
    Blocked { url: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidUrl(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::HttpStatus(status.as_u16())
        } else {
            TransportError::ConnectionFailed(err.to_string())
        }
    }
}

/// 頁面解析錯誤（代表網站格式改變）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unrecognized page structure for adapter '{adapter}': {reason}")]
    UnrecognizedStructure { adapter: String, reason: String },

    #[error("Adapter '{adapter}' found no products")]
    NoProducts { adapter: String },
}

/// 試算表發佈錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Spreadsheet API rate limit reached")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid spreadsheet target: {0}")]
    InvalidTarget(String),

    #[error("Transient spreadsheet API failure: {0}")]
    Transient(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Local storage error: {0}")]
    Storage(String),
}

/// 可重試錯誤的共同介面
pub trait Retryable {
    fn is_transient(&self) -> bool;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for TransportError {
    fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::ConnectionFailed(_) => true,
            TransportError::HttpStatus(code) => is_transient_status(*code),
            TransportError::Blocked { .. } | TransportError::InvalidUrl(_) => false,
        }
    }
}

impl Retryable for PublishError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::RateLimited { .. } | PublishError::Transient(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PublishError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub fn is_transient_status(code: u16) -> bool {
    matches!(code, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Parsing,
    Publishing,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScraperError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScraperError::Transport(_) => ErrorCategory::Network,
            ScraperError::Parse(_) => ErrorCategory::Parsing,
            ScraperError::Publish(_) => ErrorCategory::Publishing,
            ScraperError::ConfigValidationError { .. }
            | ScraperError::InvalidConfigValueError { .. }
            | ScraperError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ScraperError::IoError(_)
            | ScraperError::SerializationError(_)
            | ScraperError::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ScraperError::Parse(ParseError::NoProducts { .. }) => ErrorSeverity::Low,
            ScraperError::Transport(e) if e.is_transient() => ErrorSeverity::Medium,
            ScraperError::Publish(e) if e.is_transient() => ErrorSeverity::Medium,
            ScraperError::Transport(_) | ScraperError::Parse(_) | ScraperError::Publish(_) => {
                ErrorSeverity::High
            }
            ScraperError::ConfigValidationError { .. }
            | ScraperError::InvalidConfigValueError { .. }
            | ScraperError::MissingConfigError { .. } => ErrorSeverity::Critical,
            ScraperError::IoError(_)
            | ScraperError::SerializationError(_)
            | ScraperError::CsvError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ScraperError::Transport(TransportError::Blocked { .. }) => {
                "Configure transport.solver_endpoint or retry later from another network"
            }
            ScraperError::Transport(TransportError::InvalidUrl(_)) => {
                "Check the fetch_urls of this dispensary"
            }
            ScraperError::Transport(_) => "Check network connectivity and the dispensary site status",
            ScraperError::Parse(ParseError::NoProducts { .. }) => {
                "The site returned an empty listing; the sheet was left untouched"
            }
            ScraperError::Parse(_) => "The site layout changed; update the adapter for this dispensary",
            ScraperError::Publish(PublishError::PermissionDenied(_)) => {
                "Share the spreadsheet with the service account email"
            }
            ScraperError::Publish(PublishError::InvalidTarget(_)) => {
                "Verify spreadsheet_id and sheet_name in the configuration"
            }
            ScraperError::Publish(PublishError::Credentials(_)) => {
                "Check GOOGLE_ACCESS_TOKEN or the service account credentials file"
            }
            ScraperError::Publish(_) => "The spreadsheet API is busy; run again later",
            ScraperError::ConfigValidationError { .. }
            | ScraperError::InvalidConfigValueError { .. }
            | ScraperError::MissingConfigError { .. } => "Fix the configuration file and try again",
            ScraperError::IoError(_) => "Check file paths and permissions",
            ScraperError::SerializationError(_) | ScraperError::CsvError(_) => {
                "Inspect the input data for unexpected content"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not download the listing: {}", self),
            ErrorCategory::Parsing => format!("Could not read the listing: {}", self),
            ErrorCategory::Publishing => format!("Could not update the spreadsheet: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
