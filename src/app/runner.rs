use crate::adapters::google_auth::{ServiceAccountKey, ServiceAccountTokenProvider, StaticTokenProvider};
use crate::adapters::preview::PreviewPublisher;
use crate::adapters::sheets::GoogleSheetsClient;
use crate::adapters::solver::FlareSolverrClient;
use crate::config::cli::LocalStorage;
use crate::config::toml_config::ScraperConfig;
use crate::core::driver::PipelineDriver;
use crate::core::publisher::SheetPublisher;
use crate::core::transport::HttpTransport;
use crate::domain::ports::{TablePublisher, TokenProvider};
use crate::utils::error::{Result, ScraperError};
use std::sync::Arc;
use std::time::Duration;

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_ACCESS_TOKEN";
const SOLVER_MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// 命令列提供、覆寫設定檔的執行選項
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub only: Vec<String>,
    pub skip: Vec<String>,
    pub concurrency: Option<usize>,
    pub dry_run: bool,
    pub output_path: String,
    /// 優先於 `publisher.credentials_path`
    pub access_token: Option<String>,
}

/// 依設定組裝傳輸層、發佈端與藥局清單
pub async fn build_driver(config: &ScraperConfig, options: &RunOptions) -> Result<PipelineDriver> {
    let dispensaries = config.select_dispensaries(&options.only, &options.skip)?;
    if dispensaries.is_empty() {
        return Err(ScraperError::MissingConfigError {
            field: "dispensaries (nothing left after --only/--skip and enabled filters)".to_string(),
        });
    }
    ScraperConfig::validate_selection(&dispensaries)?;

    let mut transport = HttpTransport::new(config.transport.clone())?;
    if let Some(endpoint) = &config.transport.solver_endpoint {
        tracing::info!("🧩 Challenge solver configured at {}", endpoint);
        let solver = FlareSolverrClient::new(endpoint.clone(), SOLVER_MAX_TIMEOUT)?;
        transport = transport.with_solver(Arc::new(solver));
    }

    let publisher: Arc<dyn TablePublisher> = if options.dry_run {
        tracing::info!("🧪 Dry run: previews go to {}", options.output_path);
        Arc::new(PreviewPublisher::new(LocalStorage::new(options.output_path.clone())))
    } else {
        let tokens = token_provider(config, options).await?;
        let sink = GoogleSheetsClient::new(
            config.publisher.api_base.clone(),
            tokens,
            Duration::from_secs(config.publisher.timeout_seconds),
        )?;
        Arc::new(SheetPublisher::new(sink, config.publisher.retry.clone()))
    };

    let concurrency = options.concurrency.unwrap_or(config.run.concurrency);
    Ok(PipelineDriver::new(Arc::new(transport), publisher)
        .with_dispensaries(dispensaries)
        .with_concurrency(concurrency))
}

async fn token_provider(config: &ScraperConfig, options: &RunOptions) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = options.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
        tracing::debug!("🔑 Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    let Some(path) = &config.publisher.credentials_path else {
        return Err(ScraperError::MissingConfigError {
            field: format!("publisher.credentials_path or {}", ACCESS_TOKEN_ENV),
        });
    };
    let json = tokio::fs::read_to_string(path).await?;
    let key = ServiceAccountKey::from_json(&json)?;
    tracing::debug!("🔑 Using service account {}", key.client_email);
    Ok(Arc::new(ServiceAccountTokenProvider::new(key)))
}
