use crate::adapters::build_adapter;
use crate::core::reconcile::reconcile;
use crate::domain::model::{DispensaryConfig, WriteStats};
use crate::domain::ports::{Fetcher, SiteAdapter, TablePublisher};
use crate::utils::error::{ParseError, ScraperError};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// 單一藥局的處理階段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Fetching,
    Parsing,
    Reconciling,
    Publishing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Reconciling => "reconciling",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Done {
        rows: usize,
        out_of_stock: usize,
        stats: WriteStats,
    },
    Failed {
        stage: Stage,
        error: ScraperError,
    },
}

#[derive(Debug)]
pub struct DispensaryOutcome {
    pub name: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl DispensaryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Done { .. })
    }

    pub fn final_stage(&self) -> Stage {
        if self.is_success() {
            Stage::Done
        } else {
            Stage::Failed
        }
    }

    pub fn rows(&self) -> usize {
        match &self.outcome {
            Outcome::Done { rows, .. } => *rows,
            Outcome::Failed { .. } => 0,
        }
    }

    /// 執行摘要中的單行描述
    pub fn summary_line(&self) -> String {
        match &self.outcome {
            Outcome::Done {
                rows, out_of_stock, ..
            } => format!(
                "✅ {}: {} rows ({} out of stock) in {:.1}s",
                self.name,
                rows,
                out_of_stock,
                self.elapsed.as_secs_f64()
            ),
            Outcome::Failed { stage, error } => format!(
                "❌ {}: failed while {} after {:.1}s: {}",
                self.name,
                stage,
                self.elapsed.as_secs_f64(),
                error
            ),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<DispensaryOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// 只有在每一個藥局都失敗時才視為整體失敗
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_failed() {
            1
        } else {
            0
        }
    }

    pub fn outcome(&self, name: &str) -> Option<&DispensaryOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// 設定與對應解析器
pub struct DispensaryJob {
    pub config: DispensaryConfig,
    pub adapter: Box<dyn SiteAdapter>,
}

impl DispensaryJob {
    pub fn from_config(config: DispensaryConfig) -> Self {
        let adapter = build_adapter(&config.adapter);
        Self { config, adapter }
    }

    pub fn with_adapter(config: DispensaryConfig, adapter: Box<dyn SiteAdapter>) -> Self {
        Self { config, adapter }
    }
}

struct StageFailure {
    stage: Stage,
    error: ScraperError,
}

impl StageFailure {
    fn at(stage: Stage, error: impl Into<ScraperError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// 依序（或有限並行）處理每個藥局，單一失敗不影響其他藥局
pub struct PipelineDriver {
    jobs: Vec<DispensaryJob>,
    fetcher: Arc<dyn Fetcher>,
    publisher: Arc<dyn TablePublisher>,
    concurrency: usize,
}

impl PipelineDriver {
    pub fn new(fetcher: Arc<dyn Fetcher>, publisher: Arc<dyn TablePublisher>) -> Self {
        Self {
            jobs: Vec::new(),
            fetcher,
            publisher,
            concurrency: 1,
        }
    }

    pub fn with_dispensaries(mut self, configs: impl IntoIterator<Item = DispensaryConfig>) -> Self {
        self.jobs
            .extend(configs.into_iter().map(DispensaryJob::from_config));
        self
    }

    pub fn add_job(&mut self, job: DispensaryJob) {
        self.jobs.push(job);
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        tracing::info!(
            "🚀 Processing {} dispensaries (concurrency: {})",
            self.jobs.len(),
            self.concurrency
        );

        // buffered 保留設定順序
        let outcomes: Vec<DispensaryOutcome> = stream::iter(self.jobs.iter())
            .map(|job| self.run_job(job))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = RunSummary {
            outcomes,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "📊 Run finished in {:.1}s: {} succeeded, {} failed",
            summary.elapsed.as_secs_f64(),
            summary.succeeded(),
            summary.failed()
        );
        summary
    }

    async fn run_job(&self, job: &DispensaryJob) -> DispensaryOutcome {
        let span = tracing::info_span!("dispensary", name = %job.config.name);
        let started = Instant::now();

        let outcome = async {
            match self.execute(job).await {
                Ok(done) => {
                    tracing::info!("➡️ {} -> {}", Stage::Publishing, Stage::Done);
                    done
                }
                Err(failure) => {
                    tracing::error!(
                        "➡️ {} -> {}: {} (category: {:?})",
                        failure.stage,
                        Stage::Failed,
                        failure.error,
                        failure.error.category()
                    );
                    tracing::error!("💡 {}", failure.error.recovery_suggestion());
                    Outcome::Failed {
                        stage: failure.stage,
                        error: failure.error,
                    }
                }
            }
        }
        .instrument(span.clone())
        .await;

        let result = DispensaryOutcome {
            name: job.config.name.clone(),
            outcome,
            elapsed: started.elapsed(),
        };
        span.in_scope(|| tracing::info!("{}", result.summary_line()));
        result
    }

    async fn execute(&self, job: &DispensaryJob) -> Result<Outcome, StageFailure> {
        let mut stage = Stage::Pending;
        let mut products = Vec::new();

        for url in &job.config.fetch_urls {
            transition(&mut stage, Stage::Fetching);
            let request = job.adapter.request_for(url);
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| StageFailure::at(Stage::Fetching, e))?;

            transition(&mut stage, Stage::Parsing);
            let parsed = job
                .adapter
                .parse(&response.body, url)
                .map_err(|e| StageFailure::at(Stage::Parsing, e))?;
            tracing::info!("📥 {} products from {}", parsed.len(), url);
            products.extend(parsed);
        }

        if products.is_empty() {
            return Err(StageFailure::at(
                Stage::Parsing,
                ParseError::NoProducts {
                    adapter: job.adapter.name().to_string(),
                },
            ));
        }

        transition(&mut stage, Stage::Reconciling);
        let table = reconcile(products);
        let out_of_stock = table.out_of_stock_count();

        transition(&mut stage, Stage::Publishing);
        let stats = self
            .publisher
            .publish(&table, &job.config.target())
            .await
            .map_err(|e| StageFailure::at(Stage::Publishing, e))?;

        Ok(Outcome::Done {
            rows: table.len(),
            out_of_stock,
            stats,
        })
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    if *stage != next {
        tracing::info!("➡️ {} -> {}", stage, next);
        *stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        default_columns, AdapterConfig, CanonicalTable, Product, SheetTarget,
    };
    use crate::domain::ports::{FetchRequest, FetchResponse};
    use crate::utils::error::{PublishError, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 以網址對應固定回應的假傳輸層
    struct MockFetcher {
        pages: HashMap<String, Result<String, TransportError>>,
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
            match self.pages.get(&request.url) {
                Some(Ok(body)) => Ok(FetchResponse {
                    status: 200,
                    body: body.clone(),
                }),
                Some(Err(e)) => Err(e.clone()),
                None => Err(TransportError::HttpStatus(404)),
            }
        }
    }

    /// 每行一個商品：`category;name;in_stock`，`BROKEN` 代表網站改版
    struct LineAdapter;

    impl SiteAdapter for LineAdapter {
        fn name(&self) -> &str {
            "lines"
        }

        fn parse(&self, body: &str, source_url: &str) -> Result<Vec<Product>, ParseError> {
            if body.contains("BROKEN") {
                return Err(ParseError::UnrecognizedStructure {
                    adapter: "lines".to_string(),
                    reason: "missing listing".to_string(),
                });
            }
            Ok(body
                .lines()
                .filter_map(|line| {
                    let mut parts = line.split(';');
                    let category = parts.next()?;
                    let name = parts.next()?;
                    let in_stock = parts.next()? == "yes";
                    Some(
                        Product::new(name, source_url)
                            .with_category(Some(category.to_string()))
                            .with_stock(in_stock),
                    )
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, usize)>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl TablePublisher for RecordingPublisher {
        async fn publish(
            &self,
            table: &CanonicalTable,
            target: &SheetTarget,
        ) -> Result<WriteStats, PublishError> {
            if self.reject.as_deref() == Some(target.spreadsheet_id.as_str()) {
                return Err(PublishError::PermissionDenied(target.spreadsheet_id.clone()));
            }
            self.published
                .lock()
                .unwrap()
                .push((target.sheet_name.clone(), table.len()));
            Ok(WriteStats {
                rows_written: table.len(),
                api_calls: 2,
                ..Default::default()
            })
        }
    }

    fn dispensary(name: &str, urls: &[&str]) -> DispensaryConfig {
        DispensaryConfig {
            name: name.to_string(),
            fetch_urls: urls.iter().map(|u| u.to_string()).collect(),
            spreadsheet_id: format!("{}-sheet", name),
            sheet_name: format!("{} List", name),
            adapter: AdapterConfig::Mamedica,
            columns: default_columns(),
            enabled: None,
            stripe_color: None,
            in_stock_color: None,
        }
    }

    fn driver(
        pages: Vec<(&str, Result<&str, TransportError>)>,
        publisher: Arc<RecordingPublisher>,
        dispensaries: Vec<DispensaryConfig>,
    ) -> PipelineDriver {
        let fetcher = MockFetcher {
            pages: pages
                .into_iter()
                .map(|(url, body)| (url.to_string(), body.map(str::to_string)))
                .collect(),
        };
        let mut driver = PipelineDriver::new(Arc::new(fetcher), publisher);
        for config in dispensaries {
            driver.add_job(DispensaryJob::with_adapter(config, Box::new(LineAdapter)));
        }
        driver
    }

    #[tokio::test]
    async fn test_parse_failure_is_isolated() {
        let publisher = Arc::new(RecordingPublisher::default());
        let driver = driver(
            vec![
                ("https://a.example/", Ok("BROKEN")),
                ("https://b.example/", Ok("Flower;Pink Kush;yes\nOil;Calm;no")),
            ],
            publisher.clone(),
            vec![
                dispensary("A", &["https://a.example/"]),
                dispensary("B", &["https://b.example/"]),
            ],
        );

        let summary = driver.run().await;

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 0);
        match &summary.outcome("A").unwrap().outcome {
            Outcome::Failed { stage, error } => {
                assert_eq!(*stage, Stage::Parsing);
                assert!(matches!(error, ScraperError::Parse(ParseError::UnrecognizedStructure { .. })));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(summary.outcome("B").unwrap().rows(), 2);
        assert_eq!(*publisher.published.lock().unwrap(), vec![("B List".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_all_failed_sets_exit_code() {
        let publisher = Arc::new(RecordingPublisher::default());
        let driver = driver(
            vec![(
                "https://a.example/",
                Err(TransportError::Blocked {
                    url: "https://a.example/".into(),
                    reason: "challenge".into(),
                }),
            )],
            publisher.clone(),
            vec![
                dispensary("A", &["https://a.example/"]),
                dispensary("B", &["https://missing.example/"]),
            ],
        );

        let summary = driver.run().await;

        assert!(summary.all_failed());
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.outcomes[0].final_stage(), Stage::Failed);
        assert!(matches!(
            summary.outcomes[0].outcome,
            Outcome::Failed {
                stage: Stage::Fetching,
                error: ScraperError::Transport(TransportError::Blocked { .. })
            }
        ));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_previous_sheet() {
        let publisher = Arc::new(RecordingPublisher::default());
        let driver = driver(
            vec![("https://a.example/", Ok(""))],
            publisher.clone(),
            vec![dispensary("A", &["https://a.example/"])],
        );

        let summary = driver.run().await;

        assert!(matches!(
            summary.outcomes[0].outcome,
            Outcome::Failed {
                stage: Stage::Parsing,
                error: ScraperError::Parse(ParseError::NoProducts { .. })
            }
        ));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_pages_are_merged_before_publish() {
        let publisher = Arc::new(RecordingPublisher::default());
        let driver = driver(
            vec![
                ("https://a.example/1", Ok("Flower;Alpha;yes")),
                ("https://a.example/2", Ok("Flower;Beta;no\nOil;Gamma;yes")),
            ],
            publisher.clone(),
            vec![dispensary("A", &["https://a.example/1", "https://a.example/2"])],
        );

        let summary = driver.run().await;

        assert_eq!(summary.outcome("A").unwrap().rows(), 3);
        match &summary.outcomes[0].outcome {
            Outcome::Done { out_of_stock, stats, .. } => {
                assert_eq!(*out_of_stock, 1);
                assert_eq!(stats.api_calls, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_recorded_at_publishing() {
        let publisher = Arc::new(RecordingPublisher {
            reject: Some("A-sheet".to_string()),
            ..Default::default()
        });
        let driver = driver(
            vec![
                ("https://a.example/", Ok("Flower;Alpha;yes")),
                ("https://b.example/", Ok("Flower;Beta;yes")),
            ],
            publisher.clone(),
            vec![
                dispensary("A", &["https://a.example/"]),
                dispensary("B", &["https://b.example/"]),
            ],
        )
        .with_concurrency(2);

        let summary = driver.run().await;

        let names: Vec<&str> = summary.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(matches!(
            summary.outcomes[0].outcome,
            Outcome::Failed {
                stage: Stage::Publishing,
                ..
            }
        ));
        assert!(summary.outcomes[1].is_success());
    }

    #[test]
    fn test_empty_run_is_not_a_failure() {
        let summary = RunSummary {
            outcomes: Vec::new(),
            elapsed: Duration::ZERO,
        };
        assert!(!summary.all_failed());
        assert_eq!(summary.exit_code(), 0);
    }
}
