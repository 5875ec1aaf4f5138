pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::{build_driver, RunOptions};
pub use config::cli::LocalStorage;
pub use config::toml_config::ScraperConfig;
pub use core::driver::{PipelineDriver, RunSummary};
pub use domain::model::{CanonicalTable, DispensaryConfig, Product};
pub use utils::error::{Result, ScraperError};
