pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "dispensary-sheets")]
#[command(about = "Scrape dispensary product listings into Google Sheets")]
pub struct CliConfig {
    #[arg(long, short = 'c', default_value = "dispensaries.toml")]
    pub config: String,

    /// 只處理這些藥局（逗號分隔）
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// 覆寫設定檔中的 run.concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Write TSV previews instead of updating the spreadsheets")]
    pub dry_run: bool,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,
}
