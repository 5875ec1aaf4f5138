use clap::Parser;
use dispensary_sheets::app::runner::ACCESS_TOKEN_ENV;
use dispensary_sheets::utils::{logger, validation::Validate};
use dispensary_sheets::{build_driver, CliConfig, RunOptions, ScraperConfig, ScraperError};

/// 設定錯誤的結束碼
const CONFIG_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting dispensary-sheets with {}", cli.config);
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => exit_with_config_error(&e),
    };

    let options = RunOptions {
        only: cli.only.clone(),
        skip: cli.skip.clone(),
        concurrency: cli.concurrency,
        dry_run: cli.dry_run,
        output_path: cli.output_path.clone(),
        access_token: std::env::var(ACCESS_TOKEN_ENV).ok(),
    };

    let driver = match build_driver(&config, &options).await {
        Ok(driver) => driver,
        Err(e) => exit_with_config_error(&e),
    };

    let summary = driver.run().await;

    for outcome in &summary.outcomes {
        println!("{}", outcome.summary_line());
    }
    println!(
        "📊 {} succeeded, {} failed in {:.1}s",
        summary.succeeded(),
        summary.failed(),
        summary.elapsed.as_secs_f64()
    );

    if summary.all_failed() {
        tracing::error!("❌ Every dispensary failed");
    }
    std::process::exit(summary.exit_code());
}

fn load_config(path: &str) -> Result<ScraperConfig, ScraperError> {
    let config = ScraperConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn exit_with_config_error(error: &ScraperError) -> ! {
    tracing::error!(
        "❌ Configuration failed: {} (Category: {:?}, Severity: {:?})",
        error,
        error.category(),
        error.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", error.recovery_suggestion());
    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 {}", error.recovery_suggestion());
    std::process::exit(CONFIG_EXIT_CODE);
}
