//! twstock - Taiwan equity screener.
//!
//! Without arguments runs the daily screen and pushes the result to LINE.
//! With `--stock-id` analyses a single stock.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use twstock_common::logging::init_logging;
use twstock_common::{Config, Error, RunFeatures};
use twstock_screener::{
    GoodinfoAdapter, LineNotifier, OpenAiSummarizer, Orchestrator, StockId, SvgChartRenderer,
};

#[derive(Parser, Debug)]
#[command(name = "twstock")]
#[command(version)]
#[command(about = "Screen Taiwan stocks and push the results to LINE", long_about = None)]
struct Args {
    /// Analyse a single stock instead of running the daily screen
    #[arg(long, value_name = "ID")]
    stock_id: Option<String>,

    /// Do not send LINE notifications
    #[arg(long)]
    no_notification: bool,

    /// Configuration file (default: ~/.twstock/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Rule set for single-stock analysis: default or momentum
    #[arg(long, value_name = "NAME")]
    rules: Option<String>,

    /// Skip chart rendering
    #[arg(long)]
    no_charts: bool,

    /// Skip the language-model summary
    #[arg(long)]
    no_summary: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );
    tracing::info!("twstock v{}", env!("CARGO_PKG_VERSION"));

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Run failed");
            ExitCode::FAILURE
        }
    }
}

/// Load, apply CLI overrides and validate the configuration.
fn load_config(args: &Args) -> twstock_common::Result<Config> {
    let mut config = Config::load_with_env(args.config.as_deref())
        .map_err(|e| Error::Config(format!("{:#}", e)))?;

    if let Some(level) = &args.log_level {
        config.observability.log_level = level.to_lowercase();
    }
    if let Some(rules) = &args.rules {
        config.analysis.rule_set = rules.clone();
    }
    if args.no_charts {
        config.analysis.render_charts = false;
    }

    let features = RunFeatures::resolve(&config, args.no_notification, args.no_summary);
    config
        .validate_for(features)
        .map_err(|e| Error::from(e).with_context("invalid configuration"))?;

    Ok(config)
}

async fn run(args: Args, config: Config) -> Result<()> {
    let features = RunFeatures::resolve(&config, args.no_notification, args.no_summary);
    let provider = Arc::new(GoodinfoAdapter::new(&config.data));
    let mut orchestrator = Orchestrator::new(config.clone(), provider);

    if features.summarize {
        orchestrator = orchestrator.with_summarizer(Arc::new(OpenAiSummarizer::new(&config.llm)));
    }
    if config.analysis.render_charts {
        let renderer = SvgChartRenderer::from_config(&config.charts);
        orchestrator = orchestrator.with_renderer(Arc::new(renderer));
    }
    if features.notify {
        if let (Some(token), Some(user)) = (config.line_access_token(), config.line_user_id()) {
            let notifier = LineNotifier::new(&config.line, token);
            orchestrator = orchestrator.with_notifier(Arc::new(notifier), user);
        }
    }

    match args.stock_id {
        Some(raw) => {
            let id: StockId = raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid --stock-id")?;
            let analysis = orchestrator
                .analyze_stock(&id)
                .await
                .with_context(|| format!("Analysis of {} failed", id))?;
            println!("\n{}", analysis.console_summary());
        }
        None => {
            let report = orchestrator
                .run_daily_screen()
                .await
                .context("Daily screen failed")?;
            println!("\n{}", report.console_summary());
        }
    }

    Ok(())
}
