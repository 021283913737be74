//! quant-advisor — multi-factor stock decision pipeline.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! scans the configured universe, builds a portfolio from the ranked
//! advice, and prints a risk assessment.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use quant_advisor::config::AppConfig;
use quant_advisor::data::eastmoney::EastmoneyClient;
use quant_advisor::data::DataSource;
use quant_advisor::engine::{MarketScanner, ScanConfig, ScanReport};
use quant_advisor::portfolio::rebalance::RebalanceEngine;
use quant_advisor::portfolio::risk::RiskMonitor;
use quant_advisor::portfolio::PortfolioBuilder;
use quant_advisor::scoring::ScoringEngine;

const BANNER: &str = r#"
  quant-advisor — multi-factor decision pipeline
  scan → score → allocate → monitor
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        profile = %cfg.advisor.risk_profile,
        capital = cfg.advisor.capital,
        universe = cfg.universe.securities.len(),
        min_confidence = cfg.advisor.min_confidence,
        "quant-advisor starting"
    );

    // -- Components -------------------------------------------------------

    let profile = cfg.risk_profile()?;
    let params = cfg.profile_params()?;
    let engine = Arc::new(ScoringEngine::with_params(profile, params)?);
    let data: Arc<dyn DataSource> = Arc::new(EastmoneyClient::new(cfg.universe())?);
    let scanner = MarketScanner::new(
        data,
        engine,
        ScanConfig {
            min_confidence: cfg.advisor.min_confidence,
            lookback: cfg.advisor.lookback_days,
            concurrency: cfg.scanner.concurrency,
        },
    );
    let builder = PortfolioBuilder::new(cfg.constraints)?;
    let monitor = RiskMonitor::new(cfg.monitor_config())?;

    // -- Scan -------------------------------------------------------------

    let universe = cfg.universe();
    let report = match scanner.scan(&universe).await {
        Ok(report) => report,
        Err(aborted) => {
            warn!(reason = %aborted.reason, "scan aborted, using partial results");
            aborted.partial
        }
    };
    print_report(&report);

    // -- Allocate ---------------------------------------------------------

    let portfolio = builder
        .build(&report.advice, cfg.advisor.capital)
        .context("portfolio construction failed")?;
    println!("{portfolio}");

    // A fresh advice set against a fresh portfolio: the action map shows
    // what the next cycle would do.
    let rebalancer = RebalanceEngine::new(builder);
    let actions = rebalancer.actions(&portfolio, &report.advice);
    for (code, action) in &actions {
        info!(code = %code, action = %action, "next-cycle action");
    }

    // -- Monitor ----------------------------------------------------------

    let assessment = monitor.assess(&portfolio);
    println!("{assessment}");

    Ok(())
}

fn print_report(report: &ScanReport) {
    println!(
        "Scanned: {} evaluated, {} skipped, {} advice",
        report.evaluated,
        report.skipped.len(),
        report.advice.len(),
    );
    println!("Top picks:");
    for advice in report.top_picks(10) {
        println!("  {advice}");
        for reason in &advice.reasons {
            println!("      - {reason}");
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quant_advisor=info"));

    let json_logging = std::env::var("QUANT_ADVISOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
