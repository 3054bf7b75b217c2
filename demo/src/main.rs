//! LIFELINE Crisis-Alert Pipeline: Demo CLI
//!
//! Runs one or all of the reference scenarios. Each scenario starts a real
//! `AlertService` (classifier, rate limiter, alert store, workflow, buffered
//! audit logger, real-time dispatcher) with fictional members and staff.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- crisis-escalation
//!   cargo run -p demo -- benign-post
//!   cargo run -p demo -- rate-limit
//!   cargo run -p demo -- audit-review
//!   cargo run -p demo -- check-config crates/lifeline-service/config/lifeline.toml

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lifeline_contracts::error::LifelineResult;
use lifeline_service::{
    scenarios::{audit_review, benign_post, crisis_escalation, rate_limit},
    ServiceConfig,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// LIFELINE crisis detection and counselor alerting demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "LIFELINE crisis-alert pipeline demo",
    long_about = "Runs LIFELINE scenarios showing crisis classification, alert\n\
                  fan-out to counselors, single-winner claiming, rate limiting\n\
                  and the tamper-evident audit trail."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Crisis post → live alert → accept race → resolution.
    CrisisEscalation,
    /// Everyday and support-tier posts that never alert.
    BenignPost,
    /// Throttled submissions; crisis posts still alert.
    RateLimit,
    /// Audit queries, break-glass access and tamper detection.
    AuditReview,
    /// Load and validate a service config file, then print it.
    CheckConfig {
        /// Path to a TOML service config.
        path: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=info (or debug) to see the pipeline's structured logs.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::CrisisEscalation => crisis_escalation::run_scenario().await.map(|_| ()),
        Command::BenignPost => benign_post::run_scenario().await.map(|_| ()),
        Command::RateLimit => rate_limit::run_scenario().await.map(|_| ()),
        Command::AuditReview => audit_review::run_scenario().await.map(|_| ()),
        Command::CheckConfig { path } => check_config(&path),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run_all() -> LifelineResult<()> {
    crisis_escalation::run_scenario().await?;
    benign_post::run_scenario().await?;
    rate_limit::run_scenario().await?;
    audit_review::run_scenario().await?;
    Ok(())
}

fn check_config(path: &Path) -> LifelineResult<()> {
    let config = ServiceConfig::from_file(path)?;
    info!(path = %path.display(), "service config loaded");

    let pipeline = &config.pipeline;
    println!("Config '{}' is valid:", path.display());
    println!("  instance_id              {}", pipeline.instance_id);
    println!("  rate_limit_per_minute    {}", pipeline.rate_limit_per_minute);
    println!("  alert_severity_threshold {}", pipeline.alert_severity_threshold);
    println!("  trust_review_floor       {}", pipeline.trust_review_floor);
    println!(
        "  heartbeat                every {}ms, drop after {} misses",
        pipeline.heartbeat_interval_ms, pipeline.heartbeat_miss_limit
    );
    println!(
        "  audit buffer             {} entries / {}ms, {} retries",
        pipeline.audit_buffer_size, pipeline.audit_flush_interval_ms, pipeline.audit_max_retries
    );
    println!(
        "  classifier patterns      {}",
        config
            .classifier
            .patterns_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    println!(
        "  audit key                {} ({})",
        config.audit.key_id,
        if config.audit.key_hex.is_some() {
            "configured"
        } else {
            "ephemeral"
        }
    );
    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("LIFELINE — Crisis Detection & Counselor Alerting");
    println!("Reference Demo");
    println!("================================================");
    println!();
    println!("Pipeline per submission:");
    println!("  [1] Rate limiter admits or withholds the post from the feed");
    println!("  [2] Classifier scores crisis risk, spam and inappropriate content");
    println!("  [3] Risk at or above the threshold raises a SafetyAlert");
    println!("  [4] Dispatcher fans the alert out to every connected counselor");
    println!("  [5] Every step lands in the buffered, hash-chained audit log");
    println!();
}
