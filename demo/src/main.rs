//! WARDEN Healthcare Reference Runtime: Demo CLI
//!
//! Runs one or all of the four healthcare scenarios. Each scenario wires the
//! real WARDEN components (audit ledger, threat engine, threshold policy)
//! over fictional clinic traffic.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- phi-audit-trail
//!   cargo run -p demo -- injection-attack
//!   cargo run -p demo -- impossible-travel
//!   cargo run -p demo -- suspicious-escalation
//!   cargo run -p demo -- check-config path/to/warden.toml

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use warden_contracts::error::WardenResult;
use warden_policy::load_config_file;
use warden_ref_healthcare::scenarios::{
    impossible_travel, injection_attack, phi_audit_trail, suspicious_escalation,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// WARDEN: tamper-evident audit and request threat detection, healthcare demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "WARDEN healthcare reference runtime demo",
    long_about = "Runs WARDEN healthcare demo scenarios showing hash-chained PHI auditing,\n\
                  injection blocking, impossible-travel detection and origin escalation."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four healthcare scenarios in sequence.
    RunAll,
    /// Scenario 1: PHI Audit Trail (encryption, queries, tamper detection).
    PhiAuditTrail,
    /// Scenario 2: Injection Attack (block, TTL, repeat offender).
    InjectionAttack,
    /// Scenario 3: Impossible Travel (geo and session hijack signals).
    ImpossibleTravel,
    /// Scenario 4: Suspicious-Origin Escalation (monitor verdicts to block).
    SuspiciousEscalation,
    /// Load and validate a WARDEN configuration file.
    CheckConfig {
        /// Path to a TOML configuration file.
        path: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
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
        Command::PhiAuditTrail => phi_audit_trail::run_scenario().await,
        Command::InjectionAttack => injection_attack::run_scenario().await,
        Command::ImpossibleTravel => impossible_travel::run_scenario().await,
        Command::SuspiciousEscalation => suspicious_escalation::run_scenario().await,
        Command::CheckConfig { path } => check_config(&path),
    };

    match result {
        Ok(()) => {
            println!("All selected commands completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

async fn run_all() -> WardenResult<()> {
    phi_audit_trail::run_scenario().await?;
    injection_attack::run_scenario().await?;
    impossible_travel::run_scenario().await?;
    suspicious_escalation::run_scenario().await?;
    Ok(())
}

fn check_config(path: &std::path::Path) -> WardenResult<()> {
    let config = load_config_file(path)?;
    debug!(?config, "parsed configuration");

    let t = &config.threat.thresholds;
    println!("  Configuration OK: {}", path.display());
    println!();
    println!("  Ledger");
    println!("    batch size              {}", config.ledger.batch_size);
    println!("    flush interval          {} ms", config.ledger.flush_interval_ms);
    println!("    retention               {} days", config.ledger.retention_days);
    println!("    integrity check every   {} s", config.ledger.integrity_check_interval_secs);
    println!("  Threat engine");
    println!("    monitor / challenge / block   {} / {} / {}", t.monitor, t.challenge, t.block);
    println!(
        "    rate limit              {} requests per {} ms",
        config.threat.rate_limit.max_requests, config.threat.rate_limit.window_ms
    );
    println!("    block TTL               {} s", config.threat.containment.block_ttl_secs);
    println!("    analyzer timeout        {} ms", config.threat.analyzer_timeout_ms);
    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("WARDEN: Audit Ledger and Threat Detection");
    println!("Healthcare Reference Demo");
    println!("=========================================");
    println!();
    println!("Per audited event:");
    println!("  [1] Payload sanitized; PHI, sign-in and chart payloads encrypted");
    println!("  [2] Entry sequenced and linked to the previous entry's SHA-256 hash");
    println!("  [3] Buffered and flushed in batches (security and PHI events at once)");
    println!();
    println!("Per inbound request:");
    println!("  [1] Blocked origins refused until their block expires");
    println!("  [2] Rate, payload, geolocation, session and behavior signals scored");
    println!("  [3] Score 0-100 mapped to allow / monitor / challenge / block");
    println!("  [4] Verdict recorded in the audit ledger");
    println!();
}
