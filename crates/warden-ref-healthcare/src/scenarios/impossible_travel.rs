//! Scenario 3: Impossible Travel and Session Hijack
//!
//! Dr. Rivera works from home in Paris. Ten minutes later the same account,
//! and the same session cookie, shows up in Copenhagen with a different
//! browser. Then the session is replayed from a Tor exit node.
//!
//!   1. Paris, own session                      → allow
//!   2. Copenhagen, same session, new browser   → impossible travel +
//!                                                session mismatches
//!   3. Tor exit, same session                  → high-risk region +
//!                                                anonymizer on top
//!
//! The account then authenticates legitimately from Paris hours later and is
//! allowed again: travel speed is judged between consecutive sightings.

use chrono::Duration as ChronoDuration;

use warden_contracts::{
    error::WardenResult,
    threat::{RequestContext, ThreatAnalysis, ThreatRequest},
};

use crate::{
    mock_data::{DR_RIVERA, HOME_PARIS, PATIENTS, REMOTE_COPENHAGEN, TOR_EXIT},
    runtime::ClinicRuntime,
};

const FIREFOX: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0";
const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/124.0 Safari/537.36";

pub struct TravelOutcome {
    pub home: ThreatAnalysis,
    pub copenhagen: ThreatAnalysis,
    pub tor: ThreatAnalysis,
    pub next_day: ThreatAnalysis,
}

fn chart_request(origin: &str, user_agent: &str) -> ThreatRequest {
    ThreatRequest::new("GET", &format!("/ehr/patients/{}/chart", PATIENTS[0].id), origin)
        .with_user_agent(user_agent)
}

pub async fn simulate(runtime: &ClinicRuntime) -> WardenResult<TravelOutcome> {
    let engine = &runtime.engine;
    let session = RequestContext::for_actor(DR_RIVERA.actor_id).with_session("ehr-sess-4410");

    let home = engine
        .analyze_request(&chart_request(HOME_PARIS, FIREFOX), &session)
        .await;

    runtime.clock.advance(ChronoDuration::minutes(10));
    let copenhagen = engine
        .analyze_request(&chart_request(REMOTE_COPENHAGEN, CHROME), &session)
        .await;

    runtime.clock.advance(ChronoDuration::minutes(1));
    let tor = engine
        .analyze_request(&chart_request(TOR_EXIT, CHROME), &session)
        .await;

    // A fresh session from home the next morning.
    runtime.clock.advance(ChronoDuration::hours(14));
    let fresh = RequestContext::for_actor(DR_RIVERA.actor_id).with_session("ehr-sess-4521");
    let next_day = engine
        .analyze_request(&chart_request(HOME_PARIS, FIREFOX), &fresh)
        .await;

    runtime.ledger.flush().await?;

    Ok(TravelOutcome {
        home,
        copenhagen,
        tor,
        next_day,
    })
}

fn describe(label: &str, analysis: &ThreatAnalysis) {
    println!(
        "  {:<34} {:<10} score {:>3}",
        label,
        analysis.action.as_str().to_uppercase(),
        analysis.risk_score
    );
    for t in &analysis.threats {
        println!("      - {:<28} {:>3}  ({})", t.signal_type, t.contribution, t.severity);
    }
}

/// Run Scenario 3: Impossible Travel and Session Hijack.
pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 3: Impossible Travel and Session Hijack ===");
    println!();
    println!("  Account: {} ({})", DR_RIVERA.name, DR_RIVERA.actor_id);
    println!();

    let runtime = ClinicRuntime::new()?;
    runtime.start()?;
    let outcome = simulate(&runtime).await?;

    describe("09:00 Paris, Firefox", &outcome.home);
    describe("09:10 Copenhagen, Chrome", &outcome.copenhagen);
    describe("09:11 Tor exit (KP), Chrome", &outcome.tor);
    describe("next morning, Paris, new session", &outcome.next_day);
    println!();

    let integrity = runtime.ledger.verify_audit_integrity(None).await;
    println!(
        "  Audit chain integrity:  {} ({} event(s) in chain)",
        if integrity.verified { "VERIFIED" } else { "FAILED" },
        integrity.entries_checked
    );
    println!();

    runtime.stop().await?;
    println!("  Scenario 3 complete.");
    println!();
    Ok(())
}
