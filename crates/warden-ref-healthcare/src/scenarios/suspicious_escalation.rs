//! Scenario 4: Suspicious-Origin Escalation
//!
//! A billing clerk's credentials start exporting claim files through a VPN.
//! No single request is bad enough to block, but each one is a little worse
//! than the last:
//!
//!   requests 1-6    allow    (VPN alone, then exports over the daily limit)
//!   requests 7-12   monitor  (origin recorded as suspicious)
//!   review after 11 nothing  (five events averaging exactly 50)
//!   review after 12 block    (six events averaging above 50)
//!   request 13      refused  (blocked origin)
//!
//! A security officer then lifts the block. The next request is challenged:
//! the origin now carries a repeat-offender signal.

use chrono::Duration as ChronoDuration;

use warden_contracts::{
    audit::{AuditQuery, EventType},
    error::WardenResult,
    threat::{BlockedOrigin, RequestContext, ThreatAction, ThreatAnalysis, ThreatRequest},
};

use crate::{
    mock_data::{BILLING_CLERK, VPN_EXIT},
    runtime::ClinicRuntime,
};

pub struct EscalationOutcome {
    /// Score and action of each export before the block.
    pub ramp: Vec<(u32, ThreatAction)>,
    pub early_review: Vec<BlockedOrigin>,
    pub review: Vec<BlockedOrigin>,
    pub while_blocked: ThreatAnalysis,
    pub unblocked: bool,
    pub after_unblock: ThreatAnalysis,
    /// Security events the ledger holds about this origin.
    pub audited: usize,
}

fn export_request(n: usize) -> ThreatRequest {
    ThreatRequest::new("GET", &format!("/billing/claims/export?batch={}", n), VPN_EXIT)
        .with_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
}

pub async fn simulate(runtime: &ClinicRuntime) -> WardenResult<EscalationOutcome> {
    let engine = &runtime.engine;
    let clerk = RequestContext::for_actor(BILLING_CLERK.actor_id);

    let mut ramp = Vec::new();
    let mut early_review = Vec::new();
    for n in 1..=12 {
        let analysis = engine.analyze_request(&export_request(n), &clerk).await;
        ramp.push((analysis.risk_score, analysis.action));
        runtime.clock.advance(ChronoDuration::seconds(30));

        if n == 11 {
            early_review = engine.review_suspicious();
        }
    }
    let review = engine.review_suspicious();

    runtime.clock.advance(ChronoDuration::seconds(30));
    let while_blocked = engine.analyze_request(&export_request(13), &clerk).await;

    let unblocked = engine.unblock(VPN_EXIT);
    runtime.clock.advance(ChronoDuration::seconds(30));
    let after_unblock = engine.analyze_request(&export_request(14), &clerk).await;

    runtime.ledger.flush().await?;
    let page = runtime
        .ledger
        .query_audit_trail(&AuditQuery {
            event_type: Some(EventType::SecurityEvent),
            origin: Some(VPN_EXIT.to_string()),
            ..AuditQuery::default()
        })
        .await?;

    Ok(EscalationOutcome {
        ramp,
        early_review,
        review,
        while_blocked,
        unblocked,
        after_unblock,
        audited: page.total,
    })
}

/// Run Scenario 4: Suspicious-Origin Escalation.
pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 4: Suspicious-Origin Escalation ===");
    println!();
    println!(
        "  Account: {} ({}), exporting claims via {}",
        BILLING_CLERK.name, BILLING_CLERK.actor_id, VPN_EXIT
    );
    println!();

    let runtime = ClinicRuntime::new()?;
    runtime.start()?;
    let outcome = simulate(&runtime).await?;

    for (i, (score, action)) in outcome.ramp.iter().enumerate() {
        println!("  export {:>2}  score {:>3}  {}", i + 1, score, action.as_str().to_uppercase());
        if i + 1 == 11 {
            println!(
                "  ── review: {} escalation(s)",
                outcome.early_review.len()
            );
        }
    }
    for block in &outcome.review {
        println!("  ── review: BLOCK {} until {}", block.origin, block.expires_at.format("%H:%M"));
        println!("             reason: {}", block.reason);
    }
    println!(
        "  export 13  score {:>3}  {}",
        outcome.while_blocked.risk_score,
        outcome.while_blocked.action.as_str().to_uppercase()
    );
    println!();
    println!(
        "  Security officer lifts the block: {}",
        if outcome.unblocked { "done" } else { "no block found" }
    );
    println!(
        "  export 14  score {:>3}  {}",
        outcome.after_unblock.risk_score,
        outcome.after_unblock.action.as_str().to_uppercase()
    );
    println!();
    println!("  Security events for {}: {}", VPN_EXIT, outcome.audited);
    println!();

    runtime.stop().await?;
    println!("  Scenario 4 complete.");
    println!();
    Ok(())
}
