//! Scenario 2: Injection Attack on the Patient Portal
//!
//! A scanner attacks the portal's sign-in form:
//!   1. A normal page load is allowed
//!   2. A SQL injection from an sqlmap user agent is blocked outright
//!   3. Follow-up requests from that origin are refused while the block holds
//!   4. A percent-encoded XSS payload from another origin is caught after
//!      decoding
//!   5. An executable disguised as a PDF is flagged for monitoring
//!   6. An hour later the block lapses; the scanner's next request carries
//!      the repeat-offender signal
//!
//! Every verdict lands in the audit ledger as a security event.

use chrono::Duration as ChronoDuration;

use warden_contracts::{
    audit::{AuditQuery, EventType, ReportSummary},
    error::WardenResult,
    threat::{RequestContext, ThreatAnalysis, ThreatRequest, UploadedFile},
};

use crate::{
    mock_data::{CLINIC_NETWORK, PATIENTS, SCANNER_ORIGIN, TOR_EXIT},
    runtime::ClinicRuntime,
};

pub struct Step {
    pub label: &'static str,
    pub analysis: ThreatAnalysis,
}

pub struct AttackOutcome {
    pub steps: Vec<Step>,
    pub blocked_while_active: usize,
    pub security_summary: ReportSummary,
}

fn signal_list(analysis: &ThreatAnalysis) -> String {
    if analysis.threats.is_empty() {
        return "none".to_string();
    }
    analysis
        .threats
        .iter()
        .map(|t| format!("{}({})", t.signal_type, t.contribution))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn simulate(runtime: &ClinicRuntime) -> WardenResult<AttackOutcome> {
    let engine = &runtime.engine;
    let anonymous = RequestContext::anonymous();
    let mut steps = Vec::new();

    let browse = ThreatRequest::new("GET", "/portal/login", SCANNER_ORIGIN)
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64)");
    steps.push(Step {
        label: "page load",
        analysis: engine.analyze_request(&browse, &anonymous).await,
    });

    runtime.clock.advance(ChronoDuration::seconds(2));
    let injection = ThreatRequest::new("POST", "/portal/login", SCANNER_ORIGIN)
        .with_user_agent("sqlmap/1.7.2#stable (https://sqlmap.org)")
        .with_body("username=admin'; DROP TABLE users; --&password=x");
    steps.push(Step {
        label: "sql injection",
        analysis: engine.analyze_request(&injection, &anonymous).await,
    });

    let mut blocked_while_active = 0;
    for _ in 0..3 {
        runtime.clock.advance(ChronoDuration::seconds(30));
        let retry = engine.analyze_request(&browse, &anonymous).await;
        if retry.signal(warden_threat::engine::BLOCKED_ORIGIN).is_some() {
            blocked_while_active += 1;
        }
    }

    let patient = RequestContext::for_actor(PATIENTS[1].id).with_session("portal-sess-77");
    let message = ThreatRequest::new("POST", "/portal/messages", TOR_EXIT)
        .with_user_agent("Mozilla/5.0")
        .with_body("subject=refill&body=%3Cscript%3Ealert%28document%2Ecookie%29%3C%2Fscript%3E");
    steps.push(Step {
        label: "encoded xss",
        analysis: engine.analyze_request(&message, &patient).await,
    });

    let upload = ThreatRequest::new("POST", "/portal/documents", CLINIC_NETWORK)
        .with_user_agent("Mozilla/5.0")
        .with_file(UploadedFile {
            name: "lab_results.pdf.exe".to_string(),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 48_213,
        });
    steps.push(Step {
        label: "disguised upload",
        analysis: engine
            .analyze_request(&upload, &RequestContext::for_actor(PATIENTS[2].id))
            .await,
    });

    runtime.clock.advance(ChronoDuration::hours(1));
    steps.push(Step {
        label: "after block ttl",
        analysis: engine.analyze_request(&browse, &anonymous).await,
    });

    runtime.ledger.flush().await?;
    let report = runtime
        .ledger
        .generate_audit_report(&AuditQuery {
            event_type: Some(EventType::SecurityEvent),
            ..AuditQuery::default()
        })
        .await?;

    Ok(AttackOutcome {
        steps,
        blocked_while_active,
        security_summary: report.summary,
    })
}

/// Run Scenario 2: Injection Attack on the Patient Portal.
pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 2: Injection Attack on the Patient Portal ===");
    println!();

    let runtime = ClinicRuntime::new()?;
    runtime.start()?;
    let outcome = simulate(&runtime).await?;

    for step in &outcome.steps {
        println!(
            "  {:<18} {:<10} score {:>3}  [{}]",
            step.label,
            step.analysis.action.as_str().to_uppercase(),
            step.analysis.risk_score,
            signal_list(&step.analysis)
        );
    }
    println!();
    println!(
        "  Retries refused while blocked: {} of 3",
        outcome.blocked_while_active
    );
    println!(
        "  Security events audited:       {} ({} critical)",
        outcome.security_summary.security_events,
        outcome.security_summary.critical_security_events
    );
    println!();

    runtime.stop().await?;
    println!("  Scenario 2 complete.");
    println!();
    Ok(())
}
