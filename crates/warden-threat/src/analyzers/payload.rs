//! Payload scanner: injection patterns, hostile clients, oversized bodies,
//! encoded payloads and dangerous uploads.
//!
//! The request path, query string and body are matched against four
//! `RegexSet` families. Each family fires at most once per request, no
//! matter how many of its patterns match or where. Percent-, base64- and
//! hex-encoded fragments are decoded one layer and scanned again; an
//! injection found only after decoding also raises `obfuscated_payload`.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexSet};
use serde_json::Value;

use warden_contracts::{
    config::PayloadConfig,
    error::{WardenError, WardenResult},
    threat::{AnalyzerOutcome, RequestContext, Severity, ThreatRequest, ThreatSignal},
};
use warden_core::traits::SignalAnalyzer;

pub const SQL_INJECTION: &str = "sql_injection";
pub const XSS: &str = "xss";
pub const COMMAND_INJECTION: &str = "command_injection";
pub const PATH_TRAVERSAL: &str = "path_traversal";
pub const MALICIOUS_USER_AGENT: &str = "malicious_user_agent";
pub const OVERSIZED_PAYLOAD: &str = "oversized_payload";
pub const OBFUSCATED_PAYLOAD: &str = "obfuscated_payload";
pub const DANGEROUS_UPLOAD: &str = "dangerous_upload";

const SQL_PATTERNS: &[&str] = &[
    r"(?i)'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+",
    r"(?i)'\s*;\s*(drop|delete|insert|update|alter|create|truncate|exec)\b",
    r"(?i);\s*(drop|truncate|alter)\s+(table|database)\b",
    r"(?i)\bunion\b(\s+all)?\s+select\b",
    r"(?i)'\s*(--|#|/\*)",
    r"(?i)\bor\s+1\s*=\s*1\b",
    r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(\s*\d",
    r"(?i)\bwaitfor\s+delay\b",
    r"(?i)\binformation_schema\b",
    r"(?i)\bxp_cmdshell\b",
];

const XSS_PATTERNS: &[&str] = &[
    r"(?i)<\s*script\b",
    r"(?i)\bjavascript\s*:",
    r"(?i)\bon(error|load|click|mouseover|focus|submit)\s*=",
    r"(?i)<\s*(iframe|object|embed|svg)\b",
    r"(?i)document\s*\.\s*(cookie|location|write)",
    r"(?i)\beval\s*\(",
];

const COMMAND_PATTERNS: &[&str] = &[
    r"(?i)[;&|`]\s*(cat|ls|rm|wget|curl|nc|bash|sh|chmod|whoami|uname|python|perl|ping)(\s|$)",
    r"\$\([^)]*\)",
    r"(?i)/bin/(ba)?sh\b",
    r"(?i)\bcmd(\.exe)?\s*/c\b",
];

const TRAVERSAL_PATTERNS: &[&str] = &[
    r"\.\./",
    r"\.\.\\",
    r"(?i)%2e%2e(%2f|%5c|/|\\)",
    r"(?i)/etc/(passwd|shadow|hosts)\b",
    r"(?i)\b(boot|win)\.ini\b",
];

struct PatternFamily {
    signal_type: &'static str,
    severity: Severity,
    set: RegexSet,
}

/// The payload signal analyzer.
pub struct PayloadScanner {
    config: PayloadConfig,
    families: Vec<PatternFamily>,
    base64_token: Regex,
    hex_token: Regex,
    user_agents: Vec<String>,
    extensions: HashSet<String>,
}

impl PayloadScanner {
    /// Compile the pattern families. Fails with `ConfigError` only if a
    /// built-in pattern is rejected by the regex engine.
    pub fn new(config: PayloadConfig) -> WardenResult<Self> {
        let families = vec![
            family(SQL_INJECTION, Severity::Critical, SQL_PATTERNS)?,
            family(XSS, Severity::High, XSS_PATTERNS)?,
            family(COMMAND_INJECTION, Severity::Critical, COMMAND_PATTERNS)?,
            family(PATH_TRAVERSAL, Severity::High, TRAVERSAL_PATTERNS)?,
        ];
        let user_agents = config
            .malicious_user_agents
            .iter()
            .map(|ua| ua.to_ascii_lowercase())
            .collect();
        let extensions = config
            .dangerous_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            config,
            families,
            base64_token: compile(r"[A-Za-z0-9+/]{16,}={0,2}")?,
            hex_token: compile(r"(?i)\b(0x)?([0-9a-f]{2}){8,}\b")?,
            user_agents,
            extensions,
        })
    }

    /// Injection families matched anywhere in `text`.
    fn scan(&self, text: &str) -> Vec<&PatternFamily> {
        self.families
            .iter()
            .filter(|f| f.set.is_match(text))
            .collect()
    }

    /// One decoded layer of every encoded fragment in `text`, tagged with
    /// the encoding that produced it.
    fn decoded_layers(&self, text: &str) -> Vec<(&'static str, String)> {
        let mut layers = Vec::new();

        if let Some(decoded) = percent_decode(text) {
            layers.push(("percent", decoded));
        }
        for token in self.base64_token.find_iter(text) {
            if let Some(decoded) = BASE64
                .decode(token.as_str())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                layers.push(("base64", decoded));
            }
        }
        for token in self.hex_token.find_iter(text) {
            let digits = token.as_str().trim_start_matches("0x").trim_start_matches("0X");
            if let Some(decoded) = hex::decode(digits)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                layers.push(("hex", decoded));
            }
        }
        layers
    }

    fn scan_surfaces(&self, request: &ThreatRequest, outcome: &mut AnalyzerOutcome) {
        let surfaces = [
            ("path", Some(request.path.as_str())),
            ("query", request.query.as_deref()),
            ("body", request.body.as_deref()),
        ];

        let mut found: Vec<(&PatternFamily, BTreeSet<&'static str>)> = Vec::new();
        let mut hidden: BTreeSet<&'static str> = BTreeSet::new();
        let mut note = |family: &'static str, location: &'static str| {
            match found.iter_mut().find(|(f, _)| f.signal_type == family) {
                Some((_, locations)) => {
                    locations.insert(location);
                }
                None => {
                    if let Some(f) = self.families.iter().find(|f| f.signal_type == family) {
                        found.push((f, BTreeSet::from([location])));
                    }
                }
            }
        };

        for (location, text) in surfaces {
            let Some(text) = text.filter(|t| !t.is_empty()) else {
                continue;
            };
            let direct: Vec<&'static str> = self.scan(text).iter().map(|f| f.signal_type).collect();
            for family in &direct {
                note(*family, location);
            }

            for (encoding, decoded) in self.decoded_layers(text) {
                for f in self.scan(&decoded) {
                    if !direct.contains(&f.signal_type) {
                        hidden.insert(encoding);
                    }
                    note(f.signal_type, location);
                }
            }
        }

        for (family, locations) in found {
            outcome.push(
                ThreatSignal::new(family.signal_type, family.severity, self.config.injection_contribution)
                    .with_detail("locations", locations.into_iter().map(Value::from).collect::<Vec<_>>()),
            );
        }

        if !hidden.is_empty() {
            outcome.push(
                ThreatSignal::new(OBFUSCATED_PAYLOAD, Severity::Medium, self.config.obfuscation_contribution)
                    .with_detail("encodings", hidden.into_iter().map(Value::from).collect::<Vec<_>>()),
            );
        } else if surfaces_double_encoded(request) {
            outcome.push(
                ThreatSignal::new(OBFUSCATED_PAYLOAD, Severity::Medium, self.config.obfuscation_contribution)
                    .with_detail("encodings", vec![Value::from("double_percent")]),
            );
        }
    }

    fn scan_user_agent(&self, request: &ThreatRequest, outcome: &mut AnalyzerOutcome) {
        let Some(ua) = request.user_agent.as_deref() else {
            return;
        };
        let ua = ua.to_ascii_lowercase();
        if let Some(tool) = self.user_agents.iter().find(|tool| ua.contains(tool.as_str())) {
            outcome.push(
                ThreatSignal::new(
                    MALICIOUS_USER_AGENT,
                    Severity::High,
                    self.config.malicious_user_agent_contribution,
                )
                .with_detail("tool", tool.as_str()),
            );
        }
    }

    fn scan_size(&self, request: &ThreatRequest, outcome: &mut AnalyzerOutcome) {
        let size = request.payload_bytes();
        if size > self.config.max_payload_bytes {
            outcome.push(
                ThreatSignal::new(OVERSIZED_PAYLOAD, Severity::Medium, self.config.oversized_contribution)
                    .with_detail("size_bytes", size)
                    .with_detail("max_bytes", self.config.max_payload_bytes),
            );
        }
    }

    fn scan_uploads(&self, request: &ThreatRequest, outcome: &mut AnalyzerOutcome) {
        let mut flagged = Vec::new();
        let mut double_extension = false;

        for file in &request.files {
            let name = file.name.to_ascii_lowercase();
            let mut parts = name.split('.');
            parts.next(); // stem
            let extensions: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
            let Some((last, inner)) = extensions.split_last() else {
                continue;
            };

            let final_dangerous = self.extensions.contains(*last);
            let inner_dangerous = inner.iter().any(|ext| self.extensions.contains(*ext));
            if final_dangerous || inner_dangerous {
                double_extension |= !inner.is_empty();
                flagged.push(Value::from(file.name.as_str()));
            }
        }

        if !flagged.is_empty() {
            outcome.push(
                ThreatSignal::new(DANGEROUS_UPLOAD, Severity::High, self.config.dangerous_upload_contribution)
                    .with_detail("files", flagged)
                    .with_detail("double_extension", double_extension),
            );
        }
    }
}

#[async_trait]
impl SignalAnalyzer for PayloadScanner {
    fn name(&self) -> &'static str {
        "payload"
    }

    async fn analyze(
        &self,
        request: &ThreatRequest,
        _context: &RequestContext,
        _now: DateTime<Utc>,
    ) -> WardenResult<AnalyzerOutcome> {
        let mut outcome = AnalyzerOutcome::none();
        self.scan_surfaces(request, &mut outcome);
        self.scan_user_agent(request, &mut outcome);
        self.scan_size(request, &mut outcome);
        self.scan_uploads(request, &mut outcome);
        Ok(outcome)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn compile(pattern: &str) -> WardenResult<Regex> {
    Regex::new(pattern).map_err(|e| WardenError::ConfigError {
        reason: format!("invalid pattern {:?}: {}", pattern, e),
    })
}

fn family(
    signal_type: &'static str,
    severity: Severity,
    patterns: &[&str],
) -> WardenResult<PatternFamily> {
    let set = RegexSet::new(patterns).map_err(|e| WardenError::ConfigError {
        reason: format!("invalid {} pattern set: {}", signal_type, e),
    })?;
    Ok(PatternFamily {
        signal_type,
        severity,
        set,
    })
}

/// Decode `%XX` escapes and `+`. `None` when `text` has no escapes or the
/// result is not UTF-8.
fn percent_decode(text: &str) -> Option<String> {
    if !text.contains('%') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    let decoded = String::from_utf8(out).ok()?;
    (decoded != text).then_some(decoded)
}

/// `%25XX`: an escape that decodes to another escape.
fn surfaces_double_encoded(request: &ThreatRequest) -> bool {
    [Some(request.path.as_str()), request.query.as_deref(), request.body.as_deref()]
        .into_iter()
        .flatten()
        .any(|text| {
            text.to_ascii_lowercase()
                .as_bytes()
                .windows(5)
                .any(|w| w.starts_with(b"%25") && w[3].is_ascii_hexdigit() && w[4].is_ascii_hexdigit())
        })
}
