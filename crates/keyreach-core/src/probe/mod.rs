//! Differential HTTP-status scope probing.
//!
//! Each candidate permission is tied to one test call and two response
//! signatures. A call answered with the "with scope" signature marks the
//! permission Granted. A call answered with the "without scope" signature
//! marks it Denied, and when the vendor echoes the token's full scope list in
//! that rejection, the list settles every candidate at once and probing stops.
//! Anything else stays Unverified.

use crate::error::AnalyzerError;
use crate::permissions::PermissionSet;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info};

static INVALID_SCOPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)invalid scope(?:\(s\)|s)?:\s*(.*?)\.\s*this endpoint requires")
        .expect("invalid scope regex is valid")
});

/// Outcome of probing one permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Granted,
    Denied,
    Unverified,
}

/// A response signature: status code plus an optional message fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub status: u16,
    pub message: Option<String>,
}

impl Expected {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    fn matches(&self, response: &HttpResponse) -> bool {
        if response.status != self.status {
            return false;
        }
        match &self.message {
            Some(message) => normalize(&response.body).contains(&normalize(message)),
            None => true,
        }
    }
}

/// One candidate permission and the call that tests it.
#[derive(Debug, Clone)]
pub struct ScopeProbe {
    pub permission: String,
    pub request: HttpRequest,
    pub with_scope: Expected,
    pub without_scope: Expected,
    /// A Granted response body is the caller's identity.
    pub reveals_identity: bool,
}

impl ScopeProbe {
    pub fn new(permission: impl Into<String>, request: HttpRequest) -> Self {
        Self {
            permission: permission.into(),
            request,
            with_scope: Expected::status(200),
            without_scope: Expected::status(403),
            reveals_identity: false,
        }
    }

    pub fn granted_on(mut self, expected: Expected) -> Self {
        self.with_scope = expected;
        self
    }

    pub fn denied_on(mut self, expected: Expected) -> Self {
        self.without_scope = expected;
        self
    }

    pub fn revealing_identity(mut self) -> Self {
        self.reveals_identity = true;
        self
    }
}

/// Result of a probing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Status per candidate, in input order.
    pub statuses: Vec<(String, ProbeStatus)>,
    pub identity: Option<serde_json::Value>,
    /// Full scope list echoed by the vendor, when one was seen.
    pub revealed_scopes: Option<Vec<String>>,
    pub requests_issued: usize,
}

impl ProbeReport {
    pub fn status(&self, permission: &str) -> Option<ProbeStatus> {
        self.statuses
            .iter()
            .find(|(p, _)| p == permission)
            .map(|(_, s)| *s)
    }

    /// Granted candidates plus any scope the vendor revealed.
    pub fn granted(&self) -> PermissionSet {
        let mut set: PermissionSet = self
            .statuses
            .iter()
            .filter(|(_, s)| *s == ProbeStatus::Granted)
            .map(|(p, _)| p.clone())
            .collect();
        if let Some(revealed) = &self.revealed_scopes {
            set.extend(revealed.iter().cloned());
        }
        set
    }

    pub fn with_status(&self, status: ProbeStatus) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

#[derive(Debug, PartialEq)]
enum Classification {
    Granted,
    Denied { revealed: Option<Vec<String>> },
    Unverified,
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\\' | '"' | '[' | ']'))
        .collect()
}

/// Scopes listed in an "Invalid scope(s): a, b. This endpoint requires ..." body.
pub fn revealed_scopes(body: &str) -> Option<Vec<String>> {
    let normalized = normalize(body);
    let caps = INVALID_SCOPES.captures(&normalized)?;
    Some(
        caps[1]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
    )
}

fn classify(probe: &ScopeProbe, response: &HttpResponse) -> Classification {
    if response.status == 200 || probe.with_scope.matches(response) {
        return Classification::Granted;
    }
    if response.status == probe.without_scope.status {
        if let Some(revealed) = revealed_scopes(&response.body) {
            return Classification::Denied {
                revealed: Some(revealed),
            };
        }
        if probe.without_scope.message.is_some() && probe.without_scope.matches(response) {
            return Classification::Denied { revealed: None };
        }
    }
    Classification::Unverified
}

/// Runs scope probes in order against one transport.
pub struct ScopeProber;

impl ScopeProber {
    /// Probe every candidate, stopping at the first response that reveals
    /// the full scope list. Transport and identity-decoding failures abort.
    pub async fn run(
        transport: &dyn HttpTransport,
        probes: &[ScopeProbe],
    ) -> Result<ProbeReport, AnalyzerError> {
        let mut report = ProbeReport {
            statuses: probes
                .iter()
                .map(|p| (p.permission.clone(), ProbeStatus::Unverified))
                .collect(),
            ..ProbeReport::default()
        };

        for (i, probe) in probes.iter().enumerate() {
            let response = transport.send(probe.request.clone()).await?;
            report.requests_issued += 1;

            match classify(probe, &response) {
                Classification::Granted => {
                    debug!(permission = %probe.permission, status = response.status, "scope granted");
                    report.statuses[i].1 = ProbeStatus::Granted;
                    if probe.reveals_identity {
                        report.identity = Some(response.json(&probe.request.path)?);
                    }
                }
                Classification::Denied {
                    revealed: Some(revealed),
                } => {
                    info!(
                        permission = %probe.permission,
                        scopes = ?revealed,
                        "scope list revealed, skipping remaining probes"
                    );
                    let granted: BTreeSet<&str> = revealed.iter().map(String::as_str).collect();
                    for (permission, status) in report.statuses.iter_mut() {
                        *status = if granted.contains(permission.as_str()) {
                            ProbeStatus::Granted
                        } else {
                            ProbeStatus::Denied
                        };
                    }
                    report.revealed_scopes = Some(revealed);
                    break;
                }
                Classification::Denied { revealed: None } => {
                    debug!(permission = %probe.permission, status = response.status, "scope denied");
                    report.statuses[i].1 = ProbeStatus::Denied;
                }
                Classification::Unverified => {
                    debug!(
                        permission = %probe.permission,
                        status = response.status,
                        "unrecognized response, leaving unverified"
                    );
                }
            }
        }

        Ok(report)
    }
}
