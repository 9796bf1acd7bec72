use crate::target::health_endpoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    Unreachable,
    Timeout,
    HttpStatus,
    MalformedBody,
    NotReady,
}

impl ProbeFailure {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::MalformedBody => "malformed_body",
            Self::NotReady => "not_ready",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    NotReady {
        failure: ProbeFailure,
        detail: String,
    },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    fn not_ready(failure: ProbeFailure, detail: impl Into<String>) -> Self {
        Self::NotReady {
            failure,
            detail: detail.into(),
        }
    }
}

pub fn probe_runtime_health(port: u16, timeout: Duration) -> ProbeOutcome {
    let endpoint = health_endpoint(port);
    match ureq::get(endpoint.as_str())
        .timeout(timeout)
        .set("Accept", "application/json")
        .call()
    {
        Ok(resp) => {
            let status = resp.status();
            match resp.into_string() {
                Ok(body) => classify_health_body(body.as_str(), status),
                Err(err) => ProbeOutcome::not_ready(
                    ProbeFailure::MalformedBody,
                    format!("{endpoint} ({err})"),
                ),
            }
        }
        Err(ureq::Error::Status(code, _)) => ProbeOutcome::not_ready(
            ProbeFailure::HttpStatus,
            format!("{endpoint} -> HTTP {code}"),
        ),
        Err(ureq::Error::Transport(err)) => {
            let text = err.to_string();
            let failure = if text.to_ascii_lowercase().contains("timed out") {
                ProbeFailure::Timeout
            } else {
                ProbeFailure::Unreachable
            };
            ProbeOutcome::not_ready(failure, format!("{endpoint} ({text})"))
        }
    }
}

fn classify_health_body(body: &str, status_code: u16) -> ProbeOutcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            return ProbeOutcome::not_ready(
                ProbeFailure::MalformedBody,
                format!("health body is not json (HTTP {status_code}): {err}"),
            )
        }
    };

    match value.get("status").and_then(Value::as_str) {
        Some(status) if status.trim().eq_ignore_ascii_case("ready") => ProbeOutcome::Ready,
        Some(status) => ProbeOutcome::not_ready(
            ProbeFailure::NotReady,
            format!("runtime status is {status}"),
        ),
        None => ProbeOutcome::not_ready(
            ProbeFailure::MalformedBody,
            "health body has no status field",
        ),
    }
}
