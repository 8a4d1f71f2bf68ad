//! Job status vocabulary and the polling state machine.
//!
//! Nothing here touches the network: [`next_state`] takes whatever the last
//! poll produced and decides where the job stands.

use std::time::Duration;

use serde_json::Value;

pub const SUCCESS_STATUSES: [&str; 3] = ["completed", "done", "success"];
pub const FAILURE_STATUSES: [&str; 2] = ["failed", "error"];

/// A provider status string, lowercased and classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded(String),
    Failed(String),
    /// Anything outside the two terminal vocabularies, including the empty string.
    Pending(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        let status = raw.to_lowercase();
        if SUCCESS_STATUSES.contains(&status.as_str()) {
            JobStatus::Succeeded(status)
        } else if FAILURE_STATUSES.contains(&status.as_str()) {
            JobStatus::Failed(status)
        } else {
            JobStatus::Pending(status)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Succeeded(s) | JobStatus::Failed(s) | JobStatus::Pending(s) => s,
        }
    }
}

/// One successful status response.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: JobStatus,
    /// What to show the user if the job failed: the `error` field, or the whole
    /// response when there is none.
    pub detail: String,
}

impl StatusReport {
    pub fn from_json(value: &Value) -> Self {
        let status = JobStatus::parse(value["status"].as_str().unwrap_or_default());
        let detail = match value.get("error") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Null) | Some(Value::Bool(false)) | Some(Value::String(_)) | None => {
                value.to_string()
            }
            Some(other) => other.to_string(),
        };
        Self { status, detail }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Succeeded,
    Failed { detail: String },
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

/// What a loop iteration learned about the job.
#[derive(Debug, Clone, Copy)]
pub enum Observation<'a> {
    /// No report: either the iteration has not polled yet, or the poll failed
    /// transiently.
    Unavailable,
    Report(&'a StatusReport),
}

/// Transition function of the polling loop.
///
/// Terminal states never change. A terminal report wins over the deadline;
/// a job still pending once `elapsed >= deadline` has timed out.
pub fn next_state(
    current: JobState,
    observation: Observation<'_>,
    elapsed: Duration,
    deadline: Duration,
) -> JobState {
    if current.is_terminal() {
        return current;
    }

    if let Observation::Report(report) = observation {
        match &report.status {
            JobStatus::Succeeded(_) => return JobState::Succeeded,
            JobStatus::Failed(_) => {
                return JobState::Failed {
                    detail: report.detail.clone(),
                };
            }
            JobStatus::Pending(_) => {}
        }
    }

    if elapsed >= deadline {
        JobState::TimedOut
    } else {
        JobState::Pending
    }
}

/// Emits a status line only when the status differs from the previous one.
#[derive(Debug, Default)]
pub struct StatusLog {
    last: Option<String>,
}

impl StatusLog {
    pub fn observe(&mut self, status: &JobStatus, elapsed: Duration) -> Option<String> {
        let status = status.as_str();
        if self.last.as_deref() == Some(status) {
            return None;
        }
        self.last = Some(status.to_string());

        let shown = if status.is_empty() { "unknown" } else { status };
        Some(format!("[Status] {shown} ({}s elapsed)", elapsed.as_secs()))
    }
}
