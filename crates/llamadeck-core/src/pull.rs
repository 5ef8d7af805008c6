use serde::Serialize;

use crate::LlamaDeckError;

/// One step of a model download. Every pull ends in exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PullEvent {
    Progress {
        fraction: f64,
        status: Option<String>,
    },
    Success,
    Failed {
        #[serde(serialize_with = "serialize_error")]
        error: LlamaDeckError,
    },
    Cancelled,
}

impl PullEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PullEvent::Progress { .. })
    }

    pub fn failed(error: LlamaDeckError) -> Self {
        PullEvent::Failed { error }
    }
}

fn serialize_error<S: serde::Serializer>(error: &LlamaDeckError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// `completed / total` clamped to [0, 1]; an unknown or zero total yields 0.
pub fn progress_fraction(completed: Option<u64>, total: Option<u64>) -> f64 {
    let completed = completed.unwrap_or(0);
    match total {
        None | Some(0) => 0.0,
        Some(total) => (completed as f64 / total as f64).clamp(0.0, 1.0),
    }
}
