//! Worker state and progress snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorPayload;

/// Lifecycle of the most recent background job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Progress of the current or last job, always read and written whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerProgress {
    pub state: WorkerState,
    /// Items the job was started with.
    pub total: usize,
    /// Items finished so far, skipped items included.
    pub num_completed: usize,
    /// Journal filename of the last finished item.
    pub last_item: Option<String>,
    /// Set once the job has stopped for any reason.
    pub complete: bool,
    /// Why the job failed, reported once it has.
    pub error: Option<ErrorPayload>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkerProgress {
    pub(crate) fn started(total: usize) -> Self {
        Self {
            state: WorkerState::Running,
            total,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub(crate) fn record_item(&mut self, filename: &str) {
        self.num_completed += 1;
        self.last_item = Some(filename.to_string());
    }

    pub(crate) fn finish(&mut self, state: WorkerState, error: Option<ErrorPayload>) {
        self.state = state;
        self.error = error;
        self.complete = true;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_moves_forward() {
        let mut progress = WorkerProgress::started(2);
        assert_eq!(progress.state, WorkerState::Running);
        assert!(!progress.complete);

        progress.record_item("journal_19_1.xml");
        progress.record_item("journal_19_2.xml");
        assert_eq!(progress.num_completed, 2);
        assert_eq!(progress.last_item.as_deref(), Some("journal_19_2.xml"));

        progress.finish(WorkerState::Completed, None);
        assert!(progress.complete);
        assert!(progress.state.is_terminal());
        assert!(progress.finished_at >= progress.started_at);
    }

    #[test]
    fn serializes_state_in_snake_case() {
        let json = serde_json::to_value(WorkerProgress::default()).expect("serialize");
        assert_eq!(json["state"], "idle");
        assert_eq!(json["num_completed"], 0);
    }
}
