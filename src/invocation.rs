use crate::gate::ConfirmationTicket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque token correlating a resume to its suspension point.
///
/// Passed verbatim end-to-end: the caller receives it from `start` and must
/// hand the same id back to `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one pipeline run.
///
/// Transitions are monotone except `Suspended -> Running` on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

impl InvocationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The persisted execution state of one run. Mutated only by the
/// orchestrator; archived (kept with terminal status) once finished so a
/// late resume gets `NotSuspended` instead of a spurious not-found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: InvocationId,
    pub session_id: String,
    pub status: InvocationStatus,
    /// Index of the next step to run. Never moves backward.
    pub cursor: usize,
    /// The initial input, kept so a resumed step replays identical input.
    pub input: Value,
    /// At most one outstanding ticket per record.
    pub pending_confirmation: Option<ConfirmationTicket>,
}

impl InvocationRecord {
    pub(crate) fn new(session_id: &str, input: Value) -> Self {
        Self {
            id: InvocationId::generate(),
            session_id: session_id.to_string(),
            status: InvocationStatus::Running,
            cursor: 0,
            input,
            pending_confirmation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_starts_running_at_step_zero() {
        let record = InvocationRecord::new("s-1", json!({"units": 3}));
        assert_eq!(record.status, InvocationStatus::Running);
        assert_eq!(record.cursor, 0);
        assert!(record.pending_confirmation.is_none());
        assert_eq!(record.session_id, "s-1");
    }

    #[test]
    fn ids_are_unique() {
        let a = InvocationRecord::new("s", json!(null));
        let b = InvocationRecord::new("s", json!(null));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn terminal_statuses() {
        assert!(InvocationStatus::Completed.is_terminal());
        assert!(InvocationStatus::Failed.is_terminal());
        assert!(!InvocationStatus::Running.is_terminal());
        assert!(!InvocationStatus::Suspended.is_terminal());
    }
}
