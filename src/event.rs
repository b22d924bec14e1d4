use crate::gate::ConfirmationTicket;
use crate::invocation::InvocationId;
use crate::session::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Free-form text a step emitted for the caller.
    Text,
    /// A gate opened a ticket and is waiting for a decision.
    ConfirmationRequest,
    /// The external decision provider answered.
    ConfirmationResponse,
    /// A step completed and published its output.
    StepResult,
}

/// Immutable record of one unit of output produced during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub invocation_id: InvocationId,
    pub kind: EventKind,
    pub payload: Value,
}

impl Event {
    pub(crate) fn text(invocation_id: InvocationId, text: impl Into<String>) -> Self {
        Self {
            invocation_id,
            kind: EventKind::Text,
            payload: json!({ "text": text.into() }),
        }
    }

    pub(crate) fn confirmation_request(
        invocation_id: InvocationId,
        ticket: &ConfirmationTicket,
    ) -> Self {
        Self {
            invocation_id,
            kind: EventKind::ConfirmationRequest,
            payload: json!({
                "gate_id": ticket.gate_id,
                "hint": ticket.hint,
                "payload": ticket.payload,
            }),
        }
    }

    pub(crate) fn confirmation_response(
        invocation_id: InvocationId,
        gate_id: &str,
        confirmed: bool,
    ) -> Self {
        Self {
            invocation_id,
            kind: EventKind::ConfirmationResponse,
            payload: json!({ "gate_id": gate_id, "confirmed": confirmed }),
        }
    }

    pub(crate) fn step_result(invocation_id: InvocationId, step: &str, output: &Value) -> Self {
        Self {
            invocation_id,
            kind: EventKind::StepResult,
            payload: json!({ "step": step, "output": output }),
        }
    }
}

/// Append-only, sequence-numbered log of everything runs produce.
///
/// A single lock covers appends, so events of one invocation can never
/// reorder even with concurrent producers.
pub struct EventLog {
    entries: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Event>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::new("event log lock poisoned"))
    }

    /// Append one event, returning its sequence number.
    pub fn append(&self, event: Event) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        entries.push(event);
        Ok((entries.len() - 1) as u64)
    }

    /// Append a batch under one lock acquisition, preserving order.
    pub(crate) fn append_all(&self, events: &[Event]) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.extend_from_slice(events);
        Ok(())
    }

    /// All events for one invocation, in emission order.
    pub fn for_invocation(&self, invocation_id: InvocationId) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|e| e.invocation_id == invocation_id)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_increasing_sequence_numbers() {
        let log = EventLog::new();
        let id = InvocationId::generate();
        assert_eq!(log.append(Event::text(id, "a")).unwrap(), 0);
        assert_eq!(log.append(Event::text(id, "b")).unwrap(), 1);
        assert_eq!(log.len().unwrap(), 2);
    }

    #[test]
    fn for_invocation_filters_and_keeps_order() {
        let log = EventLog::new();
        let a = InvocationId::generate();
        let b = InvocationId::generate();

        log.append(Event::text(a, "first")).unwrap();
        log.append(Event::text(b, "other")).unwrap();
        log.append(Event::text(a, "second")).unwrap();

        let events = log.for_invocation(a).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["text"], "first");
        assert_eq!(events[1].payload["text"], "second");
    }

    #[test]
    fn append_all_preserves_batch_order() {
        let log = EventLog::new();
        let id = InvocationId::generate();
        let batch = vec![Event::text(id, "x"), Event::text(id, "y")];
        log.append_all(&batch).unwrap();

        let events = log.for_invocation(id).unwrap();
        assert_eq!(events[0].payload["text"], "x");
        assert_eq!(events[1].payload["text"], "y");
    }

    #[test]
    fn empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty().unwrap());
    }
}
