use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// An approval checkpoint guarding a side-effecting action.
///
/// A gate holds a policy predicate over the action's payload. When the
/// policy says no approval is needed the guarded action may run right away;
/// otherwise the invocation suspends until an external decision arrives.
/// Gates are stateless — per-invocation approval state lives in a
/// [`ConfirmationTicket`] owned by the invocation record.
pub struct ConfirmationGate {
    id: &'static str,
    needs_approval: Box<dyn Fn(&Value) -> bool + Send>,
}

impl ConfirmationGate {
    /// Create a gate whose `needs_approval` predicate decides, per payload,
    /// whether a human must sign off before the action runs.
    pub fn new(id: &'static str, needs_approval: impl Fn(&Value) -> bool + Send + 'static) -> Self {
        Self {
            id,
            needs_approval: Box::new(needs_approval),
        }
    }

    /// Create a gate that requires approval for every payload.
    pub fn always(id: &'static str) -> Self {
        Self::new(id, |_| true)
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub(crate) fn requires_approval(&self, payload: &Value) -> bool {
        (self.needs_approval)(payload)
    }
}

impl fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// What a gate told the step about its guarded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    /// The policy waved the payload through; run the action now.
    AutoApproved,
    /// A ticket was opened; the step must suspend and wait for a decision.
    Pending,
    /// The external decision was yes; run the action now.
    Approved,
    /// The external decision was no; the action never runs.
    Rejected,
}

impl GateOutcome {
    /// Whether the guarded action may execute.
    pub fn allows_action(&self) -> bool {
        matches!(self, Self::AutoApproved | Self::Approved)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One gate's approval request within an invocation.
///
/// Created the first time a guarded action is consulted, resolved exactly
/// once by the external decision provider. Never shared across invocations,
/// even for identical payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationTicket {
    pub gate_id: String,
    /// Human-readable prompt for whoever decides.
    pub hint: String,
    /// The action arguments captured at the pending point. A resumed step
    /// must present the same payload or the replay is rejected.
    pub payload: Value,
    pub resolved: Option<bool>,
}

impl ConfirmationTicket {
    pub(crate) fn new(gate_id: &str, hint: String, payload: Value) -> Self {
        Self {
            gate_id: gate_id.to_string(),
            hint,
            payload,
            resolved: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Internal consistency violations around tickets and replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The same gate was consulted again while its ticket was unresolved.
    DuplicateRequest { gate_id: String },
    /// A different gate was consulted while this step already holds a ticket.
    TicketHeld { open_gate: String, requested_gate: String },
    /// A replay presented different action arguments than the ticket captured.
    PayloadMismatch { gate_id: String },
    /// A suspension or resume happened with no outstanding ticket.
    MissingTicket,
    /// A step opened a ticket but advanced instead of suspending.
    AbandonedTicket { gate_id: String },
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRequest { gate_id } => {
                write!(f, "duplicate confirmation request for gate '{gate_id}'")
            }
            Self::TicketHeld {
                open_gate,
                requested_gate,
            } => write!(
                f,
                "gate '{requested_gate}' consulted while a ticket for gate '{open_gate}' is held"
            ),
            Self::PayloadMismatch { gate_id } => write!(
                f,
                "gate '{gate_id}' replayed with a payload that does not match its ticket"
            ),
            Self::MissingTicket => write!(f, "no outstanding confirmation ticket"),
            Self::AbandonedTicket { gate_id } => write!(
                f,
                "gate '{gate_id}' has an open ticket but the step did not suspend"
            ),
        }
    }
}

impl std::error::Error for GateError {}
