use crate::event::Event;
use crate::gate::{ConfirmationGate, ConfirmationTicket, GateError, GateOutcome};
use crate::invocation::InvocationId;
use crate::step::StepError;
use serde_json::Value;
use std::collections::HashMap;

/// Execution context handed to each step: the run input, the bound outputs
/// of earlier steps, gate access, and text emission.
///
/// A fresh context is built for every step execution, including replays
/// after resume — the ticket slot carries the invocation's approval state
/// across the suspend/resume boundary.
pub struct StepCtx {
    invocation_id: InvocationId,
    input: Value,
    bound: HashMap<String, Value>,
    ticket: Option<ConfirmationTicket>,
    events: Vec<Event>,
}

impl StepCtx {
    pub(crate) fn new(
        invocation_id: InvocationId,
        input: Value,
        bound: HashMap<String, Value>,
        ticket: Option<ConfirmationTicket>,
    ) -> Self {
        Self {
            invocation_id,
            input,
            bound,
            ticket,
            events: Vec::new(),
        }
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    /// The input the invocation was started with. Identical on replay.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Output of an earlier step. Only keys the step declared in
    /// `input_keys` are visible here.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bound.get(key)
    }

    /// Like [`get`](Self::get), but an error when the binding is missing.
    pub fn require(&self, key: &str) -> Result<&Value, StepError> {
        self.bound
            .get(key)
            .ok_or_else(|| StepError::invalid(format!("missing input binding: {key}")))
    }

    /// Emit a text event, delivered to the caller of `start`/`resume` and
    /// appended to the event log.
    pub fn say(&mut self, text: impl Into<String>) {
        self.events.push(Event::text(self.invocation_id, text));
    }

    /// Consult an approval gate before running a side-effecting action.
    ///
    /// First call: either [`GateOutcome::AutoApproved`] (policy waved the
    /// payload through) or [`GateOutcome::Pending`] with a fresh ticket, in
    /// which case the step must return `StepAction::Suspend` without
    /// performing the action. On replay after resume, the same call — same
    /// gate, same payload — yields [`GateOutcome::Approved`] or
    /// [`GateOutcome::Rejected`]. Repeating the call after resolution keeps
    /// returning the resolved outcome; it never re-opens the ticket.
    ///
    /// One checkpoint per step: consulting a different gate while this step
    /// already holds a ticket is a consistency error, as is replaying with
    /// a payload that differs from the one captured at the pending point.
    pub fn confirm(
        &mut self,
        gate: &ConfirmationGate,
        hint: impl Into<String>,
        payload: Value,
    ) -> Result<GateOutcome, GateError> {
        match &self.ticket {
            None => {
                if !gate.requires_approval(&payload) {
                    return Ok(GateOutcome::AutoApproved);
                }
                let ticket = ConfirmationTicket::new(gate.id(), hint.into(), payload);
                self.events
                    .push(Event::confirmation_request(self.invocation_id, &ticket));
                self.ticket = Some(ticket);
                Ok(GateOutcome::Pending)
            }
            Some(ticket) if ticket.gate_id != gate.id() => Err(GateError::TicketHeld {
                open_gate: ticket.gate_id.clone(),
                requested_gate: gate.id().to_string(),
            }),
            Some(ticket) if !ticket.is_resolved() => Err(GateError::DuplicateRequest {
                gate_id: ticket.gate_id.clone(),
            }),
            Some(ticket) => {
                if ticket.payload != payload {
                    return Err(GateError::PayloadMismatch {
                        gate_id: ticket.gate_id.clone(),
                    });
                }
                if ticket.resolved == Some(true) {
                    Ok(GateOutcome::Approved)
                } else {
                    Ok(GateOutcome::Rejected)
                }
            }
        }
    }

    pub(crate) fn take_ticket(&mut self) -> Option<ConfirmationTicket> {
        self.ticket.take()
    }

    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use serde_json::json;

    fn ctx_with_ticket(ticket: Option<ConfirmationTicket>) -> StepCtx {
        StepCtx::new(InvocationId::generate(), json!(null), HashMap::new(), ticket)
    }

    fn large_order_gate() -> ConfirmationGate {
        ConfirmationGate::new("large_order", |p| p["units"].as_u64().unwrap_or(0) > 1)
    }

    // --- input bindings ---

    #[test]
    fn get_and_require_bound_key() {
        let mut bound = HashMap::new();
        bound.insert("outline".to_string(), json!("1. intro"));
        let ctx = StepCtx::new(InvocationId::generate(), json!("topic"), bound, None);

        assert_eq!(ctx.get("outline"), Some(&json!("1. intro")));
        assert_eq!(ctx.require("outline").unwrap(), &json!("1. intro"));
        assert_eq!(ctx.input(), &json!("topic"));
    }

    #[test]
    fn require_missing_key_is_invalid() {
        let ctx = ctx_with_ticket(None);
        let err = ctx.require("missing").err().unwrap();
        assert!(matches!(err, StepError::Invalid(msg) if msg.contains("missing input binding")));
    }

    // --- say ---

    #[test]
    fn say_buffers_text_events() {
        let mut ctx = ctx_with_ticket(None);
        ctx.say("working on it");
        let events = ctx.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Text);
        assert_eq!(events[0].payload["text"], "working on it");
    }

    // --- confirm: first call ---

    #[test]
    fn small_payload_auto_approves_without_ticket() {
        let mut ctx = ctx_with_ticket(None);
        let outcome = ctx
            .confirm(&large_order_gate(), "approve?", json!({"units": 1}))
            .unwrap();
        assert_eq!(outcome, GateOutcome::AutoApproved);
        assert!(ctx.take_ticket().is_none());
        assert!(ctx.take_events().is_empty());
    }

    #[test]
    fn large_payload_opens_ticket_and_emits_request() {
        let mut ctx = ctx_with_ticket(None);
        let outcome = ctx
            .confirm(&large_order_gate(), "approve 10?", json!({"units": 10}))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Pending);

        let events = ctx.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ConfirmationRequest);
        assert_eq!(events[0].payload["payload"]["units"], 10);

        let ticket = ctx.take_ticket().unwrap();
        assert_eq!(ticket.gate_id, "large_order");
        assert!(!ticket.is_resolved());
    }

    // --- confirm: consistency errors ---

    #[test]
    fn duplicate_request_before_resolution_errors() {
        let mut ctx = ctx_with_ticket(None);
        ctx.confirm(&large_order_gate(), "approve?", json!({"units": 10}))
            .unwrap();
        let err = ctx
            .confirm(&large_order_gate(), "approve?", json!({"units": 10}))
            .err()
            .unwrap();
        assert!(matches!(err, GateError::DuplicateRequest { .. }));
    }

    #[test]
    fn second_gate_while_ticket_held_errors() {
        let mut ctx = ctx_with_ticket(None);
        ctx.confirm(&large_order_gate(), "approve?", json!({"units": 10}))
            .unwrap();
        let other = ConfirmationGate::always("other_gate");
        let err = ctx.confirm(&other, "also?", json!(null)).err().unwrap();
        assert!(
            matches!(err, GateError::TicketHeld { open_gate, requested_gate }
                if open_gate == "large_order" && requested_gate == "other_gate")
        );
    }

    #[test]
    fn replay_with_different_payload_errors() {
        let mut ticket =
            ConfirmationTicket::new("large_order", "approve?".into(), json!({"units": 10}));
        ticket.resolved = Some(true);
        let mut ctx = ctx_with_ticket(Some(ticket));

        let err = ctx
            .confirm(&large_order_gate(), "approve?", json!({"units": 11}))
            .err()
            .unwrap();
        assert!(matches!(err, GateError::PayloadMismatch { .. }));
    }

    // --- confirm: resolved replay ---

    #[test]
    fn resolved_true_replays_as_approved() {
        let mut ticket =
            ConfirmationTicket::new("large_order", "approve?".into(), json!({"units": 10}));
        ticket.resolved = Some(true);
        let mut ctx = ctx_with_ticket(Some(ticket));

        let outcome = ctx
            .confirm(&large_order_gate(), "approve?", json!({"units": 10}))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Approved);
    }

    #[test]
    fn resolved_false_replays_as_rejected() {
        let mut ticket =
            ConfirmationTicket::new("large_order", "approve?".into(), json!({"units": 8}));
        ticket.resolved = Some(false);
        let mut ctx = ctx_with_ticket(Some(ticket));

        let outcome = ctx
            .confirm(&large_order_gate(), "approve?", json!({"units": 8}))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Rejected);
    }

    #[test]
    fn resolved_replay_is_idempotent() {
        let mut ticket =
            ConfirmationTicket::new("large_order", "approve?".into(), json!({"units": 10}));
        ticket.resolved = Some(true);
        let mut ctx = ctx_with_ticket(Some(ticket));

        for _ in 0..3 {
            let outcome = ctx
                .confirm(&large_order_gate(), "approve?", json!({"units": 10}))
                .unwrap();
            assert_eq!(outcome, GateOutcome::Approved);
        }
        // no new request events were emitted
        assert!(ctx.take_events().is_empty());
    }
}
