use crate::ctx::StepCtx;
use crate::event::{Event, EventLog};
use crate::gate::GateError;
use crate::invocation::{InvocationId, InvocationRecord, InvocationStatus};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::Pipeline;
use crate::session::{SessionStore, StoreError, Turn};
use crate::step::{StepAction, StepError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Everything `start`/`resume`/`cancel` can report. Nothing is swallowed:
/// the caller always gets either a terminal outcome, a suspension, or one
/// of these.
#[derive(Debug)]
pub enum EngineError {
    InvocationNotFound(InvocationId),
    /// Resume or cancel hit an invocation that is not waiting for a decision.
    NotSuspended {
        invocation_id: InvocationId,
        status: InvocationStatus,
    },
    /// Ticket bookkeeping went inconsistent; the invocation is failed.
    Gate {
        invocation_id: InvocationId,
        source: GateError,
    },
    /// A step failed. Terminal for the invocation — no retry at this layer.
    Step {
        invocation_id: InvocationId,
        step: &'static str,
        source: StepError,
    },
    /// Session store or event log I/O failure.
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvocationNotFound(id) => write!(f, "invocation not found: {id}"),
            Self::NotSuspended {
                invocation_id,
                status,
            } => write!(
                f,
                "invocation {invocation_id} is not suspended (status: {status:?})"
            ),
            Self::Gate { source, .. } => write!(f, "gate consistency: {source}"),
            Self::Step { step, source, .. } => write!(f, "step '{step}' failed: {source}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gate { source, .. } => Some(source),
            Self::Step { source, .. } => Some(source),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Run outcomes
// ---------------------------------------------------------------------------

/// A suspended invocation's outstanding request — everything a decision
/// provider needs to solicit a human and call `resume`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub invocation_id: InvocationId,
    pub gate_id: String,
    pub hint: String,
    pub payload: Value,
}

/// What the caller of `start`/`resume` gets back.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Ran to the end; `output` is the final step's published value.
    Completed {
        invocation_id: InvocationId,
        output: Value,
        events: Vec<Event>,
    },
    /// Parked at an approval gate awaiting an external decision.
    Suspended {
        invocation_id: InvocationId,
        confirmation: PendingConfirmation,
        events: Vec<Event>,
    },
}

impl RunOutcome {
    pub fn invocation_id(&self) -> InvocationId {
        match self {
            Self::Completed { invocation_id, .. } | Self::Suspended { invocation_id, .. } => {
                *invocation_id
            }
        }
    }

    /// Events produced during this call, in emission order.
    pub fn events(&self) -> &[Event] {
        match self {
            Self::Completed { events, .. } | Self::Suspended { events, .. } => events,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a pipeline: dispatches steps, detects pending gates, suspends,
/// and resumes on matching invocation ids.
///
/// Suspension never blocks: `start` and `resume` return to the caller the
/// moment a gate goes pending, and the decision provider calls `resume`
/// later from wherever it likes. Records are looked up by invocation id —
/// there is no implicit "current run" context.
pub struct Orchestrator {
    pipeline: Pipeline,
    sessions: Arc<SessionStore>,
    log: Arc<EventLog>,
    metrics: Arc<Metrics>,
    records: HashMap<InvocationId, InvocationRecord>,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self::with_stores(
            pipeline,
            Arc::new(SessionStore::new()),
            Arc::new(EventLog::new()),
        )
    }

    /// Build against shared stores, e.g. one event log observed by an
    /// external decision provider.
    pub fn with_stores(
        pipeline: Pipeline,
        sessions: Arc<SessionStore>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            log,
            metrics: Arc::new(Metrics::default()),
            records: HashMap::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn status(&self, invocation_id: InvocationId) -> Result<InvocationStatus, EngineError> {
        self.records
            .get(&invocation_id)
            .map(|r| r.status)
            .ok_or(EngineError::InvocationNotFound(invocation_id))
    }

    /// Snapshot of one invocation's record.
    pub fn record(&self, invocation_id: InvocationId) -> Result<InvocationRecord, EngineError> {
        self.records
            .get(&invocation_id)
            .cloned()
            .ok_or(EngineError::InvocationNotFound(invocation_id))
    }

    /// All events logged for one invocation so far, in emission order.
    pub fn events(&self, invocation_id: InvocationId) -> Result<Vec<Event>, EngineError> {
        if !self.records.contains_key(&invocation_id) {
            return Err(EngineError::InvocationNotFound(invocation_id));
        }
        Ok(self.log.for_invocation(invocation_id)?)
    }

    /// Start a new invocation and advance it until completion, the first
    /// pending gate, or an error.
    pub fn start(&mut self, session_id: &str, input: Value) -> Result<RunOutcome, EngineError> {
        self.sessions.create_if_absent(session_id)?;
        self.sessions
            .push_turn(session_id, Turn::user(input.clone()))?;

        let record = InvocationRecord::new(session_id, input);
        let id = record.id;
        self.records.insert(id, record);
        self.metrics.invocation_started();

        self.advance(id, Vec::new())
    }

    /// Supply the decision for a suspended invocation and continue from the
    /// suspended step — not from the start.
    pub fn resume(
        &mut self,
        invocation_id: InvocationId,
        decision: bool,
    ) -> Result<RunOutcome, EngineError> {
        let record = self
            .records
            .get_mut(&invocation_id)
            .ok_or(EngineError::InvocationNotFound(invocation_id))?;
        if record.status != InvocationStatus::Suspended {
            return Err(EngineError::NotSuspended {
                invocation_id,
                status: record.status,
            });
        }
        let Some(ticket) = record.pending_confirmation.as_mut() else {
            return Err(EngineError::Gate {
                invocation_id,
                source: GateError::MissingTicket,
            });
        };
        ticket.resolved = Some(decision);
        let gate_id = ticket.gate_id.clone();
        record.status = InvocationStatus::Running;
        let session_id = record.session_id.clone();

        self.metrics.invocation_resumed(decision);
        self.sessions.push_turn(
            &session_id,
            Turn::user(json!({ "gate_id": gate_id, "confirmed": decision })),
        )?;

        let events = vec![Event::confirmation_response(
            invocation_id,
            &gate_id,
            decision,
        )];
        self.advance(invocation_id, events)
    }

    /// Abort a run. Pending tickets are discarded; side effects already
    /// committed by completed steps stay committed. Cancelling a finished
    /// invocation is a no-op.
    pub fn cancel(&mut self, invocation_id: InvocationId) -> Result<(), EngineError> {
        let record = self
            .records
            .get_mut(&invocation_id)
            .ok_or(EngineError::InvocationNotFound(invocation_id))?;
        if record.status.is_terminal() {
            return Ok(());
        }
        record.status = InvocationStatus::Failed;
        record.pending_confirmation = None;
        self.metrics.invocation_cancelled();
        self.log
            .append(Event::text(invocation_id, "invocation cancelled"))?;
        Ok(())
    }

    /// Drive the pipeline from the record's cursor until completion, the
    /// next pending gate, or an error. `events` carries anything already
    /// produced by the calling operation (e.g. the confirmation response).
    fn advance(
        &mut self,
        id: InvocationId,
        mut events: Vec<Event>,
    ) -> Result<RunOutcome, EngineError> {
        loop {
            let (cursor, session_id, input, ticket) = {
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(EngineError::InvocationNotFound(id))?;
                (
                    record.cursor,
                    record.session_id.clone(),
                    record.input.clone(),
                    record.pending_confirmation.take(),
                )
            };

            let session = self
                .sessions
                .get(&session_id)?
                .ok_or_else(|| StoreError::new(format!("unknown session: {session_id}")))?;

            let Some(step) = self.pipeline.step_mut(cursor) else {
                self.fail(id, &events)?;
                return Err(EngineError::Step {
                    invocation_id: id,
                    step: "pipeline",
                    source: StepError::other(format!("cursor {cursor} out of range")),
                });
            };
            let step_name = step.name();
            let output_key = step.output_key();

            let mut bound = HashMap::new();
            for key in step.input_keys() {
                if let Some(value) = session.keyed_outputs.get(*key) {
                    bound.insert((*key).to_string(), value.clone());
                }
            }

            let mut ctx = StepCtx::new(id, input, bound, ticket);
            let result = step.execute(&mut ctx);
            events.extend(ctx.take_events());
            let ticket = ctx.take_ticket();

            // an unresolved ticket must end in suspension; anything else is
            // a step bug that would strand the decision provider
            if matches!(
                result,
                Ok(StepAction::Advance(_)) | Ok(StepAction::Complete(_))
            ) {
                if let Some(t) = ticket.as_ref().filter(|t| !t.is_resolved()) {
                    let gate_id = t.gate_id.clone();
                    self.fail(id, &events)?;
                    return Err(EngineError::Gate {
                        invocation_id: id,
                        source: GateError::AbandonedTicket { gate_id },
                    });
                }
            }

            match result {
                Err(err) => {
                    self.fail(id, &events)?;
                    return Err(match err {
                        StepError::Gate(source) => EngineError::Gate {
                            invocation_id: id,
                            source,
                        },
                        source => EngineError::Step {
                            invocation_id: id,
                            step: step_name,
                            source,
                        },
                    });
                }
                Ok(StepAction::Suspend) => {
                    let Some(ticket) = ticket.filter(|t| !t.is_resolved()) else {
                        self.fail(id, &events)?;
                        return Err(EngineError::Gate {
                            invocation_id: id,
                            source: GateError::MissingTicket,
                        });
                    };
                    let confirmation = PendingConfirmation {
                        invocation_id: id,
                        gate_id: ticket.gate_id.clone(),
                        hint: ticket.hint.clone(),
                        payload: ticket.payload.clone(),
                    };
                    let record = self
                        .records
                        .get_mut(&id)
                        .ok_or(EngineError::InvocationNotFound(id))?;
                    record.status = InvocationStatus::Suspended;
                    record.pending_confirmation = Some(ticket);
                    self.metrics.invocation_suspended();
                    self.log.append_all(&events)?;
                    return Ok(RunOutcome::Suspended {
                        invocation_id: id,
                        confirmation,
                        events,
                    });
                }
                Ok(StepAction::Advance(output)) => {
                    // a resolved ticket is consumed here
                    self.sessions
                        .publish_output(&session_id, output_key, output.clone())?;
                    events.push(Event::step_result(id, step_name, &output));
                    let record = self
                        .records
                        .get_mut(&id)
                        .ok_or(EngineError::InvocationNotFound(id))?;
                    record.cursor += 1;
                    if record.cursor == self.pipeline.len() {
                        return self.finish(id, &session_id, events, output);
                    }
                }
                Ok(StepAction::Complete(output)) => {
                    self.sessions
                        .publish_output(&session_id, output_key, output.clone())?;
                    events.push(Event::step_result(id, step_name, &output));
                    let record = self
                        .records
                        .get_mut(&id)
                        .ok_or(EngineError::InvocationNotFound(id))?;
                    // forward jump past the remaining steps
                    record.cursor = self.pipeline.len();
                    return self.finish(id, &session_id, events, output);
                }
            }
        }
    }

    fn finish(
        &mut self,
        id: InvocationId,
        session_id: &str,
        events: Vec<Event>,
        output: Value,
    ) -> Result<RunOutcome, EngineError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(EngineError::InvocationNotFound(id))?;
        record.status = InvocationStatus::Completed;
        self.sessions
            .push_turn(session_id, Turn::agent(output.clone()))?;
        self.metrics.invocation_completed();
        self.log.append_all(&events)?;
        Ok(RunOutcome::Completed {
            invocation_id: id,
            output,
            events,
        })
    }

    fn fail(&mut self, id: InvocationId, events: &[Event]) -> Result<(), EngineError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(EngineError::InvocationNotFound(id))?;
        record.status = InvocationStatus::Failed;
        record.pending_confirmation = None;
        self.metrics.invocation_failed();
        self.log.append_all(events)?;
        Ok(())
    }
}
