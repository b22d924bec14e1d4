//! A batteries-included Rust library for resumable, human-in-the-loop agent
//! pipelines.
//!
//! Define steps, wire them into a sequential [`Pipeline`], and let the
//! [`Orchestrator`] drive them. Steps publish named outputs that later steps
//! consume through declared input keys, and any side-effecting action can be
//! wrapped in a [`ConfirmationGate`]: small requests sail through, large
//! ones suspend the invocation until an external decision arrives via
//! [`Orchestrator::resume`] — which re-enters the suspended step without
//! re-running anything already committed.
//!
//! # Quick start
//!
//! ```rust
//! use gate_line::{Orchestrator, Pipeline, RunOutcome, Step, StepAction, StepCtx, StepResult};
//! use serde_json::json;
//!
//! struct Shout;
//! impl Step for Shout {
//!     fn name(&self) -> &'static str { "shout" }
//!     fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
//!         let text = ctx.input().as_str().unwrap_or("").to_uppercase();
//!         Ok(StepAction::Advance(json!(text)))
//!     }
//! }
//!
//! let pipeline = Pipeline::builder("demo").step(Shout).build().unwrap();
//! let mut orch = Orchestrator::new(pipeline);
//!
//! let outcome = orch.start("session-1", json!("hello")).unwrap();
//! match outcome {
//!     RunOutcome::Completed { output, .. } => assert_eq!(output, json!("HELLO")),
//!     RunOutcome::Suspended { .. } => unreachable!("no gates in this pipeline"),
//! }
//! ```
//!
//! For the suspend/resume cycle, see [`StepCtx::confirm`] and the
//! `approval_flow` demo.

mod ctx;
mod event;
mod gate;
mod invocation;
mod metrics;
mod orchestrator;
mod pipeline;
mod session;
mod step;

pub use ctx::StepCtx;
pub use event::{Event, EventKind, EventLog};
pub use gate::{ConfirmationGate, ConfirmationTicket, GateError, GateOutcome};
pub use invocation::{InvocationId, InvocationRecord, InvocationStatus};
pub use metrics::{Metrics, MetricsSnapshot};
pub use orchestrator::{EngineError, Orchestrator, PendingConfirmation, RunOutcome};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
pub use session::{Role, SessionState, SessionStore, StoreError, Turn};
pub use step::{Step, StepAction, StepError, StepResult};
