use crate::ctx::StepCtx;
use crate::gate::GateError;
use serde_json::Value;
use std::fmt;

/// The result of running a step: what the orchestrator should do next.
pub type StepResult = Result<StepAction, StepError>;

/// One stage of a sequential pipeline.
///
/// Implement this trait on your own structs and register them into a
/// [`crate::Pipeline`]. A step reads the run input and the declared outputs
/// of earlier steps through [`StepCtx`], may consult an approval gate, and
/// publishes exactly one named output when it advances.
pub trait Step: Send + 'static {
    /// A unique name for this step, used in events and error reports.
    fn name(&self) -> &'static str;

    /// Key under which this step's output is published for later steps.
    fn output_key(&self) -> &'static str {
        self.name()
    }

    /// Output keys of earlier steps this step reads. Checked at build time,
    /// so a step can never depend on a key nothing before it publishes.
    fn input_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run one step. Re-entered from the top on resume, so any side effect
    /// must sit behind a gate consulted via [`StepCtx::confirm`].
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult;
}

/// Control flow for the orchestrator.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Publish this output under `output_key` and move to the next step.
    Advance(Value),
    /// A gate returned `Pending`; park the invocation until a decision arrives.
    Suspend,
    /// Publish this output and finish the invocation, skipping later steps.
    Complete(Value),
}

/// Error type for steps, with variants designed around what the caller can
/// do about them.
#[derive(Debug)]
pub enum StepError {
    /// Bad input or step logic error. Don't retry, fix the code.
    Invalid(String),
    /// Transient failure (network, rate limit). Retrying might help.
    Transient(String),
    /// The step decided to fail explicitly.
    Failed(String),
    /// Everything else. Inspect the message for details.
    Other(String),
    /// A gate consistency violation surfaced inside the step.
    Gate(GateError),
}

impl From<GateError> for StepError {
    fn from(e: GateError) -> Self {
        StepError::Gate(e)
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Invalid(e.to_string())
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::Other(e.to_string())
    }
}

impl StepError {
    /// Create an [`Invalid`](StepError::Invalid) error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        StepError::Invalid(msg.into())
    }

    /// Create a [`Transient`](StepError::Transient) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        StepError::Transient(msg.into())
    }

    /// Create a [`Failed`](StepError::Failed) error.
    pub fn failed(msg: impl Into<String>) -> Self {
        StepError::Failed(msg.into())
    }

    /// Create an [`Other`](StepError::Other) error.
    pub fn other(msg: impl Into<String>) -> Self {
        StepError::Other(msg.into())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
            Self::Gate(e) => write!(f, "gate: {e}"),
        }
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gate(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- StepError constructors ---

    #[test]
    fn invalid_constructor() {
        let err = StepError::invalid("bad input");
        assert!(matches!(err, StepError::Invalid(msg) if msg == "bad input"));
    }

    #[test]
    fn transient_constructor() {
        let err = StepError::transient("timeout");
        assert!(matches!(err, StepError::Transient(msg) if msg == "timeout"));
    }

    #[test]
    fn failed_constructor() {
        let err = StepError::failed("nope");
        assert!(matches!(err, StepError::Failed(msg) if msg == "nope"));
    }

    // --- StepError Display ---

    #[test]
    fn display_invalid() {
        let err = StepError::Invalid("bad input".into());
        assert_eq!(err.to_string(), "invalid: bad input");
    }

    #[test]
    fn display_other() {
        let err = StepError::Other("something".into());
        assert_eq!(err.to_string(), "something");
    }

    #[test]
    fn display_gate() {
        let err = StepError::Gate(GateError::MissingTicket);
        assert_eq!(err.to_string(), "gate: no outstanding confirmation ticket");
    }

    // --- From conversions ---

    #[test]
    fn from_gate_error() {
        let err: StepError = GateError::MissingTicket.into();
        assert!(matches!(err, StepError::Gate(GateError::MissingTicket)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let step_err: StepError = io_err.into();
        assert!(matches!(step_err, StepError::Other(msg) if msg.contains("file missing")));
    }

    // --- Step trait defaults ---

    struct Bare;
    impl Step for Bare {
        fn name(&self) -> &'static str {
            "bare"
        }
        fn execute(&mut self, _ctx: &mut StepCtx) -> StepResult {
            Ok(StepAction::Advance(serde_json::Value::Null))
        }
    }

    #[test]
    fn output_key_defaults_to_name() {
        let step = Bare;
        assert_eq!(step.output_key(), "bare");
        assert!(step.input_keys().is_empty());
    }
}
