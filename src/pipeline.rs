use crate::step::Step;
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum PipelineError {
    Empty,
    DuplicateStep(&'static str),
    DuplicateOutputKey(&'static str),
    /// A step declared an input key no earlier step publishes.
    UnboundInput {
        step: &'static str,
        key: &'static str,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "pipeline has no steps"),
            Self::DuplicateStep(name) => write!(f, "duplicate step name: {name}"),
            Self::DuplicateOutputKey(key) => write!(f, "duplicate output key: {key}"),
            Self::UnboundInput { step, key } => {
                write!(f, "step '{step}' reads '{key}' but no earlier step publishes it")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// PipelineBuilder
// ---------------------------------------------------------------------------

pub struct PipelineBuilder {
    name: &'static str,
    steps: Vec<Box<dyn Step>>,
}

impl PipelineBuilder {
    /// Append a step. Steps run in registration order.
    pub fn step<T: Step>(mut self, step: T) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Validate the step chain: unique names, unique output keys, and every
    /// declared input key published by an earlier step.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut names = HashSet::new();
        let mut published = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name()) {
                return Err(PipelineError::DuplicateStep(step.name()));
            }
            for &key in step.input_keys() {
                if !published.contains(&key) {
                    return Err(PipelineError::UnboundInput {
                        step: step.name(),
                        key,
                    });
                }
            }
            if !published.insert(step.output_key()) {
                return Err(PipelineError::DuplicateOutputKey(step.output_key()));
            }
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline (validated, only constructed via build())
// ---------------------------------------------------------------------------

pub struct Pipeline {
    name: &'static str,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn builder(name: &'static str) -> PipelineBuilder {
        PipelineBuilder {
            name,
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    // --- stuff the orchestrator uses (keep pub(crate)) ---

    pub(crate) fn step_mut(&mut self, index: usize) -> Option<&mut (dyn Step + 'static)> {
        self.steps.get_mut(index).map(|s| s.as_mut())
    }

    #[cfg(test)]
    pub(crate) fn last_output_key(&self) -> Option<&'static str> {
        self.steps.last().map(|s| s.output_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::StepCtx;
    use crate::step::{StepAction, StepResult};

    struct FakeStep {
        name: &'static str,
        inputs: &'static [&'static str],
    }

    impl FakeStep {
        fn new(name: &'static str) -> Self {
            Self { name, inputs: &[] }
        }

        fn reading(name: &'static str, inputs: &'static [&'static str]) -> Self {
            Self { name, inputs }
        }
    }

    impl Step for FakeStep {
        fn name(&self) -> &'static str {
            self.name
        }
        fn input_keys(&self) -> &'static [&'static str] {
            self.inputs
        }
        fn execute(&mut self, _ctx: &mut StepCtx) -> StepResult {
            Ok(StepAction::Advance(serde_json::Value::Null))
        }
    }

    #[test]
    fn build_valid_pipeline() {
        let pipeline = Pipeline::builder("blog")
            .step(FakeStep::new("outline"))
            .step(FakeStep::reading("writer", &["outline"]))
            .step(FakeStep::reading("editor", &["writer"]))
            .build();

        let pipeline = pipeline.unwrap();
        assert_eq!(pipeline.name(), "blog");
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.last_output_key(), Some("editor"));
    }

    #[test]
    fn empty_pipeline_rejected() {
        let err = Pipeline::builder("empty").build().err().unwrap();
        assert_eq!(err, PipelineError::Empty);
    }

    #[test]
    fn duplicate_step_rejected() {
        let err = Pipeline::builder("test")
            .step(FakeStep::new("a"))
            .step(FakeStep::new("a"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::DuplicateStep("a"));
    }

    #[test]
    fn unbound_input_rejected() {
        let err = Pipeline::builder("test")
            .step(FakeStep::new("a"))
            .step(FakeStep::reading("b", &["missing"]))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::UnboundInput {
                step: "b",
                key: "missing"
            }
        );
    }

    #[test]
    fn input_from_later_step_rejected() {
        // "a" cannot read "b"'s output — order matters
        let err = Pipeline::builder("test")
            .step(FakeStep::reading("a", &["b"]))
            .step(FakeStep::new("b"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::UnboundInput { step: "a", key: "b" });
    }

    // --- duplicate output keys ---

    struct KeyedStep;
    impl Step for KeyedStep {
        fn name(&self) -> &'static str {
            "keyed"
        }
        fn output_key(&self) -> &'static str {
            "shared"
        }
        fn execute(&mut self, _ctx: &mut StepCtx) -> StepResult {
            Ok(StepAction::Advance(serde_json::Value::Null))
        }
    }

    struct OtherKeyedStep;
    impl Step for OtherKeyedStep {
        fn name(&self) -> &'static str {
            "other_keyed"
        }
        fn output_key(&self) -> &'static str {
            "shared"
        }
        fn execute(&mut self, _ctx: &mut StepCtx) -> StepResult {
            Ok(StepAction::Advance(serde_json::Value::Null))
        }
    }

    #[test]
    fn duplicate_output_key_rejected() {
        let err = Pipeline::builder("test")
            .step(KeyedStep)
            .step(OtherKeyedStep)
            .build()
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::DuplicateOutputKey("shared"));
    }
}
