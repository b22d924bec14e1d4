use gate_line::{Orchestrator, Pipeline, RunOutcome, Step, StepAction, StepCtx, StepResult};
use serde_json::json;

// A three-stage writing pipeline. Each step publishes one named output and
// the next step declares which keys it reads — no gates, so a single
// `start` drives the whole thing to completion.

struct Outline;
impl Step for Outline {
    fn name(&self) -> &'static str {
        "outline"
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let topic = ctx.input().as_str().unwrap_or("something").to_string();
        ctx.say(format!("outlining a post about {topic}"));
        Ok(StepAction::Advance(json!(format!(
            "1. Why {topic} matters\n2. Getting started\n3. Common pitfalls"
        ))))
    }
}

struct Writer;
impl Step for Writer {
    fn name(&self) -> &'static str {
        "writer"
    }
    fn output_key(&self) -> &'static str {
        "draft"
    }
    fn input_keys(&self) -> &'static [&'static str] {
        &["outline"]
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let outline = ctx.require("outline")?.as_str().unwrap_or("").to_string();
        Ok(StepAction::Advance(json!(format!(
            "DRAFT following the outline:\n{outline}"
        ))))
    }
}

struct Editor;
impl Step for Editor {
    fn name(&self) -> &'static str {
        "editor"
    }
    fn output_key(&self) -> &'static str {
        "final_post"
    }
    fn input_keys(&self) -> &'static [&'static str] {
        &["draft"]
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let draft = ctx.require("draft")?.as_str().unwrap_or("").to_string();
        Ok(StepAction::Advance(json!(draft.replace("DRAFT", "POST"))))
    }
}

fn main() {
    let pipeline = Pipeline::builder("blog")
        .step(Outline)
        .step(Writer)
        .step(Editor)
        .build()
        .expect("valid pipeline");
    let mut orch = Orchestrator::new(pipeline);

    let outcome = orch
        .start("blog_session", json!("resumable workflows"))
        .expect("pipeline run");

    match outcome {
        RunOutcome::Completed { output, .. } => {
            println!("{}", output.as_str().unwrap_or(""));
        }
        RunOutcome::Suspended { .. } => unreachable!("no gates in this pipeline"),
    }

    // every intermediate output stays available in the session
    let session = orch
        .sessions()
        .get("blog_session")
        .expect("store available")
        .expect("session exists");
    println!("\npublished outputs:");
    for key in ["outline", "draft", "final_post"] {
        println!("  {key}: {} chars", session.output(key).map_or(0, |v| v.as_str().unwrap_or("").len()));
    }
}
