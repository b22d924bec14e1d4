use gate_line::{
    ConfirmationGate, Event, EventKind, GateOutcome, Orchestrator, Pipeline, RunOutcome, Step,
    StepAction, StepCtx, StepResult,
};
use serde_json::json;

const LARGE_ORDER_THRESHOLD: u64 = 1;

/// Places an image generation order. Orders above the threshold suspend the
/// run until a human approves.
struct PlaceImageOrder {
    gate: ConfirmationGate,
}

impl PlaceImageOrder {
    fn new() -> Self {
        Self {
            gate: ConfirmationGate::new("large_order", |p| {
                p["num_images"].as_u64().unwrap_or(0) > LARGE_ORDER_THRESHOLD
            }),
        }
    }
}

impl Step for PlaceImageOrder {
    fn name(&self) -> &'static str {
        "place_order"
    }
    fn output_key(&self) -> &'static str {
        "order"
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let num_images = ctx.input()["num_images"].as_u64().unwrap_or(0);
        let outcome = ctx.confirm(
            &self.gate,
            format!("Large order: {num_images} images. Do you want to approve?"),
            json!({ "num_images": num_images }),
        )?;
        match outcome {
            GateOutcome::Pending => {
                ctx.say(format!("Order for {num_images} images requires approval"));
                Ok(StepAction::Suspend)
            }
            GateOutcome::Rejected => Ok(StepAction::Advance(json!({
                "status": "rejected",
                "message": format!("Order rejected: {num_images} images"),
            }))),
            GateOutcome::AutoApproved => Ok(StepAction::Advance(json!({
                "status": "approved",
                "order_id": format!("ORD-{num_images}-AUTO"),
                "num_images": num_images,
                "message": format!("Order auto-approved: {num_images} images"),
            }))),
            GateOutcome::Approved => Ok(StepAction::Advance(json!({
                "status": "approved",
                "order_id": format!("ORD-{num_images}-HUMAN"),
                "num_images": num_images,
                "message": format!("Order approved: {num_images} images"),
            }))),
        }
    }
}

/// Generates the approved images, or summarises the rejection.
struct GenerateImages;

impl Step for GenerateImages {
    fn name(&self) -> &'static str {
        "generate"
    }
    fn input_keys(&self) -> &'static [&'static str] {
        &["order"]
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let order = ctx.require("order")?.clone();
        if order["status"] != "approved" {
            return Ok(StepAction::Complete(order["message"].clone()));
        }
        let n = order["num_images"].as_u64().unwrap_or(0);
        for i in 1..=n {
            ctx.say(format!("generated image {i}/{n}"));
        }
        let order_id = order["order_id"].as_str().unwrap_or("?");
        Ok(StepAction::Advance(json!(format!(
            "{n} images generated under {order_id}"
        ))))
    }
}

fn print_text_events(events: &[Event]) {
    for event in events {
        if event.kind == EventKind::Text {
            println!("Agent > {}", event.payload["text"].as_str().unwrap_or(""));
        }
    }
}

fn run_workflow(orch: &mut Orchestrator, session_id: &str, num_images: u64, approve: bool) {
    println!("{}", "=".repeat(60));
    println!("User > Generate {num_images} images of a cat");

    let outcome = match orch.start(session_id, json!({ "num_images": num_images })) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("Error: {e}");
            return;
        }
    };
    print_text_events(outcome.events());

    match outcome {
        RunOutcome::Suspended {
            invocation_id,
            confirmation,
            ..
        } => {
            println!("Pausing for approval: {}", confirmation.hint);
            println!(
                "Human decision: {}",
                if approve { "APPROVE" } else { "REJECT" }
            );
            // same invocation id correlates the resume to the pause point
            match orch.resume(invocation_id, approve) {
                Ok(resumed) => {
                    print_text_events(resumed.events());
                    if let RunOutcome::Completed { output, .. } = resumed {
                        println!("Agent > {}", output.as_str().unwrap_or("done"));
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }
        RunOutcome::Completed { output, .. } => {
            println!("Agent > {}", output.as_str().unwrap_or("done"));
        }
    }
    println!();
}

fn main() {
    let pipeline = Pipeline::builder("image_orders")
        .step(PlaceImageOrder::new())
        .step(GenerateImages)
        .build()
        .expect("valid pipeline");
    let mut orch = Orchestrator::new(pipeline);

    // small order auto-approves, no suspension
    run_workflow(&mut orch, "order_1", 1, true);
    // large order, human approves
    run_workflow(&mut orch, "order_2", 10, true);
    // large order, human rejects
    run_workflow(&mut orch, "order_3", 8, false);

    let snap = orch.metrics();
    println!(
        "runs: {} started, {} suspended, {} approved, {} rejected",
        snap.started, snap.suspended, snap.gates_approved, snap.gates_rejected
    );
}
