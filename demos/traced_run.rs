use gate_line::{
    ConfirmationGate, GateOutcome, Orchestrator, Pipeline, RunOutcome, Step, StepAction, StepCtx,
    StepResult,
};
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_stdout::SpanExporter;
use serde_json::json;

// One approval cycle wrapped in OpenTelemetry spans, with the engine's own
// counters printed at the end. Spans go to stdout.

struct Restock {
    gate: ConfirmationGate,
}

impl Step for Restock {
    fn name(&self) -> &'static str {
        "restock"
    }
    fn execute(&mut self, ctx: &mut StepCtx) -> StepResult {
        let units = ctx.input()["units"].as_u64().unwrap_or(0);
        match ctx.confirm(
            &self.gate,
            format!("Restock {units} units?"),
            json!({ "units": units }),
        )? {
            GateOutcome::Pending => Ok(StepAction::Suspend),
            GateOutcome::Rejected => Ok(StepAction::Advance(json!("restock rejected"))),
            _ => Ok(StepAction::Advance(json!(format!("restocked {units} units")))),
        }
    }
}

fn main() {
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .build();
    global::set_tracer_provider(provider.clone());
    let tracer = global::tracer("gate-line-demo");

    let pipeline = Pipeline::builder("restock")
        .step(Restock {
            gate: ConfirmationGate::new("large_restock", |p| p["units"].as_u64().unwrap_or(0) > 5),
        })
        .build()
        .expect("valid pipeline");
    let mut orch = Orchestrator::new(pipeline);

    let outcome = tracer.in_span("start", |cx| {
        let outcome = orch
            .start("warehouse", json!({ "units": 10 }))
            .expect("start");
        cx.span()
            .set_attribute(KeyValue::new("suspended", outcome.is_suspended()));
        outcome
    });

    if let RunOutcome::Suspended {
        invocation_id,
        confirmation,
        ..
    } = outcome
    {
        println!("awaiting decision: {}", confirmation.hint);
        tracer.in_span("resume", |cx| {
            cx.span()
                .set_attribute(KeyValue::new("decision", "approve"));
            let resumed = orch.resume(invocation_id, true).expect("resume");
            if let RunOutcome::Completed { output, .. } = resumed {
                println!("result: {}", output.as_str().unwrap_or(""));
            }
        });
    }

    let snap = orch.metrics();
    println!(
        "metrics: started={} suspended={} resumed={} completed={}",
        snap.started, snap.suspended, snap.resumed, snap.completed
    );

    provider.shutdown().expect("flush spans");
}
