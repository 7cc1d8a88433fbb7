//! End-to-end smoke test: declare, wire, validate, run, observe drain.

use std::sync::Arc;

use parking_lot::Mutex;
use pipeweave::connectors::{Input, Output};
use pipeweave::node::Node;
use pipeweave::pipeline::Pipeline;

mod common;

use common::{CollectTask, EmitTask};

#[tokio::test]
async fn test_smoke_pipeline_drains_and_terminates() {
    let emit = EmitTask {
        out: Output::bounded("emit_out", 4),
        values: (1..=100).collect(),
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen: Arc::clone(&seen),
    };
    emit.out.connect(&collect.numbers).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    pipeline.validate().unwrap();
    pipeline.run().await.unwrap();

    // A bounded queue forces the producer to block and resume along the way;
    // everything still arrives exactly once and in order.
    let got = seen.lock().clone();
    assert_eq!(got, (1..=100).collect::<Vec<i64>>());
    assert_eq!(pipeline.workers_alive(), 0);
}
