use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use pipeweave::connectors::{Input, Output};
use pipeweave::node::{Node, NodeError};
use pipeweave::pipeline::{Pipeline, PipelineError};

mod common;

use common::{
    CollectTask, DoubleTask, EmitTask, FailingTask, PacketCollectTask, PacketEmitTask, SleepyTask,
};

fn emit_collect(values: Vec<i64>) -> (Pipeline, Arc<Mutex<Vec<i64>>>) {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values,
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
    (pipeline, seen)
}

#[test]
fn test_validate_rejects_node_with_zero_connectors() {
    let (wired, _) = emit_collect(vec![]);
    let orphan = Node::inline("loner").build(common_noop()).unwrap();

    let pipeline = Pipeline::builder()
        .node(wired.nodes()[0].clone())
        .node(wired.nodes()[1].clone())
        .node(orphan)
        .build()
        .unwrap();

    let err = pipeline.validate().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Node(NodeError::OrphanedNode { node, .. }) if node == "loner"
    ));
}

#[test]
fn test_validate_names_the_unconnected_input() {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: vec![],
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let wired_in: Input<i64> = Input::new("wired_in");
    let dangling_in: Input<i64> = Input::new("dangling_in");
    emit.out.connect(&wired_in).unwrap();

    let collect = CollectTask {
        numbers: wired_in.clone(),
        seen,
    };
    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let target = Node::target("collect")
        .input(&wired_in)
        .input(&dangling_in)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    let err = pipeline.validate().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Node(NodeError::MissingConnection { node, connector })
            if node == "collect" && connector == "dangling_in"
    ));
}

#[test]
fn test_validate_rejects_node_wired_outside_the_pipeline() {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: vec![],
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen,
    };
    emit.out.connect(&collect.numbers).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let _target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    // The target exists but was never registered here.
    let pipeline = Pipeline::builder().node(source).build().unwrap();
    let err = pipeline.validate().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::OrphanedNode { node } if node == "emit"
    ));
}

#[test]
fn test_duplicate_node_names_rejected() {
    let (first, _) = emit_collect(vec![]);
    let emit = EmitTask {
        out: Output::new("other_out"),
        values: vec![],
    };
    let out = emit.out.clone();
    let inp: Input<i64> = Input::new("other_in");
    out.connect(&inp).unwrap();
    let clash = Node::source("emit").output(&out).build(emit).unwrap();

    let err = Pipeline::builder()
        .node(first.nodes()[0].clone())
        .node(first.nodes()[1].clone())
        .node(clash)
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DuplicateNode { node } if node == "emit"
    ));
}

#[tokio::test]
async fn test_source_to_target_delivers_everything_in_order() {
    let (pipeline, seen) = emit_collect(vec![1, 2, 3]);

    assert_eq!(pipeline.worker_count(), 2);
    pipeline.run().await.unwrap();

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(pipeline.workers_alive(), 0);
    for node in pipeline.nodes() {
        assert!(node.node_finished());
    }
}

#[tokio::test]
async fn test_inline_doubling_pipeline() {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: vec![1, 2, 3],
    };
    let double = DoubleTask {
        numbers: Input::new("double_in"),
        doubled: Output::new("double_out"),
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen: Arc::clone(&seen),
    };

    emit.out.connect(&double.numbers).unwrap();
    double.doubled.connect(&collect.numbers).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let inline = Node::inline("double")
        .input(&double.numbers)
        .output(&double.doubled)
        .build(double)
        .unwrap();
    let target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(inline)
        .node(target)
        .build()
        .unwrap();
    pipeline.run().await.unwrap();

    assert_eq!(*seen.lock(), vec![2, 4, 6]);
}

#[tokio::test]
async fn test_inline_replicas_process_everything() {
    let values: Vec<i64> = (0..40).collect();
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: values.clone(),
    };
    let double = DoubleTask {
        numbers: Input::new("double_in"),
        doubled: Output::new("double_out"),
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen: Arc::clone(&seen),
    };

    emit.out.connect(&double.numbers).unwrap();
    double.doubled.connect(&collect.numbers).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let inline = Node::inline("double")
        .replicas(3)
        .input(&double.numbers)
        .output(&double.doubled)
        .build(double)
        .unwrap();
    let target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(inline)
        .node(target)
        .build()
        .unwrap();
    assert_eq!(pipeline.worker_count(), 5);
    pipeline.run().await.unwrap();

    // Three competing replicas give no cross-replica ordering guarantee.
    let mut got = seen.lock().clone();
    got.sort_unstable();
    let expected: Vec<i64> = values.iter().map(|v| v * 2).collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn test_zero_replica_source_drains_immediately() {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: vec![1, 2, 3],
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen: Arc::clone(&seen),
    };
    emit.out.connect(&collect.numbers).unwrap();

    let source = Node::source("emit")
        .replicas(0)
        .output(&emit.out)
        .build(emit)
        .unwrap();
    let target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    // No source worker ever runs, so the target sees a finished upstream and
    // an empty queue and exits without capturing anything.
    tokio::time::timeout(Duration::from_secs(5), pipeline.run())
        .await
        .expect("pipeline should drain without a source worker")
        .unwrap();
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_kill_right_after_start_skips_teardown() {
    let teardown_ran = Arc::new(AtomicBool::new(false));
    let sleepy = SleepyTask {
        out: Output::new("sleepy_out"),
        teardown_ran: Arc::clone(&teardown_ran),
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = CollectTask {
        numbers: Input::new("collect_in"),
        seen,
    };
    sleepy.out.connect(&collect.numbers).unwrap();

    let source = Node::source("sleepy")
        .output(&sleepy.out)
        .build(sleepy)
        .unwrap();
    let target = Node::target("collect")
        .input(&collect.numbers)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    pipeline.run_async().unwrap();
    pipeline.kill();

    tokio::time::timeout(Duration::from_secs(5), pipeline.wait_for_exit())
        .await
        .expect("killed workers should exit promptly")
        .unwrap();

    assert_eq!(pipeline.workers_alive(), 0);
    assert!(!teardown_ran.load(Ordering::SeqCst));

    // Killing an already-dead pipeline is a no-op.
    pipeline.kill();
}

#[tokio::test]
async fn test_pipeline_cannot_start_twice() {
    let (pipeline, _seen) = emit_collect(vec![1]);
    pipeline.run_async().unwrap();
    let err = pipeline.run_async().unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyStarted));
    pipeline.wait_for_exit().await.unwrap();
}

#[tokio::test]
async fn test_worker_failure_is_reported_with_identity() {
    let emit = EmitTask {
        out: Output::new("emit_out"),
        values: vec![1, 2, 3],
    };
    let failing = FailingTask {
        numbers: Input::new("fail_in"),
    };
    emit.out.connect(&failing.numbers).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let target = Node::target("fail")
        .input(&failing.numbers)
        .build(failing)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    let err = pipeline.run().await.unwrap_err();
    match err {
        PipelineError::Workers { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].node, "fail");
            assert_eq!(failures[0].replica, 0);
            assert!(failures[0].message.contains("intentional failure"));
        }
        other => panic!("expected worker failures, got {other}"),
    }

    // The failing replica never tore down, so its node never finishes.
    let target_node = &pipeline.nodes()[1];
    assert!(!target_node.node_finished());
}

#[tokio::test]
async fn test_packet_kill_cooperative_shutdown() {
    let emit = PacketEmitTask {
        out: Output::new("packets_out"),
        values: vec![10, 20],
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collect = PacketCollectTask {
        packets: Input::new("packets_in"),
        seen: Arc::clone(&seen),
    };
    emit.out.connect(&collect.packets).unwrap();

    let source = Node::source("emit").output(&emit.out).build(emit).unwrap();
    let target = Node::target("collect")
        .input(&collect.packets)
        .build(collect)
        .unwrap();

    let pipeline = Pipeline::builder()
        .node(source)
        .node(target)
        .build()
        .unwrap();
    pipeline.run().await.unwrap();

    assert_eq!(*seen.lock(), vec![10, 20]);
}

fn common_noop() -> impl pipeweave::node::Task {
    struct Noop;

    #[async_trait::async_trait]
    impl pipeweave::node::Task for Noop {
        async fn action(&self) -> Result<(), pipeweave::node::TaskError> {
            Ok(())
        }
    }

    Noop
}
