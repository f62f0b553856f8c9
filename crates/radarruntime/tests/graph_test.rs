use radarcore::events::{read_jsonl, write_jsonl};
use radarcore::{FlowError, RunEvent, RunId, RunKind, RunRecord, RunState, Value};
use radarruntime::graph::records_from_events;
use radarruntime::{Arg, EdgeKind, ExecutionGraph, FlowContext, FlowRuntime};
use std::time::Duration;

async fn letter(args: Vec<Value>) -> Result<Value, FlowError> {
    let i = args.first().and_then(Value::as_i64).unwrap_or(0);
    Ok(Value::from((b'a' + i as u8) as char))
}

async fn count(args: Vec<Value>) -> Result<Value, FlowError> {
    let len = args.first().and_then(Value::as_array).map_or(0, |a| a.len());
    Ok(Value::from(len))
}

async fn letters(ctx: FlowContext, _args: Vec<Value>) -> Result<Value, FlowError> {
    let mut out = Vec::new();
    for i in 0..4usize {
        let iteration = ctx.scope();
        let future = iteration.submit_task("letter", vec![Arg::from(i)], letter).await?;
        out.push(future.resolve(&iteration).await?);
    }
    Ok(Value::Array(out))
}

async fn nested(ctx: FlowContext, _args: Vec<Value>) -> Result<Value, FlowError> {
    let first = ctx.submit_flow("letters", vec![], letters).await?;
    let total = ctx.submit_task("count", vec![Arg::from(&first)], count).await?;
    total.resolve(&ctx).await?;
    let again = ctx.submit_flow("letters", vec![], letters).await?;
    again.resolve(&ctx).await
}

async fn finished_runtime() -> (FlowRuntime, RunId) {
    let runtime = FlowRuntime::new();
    let top = runtime.run_flow("nested", vec![], nested).await.unwrap();
    for _ in 0..200 {
        if runtime.registry().all().all(|r| r.is_finalized()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    (runtime, top.run_id())
}

#[tokio::test]
async fn test_event_stream_rebuilds_same_layout() {
    let (runtime, top) = finished_runtime().await;
    let live = runtime.graph_for(top).unwrap();

    let mut buf = Vec::new();
    let written = write_jsonl(&mut buf, &runtime.events()).unwrap();
    assert_eq!(written, runtime.registry().len() * 2);

    let replayed: Vec<RunEvent> = read_jsonl(buf.as_slice()).unwrap();
    let rebuilt = ExecutionGraph::from_events(&replayed).unwrap();

    assert!(live.is_isomorphic_to(&rebuilt));
    assert_eq!(live.entries(), rebuilt.entries());
    assert_eq!(
        live.edges(EdgeKind::Dependency),
        rebuilt.edges(EdgeKind::Dependency)
    );

    let records: Vec<RunRecord> = runtime.registry().all().collect();
    assert_eq!(records_from_events(&replayed), records);
}

#[tokio::test]
async fn test_rings_grow_outward_along_every_edge() {
    let (runtime, top) = finished_runtime().await;
    let graph = runtime.graph_for(top).unwrap();

    assert_eq!(graph.run_count(), runtime.registry().len());
    assert_eq!(graph.ring_of(top), Some(0));
    assert_eq!(graph.rings()[0].len(), 1);

    for entry in graph.entries() {
        if let Some(parent) = entry.parent_run_id {
            assert!(entry.ring_index > graph.ring_of(parent).unwrap());
        }
        for dep in &entry.dependency_ids {
            assert!(entry.ring_index > graph.ring_of(*dep).unwrap());
        }
    }

    // The second subflow waits on count, which waits on the first subflow.
    let flows: Vec<_> = graph
        .entries()
        .iter()
        .filter(|e| e.name == "letters")
        .collect();
    assert_eq!(flows.len(), 2);
    assert!(flows[1].ring_index > flows[0].ring_index + 1);

    let keys: Vec<(usize, RunId)> = graph
        .entries()
        .iter()
        .map(|e| (e.ring_index, e.run_id))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_nesting_edges_follow_parents() {
    let records = vec![
        RunRecord::new(RunId(0), RunKind::Flow, "outer", None, vec![]),
        RunRecord::new(RunId(1), RunKind::Task, "a", Some(RunId(0)), vec![]),
        RunRecord::new(RunId(2), RunKind::Task, "b", Some(RunId(0)), vec![RunId(1)]),
    ];
    let graph = ExecutionGraph::build(records).unwrap();

    assert_eq!(
        graph.edges(EdgeKind::Nesting),
        vec![(RunId(0), RunId(1)), (RunId(0), RunId(2))]
    );
    assert_eq!(graph.edges(EdgeKind::Dependency), vec![(RunId(1), RunId(2))]);
    assert_eq!(graph.ring_of(RunId(1)), Some(1));
    assert_eq!(graph.ring_of(RunId(2)), Some(2));
}

#[test]
fn test_cyclic_records_are_rejected() {
    let records = vec![
        RunRecord::new(RunId(0), RunKind::Task, "a", None, vec![RunId(1)]),
        RunRecord::new(RunId(1), RunKind::Task, "b", None, vec![RunId(0)]),
    ];
    let err = ExecutionGraph::build(records).unwrap_err();
    assert!(matches!(err, FlowError::CyclicDependencyRejected { .. }));
}

#[test]
fn test_outside_references_are_kept_but_not_drawn() {
    let records = vec![RunRecord::new(
        RunId(5),
        RunKind::Task,
        "late",
        Some(RunId(2)),
        vec![RunId(3)],
    )];
    let graph = ExecutionGraph::build(records).unwrap();

    assert_eq!(graph.ring_of(RunId(5)), Some(0));
    assert!(graph.edges(EdgeKind::Nesting).is_empty());
    let entry = graph.entry(RunId(5)).unwrap();
    assert_eq!(entry.parent_run_id, Some(RunId(2)));
    assert_eq!(entry.dependency_ids, vec![RunId(3)]);
    assert!(!graph.contains(RunId(2)));
}

#[test]
fn test_unknown_root_is_reported() {
    let runtime = FlowRuntime::new();
    let err = runtime.graph_for(RunId(9)).unwrap_err();
    assert_eq!(err, FlowError::UnknownRun(RunId(9)));
}

#[test]
fn test_missing_finalize_leaves_run_running() {
    let created = RunRecord::new(RunId(0), RunKind::Task, "cut_off", None, vec![]);
    let mut done = RunRecord::new(RunId(1), RunKind::Task, "done", None, vec![RunId(0)]);
    done.state = RunState::Failed;
    done.error = Some("boom".to_string());

    let events = vec![
        RunEvent::created(&created),
        RunEvent::created(&done),
        RunEvent::finalized(&done),
    ];
    let records = records_from_events(&events);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].state, RunState::Running);
    assert!(records[0].ended_at.is_none());
    assert_eq!(records[1].state, RunState::Failed);
    assert_eq!(records[1].error.as_deref(), Some("boom"));
    assert_eq!(records[1].dependencies, vec![RunId(0)]);
}
