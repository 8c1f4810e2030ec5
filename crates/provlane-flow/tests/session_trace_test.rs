//! Session traces, proof-of-work artifacts and replay

use anyhow::Result;
use provlane_flow::renderer::{render_proof_of_work_file, render_session_tree};
use provlane_flow::{ArtifactWriter, FileArtifactWriter, ProofOfWork, SessionTrace};
use provlane_types::{EventError, EventRecord, SessionStatus};
use serde_json::{json, Value};
use tempfile::TempDir;

const CAP: usize = 2000;

fn record(value: Value) -> EventRecord {
    EventRecord::parse(value).unwrap()
}

fn scripted_session() -> Vec<EventRecord> {
    vec![
        record(json!({"type": "task_start", "task": "Find the answer", "timestamp": 1000.0})),
        record(json!({
            "type": "planning", "agent": "manager", "sequence": 0,
            "start_time": 1000.1, "end_time": 1000.4, "plan": "1. delegate"
        })),
        record(json!({
            "type": "action", "agent": "manager", "sequence": 1,
            "start_time": 1000.5, "model_output": "ask researcher",
            "tool_calls": [{"name": "researcher", "arguments": {"task": "dig"}}]
        })),
        record(json!({
            "type": "action", "agent": "researcher", "sequence": 1,
            "start_time": 1001.0, "end_time": 1002.0,
            "tool_calls": [{"name": "web_search", "arguments": {"query": "answer"}, "result": "42"}],
            "observations": "42",
            "extra_field": {"kept": true}
        })),
        record(json!({
            "type": "action", "agent": "manager", "sequence": 1,
            "start_time": 1000.5, "end_time": 1003.0, "model_output": "ask researcher",
            "tool_calls": [{"name": "researcher", "arguments": {"task": "dig"}}],
            "observations": "researcher says 42"
        })),
        record(json!({"type": "error", "error": "rate limited once"})),
        record(json!({"type": "task_end", "task": "Find the answer", "timestamp": 1003.5})),
        record(json!({"type": "session_end", "timestamp": 1004.0})),
    ]
}

fn run_session(id: &str) -> SessionTrace {
    let mut events = scripted_session().into_iter();
    let (mut trace, _) = SessionTrace::open(id, events.next().unwrap(), CAP).unwrap();
    for event in events {
        trace.apply(event).unwrap();
    }
    trace
}

#[test]
fn test_session_lifecycle_metadata() {
    println!("🧪 Testing session lifecycle");
    let trace = run_session("s1");
    assert_eq!(trace.status(), SessionStatus::Closed);
    assert_eq!(trace.events().len(), 8);
    assert_eq!(trace.tasks().len(), 1);
    assert!(trace.tasks()[0].ended_at.is_some());
    assert_eq!(trace.errors(), ["rate limited once".to_string()]);
    assert_eq!(trace.started_at().timestamp(), 1000);
    assert_eq!(trace.ended_at().unwrap().timestamp(), 1004);
    println!("✅ Session lifecycle verified");
}

#[test]
fn test_session_must_open_with_task_start() {
    let result = SessionTrace::open(
        "s1",
        record(json!({"type": "action", "agent": "A", "sequence": 1})),
        CAP,
    );
    assert!(matches!(
        result,
        Err(EventError::UnknownSessionReference { .. })
    ));
}

#[test]
fn test_closed_session_rejects_events() {
    let mut trace = run_session("s1");
    let err = trace
        .apply(record(json!({"type": "action", "agent": "A", "sequence": 9})))
        .unwrap_err();
    assert!(matches!(err, EventError::UnknownSessionReference { .. }));
    assert_eq!(trace.events().len(), 8);
}

#[test]
fn test_abort_only_affects_open_sessions() {
    let mut closed = run_session("s1");
    closed.abort();
    assert_eq!(closed.status(), SessionStatus::Closed);

    let (mut open, _) = SessionTrace::open(
        "s2",
        record(json!({"type": "task_start", "task": "t"})),
        CAP,
    )
    .unwrap();
    open.abort();
    assert_eq!(open.status(), SessionStatus::Aborted);
    assert!(open.ended_at().is_some());
}

#[test]
fn test_replay_rebuilds_identical_views() {
    let live = run_session("s1");
    let replayed = SessionTrace::replay("s1", live.events().to_vec(), CAP).unwrap();

    assert_eq!(replayed.graph().snapshot(), live.graph().snapshot());
    assert_eq!(replayed.timeline().snapshot(), live.timeline().snapshot());
    assert_eq!(replayed.status(), live.status());
}

#[test]
fn test_untimed_lifecycle_events_replay_deterministically() -> Result<()> {
    let (mut live, _) =
        SessionTrace::open("s1", record(json!({"type": "task_start", "task": "t"})), CAP)?;
    live.apply(record(json!({"type": "task_end", "task": "t"})))?;
    live.apply(record(json!({"type": "session_end"})))?;

    for event in [0, 1, 2] {
        assert!(live.events()[event].raw["timestamp"].is_number());
    }

    std::thread::sleep(std::time::Duration::from_millis(5));
    let artifact = live.proof_of_work();
    let replayed = artifact.replay(CAP)?;
    assert_eq!(replayed.tasks(), live.tasks());
    assert_eq!(replayed.started_at(), live.started_at());
    assert_eq!(replayed.ended_at(), live.ended_at());
    assert_eq!(replayed.proof_of_work(), artifact);
    Ok(())
}

#[test]
fn test_proof_of_work_round_trip_reproduces_views() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let live = run_session("run/01");
    let artifact = live.proof_of_work();

    let path = artifact.save(temp_dir.path())?;
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("proof_of_work_run_01_"));
    assert!(file_name.ends_with(".json"));

    let loaded = ProofOfWork::load(&path)?;
    assert_eq!(loaded, artifact);
    // unknown fields survive the trip
    assert_eq!(loaded.events[3].raw["extra_field"], json!({"kept": true}));

    let replayed = loaded.replay(CAP)?;
    assert_eq!(
        serde_json::to_string(&replayed.graph().snapshot())?,
        serde_json::to_string(&live.graph().snapshot())?
    );
    assert_eq!(
        serde_json::to_string(&replayed.timeline().snapshot())?,
        serde_json::to_string(&live.timeline().snapshot())?
    );
    Ok(())
}

#[test]
fn test_proof_of_work_yaml_and_aborted_status() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trace, _) = SessionTrace::open(
        "s3",
        record(json!({"type": "task_start", "task": "t", "timestamp": 5.0})),
        CAP,
    )?;
    trace.apply(record(json!({
        "type": "action", "agent": "A", "sequence": 1, "start_time": 6.0
    })))?;
    trace.abort();

    let path = temp_dir.path().join("artifact.yml");
    trace.proof_of_work().save_to(&path)?;
    let loaded = ProofOfWork::load(&path)?;
    assert_eq!(loaded.status, SessionStatus::Aborted);

    let replayed = loaded.replay(CAP)?;
    assert_eq!(replayed.status(), SessionStatus::Aborted);
    assert_eq!(replayed.graph().node_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_file_artifact_writer_creates_directory() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let writer = FileArtifactWriter::new(temp_dir.path().join("nested/output"));
    let path = writer.write(&run_session("s1").proof_of_work()).await?;
    assert!(path.exists());
    assert!(path.starts_with(writer.output_dir()));
    Ok(())
}

#[test]
fn test_render_session_tree() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let trace = run_session("s1");
    let rendered = render_session_tree(&trace)?;
    println!("{rendered}");

    assert!(rendered.contains("🌊 s1 - ✅ CLOSED"));
    assert!(rendered.contains("🤖 manager"));
    assert!(rendered.contains("🤖 researcher"));
    assert!(rendered.contains("Step 0: planning"));
    assert!(rendered.contains("🔧 web_search"));
    assert!(rendered.contains("🚨 Error: rate limited once"));

    let path = trace.proof_of_work().save(temp_dir.path())?;
    assert_eq!(render_proof_of_work_file(&path, CAP)?, rendered);
    Ok(())
}
