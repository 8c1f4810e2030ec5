//! Live stream lifecycle: markers, idle reclaim and shutdown

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use provlane_api::{create_router, serve_until, ApiState, ServerConfig, SessionRegistry};
use provlane_types::SessionStatus;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tower::util::ServiceExt;

fn app_with(config: ServerConfig) -> (Router, Arc<SessionRegistry>) {
    let registry = Arc::new(SessionRegistry::new(Arc::new(
        config.with_proof_of_work_dir(None),
    )));
    (create_router(ApiState::new(registry.clone())), registry)
}

fn action(sequence: u64) -> Value {
    json!({"type": "action", "agent": "A", "sequence": sequence, "start_time": sequence as f64})
}

async fn open_stream(app: &Router, session_id: &str) -> Result<Body> {
    let request = Request::builder()
        .uri(format!("/api/v1/sessions/{session_id}/stream"))
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.into_body())
}

async fn read_all(body: Body) -> Result<String> {
    let bytes = timeout(Duration::from_secs(3), to_bytes(body, usize::MAX)).await??;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[tokio::test]
async fn test_idle_stream_is_closed_and_reclaimed() -> Result<()> {
    let (app, registry) =
        app_with(ServerConfig::new().with_client_idle_timeout(Duration::from_millis(100)));
    registry
        .ingest("s1", json!({"type": "task_start", "task": "demo"}))
        .await?;

    let body = open_stream(&app, "s1").await?;
    assert_eq!(registry.summary("s1").await?.subscribers, 1);

    let text = read_all(body).await?;
    assert!(text.contains("event: task_start"));

    registry.sweep_expired(Duration::from_secs(3600)).await;
    let summary = registry.summary("s1").await?;
    assert_eq!(summary.subscribers, 0);
    assert_eq!(summary.status, SessionStatus::Open);
    Ok(())
}

#[tokio::test]
async fn test_overloaded_client_gets_marker_after_buffered_frames() -> Result<()> {
    let (app, registry) = app_with(ServerConfig::new().with_client_queue_capacity(2));
    registry
        .ingest("s1", json!({"type": "task_start", "task": "demo"}))
        .await?;

    // nobody polls the body while events arrive
    let body = open_stream(&app, "s1").await?;
    for sequence in 1..=3 {
        registry.ingest("s1", action(sequence)).await?;
    }

    let text = read_all(body).await?;
    let marker = text.find("event: client_overloaded").unwrap();
    let last_action = text.rfind("event: action").unwrap();
    assert!(last_action < marker);
    assert!(text.contains("id: 2"));
    assert!(!text.contains("id: 3"));
    assert_eq!(text.matches("event: action").count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_truncated_backlog_marker_precedes_replay() -> Result<()> {
    let (app, registry) = app_with(ServerConfig::new().with_backlog_capacity(2));
    registry
        .ingest("s1", json!({"type": "task_start", "task": "demo"}))
        .await?;
    for sequence in 1..=3 {
        registry.ingest("s1", action(sequence)).await?;
    }
    registry.ingest("s1", json!({"type": "session_end"})).await?;

    let text = read_all(open_stream(&app, "s1").await?).await?;
    let marker = text.find("event: backlog_truncated").unwrap();
    let first_frame = text.find("id: 3").unwrap();
    assert!(marker < first_frame);
    assert!(text.contains(r#""dropped":3"#));
    assert!(text.contains(r#""first_seq":3"#));
    assert!(text.contains("event: session_end"));
    assert!(!text.contains("id: 0"));
    assert!(!text.contains("id: 2"));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_connected_dashboards() -> Result<()> {
    println!("🧪 Testing shutdown with a live stream attached");
    let registry = Arc::new(SessionRegistry::new(Arc::new(
        ServerConfig::new().with_proof_of_work_dir(None),
    )));
    registry
        .ingest("s1", json!({"type": "task_start", "task": "demo"}))
        .await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_until(
        listener,
        ApiState::new(registry.clone()),
        async move {
            let _ = stop_rx.await;
        },
    ));

    let mut client = TcpStream::connect(addr).await?;
    client
        .write_all(b"GET /api/v1/sessions/s1/stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await?;
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !String::from_utf8_lossy(&received).contains("event: task_start") {
        let n = timeout(Duration::from_secs(3), client.read(&mut buf)).await??;
        assert!(n > 0, "stream ended before the backlog arrived");
        received.extend_from_slice(&buf[..n]);
    }

    stop_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), server).await???;

    assert_eq!(
        registry.summary("s1").await?.status,
        SessionStatus::Aborted
    );
    println!("✅ Server stopped with the stream attached");
    Ok(())
}
