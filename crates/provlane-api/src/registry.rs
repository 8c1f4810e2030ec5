//! Session registry
//!
//! Maps session ids to live sessions. Each session pairs its
//! [`SessionTrace`] with a [`Hub`] behind one mutex, so events are applied
//! and published strictly in arrival order.

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::hub::{Hub, Subscription};
use chrono::{DateTime, Utc};
use provlane_flow::renderer::render_session_tree;
use provlane_flow::{
    ArtifactWriter, GraphFormat, ProofOfWork, SessionTrace, TimelineSnapshot,
};
use provlane_types::{EventError, EventKind, EventRecord, SessionStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of ingesting one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub session_id: String,
    pub seq: u64,
    pub event_type: String,
    pub delivered: usize,
    pub status: SessionStatus,
}

/// Listing entry for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tasks: Vec<String>,
    pub event_count: usize,
    pub agent_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub subscribers: usize,
    pub backlog_evicted: u64,
}

struct SessionState {
    trace: SessionTrace,
    hub: Hub,
    closed_at: Option<Instant>,
}

impl SessionState {
    fn summary(&self) -> SessionSummary {
        let graph = self.trace.graph();
        SessionSummary {
            session_id: self.trace.session_id().to_string(),
            status: self.trace.status(),
            started_at: self.trace.started_at(),
            ended_at: self.trace.ended_at(),
            tasks: self.trace.tasks().iter().map(|t| t.task.clone()).collect(),
            event_count: self.trace.events().len(),
            agent_count: graph.agents().count(),
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            subscribers: self.hub.subscriber_count(),
            backlog_evicted: self.hub.evicted(),
        }
    }
}

pub struct Session {
    id: String,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }
}

pub struct SessionRegistry {
    config: Arc<ServerConfig>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    artifact_writer: Option<Arc<dyn ArtifactWriter>>,
}

impl SessionRegistry {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            artifact_writer: None,
        }
    }

    /// Persist a proof-of-work artifact whenever a session closes
    pub fn with_artifact_writer(mut self, writer: Arc<dyn ArtifactWriter>) -> Self {
        self.artifact_writer = Some(writer);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open a new session under a fresh id from its `task_start` event
    pub async fn create_session(&self, value: Value) -> ApiResult<IngestOutcome> {
        let record = EventRecord::parse(value)?;
        if record.kind != EventKind::TaskStart {
            return Err(ApiError::BadRequest(format!(
                "a session starts with a task_start event, got {}",
                record.type_name()
            )));
        }
        self.ingest_record(&Uuid::new_v4().to_string(), record).await
    }

    /// Validate and apply one event. A `task_start` for an unseen id opens
    /// that session; anything else must address an open session.
    pub async fn ingest(&self, session_id: &str, value: Value) -> ApiResult<IngestOutcome> {
        let record = EventRecord::parse(value).inspect_err(|e| {
            warn!(session_id = %session_id, error = %e, "Dropping malformed event");
        })?;
        self.ingest_record(session_id, record).await
    }

    async fn ingest_record(&self, session_id: &str, record: EventRecord) -> ApiResult<IngestOutcome> {
        let existing = self.sessions.read().await.get(session_id).cloned();
        match existing {
            Some(session) => self.apply_to(&session, record).await,
            None if record.kind == EventKind::TaskStart => {
                self.open_session(session_id, record).await
            }
            None => {
                let error = EventError::unknown_session(session_id);
                warn!(error = %error, event_type = %record.type_name(), "Dropping event");
                Err(error.into())
            }
        }
    }

    async fn apply_to(&self, session: &Session, record: EventRecord) -> ApiResult<IngestOutcome> {
        let event_type = record.type_name().to_string();
        let data = record.raw.clone();
        let closing = record.is_session_end();

        let mut state = session.state.lock().await;
        if let Err(error) = state.trace.apply(record) {
            warn!(error = %error, event_type = %event_type, "Dropping event");
            return Err(error.into());
        }
        let report = state.hub.publish(event_type.clone(), data);
        let status = state.trace.status();

        let artifact = if closing {
            state.hub.close();
            state.closed_at = Some(Instant::now());
            Some(state.trace.proof_of_work())
        } else {
            None
        };
        drop(state);

        if let Some(artifact) = artifact {
            self.persist(artifact);
        }

        Ok(IngestOutcome {
            session_id: session.id.clone(),
            seq: report.seq,
            event_type,
            delivered: report.delivered,
            status,
        })
    }

    async fn open_session(&self, session_id: &str, record: EventRecord) -> ApiResult<IngestOutcome> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id).cloned() {
            // another task_start opened it first
            drop(sessions);
            return self.apply_to(&session, record).await;
        }

        let event_type = record.type_name().to_string();
        let data = record.raw.clone();
        let (trace, _) = SessionTrace::open(session_id, record, self.config.observation_cap)?;
        let mut hub = Hub::new(
            session_id,
            self.config.backlog_capacity,
            self.config.client_queue_capacity,
        );
        let report = hub.publish(event_type.clone(), data);

        sessions.insert(
            session_id.to_string(),
            Arc::new(Session {
                id: session_id.to_string(),
                state: Mutex::new(SessionState {
                    trace,
                    hub,
                    closed_at: None,
                }),
            }),
        );
        info!(session_id = %session_id, active_sessions = sessions.len(), "Session opened");

        Ok(IngestOutcome {
            session_id: session_id.to_string(),
            seq: report.seq,
            event_type,
            delivered: report.delivered,
            status: SessionStatus::Open,
        })
    }

    fn persist(&self, artifact: ProofOfWork) {
        let Some(writer) = self.artifact_writer.clone() else {
            return;
        };
        tokio::spawn(async move {
            match writer.write(&artifact).await {
                Ok(path) => info!(
                    session_id = %artifact.session_id,
                    file_path = %path.display(),
                    "Proof of work written"
                ),
                Err(e) => error!(
                    session_id = %artifact.session_id,
                    error = %e,
                    "Failed to write proof of work"
                ),
            }
        });
    }

    async fn session(&self, session_id: &str) -> ApiResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))
    }

    /// Attach a dashboard client: backlog snapshot plus live queue
    pub async fn subscribe(&self, session_id: &str) -> ApiResult<Subscription> {
        let session = self.session(session_id).await?;
        let mut state = session.state.lock().await;
        Ok(state.hub.subscribe())
    }

    pub async fn summary(&self, session_id: &str) -> ApiResult<SessionSummary> {
        let session = self.session(session_id).await?;
        let state = session.state.lock().await;
        Ok(state.summary())
    }

    /// Summaries of every retained session, newest first
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.state.lock().await.summary());
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries
    }

    pub async fn graph(&self, session_id: &str, format: GraphFormat) -> ApiResult<String> {
        let session = self.session(session_id).await?;
        let state = session.state.lock().await;
        Ok(state.trace.graph().export_as(format)?)
    }

    pub async fn timeline(&self, session_id: &str) -> ApiResult<TimelineSnapshot> {
        let session = self.session(session_id).await?;
        let state = session.state.lock().await;
        Ok(state.trace.timeline().snapshot())
    }

    pub async fn proof_of_work(&self, session_id: &str) -> ApiResult<ProofOfWork> {
        let session = self.session(session_id).await?;
        let state = session.state.lock().await;
        Ok(state.trace.proof_of_work())
    }

    pub async fn ascii_tree(&self, session_id: &str) -> ApiResult<String> {
        let session = self.session(session_id).await?;
        let state = session.state.lock().await;
        Ok(render_session_tree(&state.trace)?)
    }

    /// Remove sessions closed longer than `retention` ago; also prunes
    /// vanished clients of the sessions that stay
    pub async fn sweep_expired(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            let mut state = session.state.lock().await;
            let pruned = state.hub.prune_disconnected();
            if pruned > 0 {
                debug!(session_id = %id, pruned, "Pruned disconnected clients");
            }
            if let Some(closed_at) = state.closed_at {
                if now.duration_since(closed_at) >= retention {
                    expired.push(id.clone());
                }
            }
        }
        for id in &expired {
            sessions.remove(id);
            info!(session_id = %id, "Session expired");
        }
        expired.len()
    }

    /// Mark every open session aborted and close its clients
    pub async fn abort_all(&self, reason: &str) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut aborted = 0;
        for session in sessions {
            let mut state = session.state.lock().await;
            if !state.trace.status().is_open() {
                continue;
            }
            warn!(session_id = %session.id, reason = %reason, "Aborting session");
            state.trace.abort();
            state.hub.close();
            state.closed_at = Some(Instant::now());
            let artifact = state.trace.proof_of_work();
            drop(state);
            if let Some(writer) = &self.artifact_writer {
                if let Err(e) = writer.write(&artifact).await {
                    error!(session_id = %session.id, error = %e, "Failed to write proof of work");
                }
            }
            aborted += 1;
        }
        aborted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
