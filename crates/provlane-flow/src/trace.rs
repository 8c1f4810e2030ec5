//! Per-session trace
//!
//! A [`SessionTrace`] owns everything derived from one session's events:
//! session metadata, the ordered event log, the provenance graph and the
//! timeline. Events are applied strictly in arrival order.

use crate::graph::{GraphDelta, ProvenanceGraph};
use crate::proof_of_work::ProofOfWork;
use crate::timeline::{TimelineDelta, TimelineProjector};
use crate::utils::{now_secs, timestamp_from_secs};
use chrono::{DateTime, Utc};
use provlane_types::{EventError, EventRecord, EventResult, ProvenanceEvent, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A task handed to the executor during the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Changes produced by applying one event
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TraceDelta {
    pub graph: GraphDelta,
    pub timeline: TimelineDelta,
}

#[derive(Debug, Clone)]
pub struct SessionTrace {
    session_id: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    tasks: Vec<TaskRecord>,
    errors: Vec<String>,
    events: Vec<EventRecord>,
    graph: ProvenanceGraph,
    timeline: TimelineProjector,
}

impl SessionTrace {
    /// Open a session from its first event, which must be a `task_start`
    pub fn open(
        session_id: impl Into<String>,
        mut first: EventRecord,
        observation_cap: usize,
    ) -> EventResult<(Self, TraceDelta)> {
        let session_id = session_id.into();
        first.stamp_timestamp(now_secs());
        let ProvenanceEvent::TaskStart { timestamp, .. } = &first.event else {
            return Err(EventError::unknown_session(session_id));
        };
        let started_at = timestamp
            .and_then(timestamp_from_secs)
            .unwrap_or_else(Utc::now);

        info!(session_id = %session_id, "Opening session");
        let mut trace = Self {
            session_id,
            status: SessionStatus::Open,
            started_at,
            ended_at: None,
            tasks: Vec::new(),
            errors: Vec::new(),
            events: Vec::new(),
            graph: ProvenanceGraph::new(observation_cap),
            timeline: TimelineProjector::new(),
        };
        let delta = trace.apply(first)?;
        Ok((trace, delta))
    }

    /// Apply one validated event. Closed or aborted sessions reject
    /// everything with `UnknownSessionReference`. Lifecycle events without a
    /// `timestamp` are stamped with their arrival time before being logged.
    pub fn apply(&mut self, mut record: EventRecord) -> EventResult<TraceDelta> {
        if !self.status.is_open() {
            return Err(EventError::unknown_session(&self.session_id));
        }
        record.stamp_timestamp(now_secs());

        let delta = TraceDelta {
            graph: self.graph.apply(&record),
            timeline: self.timeline.apply(&record),
        };

        match &record.event {
            ProvenanceEvent::TaskStart { task, timestamp } => {
                self.tasks.push(TaskRecord {
                    task: task.clone(),
                    started_at: event_time(*timestamp),
                    ended_at: None,
                });
            }
            ProvenanceEvent::TaskEnd { task, timestamp } => {
                let open_task = self
                    .tasks
                    .iter_mut()
                    .rev()
                    .filter(|t| t.ended_at.is_none())
                    .find(|t| task.as_ref().map_or(true, |name| *name == t.task));
                match open_task {
                    Some(open_task) => open_task.ended_at = Some(event_time(*timestamp)),
                    None => warn!(session_id = %self.session_id, "task_end without a matching open task"),
                }
            }
            ProvenanceEvent::Error { message } => {
                warn!(session_id = %self.session_id, error = %message, "Executor reported an error");
                self.errors.push(message.clone());
            }
            ProvenanceEvent::SessionEnd { timestamp } => {
                self.status = SessionStatus::Closed;
                self.ended_at = Some(event_time(*timestamp));
                info!(
                    session_id = %self.session_id,
                    events = self.events.len() + 1,
                    "Session closed"
                );
            }
            ProvenanceEvent::Step(_) | ProvenanceEvent::Other => {}
        }

        debug!(
            session_id = %self.session_id,
            event_type = %record.type_name(),
            "Applied event"
        );
        self.events.push(record);
        Ok(delta)
    }

    /// Terminate an open session after a fatal server failure
    pub fn abort(&mut self) {
        if self.status.is_open() {
            warn!(session_id = %self.session_id, "Aborting open session");
            self.status = SessionStatus::Aborted;
            self.ended_at = Some(Utc::now());
        }
    }

    /// Rebuild a trace by replaying events from empty state
    pub fn replay(
        session_id: impl Into<String>,
        events: impl IntoIterator<Item = EventRecord>,
        observation_cap: usize,
    ) -> EventResult<Self> {
        let session_id = session_id.into();
        let mut events = events.into_iter();
        let first = events
            .next()
            .ok_or_else(|| EventError::unknown_session(&session_id))?;
        let (mut trace, _) = Self::open(session_id, first, observation_cap)?;
        for record in events {
            trace.apply(record)?;
        }
        Ok(trace)
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork {
            session_id: self.session_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            tasks: self.tasks.clone(),
            errors: self.errors.clone(),
            events: self.events.clone(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    pub fn timeline(&self) -> &TimelineProjector {
        &self.timeline
    }

    pub(crate) fn restore_lifecycle(
        &mut self,
        status: SessionStatus,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) {
        self.status = status;
        self.started_at = started_at;
        self.ended_at = ended_at;
    }
}

fn event_time(timestamp: Option<f64>) -> DateTime<Utc> {
    timestamp
        .and_then(timestamp_from_secs)
        .unwrap_or_else(Utc::now)
}
