//! Provenance event schema
//!
//! Records produced by the agent executor are plain JSON objects tagged by a
//! `type` field. This module defines which fields each recognized kind
//! requires, turns a raw record into a typed [`EventRecord`], and normalizes
//! the parts consumers rely on (tool call shape, timestamps) while keeping
//! unknown fields intact.

use crate::constants::{ACTION, DEFAULT_TOOL_NAME, SESSION_END, TASK_START};
use crate::error::{EventError, EventResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Kinds of provenance events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new task was handed to the executor
    TaskStart,
    /// One agent action with tool calls and observations
    Action,
    /// The executor is done; no further events follow
    SessionEnd,
    /// System prompt recorded as the first memory step
    SystemPrompt,
    /// Task step recorded in agent memory
    Task,
    /// Planning step
    Planning,
    /// Final answer step
    FinalAnswer,
    /// A task finished (the session stays open)
    TaskEnd,
    /// The executor reported an error while running a task
    Error,
    /// Anything else; forwarded but not graphed
    Other(String),
}

impl EventKind {
    pub fn from_type(value: &str) -> Self {
        match value {
            TASK_START => EventKind::TaskStart,
            ACTION => EventKind::Action,
            SESSION_END => EventKind::SessionEnd,
            "system_prompt" => EventKind::SystemPrompt,
            "task" => EventKind::Task,
            "planning" => EventKind::Planning,
            "final_answer" => EventKind::FinalAnswer,
            "task_end" => EventKind::TaskEnd,
            "error" => EventKind::Error,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TaskStart => TASK_START,
            EventKind::Action => ACTION,
            EventKind::SessionEnd => SESSION_END,
            EventKind::SystemPrompt => "system_prompt",
            EventKind::Task => "task",
            EventKind::Planning => "planning",
            EventKind::FinalAnswer => "final_answer",
            EventKind::TaskEnd => "task_end",
            EventKind::Error => "error",
            EventKind::Other(name) => name,
        }
    }

    /// Step kinds are keyed by (agent, sequence) and become graph nodes
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            EventKind::Action
                | EventKind::SystemPrompt
                | EventKind::Task
                | EventKind::Planning
                | EventKind::FinalAnswer
        )
    }

    /// Field holding the free-text content of a step kind
    fn content_field(&self) -> Option<&'static str> {
        match self {
            EventKind::Action => Some("model_output"),
            EventKind::SystemPrompt => Some("system_prompt"),
            EventKind::Task => Some("task"),
            EventKind::Planning => Some("plan"),
            EventKind::FinalAnswer => Some("final_answer"),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation inside a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Position within the step; rendering order follows it
    pub index: u32,
    /// Tool name
    pub name: String,
    /// Opaque arguments payload
    pub arguments: Value,
    /// Call identifier assigned by the model, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Output recorded on the call itself, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ToolCall {
    /// Flat wire form: `{name, arguments[, id][, output]}`
    pub fn to_wire(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".to_string(), Value::String(self.name.clone()));
        object.insert("arguments".to_string(), self.arguments.clone());
        if let Some(id) = &self.id {
            object.insert("id".to_string(), Value::String(id.clone()));
        }
        if let Some(output) = &self.output {
            object.insert("output".to_string(), output.clone());
        }
        Value::Object(object)
    }
}

/// A unit of agent work keyed by (agent, sequence)
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub agent: String,
    pub sequence: u64,
    pub kind: EventKind,
    /// Unix seconds
    pub start_time: Option<f64>,
    /// Unix seconds; absent while the step is in flight
    pub end_time: Option<f64>,
    /// Model output, plan, task text or final answer depending on the kind
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub observation: Option<Value>,
    /// Optional scalar extras kept as node attributes
    pub attributes: Map<String, Value>,
}

/// Step fields copied verbatim into derived attributes when present
const STEP_ATTRIBUTE_FIELDS: [&str; 3] = ["action_output", "duration", "step_number"];

/// Typed view of a provenance event
#[derive(Debug, Clone, PartialEq)]
pub enum ProvenanceEvent {
    TaskStart {
        task: String,
        timestamp: Option<f64>,
    },
    Step(StepEvent),
    TaskEnd {
        task: Option<String>,
        timestamp: Option<f64>,
    },
    Error {
        message: String,
    },
    SessionEnd {
        timestamp: Option<f64>,
    },
    Other,
}

/// A validated event together with its normalized wire record
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub event: ProvenanceEvent,
    /// Normalized record forwarded to clients and stored in artifacts
    pub raw: Value,
}

impl EventRecord {
    /// Validate and normalize one untyped record.
    ///
    /// Step kinds need a non-empty string `agent` and a non-negative integer
    /// `sequence`; timestamps must be finite non-negative numbers when
    /// present. Unknown fields are kept untouched.
    pub fn parse(value: Value) -> EventResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(EventError::malformed("event is not a JSON object"));
        };

        let kind = match object.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => EventKind::from_type(kind),
            Some(_) => return Err(EventError::malformed("`type` must be a non-empty string")),
            None => return Err(EventError::malformed("missing `type`")),
        };

        let event = match &kind {
            EventKind::TaskStart => ProvenanceEvent::TaskStart {
                task: text_field(&object, "task").unwrap_or_default(),
                timestamp: time_field(&object, "timestamp")?,
            },
            EventKind::TaskEnd => ProvenanceEvent::TaskEnd {
                task: text_field(&object, "task"),
                timestamp: time_field(&object, "timestamp")?,
            },
            EventKind::Error => ProvenanceEvent::Error {
                message: text_field(&object, "error").unwrap_or_default(),
            },
            EventKind::SessionEnd => ProvenanceEvent::SessionEnd {
                timestamp: time_field(&object, "timestamp")?,
            },
            EventKind::Other(_) => ProvenanceEvent::Other,
            step_kind => {
                let step = parse_step(&object, step_kind.clone())?;
                if object.contains_key("tool_calls") {
                    let wire = step.tool_calls.iter().map(ToolCall::to_wire).collect();
                    object.insert("tool_calls".to_string(), Value::Array(wire));
                }
                ProvenanceEvent::Step(step)
            }
        };

        Ok(Self {
            kind,
            event,
            raw: Value::Object(object),
        })
    }

    /// Fill a missing lifecycle `timestamp` with `secs` in both the typed
    /// event and the raw record. Returns whether the record changed.
    pub fn stamp_timestamp(&mut self, secs: f64) -> bool {
        let slot = match &mut self.event {
            ProvenanceEvent::TaskStart { timestamp, .. }
            | ProvenanceEvent::TaskEnd { timestamp, .. }
            | ProvenanceEvent::SessionEnd { timestamp } => timestamp,
            _ => return false,
        };
        if slot.is_some() {
            return false;
        }
        let (Value::Object(object), Some(number)) = (&mut self.raw, serde_json::Number::from_f64(secs))
        else {
            return false;
        };
        object.insert("timestamp".to_string(), Value::Number(number));
        *slot = Some(secs);
        true
    }

    /// Parse a record from its JSON text
    pub fn from_json_str(text: &str) -> EventResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EventError::malformed(format!("invalid JSON: {e}")))?;
        Self::parse(value)
    }

    pub fn type_name(&self) -> &str {
        self.kind.as_str()
    }

    pub fn step(&self) -> Option<&StepEvent> {
        match &self.event {
            ProvenanceEvent::Step(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_session_end(&self) -> bool {
        matches!(self.kind, EventKind::SessionEnd)
    }
}

impl Serialize for EventRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EventRecord::parse(value).map_err(serde::de::Error::custom)
    }
}

fn parse_step(object: &Map<String, Value>, kind: EventKind) -> EventResult<StepEvent> {
    let agent = match object.get("agent") {
        Some(Value::String(agent)) if !agent.trim().is_empty() => agent.clone(),
        Some(_) => {
            return Err(EventError::malformed(format!(
                "{kind} event has an invalid `agent`"
            )))
        }
        None => return Err(EventError::malformed(format!("{kind} event missing `agent`"))),
    };

    let sequence = match object.get("sequence") {
        Some(value) => value.as_u64().ok_or_else(|| {
            EventError::malformed(format!(
                "{kind} event `sequence` must be a non-negative integer"
            ))
        })?,
        None => {
            return Err(EventError::malformed(format!(
                "{kind} event missing `sequence`"
            )))
        }
    };

    let content = kind
        .content_field()
        .and_then(|field| text_field(object, field));

    let tool_calls = match object.get("tool_calls") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(calls)) => calls
            .iter()
            .enumerate()
            .map(|(index, call)| parse_tool_call(index, call))
            .collect::<EventResult<Vec<_>>>()?,
        Some(_) => return Err(EventError::malformed("`tool_calls` must be an array")),
    };

    let observation = object
        .get("observations")
        .or_else(|| object.get("observation"))
        .filter(|value| !value.is_null())
        .cloned();

    let attributes = STEP_ATTRIBUTE_FIELDS
        .iter()
        .filter_map(|field| {
            object
                .get(*field)
                .filter(|value| !value.is_null())
                .map(|value| (field.to_string(), value.clone()))
        })
        .collect();

    Ok(StepEvent {
        agent,
        sequence,
        kind,
        start_time: time_field(object, "start_time")?,
        end_time: time_field(object, "end_time")?,
        content,
        tool_calls,
        observation,
        attributes,
    })
}

/// Accepts both `{name, arguments}` and `{id, type, function: {name, arguments}}`
fn parse_tool_call(index: usize, call: &Value) -> EventResult<ToolCall> {
    let Value::Object(call) = call else {
        return Err(EventError::malformed(format!(
            "tool call {index} is not an object"
        )));
    };
    let index = u32::try_from(index)
        .map_err(|_| EventError::malformed("too many tool calls in one step"))?;

    let function = call.get("function").and_then(Value::as_object);
    let name = function
        .and_then(|f| f.get("name"))
        .or_else(|| call.get("name"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_TOOL_NAME)
        .to_string();
    let arguments = function
        .and_then(|f| f.get("arguments"))
        .or_else(|| call.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);
    let id = call.get("id").and_then(Value::as_str).map(str::to_string);
    let output = call
        .get("output")
        .filter(|value| !value.is_null())
        .or_else(|| call.get("result").filter(|value| !value.is_null()))
        .cloned();

    Ok(ToolCall {
        index,
        name,
        arguments,
        id,
        output,
    })
}

/// Strings are taken as-is; other non-null values are rendered as JSON
fn text_field(object: &Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn time_field(object: &Map<String, Value>, field: &str) -> EventResult<Option<f64>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(secs) if secs.is_finite() && secs >= 0.0 && is_representable(secs) => {
                Ok(Some(secs))
            }
            _ => Err(EventError::malformed(format!(
                "`{field}` must be a non-negative number of seconds within the calendar range"
            ))),
        },
        Some(_) => Err(EventError::malformed(format!("`{field}` must be a number"))),
    }
}

fn is_representable(secs: f64) -> bool {
    DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0).is_some()
}
