//! Provenance graph builder
//!
//! Maintains a directed graph of agents, steps, tool calls, observations and
//! shared tool nodes, updated incrementally from step events. Node identity
//! comes from the owning entity's composite key (agent name, sequence, call
//! index), so applying the same event again never creates duplicates.

use crate::error::FlowResult;
use crate::export::{self, GraphFormat};
use crate::utils::{display_text, escape_id_segment, format_timestamp, truncate_chars};
use provlane_types::constants::{DEFAULT_OBSERVATION_DISPLAY_CAP, PYTHON_INTERPRETER};
use provlane_types::{EventRecord, ProvenanceEvent, StepEvent, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Composite identity of a graph node.
///
/// The derived ordering groups nodes by kind, then by agent name and numeric
/// sequence/index, which keeps snapshots stable and tool calls in call order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Agent(String),
    Step(String, u64),
    ToolCall(String, u64, u32),
    Observation(String, u64),
    Tool(String),
}

impl NodeKey {
    /// Exported id; names are escaped so distinct keys never share an id
    pub fn id(&self) -> String {
        match self {
            NodeKey::Agent(agent) => format!("agent:{}", escape_id_segment(agent)),
            NodeKey::Step(agent, seq) => format!("agent:{}:step:{seq}", escape_id_segment(agent)),
            NodeKey::ToolCall(agent, seq, index) => {
                format!("agent:{}:step:{seq}:tool_call:{index}", escape_id_segment(agent))
            }
            NodeKey::Observation(agent, seq) => {
                format!("agent:{}:step:{seq}:observation", escape_id_segment(agent))
            }
            NodeKey::Tool(name) => format!("tool:{}", escape_id_segment(name)),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeKey::Agent(_) => NodeKind::Agent,
            NodeKey::Step(..) => NodeKind::Step,
            NodeKey::ToolCall(..) => NodeKind::ToolCall,
            NodeKey::Observation(..) => NodeKind::Observation,
            NodeKey::Tool(_) => NodeKind::Tool,
        }
    }

    fn owning_agent(&self) -> Option<&str> {
        match self {
            NodeKey::Agent(agent)
            | NodeKey::Step(agent, _)
            | NodeKey::ToolCall(agent, _, _)
            | NodeKey::Observation(agent, _) => Some(agent),
            NodeKey::Tool(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Agent,
    Step,
    ToolCall,
    Observation,
    Tool,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Agent => "agent",
            NodeKind::Step => "step",
            NodeKind::ToolCall => "tool_call",
            NodeKind::Observation => "observation",
            NodeKind::Tool => "tool",
        }
    }
}

/// Edge relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Agent owns Step
    HasStep,
    /// Step owns ToolCall
    CallsTool,
    /// Step owns Observation
    HasObservation,
    /// Step precedes the next Step of the same agent
    NextStep,
    /// ToolCall invokes a shared Tool
    UsesTool,
    /// ToolCall hands work to another Agent
    DelegatesTo,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::HasStep => "has_step",
            Relation::CallsTool => "calls_tool",
            Relation::HasObservation => "has_observation",
            Relation::NextStep => "next_step",
            Relation::UsesTool => "uses_tool",
            Relation::DelegatesTo => "delegates_to",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: Relation,
    /// Call position for `calls_tool` edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Point-in-time copy of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Changes made by one `apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphDelta {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        *self == GraphDelta::default()
    }
}

type EdgeKey = (NodeKey, NodeKey, Relation);

/// Incremental provenance graph over one session's events
#[derive(Debug, Clone)]
pub struct ProvenanceGraph {
    observation_cap: usize,
    nodes: BTreeMap<NodeKey, GraphNode>,
    edges: BTreeMap<EdgeKey, GraphEdge>,
}

impl Default for ProvenanceGraph {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVATION_DISPLAY_CAP)
    }
}

impl ProvenanceGraph {
    /// Create an empty graph; observation text longer than
    /// `observation_cap` characters is truncated on the derived nodes
    pub fn new(observation_cap: usize) -> Self {
        Self {
            observation_cap,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Apply one event. Only step events touch the graph.
    pub fn apply(&mut self, record: &EventRecord) -> GraphDelta {
        match &record.event {
            ProvenanceEvent::Step(step) => self.upsert_step(step),
            _ => GraphDelta::default(),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    pub fn export_as(&self, format: GraphFormat) -> FlowResult<String> {
        export::export_graph(&self.snapshot(), format)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    /// Agent names in key order
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().filter_map(|key| match key {
            NodeKey::Agent(agent) => Some(agent.as_str()),
            _ => None,
        })
    }

    /// Steps of one agent ordered by sequence
    pub fn steps_of(&self, agent: &str) -> Vec<(u64, &GraphNode)> {
        self.nodes
            .range(NodeKey::Step(agent.to_string(), 0)..=NodeKey::Step(agent.to_string(), u64::MAX))
            .filter_map(|(key, node)| match key {
                NodeKey::Step(_, seq) => Some((*seq, node)),
                _ => None,
            })
            .collect()
    }

    /// Tool calls of one step ordered by index
    pub fn tool_calls_of(&self, agent: &str, sequence: u64) -> Vec<&GraphNode> {
        self.nodes
            .range(
                NodeKey::ToolCall(agent.to_string(), sequence, 0)
                    ..=NodeKey::ToolCall(agent.to_string(), sequence, u32::MAX),
            )
            .map(|(_, node)| node)
            .collect()
    }

    pub fn observation_of(&self, agent: &str, sequence: u64) -> Option<&GraphNode> {
        self.nodes
            .get(&NodeKey::Observation(agent.to_string(), sequence))
    }

    fn upsert_step(&mut self, step: &StepEvent) -> GraphDelta {
        let mut delta = GraphDelta::default();
        let agent = step.agent.as_str();

        let agent_key = NodeKey::Agent(agent.to_string());
        match self.nodes.get_mut(&agent_key) {
            Some(node) => {
                if !node.attributes.contains_key("first_seen") {
                    if let Some(first_seen) = step.start_time.and_then(format_timestamp) {
                        node.attributes
                            .insert("first_seen".to_string(), Value::String(first_seen));
                    }
                }
            }
            None => {
                self.put_node(agent_key.clone(), agent_node(&agent_key, step), &mut delta);
                self.link_delegations_to(agent, &mut delta);
            }
        }

        let step_key = NodeKey::Step(agent.to_string(), step.sequence);
        self.put_node(step_key.clone(), step_node(&step_key, step), &mut delta);
        self.put_edge(&agent_key, &step_key, Relation::HasStep, None, &mut delta);

        self.sync_tool_calls(&step_key, step, &mut delta);
        self.sync_observation(&step_key, step, &mut delta);
        self.sync_step_chain(agent, &mut delta);
        self.prune_unused_tools(&mut delta);

        debug!(
            agent = %agent,
            sequence = step.sequence,
            nodes_added = delta.nodes_added,
            edges_added = delta.edges_added,
            "Applied step to provenance graph"
        );
        delta
    }

    fn sync_tool_calls(&mut self, step_key: &NodeKey, step: &StepEvent, delta: &mut GraphDelta) {
        let agent = step.agent.as_str();
        let call_count = step.tool_calls.len() as u32;

        let stale: Vec<NodeKey> = self
            .nodes
            .range(
                NodeKey::ToolCall(agent.to_string(), step.sequence, call_count)
                    ..=NodeKey::ToolCall(agent.to_string(), step.sequence, u32::MAX),
            )
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.remove_node(&key, delta);
        }

        let single_call = step.tool_calls.len() == 1;
        for call in &step.tool_calls {
            let call_key = NodeKey::ToolCall(agent.to_string(), step.sequence, call.index);
            let fallback = if single_call {
                step.observation.as_ref()
            } else {
                None
            };
            let node = self.tool_call_node(&call_key, call, fallback);
            self.put_node(call_key.clone(), node, delta);
            self.put_edge(step_key, &call_key, Relation::CallsTool, Some(call.index), delta);

            let mut targets = Vec::new();
            if call.name != PYTHON_INTERPRETER {
                let tool_key = NodeKey::Tool(call.name.clone());
                if !self.nodes.contains_key(&tool_key) {
                    let node = GraphNode {
                        id: tool_key.id(),
                        kind: NodeKind::Tool,
                        label: call.name.clone(),
                        attributes: Map::new(),
                    };
                    self.put_node(tool_key.clone(), node, delta);
                }
                targets.push((tool_key, Relation::UsesTool));
            }
            let delegate = NodeKey::Agent(call.name.clone());
            if call.name != agent && self.nodes.contains_key(&delegate) {
                targets.push((delegate, Relation::DelegatesTo));
            }
            self.sync_outgoing(&call_key, &[Relation::UsesTool, Relation::DelegatesTo], &targets, delta);
        }
    }

    fn sync_observation(&mut self, step_key: &NodeKey, step: &StepEvent, delta: &mut GraphDelta) {
        let obs_key = NodeKey::Observation(step.agent.clone(), step.sequence);
        match &step.observation {
            Some(observation) => {
                let text = display_text(observation);
                let (content, truncated) = truncate_chars(&text, self.observation_cap);
                let mut attributes = Map::new();
                attributes.insert("content".to_string(), Value::String(content));
                attributes.insert("truncated".to_string(), Value::Bool(truncated));
                attributes.insert("length".to_string(), json!(text.chars().count()));
                let node = GraphNode {
                    id: obs_key.id(),
                    kind: NodeKind::Observation,
                    label: "observation".to_string(),
                    attributes,
                };
                self.put_node(obs_key.clone(), node, delta);
                self.put_edge(step_key, &obs_key, Relation::HasObservation, None, delta);
            }
            None => self.remove_node(&obs_key, delta),
        }
    }

    /// Recompute `next_step` edges so they link the agent's steps in sequence order
    fn sync_step_chain(&mut self, agent: &str, delta: &mut GraphDelta) {
        let steps: Vec<NodeKey> = self
            .steps_of(agent)
            .into_iter()
            .map(|(seq, _)| NodeKey::Step(agent.to_string(), seq))
            .collect();
        let desired: BTreeSet<(NodeKey, NodeKey)> = steps
            .windows(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        let before = self.edges.len();
        self.edges.retain(|(source, target, relation), _| {
            *relation != Relation::NextStep
                || source.owning_agent() != Some(agent)
                || desired.contains(&(source.clone(), target.clone()))
        });
        delta.edges_removed += before - self.edges.len();

        for (source, target) in desired {
            self.put_edge(&source, &target, Relation::NextStep, None, delta);
        }
    }

    /// A call can name an agent before that agent produces its first step
    fn link_delegations_to(&mut self, agent: &str, delta: &mut GraphDelta) {
        let target = NodeKey::Agent(agent.to_string());
        let callers: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(key, node)| {
                matches!(key, NodeKey::ToolCall(owner, _, _) if owner != agent)
                    && node.label == agent
            })
            .map(|(key, _)| key.clone())
            .collect();
        for caller in callers {
            self.put_edge(&caller, &target, Relation::DelegatesTo, None, delta);
        }
    }

    fn prune_unused_tools(&mut self, delta: &mut GraphDelta) {
        let used: BTreeSet<&NodeKey> = self
            .edges
            .keys()
            .filter(|(_, _, relation)| *relation == Relation::UsesTool)
            .map(|(_, target, _)| target)
            .collect();
        let unused: Vec<NodeKey> = self
            .nodes
            .keys()
            .filter(|key| matches!(key, NodeKey::Tool(_)) && !used.contains(key))
            .cloned()
            .collect();
        for key in unused {
            self.remove_node(&key, delta);
        }
    }

    /// Keep exactly `targets` among the node's outgoing edges of `relations`
    fn sync_outgoing(
        &mut self,
        source: &NodeKey,
        relations: &[Relation],
        targets: &[(NodeKey, Relation)],
        delta: &mut GraphDelta,
    ) {
        let before = self.edges.len();
        self.edges.retain(|(from, to, relation), _| {
            from != source
                || !relations.contains(relation)
                || targets.iter().any(|(t, r)| t == to && r == relation)
        });
        delta.edges_removed += before - self.edges.len();

        for (target, relation) in targets {
            self.put_edge(source, target, *relation, None, delta);
        }
    }

    /// Insert or overwrite; later events win
    fn put_node(&mut self, key: NodeKey, node: GraphNode, delta: &mut GraphDelta) {
        if self.nodes.insert(key, node).is_none() {
            delta.nodes_added += 1;
        }
    }

    fn put_edge(
        &mut self,
        source: &NodeKey,
        target: &NodeKey,
        relation: Relation,
        index: Option<u32>,
        delta: &mut GraphDelta,
    ) {
        let edge = GraphEdge {
            source: source.id(),
            target: target.id(),
            relation,
            index,
        };
        if self
            .edges
            .insert((source.clone(), target.clone(), relation), edge)
            .is_none()
        {
            delta.edges_added += 1;
        }
    }

    /// Remove a node with every edge touching it
    fn remove_node(&mut self, key: &NodeKey, delta: &mut GraphDelta) {
        if self.nodes.remove(key).is_none() {
            return;
        }
        delta.nodes_removed += 1;
        let before = self.edges.len();
        self.edges
            .retain(|(source, target, _), _| source != key && target != key);
        delta.edges_removed += before - self.edges.len();
    }

    fn tool_call_node(&self, key: &NodeKey, call: &ToolCall, fallback: Option<&Value>) -> GraphNode {
        let mut attributes = Map::new();
        attributes.insert("tool".to_string(), Value::String(call.name.clone()));
        attributes.insert("index".to_string(), json!(call.index));
        if !call.arguments.is_null() {
            attributes.insert("arguments".to_string(), call.arguments.clone());
        }
        if let Some(id) = &call.id {
            attributes.insert("call_id".to_string(), Value::String(id.clone()));
        }
        if let Some(output) = call.output.as_ref().or(fallback) {
            let (text, truncated) = truncate_chars(&display_text(output), self.observation_cap);
            attributes.insert("observations".to_string(), Value::String(text));
            if truncated {
                attributes.insert("observations_truncated".to_string(), Value::Bool(true));
            }
        }
        GraphNode {
            id: key.id(),
            kind: NodeKind::ToolCall,
            label: call.name.clone(),
            attributes,
        }
    }
}

fn agent_node(key: &NodeKey, step: &StepEvent) -> GraphNode {
    let mut attributes = Map::new();
    if let Some(first_seen) = step.start_time.and_then(format_timestamp) {
        attributes.insert("first_seen".to_string(), Value::String(first_seen));
    }
    GraphNode {
        id: key.id(),
        kind: NodeKind::Agent,
        label: step.agent.clone(),
        attributes,
    }
}

fn step_node(key: &NodeKey, step: &StepEvent) -> GraphNode {
    let mut attributes = Map::new();
    attributes.insert(
        "step_type".to_string(),
        Value::String(step.kind.as_str().to_string()),
    );
    attributes.insert("sequence".to_string(), json!(step.sequence));
    if let Some(start) = step.start_time.and_then(format_timestamp) {
        attributes.insert("start_time".to_string(), Value::String(start));
    }
    if let Some(end) = step.end_time.and_then(format_timestamp) {
        attributes.insert("end_time".to_string(), Value::String(end));
    }
    if let Some(content) = &step.content {
        attributes.insert("content".to_string(), Value::String(content.clone()));
    }
    for (field, value) in &step.attributes {
        attributes.insert(field.clone(), value.clone());
    }
    GraphNode {
        id: key.id(),
        kind: NodeKind::Step,
        label: format!("Step {}: {}", step.sequence, step.kind),
        attributes,
    }
}
