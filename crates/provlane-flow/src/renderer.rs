//! ASCII tree rendering for session traces
//!
//! Renders one session as a tree of agents, their steps, tool calls and
//! observations, for quick inspection on a terminal.

use crate::error::{FlowError, FlowResult};
use crate::graph::GraphNode;
use crate::proof_of_work::ProofOfWork;
use crate::trace::SessionTrace;
use crate::utils::{display_text, format_duration_secs, preview};
use ascii_tree::Tree;
use provlane_types::{ProvenanceEvent, SessionStatus, StepEvent};
use std::collections::HashMap;
use std::path::Path;

const PREVIEW_CHARS: usize = 80;

/// Render a session trace as an ASCII tree
pub fn render_session_tree(trace: &SessionTrace) -> FlowResult<String> {
    let status = match trace.status() {
        SessionStatus::Open => "⏳ OPEN",
        SessionStatus::Closed => "✅ CLOSED",
        SessionStatus::Aborted => "❌ ABORTED",
    };
    let duration = match trace.ended_at() {
        Some(end) => {
            let secs = (end - trace.started_at()).num_milliseconds() as f64 / 1000.0;
            format_duration_secs(secs)
        }
        None => "In Progress".to_string(),
    };
    let root_label = format!(
        "🌊 {} - {} (Duration: {}, Events: {})",
        trace.session_id(),
        status,
        duration,
        trace.events().len()
    );

    let latest_steps = latest_steps(trace);
    let mut children = Vec::new();

    for task in trace.tasks() {
        let marker = if task.ended_at.is_some() { "✅" } else { "⏳" };
        children.push(Tree::Leaf(vec![format!(
            "📝 Task {marker}: {}",
            preview(&task.task, PREVIEW_CHARS)
        )]));
    }

    let graph = trace.graph();
    for agent in graph.agents() {
        let mut step_trees = Vec::new();
        for (sequence, step) in graph.steps_of(agent) {
            let duration = latest_steps
                .get(&(agent, sequence))
                .and_then(|step| step_duration(step));
            let mut label = format!("🔄 {}", step.label);
            if let Some(duration) = duration {
                label.push_str(&format!(" ({duration})"));
            }

            let mut details = Vec::new();
            if let Some(content) = step.attributes.get("content") {
                details.push(Tree::Leaf(vec![format!(
                    "💭 {}",
                    preview(&display_text(content), PREVIEW_CHARS)
                )]));
            }
            for call in graph.tool_calls_of(agent, sequence) {
                details.push(tool_call_tree(call));
            }
            if let Some(observation) = graph.observation_of(agent, sequence) {
                if let Some(content) = observation.attributes.get("content") {
                    details.push(Tree::Leaf(vec![format!(
                        "👁 {}",
                        preview(&display_text(content), PREVIEW_CHARS)
                    )]));
                }
            }
            step_trees.push(Tree::Node(label, details));
        }
        children.push(Tree::Node(format!("🤖 {agent}"), step_trees));
    }

    for error in trace.errors() {
        children.push(Tree::Leaf(vec![format!(
            "🚨 Error: {}",
            preview(error, PREVIEW_CHARS)
        )]));
    }

    let tree = Tree::Node(root_label, children);
    let mut buffer = String::new();
    ascii_tree::write_tree(&mut buffer, &tree).map_err(|e| FlowError::render(e.to_string()))?;
    Ok(buffer)
}

/// Load a proof-of-work document, replay it and render the result
pub fn render_proof_of_work_file(path: &Path, observation_cap: usize) -> FlowResult<String> {
    let artifact = ProofOfWork::load(path)?;
    let trace = artifact.replay(observation_cap)?;
    render_session_tree(&trace)
}

fn tool_call_tree(call: &GraphNode) -> Tree {
    let mut lines = Vec::new();
    if let Some(arguments) = call.attributes.get("arguments") {
        lines.push(format!(
            "📥 {}",
            preview(&display_text(arguments), PREVIEW_CHARS)
        ));
    }
    if let Some(output) = call.attributes.get("observations") {
        lines.push(format!("📤 {}", preview(&display_text(output), PREVIEW_CHARS)));
    }
    if lines.is_empty() {
        Tree::Leaf(vec![format!("🔧 {}", call.label)])
    } else {
        Tree::Node(format!("🔧 {}", call.label), vec![Tree::Leaf(lines)])
    }
}

/// Last-applied step event per (agent, sequence)
fn latest_steps(trace: &SessionTrace) -> HashMap<(&str, u64), &StepEvent> {
    trace
        .events()
        .iter()
        .filter_map(|record| match &record.event {
            ProvenanceEvent::Step(step) => Some(((step.agent.as_str(), step.sequence), step)),
            _ => None,
        })
        .collect()
}

fn step_duration(step: &StepEvent) -> Option<String> {
    let start = step.start_time?;
    let end = step.end_time?;
    Some(format_duration_secs(end - start))
}
