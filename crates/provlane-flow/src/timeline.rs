//! Timeline projector
//!
//! Projects step events onto per-agent swimlanes in the shape vis-timeline
//! consumes: one group per agent, a range item per timed step and a point
//! item per tool call at the step's start.

use crate::utils::{escape_id_segment, format_timestamp};
use provlane_types::{EventRecord, ProvenanceEvent, StepEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One swimlane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineGroup {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Range,
    Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub group: String,
    /// Keeps a step's bar and its tool points stacked together
    pub subgroup: String,
    pub content: String,
    pub start: String,
    /// Absent while the step is still in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TimelineItem {
    pub fn is_in_progress(&self) -> bool {
        self.item_type == ItemType::Range && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub groups: Vec<TimelineGroup>,
    pub items: Vec<TimelineItem>,
}

/// Changes made by one `apply`; unchanged items are not reported
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TimelineDelta {
    pub groups_added: Vec<TimelineGroup>,
    pub items_upserted: Vec<TimelineItem>,
    pub items_removed: Vec<String>,
}

impl TimelineDelta {
    pub fn is_empty(&self) -> bool {
        self.groups_added.is_empty() && self.items_upserted.is_empty() && self.items_removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Swimlane {
    group: TimelineGroup,
    /// Range item first, then tool points by index
    steps: BTreeMap<u64, Vec<TimelineItem>>,
}

/// Per-agent chronological swimlanes
#[derive(Debug, Clone, Default)]
pub struct TimelineProjector {
    lanes: Vec<Swimlane>,
    lane_index: HashMap<String, usize>,
}

impl TimelineProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: &EventRecord) -> TimelineDelta {
        match &record.event {
            ProvenanceEvent::Step(step) => self.upsert_step(step),
            _ => TimelineDelta::default(),
        }
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            groups: self.lanes.iter().map(|lane| lane.group.clone()).collect(),
            items: self
                .lanes
                .iter()
                .flat_map(|lane| lane.steps.values().flatten().cloned())
                .collect(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn item_count(&self) -> usize {
        self.lanes
            .iter()
            .map(|lane| lane.steps.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    fn upsert_step(&mut self, step: &StepEvent) -> TimelineDelta {
        let mut delta = TimelineDelta::default();
        let lane_pos = match self.lane_index.get(&step.agent) {
            Some(pos) => *pos,
            None => {
                let group = TimelineGroup {
                    id: step.agent.clone(),
                    content: step.agent.clone(),
                };
                delta.groups_added.push(group.clone());
                self.lanes.push(Swimlane {
                    group,
                    steps: BTreeMap::new(),
                });
                self.lane_index.insert(step.agent.clone(), self.lanes.len() - 1);
                self.lanes.len() - 1
            }
        };
        let lane = &mut self.lanes[lane_pos];

        let items = step_items(step);
        let previous = match &items {
            Some(items) => lane.steps.insert(step.sequence, items.clone()),
            None => lane.steps.remove(&step.sequence),
        }
        .unwrap_or_default();
        let current = items.unwrap_or_default();

        for item in &current {
            if !previous.contains(item) {
                delta.items_upserted.push(item.clone());
            }
        }
        for item in &previous {
            if !current.iter().any(|c| c.id == item.id) {
                delta.items_removed.push(item.id.clone());
            }
        }

        debug!(
            agent = %step.agent,
            sequence = step.sequence,
            upserted = delta.items_upserted.len(),
            removed = delta.items_removed.len(),
            "Applied step to timeline"
        );
        delta
    }
}

/// Items for one step; steps without a start time are not placed
fn step_items(step: &StepEvent) -> Option<Vec<TimelineItem>> {
    let start = step.start_time.and_then(format_timestamp)?;
    let step_id = format!("{}-step-{}", escape_id_segment(&step.agent), step.sequence);
    let step_type = step.kind.as_str();

    let mut items = Vec::with_capacity(step.tool_calls.len() + 1);
    items.push(TimelineItem {
        id: step_id.clone(),
        group: step.agent.clone(),
        subgroup: step_id.clone(),
        content: format!("Step {}: {}", step.sequence, step_type),
        start: start.clone(),
        end: step.end_time.and_then(format_timestamp),
        item_type: ItemType::Range,
        class_name: step_type.to_string(),
        title: step.content.clone(),
    });

    for call in &step.tool_calls {
        items.push(TimelineItem {
            id: format!("{step_id}-call-{}", call.index),
            group: step.agent.clone(),
            subgroup: step_id.clone(),
            content: format!("🔧 {}", call.name),
            start: start.clone(),
            end: None,
            item_type: ItemType::Point,
            class_name: "tool_call".to_string(),
            title: serde_json::to_string_pretty(&call.to_wire()).ok(),
        });
    }
    Some(items)
}
