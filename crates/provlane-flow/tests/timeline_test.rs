//! Timeline projection tests

use provlane_flow::{ItemType, TimelineProjector};
use provlane_types::EventRecord;
use serde_json::{json, Value};

fn record(value: Value) -> EventRecord {
    EventRecord::parse(value).unwrap()
}

#[test]
fn test_step_becomes_range_with_tool_points() {
    println!("🧪 Testing timeline projection of one step");
    let mut timeline = TimelineProjector::new();
    let delta = timeline.apply(&record(json!({
        "type": "action",
        "agent": "A",
        "sequence": 1,
        "start_time": 0.0,
        "end_time": 1.5,
        "model_output": "thinking",
        "tool_calls": [
            {"name": "search", "arguments": {"q": "x"}},
            {"name": "fetch", "arguments": {"url": "u"}}
        ],
    })));

    assert_eq!(delta.groups_added.len(), 1);
    assert_eq!(delta.groups_added[0].id, "A");
    assert_eq!(delta.items_upserted.len(), 3);

    let snapshot = timeline.snapshot();
    let range = &snapshot.items[0];
    assert_eq!(range.id, "A-step-1");
    assert_eq!(range.item_type, ItemType::Range);
    assert_eq!(range.content, "Step 1: action");
    assert_eq!(range.start, "1970-01-01T00:00:00.000Z");
    assert_eq!(range.end.as_deref(), Some("1970-01-01T00:00:01.500Z"));
    assert_eq!(range.class_name, "action");
    assert_eq!(range.title.as_deref(), Some("thinking"));

    let point = &snapshot.items[1];
    assert_eq!(point.id, "A-step-1-call-0");
    assert_eq!(point.item_type, ItemType::Point);
    assert_eq!(point.content, "🔧 search");
    assert_eq!(point.start, range.start);
    assert_eq!(point.subgroup, range.id);
    assert!(point.title.as_deref().unwrap().contains("\"q\": \"x\""));
    assert_eq!(snapshot.items[2].id, "A-step-1-call-1");
    println!("✅ Timeline projection verified");
}

#[test]
fn test_in_progress_step_gets_end_on_update() {
    let mut timeline = TimelineProjector::new();
    timeline.apply(&record(json!({
        "type": "action", "agent": "A", "sequence": 1, "start_time": 10.0
    })));
    assert!(timeline.snapshot().items[0].is_in_progress());

    let delta = timeline.apply(&record(json!({
        "type": "action", "agent": "A", "sequence": 1, "start_time": 10.0, "end_time": 12.0
    })));
    assert!(delta.groups_added.is_empty());
    assert_eq!(delta.items_upserted.len(), 1);
    assert!(!timeline.snapshot().items[0].is_in_progress());
    assert_eq!(timeline.item_count(), 1);
}

#[test]
fn test_step_without_start_time_is_not_placed() {
    let mut timeline = TimelineProjector::new();
    let delta = timeline.apply(&record(json!({
        "type": "action", "agent": "A", "sequence": 1
    })));
    assert!(delta.items_upserted.is_empty());
    assert_eq!(timeline.item_count(), 0);
}

#[test]
fn test_removed_tool_calls_are_reported() {
    let mut timeline = TimelineProjector::new();
    timeline.apply(&record(json!({
        "type": "action", "agent": "A", "sequence": 1, "start_time": 1.0,
        "tool_calls": [{"name": "a"}, {"name": "b"}]
    })));
    let delta = timeline.apply(&record(json!({
        "type": "action", "agent": "A", "sequence": 1, "start_time": 1.0,
        "tool_calls": [{"name": "a"}]
    })));
    assert_eq!(delta.items_removed, vec!["A-step-1-call-1".to_string()]);
    assert_eq!(timeline.item_count(), 2);
}

#[test]
fn test_groups_follow_first_appearance_and_items_sort_by_sequence() {
    let mut timeline = TimelineProjector::new();
    for (agent, sequence) in [("worker", 2), ("manager", 1), ("worker", 1)] {
        timeline.apply(&record(json!({
            "type": "action", "agent": agent, "sequence": sequence,
            "start_time": sequence as f64
        })));
    }
    let snapshot = timeline.snapshot();
    let groups: Vec<&str> = snapshot.groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(groups, vec!["worker", "manager"]);
    let ids: Vec<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["worker-step-1", "worker-step-2", "manager-step-1"]);
    assert_eq!(timeline.group_count(), 2);
}

#[test]
fn test_item_ids_escape_agent_names() {
    let mut timeline = TimelineProjector::new();
    timeline.apply(&record(json!({
        "type": "action", "agent": "team:lead", "sequence": 3, "start_time": 1.0,
        "tool_calls": [{"name": "search", "arguments": {}}]
    })));
    let snapshot = timeline.snapshot();
    assert_eq!(snapshot.groups[0].id, "team:lead");
    let ids: Vec<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["team%3Alead-step-3", "team%3Alead-step-3-call-0"]);
}

#[test]
fn test_snapshot_serializes_vis_timeline_fields() {
    let mut timeline = TimelineProjector::new();
    timeline.apply(&record(json!({
        "type": "planning", "agent": "A", "sequence": 0, "start_time": 5.0, "plan": "p"
    })));
    let value = serde_json::to_value(timeline.snapshot()).unwrap();
    let item = &value["items"][0];
    assert_eq!(item["type"], "range");
    assert_eq!(item["className"], "planning");
    assert_eq!(item["group"], "A");
    assert!(item.get("end").is_none());
}
