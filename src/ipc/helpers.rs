use crate::config::DetectorConfig;
use crate::db;
use crate::grid::{ConflictRecord, ResourceType, SlotAssignment, TimeSlot, WeekGrid, Weekday};
use crate::ipc::types::AppState;
use serde_json::Value;
use std::collections::HashSet;

pub fn get_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

pub fn get_grid(params: &Value, key: &str) -> Result<WeekGrid, String> {
    match params.get(key) {
        Some(v) if v.is_object() => Ok(WeekGrid::from_value(v)),
        Some(_) => Err(format!("{} must be an object", key)),
        None => Err(format!("missing {}", key)),
    }
}

/// Optional array of grid objects; absent means empty.
pub fn get_grids(params: &Value, key: &str) -> Result<Vec<WeekGrid>, String> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if item.is_object() {
                Ok(WeekGrid::from_value(item))
            } else {
                Err(format!("{}[{}] must be an object", key, i))
            }
        })
        .collect()
}

pub fn get_day(params: &Value) -> Result<Weekday, String> {
    let raw = get_str(params, "day")?;
    Weekday::parse(raw).ok_or_else(|| format!("unknown day: {}", raw))
}

pub fn get_time_slot(params: &Value) -> Result<TimeSlot, String> {
    let raw = get_str(params, "timeSlot")?;
    TimeSlot::parse(raw).ok_or_else(|| format!("unknown timeSlot: {}", raw))
}

pub fn get_resource_type(params: &Value) -> Result<ResourceType, String> {
    let raw = get_str(params, "type")?;
    ResourceType::parse(raw).ok_or_else(|| format!("unknown resource type: {}", raw))
}

pub fn get_slot(params: &Value, key: &str) -> Result<SlotAssignment, String> {
    match params.get(key) {
        Some(v) if v.is_object() => Ok(SlotAssignment::from_value(v)),
        _ => Err(format!("{} must be an object", key)),
    }
}

pub fn get_index(params: &Value) -> Result<usize, String> {
    params
        .get("index")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| "index must be a non-negative integer".to_string())
}

pub fn get_records(params: &Value, key: &str) -> Result<Vec<ConflictRecord>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| format!("invalid {}: {}", key, e)),
    }
}

pub fn get_dismissed(params: &Value) -> Result<HashSet<String>, String> {
    match params.get("dismissed") {
        None | Some(Value::Null) => Ok(HashSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| "dismissed must hold strings".to_string())
            })
            .collect(),
        Some(_) => Err("dismissed must be an array".to_string()),
    }
}

/// Saved grids of the open workspace; none without one.
pub fn saved_grids(state: &AppState) -> anyhow::Result<Vec<WeekGrid>> {
    match state.db.as_ref() {
        Some(conn) => db::list_timetables(conn),
        None => Ok(Vec::new()),
    }
}

pub fn detector_config(state: &AppState) -> DetectorConfig {
    DetectorConfig::load_or_default(state.db.as_ref())
}

/// Drafts followed by the saved grids that are not open as drafts.
pub fn candidate_pool(saved: Vec<WeekGrid>, drafts: &[WeekGrid]) -> Vec<WeekGrid> {
    let draft_ids: HashSet<&str> = drafts.iter().filter_map(|g| g.id.as_deref()).collect();
    let mut pool = drafts.to_vec();
    pool.extend(
        saved
            .into_iter()
            .filter(|g| g.id.as_deref().map_or(true, |id| !draft_ids.contains(id))),
    );
    pool
}
