use crate::config::DetectorConfig;
use crate::detect::scan_grid;
use crate::grid::{ConflictRecord, ResourceType, TimeSlot, WeekGrid, Weekday};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
}

/// Flat, display-ready view of one embedded conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConflict {
    pub day: Weekday,
    pub time_slot: TimeSlot,
    /// Position in the slot's conflict list.
    pub index: usize,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub message: String,
    pub severity: Severity,
    pub program: String,
    pub branch: String,
    pub semester: String,
    pub batch: String,
    pub program_type: String,
    pub conflicting_resource: String,
    pub conflicting_course: String,
    pub ignorable: bool,
    pub dismissal_key: String,
}

/// Scans a copy of `target`; the caller's grid is left untouched.
pub fn embed(
    target: &WeekGrid,
    saved: &[WeekGrid],
    drafts: &[WeekGrid],
    cfg: &DetectorConfig,
) -> WeekGrid {
    let mut annotated = target.clone();
    scan_grid(&mut annotated, saved, drafts, cfg);
    annotated
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

pub fn conflict_message(c: &ConflictRecord) -> String {
    let program = or_placeholder(&c.program, "Unknown Program");
    let branch = or_placeholder(&c.branch, "Unknown Branch");
    let semester = or_placeholder(&c.semester, "Unknown Semester");
    let batch = if c.batch.trim().is_empty() {
        String::new()
    } else {
        format!(" ({})", c.batch)
    };
    let details = format!("{} {} - Sem {}{}", program, branch, semester, batch);
    let course = or_placeholder(&c.conflicting_course, "Unknown Course");

    match c.resource_type {
        ResourceType::Teacher => format!(
            "Teacher \"{}\" is already teaching \"{}\" for {}",
            or_placeholder(&c.resource_name, "Unknown Teacher"),
            course,
            details
        ),
        ResourceType::Room => format!(
            "Room \"{}\" is already booked for \"{}\" for {}",
            or_placeholder(&c.resource_name, "Unknown Room"),
            course,
            details
        ),
    }
}

/// Composite key a UI can keep in its own "hide this warning" set.
pub fn dismissal_key(day: Weekday, slot: TimeSlot, c: &ConflictRecord) -> String {
    format!(
        "{}|{}|{}|{}",
        day,
        slot,
        c.resource_type.as_str(),
        c.other_key()
    )
}

pub fn extract_for_display(annotated: &WeekGrid) -> Vec<DisplayConflict> {
    let mut out = Vec::new();
    for (day, slot, a) in annotated.cells() {
        let Some(conflicts) = a.conflicts.as_ref() else {
            continue;
        };
        for (index, c) in conflicts.iter().enumerate() {
            out.push(DisplayConflict {
                day,
                time_slot: slot,
                index,
                resource_type: c.resource_type,
                message: conflict_message(c),
                severity: Severity::High,
                program: c.program.clone(),
                branch: c.branch.clone(),
                semester: c.semester.clone(),
                batch: c.batch.clone(),
                program_type: c.academic_type.clone(),
                conflicting_resource: c.resource_name.clone(),
                conflicting_course: c.conflicting_course.clone(),
                ignorable: c.ignorable,
                dismissal_key: dismissal_key(day, slot, c),
            });
        }
    }
    out
}

/// Drops records whose dismissal key the caller has hidden.
pub fn without_dismissed(
    records: Vec<DisplayConflict>,
    dismissed: &HashSet<String>,
) -> Vec<DisplayConflict> {
    records
        .into_iter()
        .filter(|r| !dismissed.contains(&r.dismissal_key))
        .collect()
}
