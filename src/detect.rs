use crate::config::DetectorConfig;
use crate::grid::{ConflictRecord, ResourceType, SlotAssignment, TimeSlot, WeekGrid, Weekday};
use std::collections::HashSet;

/// Both slots name the same teacher (or room), ignoring case and surrounding
/// whitespace. Values shorter than the configured minimum never match.
pub fn slots_collide(
    a: &SlotAssignment,
    b: &SlotAssignment,
    resource_type: ResourceType,
    cfg: &DetectorConfig,
) -> bool {
    let min_len = match resource_type {
        ResourceType::Teacher => cfg.teacher_min_length,
        ResourceType::Room => cfg.room_min_length,
    };
    let va = a.resource(resource_type).trim();
    let vb = b.resource(resource_type).trim();
    if va.is_empty() || vb.is_empty() {
        return false;
    }
    if va.chars().count() < min_len || vb.chars().count() < min_len {
        return false;
    }
    va.to_lowercase() == vb.to_lowercase()
}

/// A grid takes part in conflict math only once program, branch, semester and
/// academic type are all filled in.
pub fn is_eligible_for_conflict_check(grid: &WeekGrid) -> bool {
    [&grid.program, &grid.branch, &grid.semester, &grid.academic_type]
        .iter()
        .all(|f| !f.trim().is_empty())
}

pub fn conflict_record(
    resource_type: ResourceType,
    other: &WeekGrid,
    slot: &SlotAssignment,
    other_slot: &SlotAssignment,
) -> ConflictRecord {
    ConflictRecord {
        resource_type,
        resource_name: slot.resource(resource_type).to_string(),
        conflicting_course: other_slot.course.clone(),
        program: other.program.clone(),
        branch: other.branch.clone(),
        semester: other.semester.clone(),
        batch: other.batch.clone(),
        academic_type: other.academic_type.clone(),
        ignorable: false,
    }
}

/// All collisions between `slot` and the same cell of each candidate, in
/// candidate order, teacher before room within a candidate.
pub fn find_slot_conflicts<'a, I>(
    day: Weekday,
    time_slot: TimeSlot,
    slot: &SlotAssignment,
    candidates: I,
    exclude_id: Option<&str>,
    cfg: &DetectorConfig,
) -> Vec<ConflictRecord>
where
    I: IntoIterator<Item = &'a WeekGrid>,
{
    let mut out = Vec::new();
    for candidate in candidates {
        if exclude_id.is_some() && candidate.id.as_deref() == exclude_id {
            continue;
        }
        if !is_eligible_for_conflict_check(candidate) {
            continue;
        }
        let Some(other) = candidate.cell(day, time_slot) else {
            continue;
        };
        if other.is_empty() {
            continue;
        }
        for resource_type in ResourceType::ALL {
            if slots_collide(slot, other, resource_type, cfg) {
                out.push(conflict_record(resource_type, candidate, slot, other));
            }
        }
    }
    out
}

/// Draft collisions first; a saved collision is kept only when no draft
/// collision of the same resource type exists for this slot.
pub(crate) fn prioritized_conflicts(
    day: Weekday,
    time_slot: TimeSlot,
    slot: &SlotAssignment,
    drafts: &[&WeekGrid],
    saved: &[&WeekGrid],
    cfg: &DetectorConfig,
) -> Vec<ConflictRecord> {
    let mut found = find_slot_conflicts(day, time_slot, slot, drafts.iter().copied(), None, cfg);
    let draft_types: HashSet<ResourceType> = found.iter().map(|c| c.resource_type).collect();
    let from_saved = find_slot_conflicts(day, time_slot, slot, saved.iter().copied(), None, cfg);
    found.extend(
        from_saved
            .into_iter()
            .filter(|c| !draft_types.contains(&c.resource_type)),
    );
    found
}

/// `other` is the target itself: the same id, or for a target without an id
/// an id-less grid under the same logical key.
pub(crate) fn is_same_timetable(target: &WeekGrid, other: &WeekGrid) -> bool {
    match target.id.as_deref() {
        Some(id) => other.id.as_deref() == Some(id),
        None => other.id.is_none() && other.key() == target.key(),
    }
}

pub(crate) struct CandidateSets<'a> {
    pub drafts: Vec<&'a WeekGrid>,
    pub saved: Vec<&'a WeekGrid>,
}

/// Drafts other than the target, then saved grids that are neither the target
/// nor already open as a draft.
pub(crate) fn candidate_sets<'a>(
    target: &WeekGrid,
    saved: &'a [WeekGrid],
    drafts: &'a [WeekGrid],
) -> CandidateSets<'a> {
    let is_target = |g: &WeekGrid| is_same_timetable(target, g);
    let draft_ids: HashSet<&str> = drafts.iter().filter_map(|g| g.id.as_deref()).collect();
    CandidateSets {
        drafts: drafts.iter().filter(|g| !is_target(*g)).collect(),
        saved: saved
            .iter()
            .filter(|g| !is_target(*g))
            .filter(|g| g.id.as_deref().map_or(true, |id| !draft_ids.contains(id)))
            .collect(),
    }
}

/// Annotates every non-empty slot of `target` in place. Each slot's conflict
/// list is replaced wholesale; empty slots end up with none. An ineligible
/// target carries no conflicts at all.
pub fn scan_grid(
    target: &mut WeekGrid,
    saved: &[WeekGrid],
    drafts: &[WeekGrid],
    cfg: &DetectorConfig,
) {
    if !is_eligible_for_conflict_check(target) {
        target.clear_conflicts();
        return;
    }

    let sets = candidate_sets(target, saved, drafts);
    let mut total = 0usize;
    for (day, slots) in target.days.iter_mut() {
        for (time_slot, assignment) in slots.iter_mut() {
            if assignment.is_empty() {
                assignment.conflicts = None;
                continue;
            }
            let found =
                prioritized_conflicts(*day, *time_slot, assignment, &sets.drafts, &sets.saved, cfg);
            total += found.len();
            assignment.conflicts = Some(found);
        }
    }
    target.checked = true;

    tracing::debug!(
        timetable = %target.key(),
        drafts = sets.drafts.len(),
        saved = sets.saved.len(),
        conflicts = total,
        "scanned timetable"
    );
}
