use crate::config::DetectorConfig;
use crate::detect::find_slot_conflicts;
use crate::grid::{ConflictRecord, ResourceType, SlotAssignment, TimeSlot, WeekGrid, Weekday};
use crate::index::ConflictIndex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const MAX_SUGGESTIONS: usize = 5;

/// Percentage with one decimal; zero when there is nothing to divide by.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}

fn same_name(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a.to_lowercase() == b.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateCheck {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictRecord>,
    pub can_proceed: bool,
}

/// Checks a cell while it is being edited. Records matching an already
/// acknowledged record in `previous` stay acknowledged, so the edit may
/// proceed when every remaining collision has been accepted.
pub fn check_immediate(
    day: Weekday,
    slot: TimeSlot,
    assignment: &SlotAssignment,
    candidates: &[WeekGrid],
    exclude_id: Option<&str>,
    previous: &[ConflictRecord],
    cfg: &DetectorConfig,
) -> ImmediateCheck {
    let mut conflicts = if assignment.is_empty() {
        Vec::new()
    } else {
        find_slot_conflicts(day, slot, assignment, candidates, exclude_id, cfg)
    };
    for c in conflicts.iter_mut() {
        c.ignorable = previous.iter().any(|p| p.ignorable && p.same_source(c));
    }
    ImmediateCheck {
        has_conflicts: !conflicts.is_empty(),
        can_proceed: conflicts.iter().all(|c| c.ignorable),
        conflicts,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictStatistics {
    pub total: usize,
    pub teacher: usize,
    pub room: usize,
    pub ignorable: usize,
    pub blocking: usize,
    pub has_conflicts: bool,
}

pub fn conflict_statistics(grid: &WeekGrid) -> ConflictStatistics {
    let mut stats = ConflictStatistics::default();
    for (_, _, c) in grid.conflicts() {
        stats.total += 1;
        match c.resource_type {
            ResourceType::Teacher => stats.teacher += 1,
            ResourceType::Room => stats.room += 1,
        }
        if c.ignorable {
            stats.ignorable += 1;
        } else {
            stats.blocking += 1;
        }
    }
    stats.has_conflicts = stats.total > 0;
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSummary {
    pub total_conflicts: usize,
    pub teacher_conflicts: usize,
    pub room_conflicts: usize,
    pub timetables_with_conflicts: usize,
    pub total_timetables: usize,
    pub conflict_rate: f64,
}

pub fn overall_conflict_summary(grids: &[WeekGrid]) -> ConflictSummary {
    let mut summary = ConflictSummary {
        total_conflicts: 0,
        teacher_conflicts: 0,
        room_conflicts: 0,
        timetables_with_conflicts: 0,
        total_timetables: grids.len(),
        conflict_rate: 0.0,
    };
    for g in grids {
        let stats = conflict_statistics(g);
        if stats.has_conflicts {
            summary.timetables_with_conflicts += 1;
            summary.total_conflicts += stats.total;
            summary.teacher_conflicts += stats.teacher;
            summary.room_conflicts += stats.room;
        }
    }
    summary.conflict_rate = percent(summary.timetables_with_conflicts, grids.len());
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUse {
    pub timetable_id: Option<String>,
    pub identifier: String,
    pub slot: SlotAssignment,
}

/// Every timetable using `name` as its teacher (or room) in the given cell.
pub fn find_conflicting_timetables(
    resource_type: ResourceType,
    name: &str,
    day: Weekday,
    slot: TimeSlot,
    grids: &[WeekGrid],
) -> Vec<ResourceUse> {
    if name.trim().is_empty() {
        return Vec::new();
    }
    let index = ConflictIndex::build(grids);
    index
        .grids_at(resource_type, name, day, slot)
        .filter_map(|i| {
            let g = &grids[i];
            let cell = g.cell(day, slot)?;
            Some(ResourceUse {
                timetable_id: g.id.clone(),
                identifier: g.key().to_string(),
                slot: SlotAssignment {
                    conflicts: None,
                    ..cell.clone()
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSuggestion {
    pub day: Weekday,
    pub time_slot: TimeSlot,
    pub suggestion: String,
}

/// Free cells of `grid` where its assignment at (`day`, `slot`) would collide
/// with nothing: other slots the same day first, then the same slot on other
/// days. At most five.
pub fn suggest_alternative_slots(
    grid: &WeekGrid,
    day: Weekday,
    slot: TimeSlot,
    candidates: &[WeekGrid],
    cfg: &DetectorConfig,
) -> Vec<SlotSuggestion> {
    let Some(current) = grid.cell(day, slot).filter(|a| !a.is_empty()) else {
        return Vec::new();
    };

    let same_day = TimeSlot::all().filter(|s| *s != slot).map(|s| (day, s));
    let other_days = Weekday::ALL
        .into_iter()
        .filter(|d| *d != day)
        .map(|d| (d, slot));

    same_day
        .chain(other_days)
        .filter(|(d, s)| grid.cell(*d, *s).map_or(true, |a| a.is_empty()))
        .filter(|(d, s)| {
            find_slot_conflicts(*d, *s, current, candidates, grid.id.as_deref(), cfg).is_empty()
        })
        .take(MAX_SUGGESTIONS)
        .map(|(d, s)| SlotSuggestion {
            day: d,
            time_slot: s,
            suggestion: format!("Move to {} {}", d, s),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableStatistics {
    pub total_timetables: usize,
    pub programs: usize,
    pub branches: usize,
    pub semesters: usize,
    pub total_slots: usize,
    pub filled_slots: usize,
    pub utilization_rate: f64,
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .filter(|v| !v.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn timetable_statistics(grids: &[WeekGrid]) -> TimetableStatistics {
    let total_slots = grids.len() * Weekday::ALL.len() * TimeSlot::all().count();
    let filled_slots = grids
        .iter()
        .flat_map(|g| g.cells())
        .filter(|(_, _, a)| !a.is_empty())
        .count();

    TimetableStatistics {
        total_timetables: grids.len(),
        programs: distinct(grids.iter().map(|g| g.program.as_str())),
        branches: distinct(grids.iter().map(|g| g.branch.as_str())),
        semesters: distinct(grids.iter().map(|g| g.semester.as_str())),
        total_slots,
        filled_slots,
        utilization_rate: percent(filled_slots, total_slots),
    }
}

/// Cells with a course scheduled.
pub fn scheduled_hours(grid: &WeekGrid) -> usize {
    grid.cells()
        .filter(|(_, _, a)| !a.course.trim().is_empty())
        .count()
}

fn timetable_info(g: &WeekGrid) -> String {
    format!("{} - {} - Sem {}", g.program, g.branch, g.semester)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub course: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    pub timetable_info: String,
}

/// Day → slot → bookings. Every day and slot is present, possibly empty.
pub type WeeklyBookings = BTreeMap<Weekday, BTreeMap<TimeSlot, Vec<Booking>>>;

fn empty_week() -> WeeklyBookings {
    Weekday::ALL
        .into_iter()
        .map(|d| (d, TimeSlot::all().map(|s| (s, Vec::new())).collect()))
        .collect()
}

fn collect_bookings(
    grids: &[WeekGrid],
    resource_type: ResourceType,
    name: &str,
) -> WeeklyBookings {
    let mut week = empty_week();
    for g in grids {
        for (day, slot, a) in g.cells() {
            if !same_name(a.resource(resource_type), name) {
                continue;
            }
            let booking = match resource_type {
                ResourceType::Teacher => Booking {
                    course: a.course.clone(),
                    room: Some(a.room.clone()),
                    teacher: None,
                    timetable_info: timetable_info(g),
                },
                ResourceType::Room => Booking {
                    course: a.course.clone(),
                    room: None,
                    teacher: Some(a.teacher.clone()),
                    timetable_info: timetable_info(g),
                },
            };
            if let Some(list) = week.get_mut(&day).and_then(|d| d.get_mut(&slot)) {
                list.push(booking);
            }
        }
    }
    week
}

pub fn teacher_schedule(grids: &[WeekGrid], teacher: &str) -> WeeklyBookings {
    collect_bookings(grids, ResourceType::Teacher, teacher)
}

pub fn room_utilization(grids: &[WeekGrid], room: &str) -> WeeklyBookings {
    collect_bookings(grids, ResourceType::Room, room)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::embed;
    use crate::fixtures::{assign, grid, slot, smith_pair};
    use crate::reconcile::mark_ignorable;

    fn cfg() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn immediate_check_blocks_until_acknowledged() {
        let (g1, g2) = smith_pair();
        let a = SlotAssignment::new("CS101", "dr. smith", "R9");
        let first = check_immediate(
            Weekday::Monday,
            slot("9:00-10:00"),
            &a,
            &[g1.clone(), g2.clone()],
            Some("g1"),
            &[],
            &cfg(),
        );
        assert!(first.has_conflicts);
        assert!(!first.can_proceed);

        let mut acked = first.conflicts.clone();
        acked[0].ignorable = true;
        let second = check_immediate(
            Weekday::Monday,
            slot("9:00-10:00"),
            &a,
            &[g1, g2],
            Some("g1"),
            &acked,
            &cfg(),
        );
        assert!(second.has_conflicts);
        assert!(second.can_proceed);
    }

    #[test]
    fn immediate_check_on_empty_cell_can_proceed() {
        let (_, g2) = smith_pair();
        let out = check_immediate(
            Weekday::Monday,
            slot("9:00-10:00"),
            &SlotAssignment::default(),
            &[g2],
            None,
            &[],
            &cfg(),
        );
        assert!(!out.has_conflicts);
        assert!(out.can_proceed);
    }

    #[test]
    fn statistics_split_by_type_and_acknowledgement() {
        let (mut g1, g2) = smith_pair();
        assign(&mut g1, Weekday::Monday, "9:00-10:00", "CS101", "Dr. Smith", "R202");
        let annotated = embed(&g1, &[g2.clone()], &[], &cfg());
        let acked = mark_ignorable(&annotated, Weekday::Monday, slot("9:00-10:00"), 1);
        let stats = conflict_statistics(&acked);
        assert_eq!(
            stats,
            ConflictStatistics {
                total: 2,
                teacher: 1,
                room: 1,
                ignorable: 1,
                blocking: 1,
                has_conflicts: true,
            }
        );

        let summary = overall_conflict_summary(&[acked, g2, grid("g9", "B", "C", "1", "part-time")]);
        assert_eq!(summary.total_timetables, 3);
        assert_eq!(summary.timetables_with_conflicts, 1);
        assert_eq!(summary.total_conflicts, 2);
        assert_eq!(summary.conflict_rate, 33.3);
        assert_eq!(overall_conflict_summary(&[]).conflict_rate, 0.0);
    }

    #[test]
    fn finds_every_user_of_a_resource_in_a_cell() {
        let (g1, mut g2) = smith_pair();
        g2.batch = "A".into();
        let hits = find_conflicting_timetables(
            ResourceType::Teacher,
            " DR. SMITH",
            Weekday::Monday,
            slot("9:00-10:00"),
            &[g1, g2],
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].identifier, "BTech-CSE-Sem1-full-time");
        assert_eq!(hits[1].identifier, "BTech-ECE-Sem1-full-time-A");
        assert_eq!(hits[1].slot.room, "R202");
    }

    #[test]
    fn suggestions_skip_busy_cells_and_cap_at_five() {
        let (g1, mut g2) = smith_pair();
        assign(&mut g2, Weekday::Monday, "7:00-8:00", "EC102", "Dr. Smith", "R202");
        let out = suggest_alternative_slots(&g1, Weekday::Monday, slot("9:00-10:00"), &[g2], &cfg());
        assert_eq!(out.len(), MAX_SUGGESTIONS);
        assert_eq!(out[0].time_slot, slot("8:00-9:00"));
        assert!(out.iter().all(|s| s.day == Weekday::Monday));
        assert_eq!(out[0].suggestion, "Move to monday 8:00-9:00");

        let nothing = suggest_alternative_slots(&g1, Weekday::Friday, slot("9:00-10:00"), &[], &cfg());
        assert!(nothing.is_empty());
    }

    #[test]
    fn statistics_over_saved_grids() {
        let (g1, g2) = smith_pair();
        let stats = timetable_statistics(&[g1.clone(), g2]);
        assert_eq!(stats.total_timetables, 2);
        assert_eq!(stats.programs, 1);
        assert_eq!(stats.branches, 2);
        assert_eq!(stats.semesters, 1);
        assert_eq!(stats.total_slots, 144);
        assert_eq!(stats.filled_slots, 2);
        assert_eq!(stats.utilization_rate, 1.4);
        assert_eq!(scheduled_hours(&g1), 1);
    }

    #[test]
    fn schedule_views_cover_the_whole_week() {
        let (g1, g2) = smith_pair();
        let grids = [g1, g2];
        let week = teacher_schedule(&grids, "dr. smith");
        assert_eq!(week.len(), 6);
        assert!(week.values().all(|d| d.len() == 12));
        let monday = &week[&Weekday::Monday][&slot("9:00-10:00")];
        assert_eq!(monday.len(), 2);
        assert_eq!(monday[0].timetable_info, "BTech - CSE - Sem 1");
        assert_eq!(monday[1].room.as_deref(), Some("R202"));

        let rooms = room_utilization(&grids, "R101");
        let v = serde_json::to_value(&rooms).unwrap();
        assert_eq!(v["monday"]["9:00-10:00"][0]["teacher"], "Dr. Smith");
        assert!(v["monday"]["9:00-10:00"][0].get("room").is_none());
        assert_eq!(v["friday"]["9:00-10:00"], serde_json::json!([]));
    }
}
