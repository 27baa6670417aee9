use crate::config::DetectorConfig;
use crate::detect::{find_slot_conflicts, is_eligible_for_conflict_check, is_same_timetable};
use crate::grid::{TimeSlot, WeekGrid, Weekday};

/// Drops stored conflict records that no longer hold against the current
/// saved and draft grids. Surviving records keep their `ignorable` flag.
/// Slots left without records lose their `conflicts` field entirely.
pub fn resolve(
    grid: &WeekGrid,
    saved: &[WeekGrid],
    drafts: &[WeekGrid],
    cfg: &DetectorConfig,
) -> WeekGrid {
    let mut out = grid.clone();
    let eligible = is_eligible_for_conflict_check(grid);
    let mut dropped = 0usize;

    for (day, slots) in out.days.iter_mut() {
        for (time_slot, assignment) in slots.iter_mut() {
            let Some(stored) = assignment.conflicts.take() else {
                continue;
            };
            if stored.is_empty() {
                continue;
            }
            let current = if eligible {
                find_slot_conflicts(
                    *day,
                    *time_slot,
                    assignment,
                    saved
                        .iter()
                        .chain(drafts.iter())
                        .filter(|g| !is_same_timetable(grid, g)),
                    None,
                    cfg,
                )
            } else {
                Vec::new()
            };
            let before = stored.len();
            let kept: Vec<_> = stored
                .into_iter()
                .filter(|r| current.iter().any(|c| c.same_source(r)))
                .collect();
            dropped += before - kept.len();
            if !kept.is_empty() {
                assignment.conflicts = Some(kept);
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(timetable = %grid.key(), dropped, "dropped stale conflicts");
    }
    out
}

/// Acknowledges one record. Out-of-range positions leave the grid unchanged.
pub fn mark_ignorable(grid: &WeekGrid, day: Weekday, slot: TimeSlot, index: usize) -> WeekGrid {
    let mut out = grid.clone();
    if let Some(record) = out
        .cell_mut(day, slot)
        .and_then(|a| a.conflicts.as_mut())
        .and_then(|list| list.get_mut(index))
    {
        record.ignorable = true;
    }
    out
}

pub fn drop_ignorable(grid: &WeekGrid) -> WeekGrid {
    let mut out = grid.clone();
    for slots in out.days.values_mut() {
        for assignment in slots.values_mut() {
            if let Some(list) = assignment.conflicts.as_mut() {
                list.retain(|r| !r.ignorable);
                if list.is_empty() {
                    assignment.conflicts = None;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::embed;
    use crate::fixtures::{assign, grid, slot, smith_pair};
    use crate::grid::{GridStatus, ResourceType};
    use proptest::prelude::*;

    fn cfg() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn record_against_deleted_grid_is_cleared() {
        let (g1, g2) = smith_pair();
        let annotated = embed(&g1, &[g2], &[], &cfg());
        assert_eq!(annotated.conflicts().count(), 1);

        let resolved = resolve(&annotated, &[], &[], &cfg());
        let cell = resolved.cell(Weekday::Monday, slot("9:00-10:00")).unwrap();
        assert!(cell.conflicts.is_none());
        assert_eq!(resolved.status(), GridStatus::Clean);
    }

    #[test]
    fn still_valid_records_survive_with_their_flags() {
        let (g1, g2) = smith_pair();
        let annotated = embed(&g1, &[g2.clone()], &[], &cfg());
        let acked = mark_ignorable(&annotated, Weekday::Monday, slot("9:00-10:00"), 0);
        let resolved = resolve(&acked, &[g2], &[], &cfg());
        let records: Vec<_> = resolved.conflicts().collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].2.ignorable);
    }

    #[test]
    fn moved_teacher_drops_only_that_type() {
        let (mut g1, mut g2) = smith_pair();
        g1.days
            .get_mut(&Weekday::Monday)
            .and_then(|d| d.get_mut(&slot("9:00-10:00")))
            .unwrap()
            .room = "R202".into();
        let annotated = embed(&g1, &[g2.clone()], &[], &cfg());
        assert_eq!(annotated.conflicts().count(), 2);

        assign(&mut g2, Weekday::Monday, "9:00-10:00", "EC101", "Prof. Rao", "R202");
        let resolved = resolve(&annotated, &[g2], &[], &cfg());
        let records: Vec<_> = resolved.conflicts().map(|(_, _, c)| c.clone()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_type, ResourceType::Room);
    }

    #[test]
    fn other_grid_rekeyed_counts_as_stale() {
        let (g1, mut g2) = smith_pair();
        let annotated = embed(&g1, &[g2.clone()], &[], &cfg());
        g2.semester = "3".into();
        let resolved = resolve(&annotated, &[], &[g2], &cfg());
        assert_eq!(resolved.conflicts().count(), 0);
    }

    #[test]
    fn id_less_grid_keeps_records_against_others_only() {
        let (mut g1, mut g2) = smith_pair();
        g1.id = None;
        g2.id = None;
        let annotated = embed(&g1, &[], &[g1.clone(), g2.clone()], &cfg());
        assert_eq!(annotated.conflicts().count(), 1);

        let resolved = resolve(&annotated, &[], &[g1.clone(), g2], &cfg());
        let records: Vec<_> = resolved.conflicts().map(|(_, _, c)| c.clone()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].branch, "ECE");

        let alone = resolve(&annotated, &[], &[g1], &cfg());
        assert_eq!(alone.conflicts().count(), 0);
    }

    #[test]
    fn mark_out_of_range_is_noop() {
        let (g1, g2) = smith_pair();
        let annotated = embed(&g1, &[g2], &[], &cfg());
        assert_eq!(mark_ignorable(&annotated, Weekday::Monday, slot("9:00-10:00"), 5), annotated);
        assert_eq!(mark_ignorable(&annotated, Weekday::Friday, slot("9:00-10:00"), 0), annotated);
    }

    #[test]
    fn drop_ignorable_removes_only_acknowledged() {
        let (g1, g2) = smith_pair();
        let mut g3 = grid("g3", "BTech", "ME", "1", "full-time");
        assign(&mut g3, Weekday::Monday, "9:00-10:00", "ME101", "Prof. Rao", "R101");
        let annotated = embed(&g1, &[g2, g3], &[], &cfg());
        assert_eq!(annotated.conflicts().count(), 2);

        let acked = mark_ignorable(&annotated, Weekday::Monday, slot("9:00-10:00"), 0);
        let kept = drop_ignorable(&acked);
        let records: Vec<_> = kept.conflicts().map(|(_, _, c)| c.clone()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_type, ResourceType::Room);

        let all_acked = mark_ignorable(&acked, Weekday::Monday, slot("9:00-10:00"), 1);
        let none_left = drop_ignorable(&all_acked);
        assert!(none_left
            .cell(Weekday::Monday, slot("9:00-10:00"))
            .unwrap()
            .conflicts
            .is_none());
    }

    const TEACHERS: [&str; 4] = ["Dr. Smith", "dr. smith ", "Prof. Rao", ""];
    const ROOMS: [&str; 3] = ["R101", "r101", "R2"];

    fn arb_grid(id: &'static str, branch: &'static str) -> impl Strategy<Value = WeekGrid> {
        prop::collection::vec((0usize..2, 0usize..3, 0usize..4, 0usize..3), 0..6).prop_map(
            move |cells| {
                let mut g = grid(id, "BTech", branch, "1", "full-time");
                for (d, s, t, r) in cells {
                    let label = TimeSlot::all().nth(s).unwrap().label();
                    assign(&mut g, Weekday::ALL[d], label, "C", TEACHERS[t], ROOMS[r]);
                }
                g
            },
        )
    }

    proptest! {
        #[test]
        fn resolve_is_idempotent(
            target in arb_grid("t", "CSE"),
            then in arb_grid("o", "ECE"),
            now in arb_grid("o", "ECE"),
        ) {
            let annotated = embed(&target, &[then], &[], &cfg());
            let once = resolve(&annotated, &[now.clone()], &[], &cfg());
            let twice = resolve(&once, &[now], &[], &cfg());
            prop_assert_eq!(once, twice);
        }
    }
}
