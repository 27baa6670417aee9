use crate::config::DetectorConfig;
use crate::detect::{is_eligible_for_conflict_check, is_same_timetable, prioritized_conflicts};
use crate::grid::{ResourceType, TimeSlot, WeekGrid, Weekday};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// Position of the grid in the batch the index was built from.
    pub grid: usize,
    pub day: Weekday,
    pub slot: TimeSlot,
}

/// Inverted map from (resource type, normalized name) to every cell using it.
/// Built per batch and thrown away afterwards.
#[derive(Debug, Default)]
pub struct ConflictIndex {
    entries: HashMap<(ResourceType, String), Vec<Occurrence>>,
}

fn index_name(value: &str) -> String {
    value.trim().to_lowercase()
}

impl ConflictIndex {
    pub fn build<'a, I>(grids: I) -> Self
    where
        I: IntoIterator<Item = &'a WeekGrid>,
    {
        let mut entries: HashMap<(ResourceType, String), Vec<Occurrence>> = HashMap::new();
        for (i, g) in grids.into_iter().enumerate() {
            for (day, slot, a) in g.cells() {
                if a.is_empty() {
                    continue;
                }
                for rt in ResourceType::ALL {
                    let name = index_name(a.resource(rt));
                    if name.is_empty() {
                        continue;
                    }
                    entries.entry((rt, name)).or_default().push(Occurrence {
                        grid: i,
                        day,
                        slot,
                    });
                }
            }
        }
        Self { entries }
    }

    pub fn occurrences(&self, resource_type: ResourceType, name: &str) -> &[Occurrence] {
        self.entries
            .get(&(resource_type, index_name(name)))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Batch positions of grids using `name` in the given cell.
    pub fn grids_at(
        &self,
        resource_type: ResourceType,
        name: &str,
        day: Weekday,
        slot: TimeSlot,
    ) -> impl Iterator<Item = usize> + '_ {
        self.occurrences(resource_type, name)
            .iter()
            .filter(move |o| o.day == day && o.slot == slot)
            .map(|o| o.grid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Scans every grid of `targets` with the whole batch as drafts and `saved` as
/// persisted records. Produces the same records as running `scan_grid` per
/// target, but only compares cells that share a resource name.
pub fn scan_batch(targets: &[WeekGrid], saved: &[WeekGrid], cfg: &DetectorConfig) -> Vec<WeekGrid> {
    let index = ConflictIndex::build(targets.iter().chain(saved.iter()));
    let draft_ids: HashSet<&str> = targets.iter().filter_map(|g| g.id.as_deref()).collect();
    let n = targets.len();

    let mut out = Vec::with_capacity(n);
    for (ti, target) in targets.iter().enumerate() {
        let mut annotated = target.clone();
        if !is_eligible_for_conflict_check(target) {
            annotated.clear_conflicts();
            out.push(annotated);
            continue;
        }

        let same_as_target = |g: &WeekGrid| is_same_timetable(target, g);

        for (day, slots) in annotated.days.iter_mut() {
            for (slot, assignment) in slots.iter_mut() {
                if assignment.is_empty() {
                    assignment.conflicts = None;
                    continue;
                }

                let mut hits = BTreeSet::new();
                for rt in ResourceType::ALL {
                    hits.extend(index.grids_at(rt, assignment.resource(rt), *day, *slot));
                }

                let mut drafts = Vec::new();
                let mut saved_hits = Vec::new();
                for j in hits {
                    if j < n {
                        if j != ti && !same_as_target(&targets[j]) {
                            drafts.push(&targets[j]);
                        }
                    } else {
                        let g = &saved[j - n];
                        let open_as_draft = g.id.as_deref().is_some_and(|id| draft_ids.contains(id));
                        if !same_as_target(g) && !open_as_draft {
                            saved_hits.push(g);
                        }
                    }
                }

                assignment.conflicts = Some(prioritized_conflicts(
                    *day,
                    *slot,
                    assignment,
                    &drafts,
                    &saved_hits,
                    cfg,
                ));
            }
        }
        annotated.checked = true;
        out.push(annotated);
    }

    tracing::debug!(
        timetables = n,
        saved = saved.len(),
        resources = index.len(),
        "batch scan finished"
    );
    out
}
