use crate::analysis;
use crate::embed::{embed, extract_for_display, without_dismissed};
use crate::grid::WeekGrid;
use crate::index::scan_batch;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    candidate_pool, detector_config, get_day, get_dismissed, get_grid, get_grids, get_index,
    get_records, get_resource_type, get_slot, get_str, get_time_slot, saved_grids,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile;
use serde_json::json;
use std::collections::HashSet;

fn grid_view(grid: &WeekGrid, dismissed: &HashSet<String>) -> serde_json::Value {
    let conflicts = without_dismissed(extract_for_display(grid), dismissed);
    json!({
        "timetable": grid,
        "status": grid.status(),
        "conflicts": conflicts,
        "statistics": analysis::conflict_statistics(grid),
    })
}

fn handle_conflicts_scan(state: &mut AppState, req: &Request) -> serde_json::Value {
    let target = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let dismissed = match get_dismissed(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let annotated = embed(&target, &saved, &drafts, &detector_config(state));
    ok(&req.id, grid_view(&annotated, &dismissed))
}

fn handle_conflicts_extract(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let dismissed = match get_dismissed(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let conflicts = without_dismissed(extract_for_display(&grid), &dismissed);
    ok(&req.id, json!({ "conflicts": conflicts }))
}

fn handle_conflicts_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let resolved = reconcile::resolve(&grid, &saved, &drafts, &detector_config(state));
    ok(&req.id, grid_view(&resolved, &HashSet::new()))
}

fn handle_conflicts_mark_ignorable(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let day = match get_day(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let slot = match get_time_slot(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let index = match get_index(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let out = reconcile::mark_ignorable(&grid, day, slot, index);
    ok(&req.id, grid_view(&out, &HashSet::new()))
}

fn handle_conflicts_drop_ignorable(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let out = reconcile::drop_ignorable(&grid);
    ok(&req.id, grid_view(&out, &HashSet::new()))
}

fn handle_conflicts_check_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let day = match get_day(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let slot = match get_time_slot(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let assignment = match get_slot(&req.params, "slot") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let previous = match get_records(&req.params, "previous") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let exclude_id = req.params.get("excludeId").and_then(|v| v.as_str());
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let pool = candidate_pool(saved, &drafts);
    let check = analysis::check_immediate(
        day,
        slot,
        &assignment,
        &pool,
        exclude_id,
        &previous,
        &detector_config(state),
    );
    ok(&req.id, json!(check))
}

fn handle_conflicts_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let scanned = scan_batch(&drafts, &saved, &detector_config(state));
    let empty = HashSet::new();
    let items: Vec<_> = scanned.iter().map(|g| grid_view(g, &empty)).collect();
    ok(
        &req.id,
        json!({
            "timetables": items,
            "summary": analysis::overall_conflict_summary(&scanned),
        }),
    )
}

fn handle_conflicts_stats(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    ok(
        &req.id,
        json!({ "statistics": analysis::conflict_statistics(&grid) }),
    )
}

fn handle_conflicts_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grids = if req.params.get("timetables").is_some() {
        match get_grids(&req.params, "timetables") {
            Ok(v) => v,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        }
    } else {
        match saved_grids(state) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };
    ok(
        &req.id,
        json!({ "summary": analysis::overall_conflict_summary(&grids) }),
    )
}

fn handle_conflicts_find_timetables(state: &mut AppState, req: &Request) -> serde_json::Value {
    let resource_type = match get_resource_type(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let name = match get_str(&req.params, "name") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let day = match get_day(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let slot = match get_time_slot(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let pool = candidate_pool(saved, &drafts);
    let hits = analysis::find_conflicting_timetables(resource_type, name, day, slot, &pool);
    ok(&req.id, json!({ "timetables": hits }))
}

fn handle_conflicts_suggest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let day = match get_day(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let slot = match get_time_slot(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let drafts = match get_grids(&req.params, "drafts") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let pool = candidate_pool(saved, &drafts);
    let suggestions =
        analysis::suggest_alternative_slots(&grid, day, slot, &pool, &detector_config(state));
    ok(&req.id, json!({ "suggestions": suggestions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "conflicts.scan" => Some(handle_conflicts_scan(state, req)),
        "conflicts.extract" => Some(handle_conflicts_extract(state, req)),
        "conflicts.resolve" => Some(handle_conflicts_resolve(state, req)),
        "conflicts.markIgnorable" => Some(handle_conflicts_mark_ignorable(state, req)),
        "conflicts.dropIgnorable" => Some(handle_conflicts_drop_ignorable(state, req)),
        "conflicts.checkSlot" => Some(handle_conflicts_check_slot(state, req)),
        "conflicts.batch" => Some(handle_conflicts_batch(state, req)),
        "conflicts.stats" => Some(handle_conflicts_stats(state, req)),
        "conflicts.summary" => Some(handle_conflicts_summary(state, req)),
        "conflicts.findTimetables" => Some(handle_conflicts_find_timetables(state, req)),
        "conflicts.suggest" => Some(handle_conflicts_suggest(state, req)),
        _ => None,
    }
}
