use crate::analysis;
use crate::db;
use crate::ipc::error::{err, ok, persist_err};
use crate::ipc::helpers::{get_day, get_grid, get_slot, get_str, get_time_slot};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_timetables_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "timetables": [] }));
    };
    match db::list_timetables(conn) {
        Ok(grids) => {
            let items: Vec<_> = grids
                .iter()
                .map(|g| {
                    json!({
                        "timetable": g,
                        "status": g.status(),
                        "scheduledHours": analysis::scheduled_hours(g),
                    })
                })
                .collect();
            ok(&req.id, json!({ "timetables": items }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_timetables_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match get_str(&req.params, "id") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match db::get_timetable(conn, id) {
        Ok(Some(g)) => ok(&req.id, json!({ "timetable": g, "status": g.status() })),
        Ok(None) => err(&req.id, "not_found", "timetable not found", Some(json!({ "id": id }))),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_timetables_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match db::create_timetable(conn, &grid) {
        Ok(stored) => ok(&req.id, json!({ "id": stored.id, "timetable": stored })),
        Err(e) => persist_err(&req.id, &e),
    }
}

fn handle_timetables_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match get_str(&req.params, "id") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let grid = match get_grid(&req.params, "timetable") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match db::update_timetable(conn, id, &grid) {
        Ok(stored) => ok(&req.id, json!({ "timetable": stored })),
        Err(e) => persist_err(&req.id, &e),
    }
}

fn handle_timetables_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match get_str(&req.params, "id") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match db::delete_timetable(conn, id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => persist_err(&req.id, &e),
    }
}

fn handle_timetables_update_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match get_str(&req.params, "id") {
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
    let assignment = match get_slot(&req.params, "slot") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match db::update_timetable_slot(conn, id, day, slot, assignment) {
        Ok(stored) => ok(&req.id, json!({ "timetable": stored, "status": stored.status() })),
        Err(e) => persist_err(&req.id, &e),
    }
}

fn handle_timetables_statistics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(
            &req.id,
            json!({ "statistics": analysis::timetable_statistics(&[]) }),
        );
    };
    match db::list_timetables(conn) {
        Ok(grids) => ok(
            &req.id,
            json!({ "statistics": analysis::timetable_statistics(&grids) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetables.list" => Some(handle_timetables_list(state, req)),
        "timetables.get" => Some(handle_timetables_get(state, req)),
        "timetables.create" => Some(handle_timetables_create(state, req)),
        "timetables.update" => Some(handle_timetables_update(state, req)),
        "timetables.delete" => Some(handle_timetables_delete(state, req)),
        "timetables.updateSlot" => Some(handle_timetables_update_slot(state, req)),
        "timetables.statistics" => Some(handle_timetables_statistics(state, req)),
        _ => None,
    }
}
