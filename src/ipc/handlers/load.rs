use crate::analysis;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_str, saved_grids};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_teacher_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher = match get_str(&req.params, "teacher") {
        Ok(v) if !v.trim().is_empty() => v,
        Ok(_) => return err(&req.id, "bad_params", "teacher must not be empty", None),
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "teacher": teacher,
            "schedule": analysis::teacher_schedule(&saved, teacher),
        }),
    )
}

fn handle_room_utilization(state: &mut AppState, req: &Request) -> serde_json::Value {
    let room = match get_str(&req.params, "room") {
        Ok(v) if !v.trim().is_empty() => v,
        Ok(_) => return err(&req.id, "bad_params", "room must not be empty", None),
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "room": room,
            "utilization": analysis::room_utilization(&saved, room),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "load.teacherSchedule" => Some(handle_teacher_schedule(state, req)),
        "load.roomUtilization" => Some(handle_room_utilization(state, req)),
        _ => None,
    }
}
