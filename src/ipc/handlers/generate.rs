use crate::config::GENERATOR_ENV;
use crate::generated::{self, CommandCompletion, GenerationRequest};
use crate::ipc::error::{err, generate_err, ok};
use crate::ipc::helpers::{detector_config, get_str, saved_grids};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_generate_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let text = match get_str(&req.params, "text") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match generated::validate_batch(text, &saved, &detector_config(state)) {
        Ok(batch) => ok(&req.id, json!(batch)),
        Err(e) => generate_err(&req.id, &e),
    }
}

fn handle_generate_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(command) = state.generator.as_ref() else {
        return err(
            &req.id,
            "generator_unavailable",
            format!("no generator configured; set {}", GENERATOR_ENV),
            None,
        );
    };
    let request: GenerationRequest = if req.params.is_null() {
        GenerationRequest::default()
    } else {
        match serde_json::from_value(req.params.clone()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    };
    let service = match CommandCompletion::new(command) {
        Ok(v) => v,
        Err(e) => return generate_err(&req.id, &e),
    };
    let saved = match saved_grids(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match generated::generate_timetables(&service, &request, &saved, &detector_config(state)) {
        Ok(batch) => ok(&req.id, json!(batch)),
        Err(e) => generate_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "generate.ingest" => Some(handle_generate_ingest(state, req)),
        "generate.run" => Some(handle_generate_run(state, req)),
        _ => None,
    }
}
