use crate::db::PersistError;
use crate::generated::GenerateError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn persist_err(id: &str, e: &PersistError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), e.details())
}

pub fn generate_err(id: &str, e: &GenerateError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}
