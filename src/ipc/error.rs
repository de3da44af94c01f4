use serde_json::json;

use crate::error::CoreError;

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

/// Map a core outcome to its wire code. Business failures keep their
/// specific reason; store failures surface a safe message and log the
/// detail instead.
pub fn core_err(id: &str, e: &CoreError) -> serde_json::Value {
    match e {
        CoreError::NotFound(m) => err(id, "not_found", m.clone(), None),
        CoreError::Validation(m) => err(id, "validation_failed", m.clone(), None),
        CoreError::Conflict(m) => err(id, "conflict", m.clone(), None),
        CoreError::Auth(m) => err(id, "auth_failed", m.clone(), None),
        CoreError::TransientStore(inner) => {
            tracing::error!(error = %inner, "retries exhausted on transient store conflict");
            err(
                id,
                "store_busy",
                "the operation could not complete because the store stayed busy; try again",
                None,
            )
        }
        CoreError::FatalStore(inner) => {
            tracing::error!(error = %inner, "store operation failed");
            err(id, "store_failed", "internal storage failure", None)
        }
    }
}
