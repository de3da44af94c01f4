use super::error::err;
use super::types::Request;

/// Missing/blank params short-circuit with a bad_params response; handlers
/// use `?` on these and stay flat.
pub fn require_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("missing params.{key}"),
            None,
        )),
    }
}

pub fn require_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_i64()) {
        Some(v) => Ok(v),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("missing params.{key}"),
            None,
        )),
    }
}

pub fn require_str_list(req: &Request, key: &str) -> Result<Vec<String>, serde_json::Value> {
    let items = req
        .params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        });
    match items {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("missing params.{key}"),
            None,
        )),
    }
}

/// Nested string lookup for object params like credentials.username.
pub fn require_nested_str(
    req: &Request,
    outer: &str,
    inner: &str,
) -> Result<String, serde_json::Value> {
    match req
        .params
        .get(outer)
        .and_then(|v| v.get(inner))
        .and_then(|v| v.as_str())
    {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("missing params.{outer}.{inner}"),
            None,
        )),
    }
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}
