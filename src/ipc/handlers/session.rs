use std::path::PathBuf;

use serde_json::json;

use crate::backup;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::helpers::{no_workspace, require_str};
use crate::ipc::types::{AppState, Request};
use crate::session;

fn handle_session_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let session_type = match require_str(req, "sessionType") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let year = match require_str(req, "year") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match session::start(conn, &state.retry, &session_type, &year) {
        Ok(record) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "session_started",
                &format!("{} {} session started", record.session_type, record.year),
                None,
            );
            ok(
                &req.id,
                json!({
                    "sessionId": record.id,
                    "sessionType": record.session_type,
                    "year": record.year,
                    "startedAt": record.started_at
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_end(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match session::end(conn, &state.retry) {
        Ok(summary) => ok(&req.id, summary),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match session::status(conn) {
        Ok(status) => ok(&req.id, status),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_statistics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match session::statistics(conn) {
        Ok(stats) => ok(&req.id, stats),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_log_activity(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let kind = match require_str(req, "kind") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let description = match require_str(req, "description") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let details = req.params.get("details").cloned();

    match session::log_activity(conn, &state.retry, &kind, &description, details.as_ref()) {
        Ok(seq) => ok(&req.id, json!({ "seq": seq })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_backup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match session::backup_snapshot(conn, &state.retry) {
        Ok(snapshot) => ok(&req.id, json!({ "snapshot": snapshot })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_backups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match session::list_backups(conn) {
        Ok(rows) => ok(&req.id, json!({ "backups": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let session_id = match require_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match session::delete(conn, &state.retry, &session_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_restore_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let session_id = match require_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match session::restore_preview(conn, &session_id) {
        Ok(preview) => ok(&req.id, preview),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let session_id = match require_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match session::restore(conn, &session_id) {
        Ok(outcome) => ok(&req.id, outcome),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_session_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let session_id = match require_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match require_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    let record = match session::find_session(conn, &session_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "session not found", None),
        Err(e) => return core_err(&req.id, &e),
    };
    let Some(data) = record.session_data else {
        return err(
            &req.id,
            "validation_failed",
            "session has no snapshot data to export",
            None,
        );
    };
    let snapshot: serde_json::Value = match serde_json::from_str(&data) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "store_failed",
                format!("stored snapshot is not valid JSON: {e}"),
                None,
            )
        }
    };
    let activities = match session::session_activities(conn, &session_id) {
        Ok(rows) => json!(rows),
        Err(e) => return core_err(&req.id, &e),
    };
    let meta = json!({
        "sessionId": record.id,
        "sessionType": record.session_type,
        "year": record.year,
        "startedAt": record.started_at,
        "endedAt": record.ended_at
    });

    match backup::export_session_bundle(&meta, &snapshot, &activities, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "snapshotSha256": summary.snapshot_sha256,
                "outPath": out_path.to_string_lossy()
            }),
        ),
        Err(e) => err(&req.id, "bundle_export_failed", format!("{e:?}"), None),
    }
}

fn handle_session_preview_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Bundle preview reads only the bundle file; no workspace is needed.
    let _ = state;
    let path = match require_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    match backup::preview_session_bundle(&path) {
        Ok(preview) => ok(
            &req.id,
            json!({
                "bundleFormat": preview.bundle_format,
                "session": preview.session,
                "checksumOk": preview.checksum_ok,
                "activityCount": preview.activity_count
            }),
        ),
        Err(e) => err(&req.id, "bundle_preview_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.start" => Some(handle_session_start(state, req)),
        "session.end" => Some(handle_session_end(state, req)),
        "session.status" => Some(handle_session_status(state, req)),
        "session.statistics" => Some(handle_session_statistics(state, req)),
        "session.logActivity" => Some(handle_session_log_activity(state, req)),
        "session.backup" => Some(handle_session_backup(state, req)),
        "session.backups" => Some(handle_session_backups(state, req)),
        "session.delete" => Some(handle_session_delete(state, req)),
        "session.restorePreview" => Some(handle_session_restore_preview(state, req)),
        "session.restore" => Some(handle_session_restore(state, req)),
        "session.exportBundle" => Some(handle_session_export_bundle(state, req)),
        "session.previewBundle" => Some(handle_session_preview_bundle(state, req)),
        _ => None,
    }
}
