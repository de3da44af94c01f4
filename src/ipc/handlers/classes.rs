use serde_json::json;

use crate::cascade;
use crate::classes;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{no_workspace, require_i64, require_str, require_str_list};
use crate::ipc::types::{AppState, Request};
use crate::session;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    match classes::list_classes(conn) {
        Ok(rows) => ok(&req.id, json!({ "classes": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let program = match require_str(req, "program") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester = match require_i64(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sections = match require_str_list(req, "sections") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subjects = match require_str_list(req, "subjects") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match classes::create_class(conn, &state.retry, &program, semester, &sections, &subjects) {
        Ok(created) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "class_created",
                &format!("class {} created", created.class_name),
                Some(&json!({
                    "classId": created.class_id,
                    "sections": created.sections,
                    "subjects": created.subjects
                })),
            );
            ok(
                &req.id,
                json!({
                    "classId": created.class_id,
                    "className": created.class_name,
                    "sections": created.sections,
                    "subjects": created.subjects
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_classes_sections(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let class_id = match require_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match classes::list_class_sections(conn, &class_id) {
        Ok(rows) => ok(&req.id, json!({ "classSections": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let class_id = match require_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match cascade::delete_class(conn, &class_id) {
        Ok(summary) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "class_deleted",
                &format!("class {} deleted", class_id),
                Some(&json!({
                    "enrollmentsRemoved": summary.enrollments_removed,
                    "sectionsRemoved": summary.sections_removed
                })),
            );
            let note = if summary.class_found {
                serde_json::Value::Null
            } else {
                json!("class not found but related data cleaned")
            };
            ok(
                &req.id,
                json!({
                    "classFound": summary.class_found,
                    "assignmentsRemoved": summary.assignments_removed,
                    "enrollmentsRemoved": summary.enrollments_removed,
                    "studentsResynced": summary.students_resynced,
                    "sectionsRemoved": summary.sections_removed,
                    "note": note
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.sections" => Some(handle_classes_sections(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
