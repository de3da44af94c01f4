use serde_json::json;

use crate::assign::{self, AssignRequest};
use crate::cascade;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{no_workspace, require_nested_str, require_str, require_str_list};
use crate::ipc::types::{AppState, Request};
use crate::session;

fn handle_assignments_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let teacher_id = match require_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_id = match require_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sections = match require_str_list(req, "sections") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let username = match require_nested_str(req, "credentials", "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match require_nested_str(req, "credentials", "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let assign_req = AssignRequest {
        teacher_id,
        class_id,
        subject,
        sections,
        username,
        password,
    };

    match assign::assign_teacher(conn, &state.retry, state.notifier.as_ref(), &assign_req) {
        Ok(summary) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "teacher_assigned",
                &format!(
                    "{} assigned to {} {} ({})",
                    summary.teacher_name,
                    summary.class_display_name,
                    summary.subject,
                    summary.sections.join(", ")
                ),
                Some(&json!({
                    "assignmentId": summary.assignment_id,
                    "teacherId": assign_req.teacher_id,
                    "classId": assign_req.class_id
                })),
            );
            ok(
                &req.id,
                json!({
                    "assignmentId": summary.assignment_id,
                    "classDisplayName": summary.class_display_name,
                    "subject": summary.subject,
                    "sections": summary.sections,
                    "username": summary.username
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let teacher_id = match require_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match assign::list_assignments(conn, &teacher_id) {
        Ok(rows) => ok(&req.id, json!({ "assignments": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_assignments_unassign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let teacher_id = match require_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_id = match require_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sections = match require_str(req, "sections") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match cascade::unassign_teacher(conn, &teacher_id, &class_id, &sections, &subject) {
        Ok(summary) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "teacher_unassigned",
                &format!("teacher {} unassigned from {} ({})", teacher_id, subject, sections),
                Some(&json!({
                    "classId": class_id,
                    "enrollmentsRemoved": summary.enrollments_removed
                })),
            );
            ok(
                &req.id,
                json!({
                    "sectionsCleared": summary.sections_cleared,
                    "enrollmentsRemoved": summary.enrollments_removed,
                    "assignmentsRemoved": summary.assignments_removed,
                    "assignmentsRewritten": summary.assignments_rewritten,
                    "countsRepaired": {
                        "students": summary.students_repaired,
                        "classSections": summary.sections_repaired
                    }
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.assign" => Some(handle_assignments_assign(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.unassign" => Some(handle_assignments_unassign(state, req)),
        _ => None,
    }
}
