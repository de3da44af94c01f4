use serde_json::json;

use crate::cascade;
use crate::enroll;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{no_workspace, require_str};
use crate::ipc::types::{AppState, Request};
use crate::session;

fn handle_enrollment_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let student_id = match require_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let username = match require_str(req, "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match require_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match enroll::enroll_student(conn, &state.retry, &student_id, &username, &password) {
        Ok(summary) => {
            session::log_activity_best_effort(
                conn,
                &state.retry,
                "student_enrolled",
                &format!(
                    "student enrolled in {} {} section {}",
                    summary.class_display_name, summary.subject, summary.section
                ),
                Some(&json!({
                    "studentId": student_id,
                    "classSectionId": summary.class_section_id
                })),
            );
            ok(
                &req.id,
                json!({
                    "enrollmentId": summary.enrollment_id,
                    "classSectionId": summary.class_section_id,
                    "classId": summary.class_id,
                    "classDisplayName": summary.class_display_name,
                    "subject": summary.subject,
                    "section": summary.section,
                    "enrolledAt": summary.enrolled_at
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_enrollment_repair_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match cascade::repair_counts(conn) {
        Ok((students, sections)) => ok(
            &req.id,
            json!({
                "studentsRepaired": students,
                "classSectionsRepaired": sections
            }),
        ),
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.enroll" => Some(handle_enrollment_enroll(state, req)),
        "enrollment.repairCounts" => Some(handle_enrollment_repair_counts(state, req)),
        _ => None,
    }
}
