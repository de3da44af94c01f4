use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{no_workspace, require_str};
use crate::ipc::types::{AppState, Request};
use crate::matching;
use crate::model;

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match require_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let role = req
        .params
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("teacher")
        .to_string();
    if let Err(e) = model::validate_teacher_role(&role) {
        return core_err(&req.id, &e);
    }

    let teacher_id = Uuid::new_v4().to_string();
    if let Err(e) = conn
        .execute(
            "INSERT INTO teachers(id, name, email, role) VALUES(?, ?, ?, ?)",
            (&teacher_id, &name, &email, &role),
        )
        .map_err(CoreError::from)
    {
        return core_err(&req.id, &e);
    }

    ok(
        &req.id,
        json!({ "teacherId": teacher_id, "name": name, "role": role }),
    )
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "teachers": [] }));
    };

    match list_teachers(conn) {
        Ok(rows) => ok(&req.id, json!({ "teachers": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn list_teachers(conn: &Connection) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT
           t.id, t.name, t.email, t.role,
           (SELECT COUNT(*) FROM teacher_assignments a WHERE a.teacher_id = t.id) AS assignment_count
         FROM teachers t
         ORDER BY t.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let email: String = row.get(2)?;
            let role: String = row.get(3)?;
            let assignment_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "role": role,
                "assignmentCount": assignment_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let program = match require_str(req, "program") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester = match require_str(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match require_str(req, "section") {
        Ok(v) => v.to_ascii_uppercase(),
        Err(resp) => return resp,
    };

    if let Err(e) = model::validate_program(&program) {
        return core_err(&req.id, &e);
    }
    // The ordinal form is kept as entered; it only has to normalize.
    if matching::normalize_semester(&semester).is_none() {
        return core_err(
            &req.id,
            &CoreError::validation(format!("'{semester}' is not a recognized semester")),
        );
    }
    if let Err(e) = model::validate_section_code(&section) {
        return core_err(&req.id, &e);
    }

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn
        .execute(
            "INSERT INTO students(id, name, program, semester, section, enrollment_count)
             VALUES(?, ?, ?, ?, ?, 0)",
            (&student_id, &name, &program, &semester, &section),
        )
        .map_err(CoreError::from)
    {
        return core_err(&req.id, &e);
    }

    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    match list_students(conn) {
        Ok(rows) => ok(&req.id, json!({ "students": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn list_students(conn: &Connection) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, program, semester, section, enrollment_count
         FROM students
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let program: String = row.get(2)?;
            let semester: String = row.get(3)?;
            let section: String = row.get(4)?;
            let enrollment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "program": program,
                "semester": semester,
                "section": section,
                "enrollmentCount": enrollment_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_registration_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match require_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let requested_role = match require_str(req, "requestedRole") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let request_id = Uuid::new_v4().to_string();
    if let Err(e) = conn
        .execute(
            "INSERT INTO registration_requests(id, name, email, requested_role, status, created_at)
             VALUES(?, ?, ?, ?, 'pending', ?)",
            (&request_id, &name, &email, &requested_role, model::now_utc()),
        )
        .map_err(CoreError::from)
    {
        return core_err(&req.id, &e);
    }

    ok(&req.id, json!({ "requestId": request_id, "status": "pending" }))
}

fn handle_registration_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "requests": [] }));
    };

    match list_registration_requests(conn) {
        Ok(rows) => ok(&req.id, json!({ "requests": rows })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn list_registration_requests(conn: &Connection) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, requested_role, status, created_at
         FROM registration_requests
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let email: String = row.get(2)?;
            let requested_role: String = row.get(3)?;
            let status: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "requestedRole": requested_role,
                "status": status,
                "createdAt": created_at
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "registration.submit" => Some(handle_registration_submit(state, req)),
        "registration.list" => Some(handle_registration_list(state, req)),
        _ => None,
    }
}
