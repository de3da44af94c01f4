use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::classes;
use crate::error::CoreError;
use crate::matching;
use crate::model;
use crate::notify::{self, Notifier};
use crate::password;
use crate::retry::{run_in_transaction, RetryPolicy};

pub struct AssignRequest {
    pub teacher_id: String,
    pub class_id: String,
    pub subject: String,
    pub sections: Vec<String>,
    pub username: String,
    pub password: String,
}

pub struct AssignmentSummary {
    pub assignment_id: String,
    pub class_display_name: String,
    pub subject: String,
    pub sections: Vec<String>,
    pub username: String,
    pub teacher_name: String,
}

pub struct TeacherRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

pub fn find_teacher(conn: &Connection, teacher_id: &str) -> Result<Option<TeacherRecord>, CoreError> {
    let row = conn
        .query_row(
            "SELECT id, name, email, role FROM teachers WHERE id = ?",
            [teacher_id],
            |r| {
                Ok(TeacherRecord {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    email: r.get(2)?,
                    role: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Link a teacher to a set of sections for one subject within one class, as
/// one atomic unit: the subject-bound ClassSection rows are upserted and the
/// Assignment record (with the hashed credentials) is appended together, or
/// not at all. The notification at the end is best-effort and deliberately
/// outside the transaction; its failure never unwinds the assignment.
pub fn assign_teacher(
    conn: &Connection,
    policy: &RetryPolicy,
    notifier: &dyn Notifier,
    req: &AssignRequest,
) -> Result<AssignmentSummary, CoreError> {
    let teacher = find_teacher(conn, &req.teacher_id)?
        .ok_or_else(|| CoreError::not_found("teacher not found"))?;
    let class = classes::find_class(conn, &req.class_id)?
        .ok_or_else(|| CoreError::not_found("class not found"))?;

    if req.sections.is_empty() {
        return Err(CoreError::validation("at least one section is required"));
    }

    let subject = req.subject.trim().to_string();
    model::validate_subject(&subject)?;
    if !class.subjects.iter().any(|s| s == &subject) {
        return Err(CoreError::validation(format!(
            "class {} does not offer {}",
            class.class_name, subject
        )));
    }

    let mut section_codes: Vec<String> = Vec::new();
    for raw in &req.sections {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() || section_codes.contains(&code) {
            continue;
        }
        if !class.sections.iter().any(|s| s == &code) {
            return Err(CoreError::validation(format!(
                "section {} does not exist in class {}",
                code, class.class_name
            )));
        }
        section_codes.push(code);
    }
    if section_codes.is_empty() {
        return Err(CoreError::validation("at least one section is required"));
    }

    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(CoreError::validation("credentials username is required"));
    }
    if req.password.len() < 6 {
        return Err(CoreError::validation(
            "credentials password must be at least 6 characters",
        ));
    }

    // Hashing is slow on purpose; do it before the transactional unit so
    // retries never pay for it twice.
    let password_hash = password::hash_password(&req.password).map_err(CoreError::fatal)?;
    let assigned_at = model::now_utc();

    let assignment_id = run_in_transaction(conn, policy, |tx| {
        // Reject if any requested section is already claimed for this
        // subject, naming every conflicting section.
        let mut conflicting: Vec<String> = Vec::new();
        for code in &section_codes {
            let claimed: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM class_sections
                     WHERE class_id = ? AND section = ? AND subject = ?
                       AND assigned_teacher IS NOT NULL",
                    (&req.class_id, code, &subject),
                    |r| r.get(0),
                )
                .optional()?;
            if claimed.is_some() {
                conflicting.push(code.clone());
            }
        }
        if !conflicting.is_empty() {
            return Err(CoreError::conflict(format!(
                "sections already assigned for {}: {}",
                subject,
                conflicting.join(", ")
            )));
        }

        // Enrollment resolves assignments by username alone, so the
        // username must be unique across all assignments.
        let username_taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM teacher_assignments WHERE lower(cred_username) = ?",
                [matching::normalize_username(&username)],
                |r| r.get(0),
            )
            .optional()?;
        if username_taken.is_some() {
            return Err(CoreError::conflict(
                "class credentials username is already in use",
            ));
        }

        for code in &section_codes {
            tx.execute(
                "INSERT INTO class_sections(
                     id, class_id, section, subject, program, semester, room,
                     assigned_teacher, assigned_at, enrolled_students)
                 VALUES(?, ?, ?, ?, ?, ?, '', ?, ?, 0)
                 ON CONFLICT(class_id, section, subject) WHERE subject IS NOT NULL
                 DO UPDATE SET
                     assigned_teacher = excluded.assigned_teacher,
                     assigned_at = excluded.assigned_at,
                     program = excluded.program,
                     semester = excluded.semester",
                (
                    Uuid::new_v4().to_string(),
                    &req.class_id,
                    code,
                    &subject,
                    &class.program,
                    class.semester,
                    &teacher.id,
                    &assigned_at,
                ),
            )?;
        }

        let assignment_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO teacher_assignments(
                 id, teacher_id, class_id, subject, sections, class_display_name,
                 cred_username, cred_password_hash, assigned_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &assignment_id,
                &teacher.id,
                &req.class_id,
                &subject,
                model::encode_string_list(&section_codes),
                &class.class_name,
                &username,
                &password_hash,
                &assigned_at,
            ),
        )?;

        Ok(assignment_id)
    })?;

    notify::send_best_effort(
        notifier,
        &teacher.email,
        "New class assignment",
        &format!(
            "You have been assigned to {} {} (sections {}). Students enroll with username '{}'.",
            class.class_name,
            subject,
            section_codes.join(", "),
            username
        ),
    );

    Ok(AssignmentSummary {
        assignment_id,
        class_display_name: class.class_name,
        subject,
        sections: section_codes,
        username,
        teacher_name: teacher.name,
    })
}

/// A teacher's assignment rows, credentials elided down to the username.
pub fn list_assignments(
    conn: &Connection,
    teacher_id: &str,
) -> Result<Vec<serde_json::Value>, CoreError> {
    if find_teacher(conn, teacher_id)?.is_none() {
        return Err(CoreError::not_found("teacher not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT id, class_id, subject, sections, class_display_name, cred_username, assigned_at
         FROM teacher_assignments
         WHERE teacher_id = ?
         ORDER BY assigned_at, id",
    )?;

    let rows = stmt
        .query_map([teacher_id], |row| {
            let id: String = row.get(0)?;
            let class_id: String = row.get(1)?;
            let subject: String = row.get(2)?;
            let sections: String = row.get(3)?;
            let class_display_name: String = row.get(4)?;
            let username: String = row.get(5)?;
            let assigned_at: String = row.get(6)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "subject": subject,
                "sections": model::decode_string_list(&sections),
                "classDisplayName": class_display_name,
                "username": username,
                "assignedAt": assigned_at
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
