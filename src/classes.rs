use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model;
use crate::retry::{run_in_transaction, RetryPolicy};

pub struct CreatedClass {
    pub class_id: String,
    pub class_name: String,
    pub sections: Vec<String>,
    pub subjects: Vec<String>,
}

/// Create a class together with one subjectless ClassSection placeholder per
/// section, as a single retried transaction. The class name is derived from
/// program and semester and is unique, so exactly one class exists per
/// (program, semester) pair.
pub fn create_class(
    conn: &Connection,
    policy: &RetryPolicy,
    program: &str,
    semester: i64,
    sections: &[String],
    subjects: &[String],
) -> Result<CreatedClass, CoreError> {
    model::validate_program(program)?;
    model::validate_semester(semester)?;

    if sections.is_empty() {
        return Err(CoreError::validation("at least one section is required"));
    }
    if subjects.is_empty() {
        return Err(CoreError::validation("at least one subject is required"));
    }

    let mut section_codes: Vec<String> = Vec::new();
    for raw in sections {
        let code = raw.trim().to_ascii_uppercase();
        model::validate_section_code(&code)?;
        if !section_codes.contains(&code) {
            section_codes.push(code);
        }
    }

    let mut subject_names: Vec<String> = Vec::new();
    for raw in subjects {
        let subject = raw.trim().to_string();
        model::validate_subject(&subject)?;
        if !subject_names.contains(&subject) {
            subject_names.push(subject);
        }
    }

    let class_name = format!("{program}-{semester}");

    run_in_transaction(conn, policy, |tx| {
        let taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM classes WHERE class_name = ?",
                [&class_name],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(CoreError::conflict(format!(
                "class {class_name} already exists"
            )));
        }

        let class_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO classes(id, program, class_name, semester, sections, subjects)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &class_id,
                program,
                &class_name,
                semester,
                model::encode_string_list(&section_codes),
                model::encode_string_list(&subject_names),
            ),
        )?;

        for code in &section_codes {
            tx.execute(
                "INSERT INTO class_sections(id, class_id, section, subject, program, semester)
                 VALUES(?, ?, ?, NULL, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &class_id,
                    code,
                    program,
                    semester,
                ),
            )?;
        }

        Ok(CreatedClass {
            class_id,
            class_name: class_name.clone(),
            sections: section_codes.clone(),
            subjects: subject_names.clone(),
        })
    })
}

pub struct ClassRecord {
    pub id: String,
    pub program: String,
    pub class_name: String,
    pub semester: i64,
    pub sections: Vec<String>,
    pub subjects: Vec<String>,
}

pub fn find_class(conn: &Connection, class_id: &str) -> Result<Option<ClassRecord>, CoreError> {
    let row = conn
        .query_row(
            "SELECT id, program, class_name, semester, sections, subjects
             FROM classes WHERE id = ?",
            [class_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(id, program, class_name, semester, sections, subjects)| ClassRecord {
        id,
        program,
        class_name,
        semester,
        sections: model::decode_string_list(&sections),
        subjects: model::decode_string_list(&subjects),
    }))
}

/// Classes with basic counts so the admin dashboard has something useful to
/// show without extra round-trips.
pub fn list_classes(conn: &Connection) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.program,
           c.class_name,
           c.semester,
           c.sections,
           c.subjects,
           (SELECT COUNT(*) FROM class_sections cs
             WHERE cs.class_id = c.id AND cs.assigned_teacher IS NOT NULL) AS assigned_count,
           (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id) AS enrollment_count
         FROM classes c
         ORDER BY c.class_name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let program: String = row.get(1)?;
            let class_name: String = row.get(2)?;
            let semester: i64 = row.get(3)?;
            let sections: String = row.get(4)?;
            let subjects: String = row.get(5)?;
            let assigned_count: i64 = row.get(6)?;
            let enrollment_count: i64 = row.get(7)?;
            Ok(json!({
                "id": id,
                "program": program,
                "className": class_name,
                "semester": semester,
                "sections": model::decode_string_list(&sections),
                "subjects": model::decode_string_list(&subjects),
                "assignedSectionCount": assigned_count,
                "enrollmentCount": enrollment_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// ClassSection rows for one class, including assignment state and the
/// denormalized enrolled count.
pub fn list_class_sections(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<serde_json::Value>, CoreError> {
    if find_class(conn, class_id)?.is_none() {
        return Err(CoreError::not_found("class not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT id, section, subject, program, semester, room,
                assigned_teacher, assigned_at, enrolled_students
         FROM class_sections
         WHERE class_id = ?
         ORDER BY section, subject",
    )?;

    let rows = stmt
        .query_map([class_id], |row| {
            let id: String = row.get(0)?;
            let section: String = row.get(1)?;
            let subject: Option<String> = row.get(2)?;
            let program: String = row.get(3)?;
            let semester: i64 = row.get(4)?;
            let room: String = row.get(5)?;
            let assigned_teacher: Option<String> = row.get(6)?;
            let assigned_at: Option<String> = row.get(7)?;
            let enrolled_students: i64 = row.get(8)?;
            Ok(json!({
                "id": id,
                "section": section,
                "subject": subject,
                "program": program,
                "semester": semester,
                "room": room,
                "assignedTeacher": assigned_teacher,
                "assignedAt": assigned_at,
                "enrolledStudents": enrolled_students
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
