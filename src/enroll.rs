use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::CoreError;
use crate::matching;
use crate::model;
use crate::password;
use crate::retry::{run_in_transaction, RetryPolicy};

pub struct EnrollmentSummary {
    pub enrollment_id: String,
    pub class_section_id: String,
    pub class_id: String,
    pub class_display_name: String,
    pub subject: String,
    pub section: String,
    pub enrolled_at: String,
}

struct StudentRecord {
    id: String,
    program: String,
    semester: String,
    section: String,
}

struct ResolvedAssignment {
    class_id: String,
    subject: String,
    class_display_name: String,
    password_hash: String,
}

/// Enroll a student into the class section addressed by an assignment's
/// credentials. The resolution chain fails with a distinct reason at every
/// step; only the final bidirectional write is transactional.
pub fn enroll_student(
    conn: &Connection,
    policy: &RetryPolicy,
    student_id: &str,
    username: &str,
    raw_password: &str,
) -> Result<EnrollmentSummary, CoreError> {
    let student = conn
        .query_row(
            "SELECT id, program, semester, section FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(StudentRecord {
                    id: r.get(0)?,
                    program: r.get(1)?,
                    semester: r.get(2)?,
                    section: r.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("student not found"))?;

    let assignment = conn
        .query_row(
            "SELECT class_id, subject, class_display_name, cred_password_hash
             FROM teacher_assignments
             WHERE lower(cred_username) = ?",
            [matching::normalize_username(username)],
            |r| {
                Ok(ResolvedAssignment {
                    class_id: r.get(0)?,
                    subject: r.get(1)?,
                    class_display_name: r.get(2)?,
                    password_hash: r.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("class credentials not found"))?;

    let verified =
        password::verify_password(raw_password, &assignment.password_hash).map_err(CoreError::fatal)?;
    if !verified {
        return Err(CoreError::auth("incorrect class password"));
    }

    let semester = matching::normalize_semester(&student.semester).ok_or_else(|| {
        CoreError::validation(format!(
            "student semester '{}' is not a recognized semester",
            student.semester
        ))
    })?;
    let section = student.section.trim().to_ascii_uppercase();

    let class_section_id: String = conn
        .query_row(
            "SELECT id FROM class_sections
             WHERE class_id = ? AND program = ? AND semester = ? AND section = ? AND subject = ?",
            (
                &assignment.class_id,
                &student.program,
                semester,
                &section,
                &assignment.subject,
            ),
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| {
            CoreError::not_found(format!(
                "no class section matches {} semester {} section {} for {}",
                student.program, semester, section, assignment.subject
            ))
        })?;

    let enrolled_at = model::now_utc();

    let enrollment_id = run_in_transaction(conn, policy, |tx| {
        let duplicate: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM enrollments WHERE student_id = ? AND class_section_id = ?",
                (&student.id, &class_section_id),
                |r| r.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(CoreError::conflict(
                "student is already enrolled in this class section",
            ));
        }

        let enrollment_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO enrollments(
                 id, student_id, class_section_id, class_id, subject,
                 program, semester, section, enrolled_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &enrollment_id,
                &student.id,
                &class_section_id,
                &assignment.class_id,
                &assignment.subject,
                &student.program,
                semester,
                &section,
                &enrolled_at,
            ),
        )?;
        tx.execute(
            "UPDATE students SET enrollment_count = enrollment_count + 1 WHERE id = ?",
            [&student.id],
        )?;

        tx.execute(
            "INSERT INTO class_section_students(class_section_id, student_id) VALUES(?, ?)",
            (&class_section_id, &student.id),
        )?;
        tx.execute(
            "UPDATE class_sections SET enrolled_students = enrolled_students + 1 WHERE id = ?",
            [&class_section_id],
        )?;

        Ok(enrollment_id)
    })?;

    Ok(EnrollmentSummary {
        enrollment_id,
        class_section_id,
        class_id: assignment.class_id,
        class_display_name: assignment.class_display_name,
        subject: assignment.subject,
        section,
        enrolled_at,
    })
}
