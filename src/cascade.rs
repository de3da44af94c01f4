use rusqlite::{Connection, OptionalExtension};

use crate::assign;
use crate::error::CoreError;
use crate::matching;
use crate::model;

pub struct UnassignSummary {
    pub sections_cleared: usize,
    pub enrollments_removed: usize,
    pub assignments_removed: usize,
    pub assignments_rewritten: usize,
    pub students_repaired: usize,
    pub sections_repaired: usize,
}

/// Reverse an assignment section by section. Each step is durable as it
/// happens; the steps are intentionally not one cross-table transaction
/// (cascades trade atomicity for bounded write size), and the global
/// reconciliation pass at the end repairs the denormalized counters.
pub fn unassign_teacher(
    conn: &Connection,
    teacher_id: &str,
    class_id: &str,
    section_list: &str,
    subject: &str,
) -> Result<UnassignSummary, CoreError> {
    if assign::find_teacher(conn, teacher_id)?.is_none() {
        return Err(CoreError::not_found("teacher not found"));
    }

    let requested = matching::parse_section_list(section_list);
    if requested.is_empty() {
        return Err(CoreError::validation("no sections given to unassign"));
    }
    let subject = subject.trim().to_string();
    if subject.is_empty() {
        return Err(CoreError::validation("subject is required"));
    }

    let mut sections_cleared = 0usize;
    let mut enrollments_removed = 0usize;

    for code in &requested {
        // Enrollments are pulled by the (class, section, subject) triple so
        // strays survive even if the section row itself is gone.
        enrollments_removed += conn.execute(
            "DELETE FROM enrollments WHERE class_id = ? AND section = ? AND subject = ?",
            (class_id, code, &subject),
        )?;

        let section_id: Option<String> = conn
            .query_row(
                "SELECT id FROM class_sections
                 WHERE class_id = ? AND section = ? AND subject = ?",
                (class_id, code, &subject),
                |r| r.get(0),
            )
            .optional()?;
        let Some(section_id) = section_id else {
            continue;
        };

        conn.execute(
            "DELETE FROM class_section_students WHERE class_section_id = ?",
            [&section_id],
        )?;
        conn.execute(
            "UPDATE class_sections
             SET assigned_teacher = NULL, assigned_at = NULL, enrolled_students = 0
             WHERE id = ?",
            [&section_id],
        )?;
        sections_cleared += 1;
    }

    // Pull the matching Assignment record. Section sets compare
    // order-insensitively: a row is removed when the requested set covers
    // everything it claims, and rewritten when only part of it is released.
    let mut stmt = conn.prepare(
        "SELECT id, sections FROM teacher_assignments
         WHERE teacher_id = ? AND class_id = ? AND subject = ?",
    )?;
    let assignment_rows = stmt
        .query_map((teacher_id, class_id, &subject), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut assignments_removed = 0usize;
    let mut assignments_rewritten = 0usize;
    for (assignment_id, raw_sections) in assignment_rows {
        let stored = model::decode_string_list(&raw_sections);
        if matching::section_set_covers(&requested, &stored) {
            conn.execute(
                "DELETE FROM teacher_assignments WHERE id = ?",
                [&assignment_id],
            )?;
            assignments_removed += 1;
        } else if stored.iter().any(|s| requested.contains(s)) {
            let remaining: Vec<String> = stored
                .into_iter()
                .filter(|s| !requested.contains(s))
                .collect();
            conn.execute(
                "UPDATE teacher_assignments SET sections = ? WHERE id = ?",
                (model::encode_string_list(&remaining), &assignment_id),
            )?;
            assignments_rewritten += 1;
        }
    }

    let (students_repaired, sections_repaired) = repair_counts(conn)?;

    Ok(UnassignSummary {
        sections_cleared,
        enrollments_removed,
        assignments_removed,
        assignments_rewritten,
        students_repaired,
        sections_repaired,
    })
}

pub struct CascadeSummary {
    pub class_found: bool,
    pub assignments_removed: usize,
    pub enrollments_removed: usize,
    pub students_resynced: usize,
    pub sections_removed: usize,
}

/// Delete a class and everything downstream of it, in strict order:
/// assignments first, then enrollments (with per-student count resync),
/// then the ClassSection rows, then the class itself. A missing class row
/// at the final step is reported as cleanup, not failure.
pub fn delete_class(conn: &Connection, class_id: &str) -> Result<CascadeSummary, CoreError> {
    let assignments_removed = conn.execute(
        "DELETE FROM teacher_assignments WHERE class_id = ?",
        [class_id],
    )?;

    let mut stmt =
        conn.prepare("SELECT DISTINCT student_id FROM enrollments WHERE class_id = ?")?;
    let affected: Vec<String> = stmt
        .query_map([class_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let enrollments_removed =
        conn.execute("DELETE FROM enrollments WHERE class_id = ?", [class_id])?;

    for student_id in &affected {
        conn.execute(
            "UPDATE students
             SET enrollment_count =
                 (SELECT COUNT(*) FROM enrollments e WHERE e.student_id = students.id)
             WHERE id = ?",
            [student_id],
        )?;
    }

    conn.execute(
        "DELETE FROM class_section_students
         WHERE class_section_id IN (SELECT id FROM class_sections WHERE class_id = ?)",
        [class_id],
    )?;
    let sections_removed =
        conn.execute("DELETE FROM class_sections WHERE class_id = ?", [class_id])?;

    let class_found = conn.execute("DELETE FROM classes WHERE id = ?", [class_id])? > 0;

    Ok(CascadeSummary {
        class_found,
        assignments_removed,
        enrollments_removed,
        students_resynced: affected.len(),
        sections_removed,
    })
}

/// Idempotent reconciliation pass: recompute both denormalized counters from
/// the authoritative rows wherever they disagree. Callable on demand, and
/// run automatically after every unassignment cascade.
pub fn repair_counts(conn: &Connection) -> Result<(usize, usize), CoreError> {
    let students_repaired = conn.execute(
        "UPDATE students
         SET enrollment_count =
             (SELECT COUNT(*) FROM enrollments e WHERE e.student_id = students.id)
         WHERE enrollment_count !=
             (SELECT COUNT(*) FROM enrollments e WHERE e.student_id = students.id)",
        [],
    )?;

    let sections_repaired = conn.execute(
        "UPDATE class_sections
         SET enrolled_students =
             (SELECT COUNT(*) FROM class_section_students m
              WHERE m.class_section_id = class_sections.id)
         WHERE enrolled_students !=
             (SELECT COUNT(*) FROM class_section_students m
              WHERE m.class_section_id = class_sections.id)",
        [],
    )?;

    Ok((students_repaired, sections_repaired))
}
