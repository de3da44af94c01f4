use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::matching;
use crate::model;
use crate::retry::{run_in_transaction, RetryPolicy};

/// Activity logs are bounded so a long-lived session cannot grow without
/// limit; only the most recent entries are kept.
pub const ACTIVITY_LOG_CAP: i64 = 1000;

pub struct SessionRecord {
    pub id: String,
    pub session_type: String,
    pub year: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub is_active: bool,
    pub session_data: Option<String>,
}

pub fn active_session_id(conn: &Connection) -> Result<Option<String>, CoreError> {
    let id = conn
        .query_row(
            "SELECT session_id FROM active_session WHERE id = 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn require_active(conn: &Connection) -> Result<String, CoreError> {
    active_session_id(conn)?
        .ok_or_else(|| CoreError::not_found("no active session; start one first"))
}

pub fn find_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>, CoreError> {
    let row = conn
        .query_row(
            "SELECT id, session_type, year, started_at, ended_at, is_active, session_data
             FROM sessions WHERE id = ?",
            [session_id],
            |r| {
                Ok(SessionRecord {
                    id: r.get(0)?,
                    session_type: r.get(1)?,
                    year: r.get(2)?,
                    started_at: r.get(3)?,
                    ended_at: r.get(4)?,
                    is_active: r.get::<_, i64>(5)? != 0,
                    session_data: r.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Start a new academic session. The one-active-session invariant is held by
/// the fixed-id sentinel row: the conditional insert either claims it or
/// changes nothing, so two concurrent starts cannot both succeed.
pub fn start(
    conn: &Connection,
    policy: &RetryPolicy,
    session_type: &str,
    year: &str,
) -> Result<SessionRecord, CoreError> {
    let session_type = session_type.trim().to_string();
    let year = year.trim().to_string();
    if session_type.is_empty() {
        return Err(CoreError::validation("sessionType is required"));
    }
    if year.is_empty() {
        return Err(CoreError::validation("year is required"));
    }

    let started_at = model::now_utc();

    run_in_transaction(conn, policy, |tx| {
        let session_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO sessions(id, session_type, year, started_at, is_active)
             VALUES(?, ?, ?, ?, 1)",
            (&session_id, &session_type, &year, &started_at),
        )?;

        let claimed = tx.execute(
            "INSERT OR IGNORE INTO active_session(id, session_id) VALUES(1, ?)",
            [&session_id],
        )?;
        if claimed == 0 {
            return Err(CoreError::conflict(
                "an academic session is already active; end it first",
            ));
        }

        Ok(SessionRecord {
            id: session_id,
            session_type: session_type.clone(),
            year: year.clone(),
            started_at: started_at.clone(),
            ended_at: None,
            is_active: true,
            session_data: None,
        })
    })
}

/// End the active session: snapshot the store into session_data, stamp the
/// end date, and release the sentinel.
pub fn end(conn: &Connection, policy: &RetryPolicy) -> Result<serde_json::Value, CoreError> {
    let session_id = require_active(conn)?;
    let snapshot = build_snapshot(conn, &session_id)?;
    let ended_at = model::now_utc();

    run_in_transaction(conn, policy, |tx| {
        tx.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?, session_data = ? WHERE id = ?",
            (&ended_at, snapshot.to_string(), &session_id),
        )?;
        tx.execute("DELETE FROM active_session WHERE id = 1", [])?;
        Ok(())
    })?;

    Ok(json!({
        "sessionId": session_id,
        "endedAt": ended_at,
        "counts": snapshot.get("counts").cloned().unwrap_or_else(|| json!({}))
    }))
}

pub fn status(conn: &Connection) -> Result<serde_json::Value, CoreError> {
    let Some(session_id) = active_session_id(conn)? else {
        return Ok(json!({ "active": false }));
    };
    let session = find_session(conn, &session_id)?
        .ok_or_else(|| CoreError::fatal("active session record is missing"))?;
    let activity_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM session_activities WHERE session_id = ?",
        [&session_id],
        |r| r.get(0),
    )?;

    Ok(json!({
        "active": true,
        "sessionId": session.id,
        "sessionType": session.session_type,
        "year": session.year,
        "startedAt": session.started_at,
        "activityCount": activity_count
    }))
}

/// Append one activity entry to the active session and re-cap the log.
pub fn log_activity(
    conn: &Connection,
    policy: &RetryPolicy,
    kind: &str,
    description: &str,
    details: Option<&serde_json::Value>,
) -> Result<i64, CoreError> {
    let kind = kind.trim().to_string();
    if kind.is_empty() {
        return Err(CoreError::validation("activity kind is required"));
    }

    let session_id = require_active(conn)?;
    let at = model::now_utc();
    let details_text = details.map(|d| d.to_string());

    run_in_transaction(conn, policy, |tx| {
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM session_activities WHERE session_id = ?",
            [&session_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "INSERT INTO session_activities(session_id, seq, at, kind, description, details)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&session_id, seq, &at, &kind, description, &details_text),
        )?;
        tx.execute(
            "DELETE FROM session_activities WHERE session_id = ? AND seq <= ?",
            (&session_id, seq - ACTIVITY_LOG_CAP),
        )?;
        Ok(seq)
    })
}

/// Activity logging for engine side effects: skipped silently when no
/// session is active, and a failed append never fails the primary
/// operation.
pub fn log_activity_best_effort(
    conn: &Connection,
    policy: &RetryPolicy,
    kind: &str,
    description: &str,
    details: Option<&serde_json::Value>,
) {
    match log_activity(conn, policy, kind, description, details) {
        Ok(_) => {}
        Err(CoreError::NotFound(_)) => {}
        Err(e) => tracing::warn!(kind, error = %e, "failed to log session activity"),
    }
}

/// Live aggregates over the store: totals, distributions, and
/// percentage-of-total metrics. Read-only.
pub fn statistics(conn: &Connection) -> Result<serde_json::Value, CoreError> {
    let session_id = require_active(conn)?;

    let counts = collection_counts(conn)?;
    let total_students = counts["students"].as_i64().unwrap_or(0);
    let total_classes = counts["classes"].as_i64().unwrap_or(0);

    // Student semester tokens may carry ordinal suffixes; group them by
    // their normalized value so "3rd" and "3" land in the same bucket.
    let mut stmt = conn.prepare("SELECT semester FROM students")?;
    let tokens: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut by_semester: Vec<(String, i64)> = Vec::new();
    for token in tokens {
        let key = match matching::normalize_semester(&token) {
            Some(n) => n.to_string(),
            None => "unknown".to_string(),
        };
        match by_semester.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => by_semester.push((key, 1)),
        }
    }
    by_semester.sort_by(|a, b| a.0.cmp(&b.0));

    let students_by_semester: Vec<serde_json::Value> = by_semester
        .iter()
        .map(|(semester, count)| {
            json!({
                "semester": semester,
                "count": count,
                "percent": percent_of(*count, total_students)
            })
        })
        .collect();

    let students_by_program: Vec<serde_json::Value> = grouped_counts(
        conn,
        "SELECT program, COUNT(*) FROM students GROUP BY program ORDER BY program",
    )?
    .into_iter()
    .map(|(program, count)| {
        json!({
            "program": program,
            "count": count,
            "percent": percent_of(count, total_students)
        })
    })
    .collect();
    let classes_by_semester: Vec<serde_json::Value> = grouped_counts(
        conn,
        "SELECT CAST(semester AS TEXT), COUNT(*) FROM classes GROUP BY semester ORDER BY semester",
    )?
    .into_iter()
    .map(|(semester, count)| {
        json!({
            "semester": semester,
            "count": count,
            "percent": percent_of(count, total_classes)
        })
    })
    .collect();

    Ok(json!({
        "sessionId": session_id,
        "totals": counts,
        "studentsBySemester": students_by_semester,
        "studentsByProgram": students_by_program,
        "classesBySemester": classes_by_semester
    }))
}

fn grouped_counts(conn: &Connection, sql: &str) -> Result<Vec<(String, i64)>, CoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn percent_of(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((count as f64) * 1000.0 / (total as f64)).round() / 10.0
}

fn collection_counts(conn: &Connection) -> Result<serde_json::Value, CoreError> {
    let count = |sql: &str| -> Result<i64, CoreError> {
        Ok(conn.query_row(sql, [], |r| r.get(0))?)
    };
    Ok(json!({
        "teachers": count("SELECT COUNT(*) FROM teachers")?,
        "students": count("SELECT COUNT(*) FROM students")?,
        "classes": count("SELECT COUNT(*) FROM classes")?,
        "classSections": count("SELECT COUNT(*) FROM class_sections")?,
        "enrollments": count("SELECT COUNT(*) FROM enrollments")?,
        "registrationRequests": count("SELECT COUNT(*) FROM registration_requests")?
    }))
}

/// Point-in-time snapshot of the store plus the session's activity log.
fn build_snapshot(conn: &Connection, session_id: &str) -> Result<serde_json::Value, CoreError> {
    let counts = collection_counts(conn)?;

    let classes = collect_rows(
        conn,
        "SELECT id, class_name, program, semester FROM classes ORDER BY class_name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "className": row.get::<_, String>(1)?,
                "program": row.get::<_, String>(2)?,
                "semester": row.get::<_, i64>(3)?
            }))
        },
    )?;
    let class_sections = collect_rows(
        conn,
        "SELECT id, class_id, section, subject, assigned_teacher, enrolled_students
         FROM class_sections ORDER BY class_id, section, subject",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "classId": row.get::<_, String>(1)?,
                "section": row.get::<_, String>(2)?,
                "subject": row.get::<_, Option<String>>(3)?,
                "assignedTeacher": row.get::<_, Option<String>>(4)?,
                "enrolledStudents": row.get::<_, i64>(5)?
            }))
        },
    )?;
    let teachers = collect_rows(
        conn,
        "SELECT id, name, role FROM teachers ORDER BY name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "role": row.get::<_, String>(2)?
            }))
        },
    )?;
    let students = collect_rows(
        conn,
        "SELECT id, name, program, semester, section, enrollment_count
         FROM students ORDER BY name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "program": row.get::<_, String>(2)?,
                "semester": row.get::<_, String>(3)?,
                "section": row.get::<_, String>(4)?,
                "enrollmentCount": row.get::<_, i64>(5)?
            }))
        },
    )?;
    let registration_requests = collect_rows(
        conn,
        "SELECT id, name, status FROM registration_requests ORDER BY created_at",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "status": row.get::<_, String>(2)?
            }))
        },
    )?;
    let activities = session_activities(conn, session_id)?;

    Ok(json!({
        "takenAt": model::now_utc(),
        "sessionId": session_id,
        "counts": counts,
        "collections": {
            "classes": classes,
            "classSections": class_sections,
            "teachers": teachers,
            "students": students,
            "registrationRequests": registration_requests
        },
        "activities": activities
    }))
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    map: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value>,
) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| map(row))?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn session_activities(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT seq, at, kind, description, details
         FROM session_activities WHERE session_id = ? ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([session_id], |row| {
            let seq: i64 = row.get(0)?;
            let at: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let description: String = row.get(3)?;
            let details: Option<String> = row.get(4)?;
            Ok(json!({
                "seq": seq,
                "at": at,
                "kind": kind,
                "description": description,
                "details": details
                    .and_then(|d| serde_json::from_str::<serde_json::Value>(&d).ok())
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Manual backup: snapshot the store into the active session's
/// session_data, log a manual_backup activity carrying the counts, and hand
/// the snapshot back to the caller.
pub fn backup_snapshot(
    conn: &Connection,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, CoreError> {
    let session_id = require_active(conn)?;
    let snapshot = build_snapshot(conn, &session_id)?;

    conn.execute(
        "UPDATE sessions SET session_data = ? WHERE id = ?",
        (snapshot.to_string(), &session_id),
    )?;

    let counts = snapshot.get("counts").cloned().unwrap_or_else(|| json!({}));
    log_activity(
        conn,
        policy,
        "manual_backup",
        "manual backup snapshot taken",
        Some(&counts),
    )?;

    Ok(snapshot)
}

/// Sessions that carry snapshot data, newest first.
pub fn list_backups(conn: &Connection) -> Result<Vec<serde_json::Value>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_type, year, started_at, ended_at, is_active, session_data
         FROM sessions
         WHERE session_data IS NOT NULL
         ORDER BY started_at DESC, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let session_type: String = row.get(1)?;
            let year: String = row.get(2)?;
            let started_at: String = row.get(3)?;
            let ended_at: Option<String> = row.get(4)?;
            let is_active: i64 = row.get(5)?;
            let session_data: String = row.get(6)?;
            Ok((id, session_type, year, started_at, ended_at, is_active, session_data))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(id, session_type, year, started_at, ended_at, is_active, session_data)| {
            let snapshot: serde_json::Value =
                serde_json::from_str(&session_data).unwrap_or_else(|_| json!({}));
            json!({
                "sessionId": id,
                "sessionType": session_type,
                "year": year,
                "startedAt": started_at,
                "endedAt": ended_at,
                "isActive": is_active != 0,
                "takenAt": snapshot.get("takenAt").cloned(),
                "counts": snapshot.get("counts").cloned().unwrap_or_else(|| json!({}))
            })
        })
        .collect())
}

/// Hard-delete a historical session. The active session must be ended
/// first; there is no force path.
pub fn delete(
    conn: &Connection,
    policy: &RetryPolicy,
    session_id: &str,
) -> Result<(), CoreError> {
    let session = find_session(conn, session_id)?
        .ok_or_else(|| CoreError::not_found("session not found"))?;
    if session.is_active {
        return Err(CoreError::validation(
            "session is active; end it before deleting",
        ));
    }

    run_in_transaction(conn, policy, |tx| {
        tx.execute(
            "DELETE FROM session_activities WHERE session_id = ?",
            [session_id],
        )?;
        tx.execute("DELETE FROM sessions WHERE id = ?", [session_id])?;
        Ok(())
    })
}

/// Read-only summary of an inactive session's snapshot.
pub fn restore_preview(
    conn: &Connection,
    session_id: &str,
) -> Result<serde_json::Value, CoreError> {
    let session = find_session(conn, session_id)?
        .ok_or_else(|| CoreError::not_found("session not found"))?;
    if session.is_active {
        return Err(CoreError::validation(
            "session is still active; only ended sessions can be previewed",
        ));
    }
    let data = session.session_data.ok_or_else(|| {
        CoreError::validation("session has no snapshot data to preview")
    })?;
    let snapshot: serde_json::Value =
        serde_json::from_str(&data).map_err(|e| CoreError::fatal(format!(
            "stored snapshot is not valid JSON: {e}"
        )))?;

    Ok(json!({
        "sessionId": session.id,
        "sessionType": session.session_type,
        "year": session.year,
        "startedAt": session.started_at,
        "endedAt": session.ended_at,
        "takenAt": snapshot.get("takenAt").cloned(),
        "counts": snapshot.get("counts").cloned().unwrap_or_else(|| json!({})),
        "activityCount": snapshot
            .get("activities")
            .and_then(|a| a.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }))
}

/// Validate every restore precondition, then stop: historical data
/// restoration is disabled as a guard against destructive overwrite. The
/// response says so explicitly and no collection is touched.
pub fn restore(conn: &Connection, session_id: &str) -> Result<serde_json::Value, CoreError> {
    if active_session_id(conn)?.is_some() {
        return Err(CoreError::conflict(
            "end the active session before restoring a historical one",
        ));
    }
    let preview = restore_preview(conn, session_id)?;

    Ok(json!({
        "restored": false,
        "message": "historical data restoration is disabled for safety; no records were modified",
        "preview": preview
    }))
}
