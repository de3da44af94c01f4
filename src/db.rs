use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "registrar.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Concurrent writers surface SQLITE_BUSY to the retry wrapper almost
    // immediately instead of blocking the protocol loop.
    conn.busy_timeout(Duration::from_millis(50))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            session_type TEXT NOT NULL,
            year TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            session_data TEXT
        )",
        [],
    )?;

    // Single-row sentinel for the one-active-session invariant. Claiming it
    // is an atomic conditional insert, so concurrent starts cannot both win.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS active_session(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            session_id TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_activities(
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            at TEXT NOT NULL,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            details TEXT,
            PRIMARY KEY(session_id, seq),
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            program TEXT NOT NULL,
            class_name TEXT NOT NULL UNIQUE,
            semester INTEGER NOT NULL,
            sections TEXT NOT NULL,
            subjects TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'teacher'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_sections(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            section TEXT NOT NULL,
            subject TEXT,
            program TEXT NOT NULL,
            semester INTEGER NOT NULL,
            room TEXT NOT NULL DEFAULT '',
            assigned_teacher TEXT,
            assigned_at TEXT,
            enrolled_students INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(assigned_teacher) REFERENCES teachers(id)
        )",
        [],
    )?;
    // Sparse uniqueness: subjectless placeholder rows may coexist; one row
    // per (class, section, subject) once a subject is bound.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_class_sections_unit
         ON class_sections(class_id, section, subject) WHERE subject IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_sections_class ON class_sections(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_sections_teacher
         ON class_sections(assigned_teacher)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            program TEXT NOT NULL,
            semester TEXT NOT NULL,
            section TEXT NOT NULL,
            enrollment_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_section_students(
            class_section_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(class_section_id, student_id),
            FOREIGN KEY(class_section_id) REFERENCES class_sections(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_section_students_student
         ON class_section_students(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_assignments(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            sections TEXT NOT NULL,
            class_display_name TEXT NOT NULL,
            cred_username TEXT NOT NULL,
            cred_password_hash TEXT NOT NULL,
            assigned_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_assignments_teacher
         ON teacher_assignments(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_assignments_class
         ON teacher_assignments(class_id)",
        [],
    )?;
    // Usernames resolve an enrollment to a single assignment, so they are
    // unique regardless of letter case.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_teacher_assignments_username
         ON teacher_assignments(lower(cred_username))",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_section_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            program TEXT NOT NULL,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL,
            enrolled_at TEXT NOT NULL,
            UNIQUE(student_id, class_section_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_section_id) REFERENCES class_sections(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_section ON enrollments(class_section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS registration_requests(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            requested_role TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Existing workspaces may predate the room column on class_sections.
    ensure_class_sections_room(&conn)?;

    Ok(conn)
}

fn ensure_class_sections_room(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "class_sections", "room")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE class_sections ADD COLUMN room TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
