use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .expect("error code")
        .to_string()
}

fn section_row<'a>(
    sections: &'a [serde_json::Value],
    section: &str,
    subject: &str,
) -> &'a serde_json::Value {
    sections
        .iter()
        .find(|s| {
            s.get("section").and_then(|v| v.as_str()) == Some(section)
                && s.get("subject").and_then(|v| v.as_str()) == Some(subject)
        })
        .unwrap_or_else(|| panic!("no class section {section}/{subject}"))
}

#[test]
fn assign_enroll_duplicate_and_unassign_flow() {
    let workspace = temp_dir("registrar-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Maria Santos", "email": "maria@school.test", "role": "teacher" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({
            "program": "BSCS",
            "semester": 3,
            "sections": ["A", "B"],
            "subjects": ["Math"]
        }),
    );
    let class_id = created
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    assert_eq!(
        created.get("className").and_then(|v| v.as_str()),
        Some("BSCS-3")
    );

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.assign",
        json!({
            "teacherId": teacher_id,
            "classId": class_id,
            "subject": "Math",
            "sections": ["A"],
            "credentials": { "username": "mathA", "password": "secret123" }
        }),
    );
    assert_eq!(
        assigned.get("sections").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "name": "Juan Reyes",
            "program": "BSCS",
            "semester": "3rd",
            "section": "A"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    // Ordinal semester "3rd" must resolve against the class's semester 3.
    let enrolled = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "enrollment.enroll",
        json!({ "studentId": student_id, "username": "mathA", "password": "secret123" }),
    );
    assert_eq!(enrolled.get("subject").and_then(|v| v.as_str()), Some("Math"));
    assert_eq!(enrolled.get("section").and_then(|v| v.as_str()), Some("A"));
    let class_section_id = enrolled
        .get("classSectionId")
        .and_then(|v| v.as_str())
        .expect("classSectionId")
        .to_string();

    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.sections",
        json!({ "classId": class_id }),
    );
    let sections = sections
        .get("classSections")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("classSections");
    let math_a = section_row(&sections, "A", "Math");
    assert_eq!(math_a.get("id").and_then(|v| v.as_str()), Some(class_section_id.as_str()));
    assert_eq!(math_a.get("enrolledStudents").and_then(|v| v.as_i64()), Some(1));
    assert!(math_a.get("assignedTeacher").and_then(|v| v.as_str()).is_some());

    let students = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}));
    let students = students
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("students");
    assert_eq!(
        students[0].get("enrollmentCount").and_then(|v| v.as_i64()),
        Some(1)
    );

    // Second enrollment with the same credentials must conflict and leave
    // both counters where they were.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "enrollment.enroll",
        json!({ "studentId": student_id, "username": "mathA", "password": "secret123" }),
    );
    assert_eq!(code, "conflict");

    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "classes.sections",
        json!({ "classId": class_id }),
    );
    let sections = sections
        .get("classSections")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("classSections");
    assert_eq!(
        section_row(&sections, "A", "Math")
            .get("enrolledStudents")
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let unassigned = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.unassign",
        json!({
            "teacherId": teacher_id,
            "classId": class_id,
            "sections": "A",
            "subject": "Math"
        }),
    );
    assert_eq!(
        unassigned.get("sectionsCleared").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        unassigned.get("enrollmentsRemoved").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        unassigned.get("assignmentsRemoved").and_then(|v| v.as_i64()),
        Some(1)
    );

    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "classes.sections",
        json!({ "classId": class_id }),
    );
    let sections = sections
        .get("classSections")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("classSections");
    let math_a = section_row(&sections, "A", "Math");
    assert_eq!(math_a.get("enrolledStudents").and_then(|v| v.as_i64()), Some(0));
    assert!(math_a.get("assignedTeacher").and_then(|v| v.as_str()).is_none());

    let students = request_ok(&mut stdin, &mut reader, "13", "students.list", json!({}));
    let students = students
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("students");
    assert_eq!(
        students[0].get("enrollmentCount").and_then(|v| v.as_i64()),
        Some(0)
    );

    let assignments = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "assignments.list",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(
        assignments
            .get("assignments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn enrollment_resolution_failures_are_distinct() {
    let workspace = temp_dir("registrar-resolution");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Ana Cruz", "email": "ana@school.test" }),
    );
    let teacher_id = teacher.get("teacherId").and_then(|v| v.as_str()).unwrap().to_string();
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "program": "BSCS", "semester": 3, "sections": ["A"], "subjects": ["Math"] }),
    );
    let class_id = class.get("classId").and_then(|v| v.as_str()).unwrap().to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.assign",
        json!({
            "teacherId": teacher_id,
            "classId": class_id,
            "subject": "Math",
            "sections": ["A"],
            "credentials": { "username": "mathA", "password": "secret123" }
        }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "name": "Pia", "program": "BSCS", "semester": "3rd", "section": "A" }),
    );
    let student_id = student.get("studentId").and_then(|v| v.as_str()).unwrap().to_string();

    // Unknown student.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "enrollment.enroll",
        json!({ "studentId": "missing", "username": "mathA", "password": "secret123" }),
    );
    assert_eq!(code, "not_found");

    // Unknown credentials username.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "7",
        "enrollment.enroll",
        json!({ "studentId": student_id, "username": "nosuch", "password": "secret123" }),
    );
    assert_eq!(code, "not_found");

    // Wrong password is an auth failure, not a lookup failure.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "8",
        "enrollment.enroll",
        json!({ "studentId": student_id, "username": "mathA", "password": "wrong" }),
    );
    assert_eq!(code, "auth_failed");

    // Username matching is case-insensitive, so this succeeds.
    let enrolled = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "enrollment.enroll",
        json!({ "studentId": student_id, "username": "MATHA", "password": "secret123" }),
    );
    assert_eq!(enrolled.get("section").and_then(|v| v.as_str()), Some("A"));

    // A student outside the assignment's program has no matching section.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.create",
        json!({ "name": "Leo", "program": "BSIT", "semester": "3rd", "section": "A" }),
    );
    let other_id = other.get("studentId").and_then(|v| v.as_str()).unwrap().to_string();
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "11",
        "enrollment.enroll",
        json!({ "studentId": other_id, "username": "mathA", "password": "secret123" }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
