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

#[test]
fn backup_snapshot_export_and_preview_bundle() {
    let workspace = temp_dir("registrar-bundle");
    let out_dir = temp_dir("registrar-bundle-out");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Backups need an active session.
    let code = request_err_code(&mut stdin, &mut reader, "2", "session.backup", json!({}));
    assert_eq!(code, "not_found");

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.start",
        json!({ "sessionType": "First Semester", "year": "2025-2026" }),
    );
    let session_id = started
        .get("sessionId")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "name": "Maria Santos", "email": "maria@school.test" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "name": "Ana", "program": "BSCS", "semester": "1st", "section": "A" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "registration.submit",
        json!({ "name": "New Parent", "email": "parent@school.test", "requestedRole": "parent" }),
    );

    let backed_up = request_ok(&mut stdin, &mut reader, "7", "session.backup", json!({}));
    let counts = backed_up
        .get("snapshot")
        .and_then(|s| s.get("counts"))
        .cloned()
        .expect("snapshot counts");
    assert_eq!(counts.get("teachers").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(counts.get("students").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        counts.get("registrationRequests").and_then(|v| v.as_i64()),
        Some(1)
    );

    // The manual backup shows up in the backups listing, active included.
    let backups = request_ok(&mut stdin, &mut reader, "8", "session.backups", json!({}));
    let rows = backups.get("backups").and_then(|v| v.as_array()).cloned().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("sessionId").and_then(|v| v.as_str()),
        Some(session_id.as_str())
    );
    assert_eq!(rows[0].get("isActive").and_then(|v| v.as_bool()), Some(true));

    let bundle_path = out_dir.join("first-semester.rsbundle.zip");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "session.exportBundle",
        json!({ "sessionId": session_id, "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("registrar-session-v1")
    );
    assert_eq!(exported.get("entryCount").and_then(|v| v.as_i64()), Some(3));
    let sha = exported
        .get("snapshotSha256")
        .and_then(|v| v.as_str())
        .expect("snapshotSha256")
        .to_string();
    assert_eq!(sha.len(), 64);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "session.previewBundle",
        json!({ "path": bundle_path.to_string_lossy() }),
    );
    assert_eq!(preview.get("checksumOk").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        preview
            .get("session")
            .and_then(|s| s.get("sessionId"))
            .and_then(|v| v.as_str()),
        Some(session_id.as_str())
    );
    assert!(preview.get("activityCount").and_then(|v| v.as_i64()).unwrap_or(0) >= 1);

    // Unknown session and non-bundle files fail with their own codes.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "11",
        "session.exportBundle",
        json!({ "sessionId": "missing", "outPath": out_dir.join("x.zip").to_string_lossy() }),
    );
    assert_eq!(code, "not_found");

    let not_a_bundle = out_dir.join("plain.txt");
    std::fs::write(&not_a_bundle, b"not a zip").expect("write plain file");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "12",
        "session.previewBundle",
        json!({ "path": not_a_bundle.to_string_lossy() }),
    );
    assert_eq!(code, "bundle_preview_failed");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
