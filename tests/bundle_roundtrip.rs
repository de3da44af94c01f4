#[path = "../src/backup.rs"]
mod backup;

use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
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

#[test]
fn export_then_preview_verifies_checksum() {
    let out_dir = temp_dir("registrar-bundle-roundtrip");

    let meta = json!({
        "sessionId": "s-1",
        "sessionType": "First Semester",
        "year": "2025-2026"
    });
    let snapshot = json!({
        "takenAt": "2026-03-01T08:00:00Z",
        "counts": { "students": 2, "teachers": 1 }
    });
    let activities = json!([
        { "seq": 1, "kind": "session_started", "description": "started" },
        { "seq": 2, "kind": "manual_backup", "description": "backup" }
    ]);

    let bundle_path = out_dir.join("session.rsbundle.zip");
    let export = backup::export_session_bundle(&meta, &snapshot, &activities, &bundle_path)
        .expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.snapshot_sha256.len(), 64);

    let preview = backup::preview_session_bundle(&bundle_path).expect("preview bundle");
    assert_eq!(preview.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert!(preview.checksum_ok);
    assert_eq!(preview.activity_count, 2);
    assert_eq!(
        preview.session.get("sessionId").and_then(|v| v.as_str()),
        Some("s-1")
    );

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn foreign_and_non_zip_inputs_are_rejected() {
    let out_dir = temp_dir("registrar-bundle-reject");

    // Not a zip at all.
    let plain = out_dir.join("plain.bin");
    std::fs::write(&plain, b"0123456789").expect("write plain file");
    let err = backup::preview_session_bundle(&plain).expect_err("plain file must be rejected");
    assert!(err.to_string().contains("not a session bundle"));

    // A real zip carrying a different manifest format.
    let foreign = out_dir.join("foreign.zip");
    {
        let f = std::fs::File::create(&foreign).expect("create foreign zip");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("start manifest");
        zip.write_all(br#"{ "format": "something-else" }"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }
    let err = backup::preview_session_bundle(&foreign).expect_err("foreign bundle must be rejected");
    assert!(err.to_string().contains("unsupported bundle format"));

    let _ = std::fs::remove_dir_all(out_dir);
}
