use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const SNAPSHOT_ENTRY: &str = "session/snapshot.json";
const ACTIVITIES_ENTRY: &str = "session/activities.json";
pub const BUNDLE_FORMAT_V1: &str = "registrar-session-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub snapshot_sha256: String,
}

#[derive(Debug, Clone)]
pub struct BundlePreview {
    pub bundle_format: String,
    pub session: serde_json::Value,
    pub checksum_ok: bool,
    pub activity_count: usize,
}

/// Write one session's snapshot as a portable zip bundle: a manifest (with
/// a sha-256 digest of the snapshot entry), the snapshot itself, and the
/// activity log.
pub fn export_session_bundle(
    session_meta: &serde_json::Value,
    snapshot: &serde_json::Value,
    activities: &serde_json::Value,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let snapshot_bytes =
        serde_json::to_vec_pretty(snapshot).context("failed to serialize snapshot")?;
    let snapshot_sha256 = sha256_hex(&snapshot_bytes);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "session": session_meta,
        "snapshotSha256": snapshot_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(SNAPSHOT_ENTRY, opts)
        .context("failed to start snapshot entry")?;
    zip.write_all(&snapshot_bytes)
        .context("failed to write snapshot entry")?;

    zip.start_file(ACTIVITIES_ENTRY, opts)
        .context("failed to start activities entry")?;
    zip.write_all(
        serde_json::to_string_pretty(activities)
            .context("failed to serialize activities")?
            .as_bytes(),
    )
    .context("failed to write activities entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        snapshot_sha256,
    })
}

/// Read a bundle's manifest and verify the snapshot checksum without
/// touching any collection. This is the only import path: actual
/// restoration from a bundle is as deliberately absent as session restore.
pub fn preview_session_bundle(in_path: &Path) -> anyhow::Result<BundlePreview> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a session bundle: {}",
            in_path.to_string_lossy()
        ));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut snapshot_bytes = Vec::new();
    archive
        .by_name(SNAPSHOT_ENTRY)
        .context("bundle missing session/snapshot.json")?
        .read_to_end(&mut snapshot_bytes)
        .context("failed to read snapshot entry")?;
    let expected = manifest
        .get("snapshotSha256")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let checksum_ok = !expected.is_empty() && sha256_hex(&snapshot_bytes) == expected;

    let mut activities_text = String::new();
    archive
        .by_name(ACTIVITIES_ENTRY)
        .context("bundle missing session/activities.json")?
        .read_to_string(&mut activities_text)
        .context("failed to read activities entry")?;
    let activities: serde_json::Value =
        serde_json::from_str(&activities_text).context("activities entry is invalid JSON")?;

    Ok(BundlePreview {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        session: manifest
            .get("session")
            .cloned()
            .unwrap_or_else(|| json!({})),
        checksum_ok,
        activity_count: activities.as_array().map(|a| a.len()).unwrap_or(0),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
