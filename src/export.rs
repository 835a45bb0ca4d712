//! Export the memory document and the source-index artifact as JSON.
//!
//! Snapshots are pretty-printed copies of the whole [`MemoryDocument`] and
//! can be fed back through `pmem import`. The source index is a regenerable
//! summary for external tooling; nothing reads it back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::models::MemoryDocument;

/// `memory-export-<millis>.json` inside `dir`.
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "memory-export-{}.json",
        Utc::now().timestamp_millis()
    ))
}

/// Write `doc` to `path`, creating parent directories.
pub fn write_snapshot(doc: &MemoryDocument, path: &Path) -> Result<()> {
    write_json(doc, path)?;
    tracing::info!(
        path = %path.display(),
        items = doc.total_items(),
        "memory snapshot written"
    );
    Ok(())
}

/// Summary of an indexed source tree.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIndex {
    pub project_name: String,
    pub engine_version: String,
    pub indexed: DateTime<Utc>,
    pub source_files: Vec<String>,
    pub header_files: Vec<String>,
    pub implementation_files: Vec<String>,
    pub classes: Vec<String>,
}

pub fn write_source_index(index: &SourceIndex, path: &Path) -> Result<()> {
    write_json(index, path)?;
    eprintln!(
        "Wrote source index ({} files, {} classes) to {}",
        index.source_files.len(),
        index.classes.len(),
        path.display()
    );
    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/snap.json");
        write_snapshot(&MemoryDocument::new("Arena"), &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: MemoryDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc.project_name, "Arena");
    }

    #[test]
    fn default_export_name() {
        let path = default_export_path(Path::new("/tmp/mem"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("memory-export-"));
        assert!(name.ends_with(".json"));
    }
}
