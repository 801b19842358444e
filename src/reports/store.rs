use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use super::Report;

const REPORTS_FILE: &str = "battery_reports.json";
const INTERMEDIATE_FILE: &str = "battery_test_intermediate.json";

/// Durable report history plus the single crash-recovery slot.
///
/// History is a load-merge-store JSON array, which is only safe because the
/// tester engine is the one and only writer.
#[derive(Debug, Clone)]
pub struct ReportStore {
    reports_path: PathBuf,
    intermediate_path: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            reports_path: dir.join(REPORTS_FILE),
            intermediate_path: dir.join(INTERMEDIATE_FILE),
        }
    }

    pub fn reports_path(&self) -> &Path {
        &self.reports_path
    }

    pub fn intermediate_path(&self) -> &Path {
        &self.intermediate_path
    }

    /// Returns the persisted history. An absent or corrupt file reads as empty.
    pub fn load_all(&self) -> Vec<Report> {
        match fs::read_to_string(&self.reports_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Report history at {} is unreadable, treating as empty: {err}",
                    self.reports_path.display()
                );
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Appends `report` and rewrites the full history. Returns the new history.
    pub fn append(&self, report: Report) -> Result<Vec<Report>> {
        let mut reports = self.load_all();
        reports.push(report);
        write_json_atomically(&self.reports_path, &reports)
            .context("failed to save report history")?;
        Ok(reports)
    }

    /// Overwrites the recovery slot.
    pub fn write_intermediate(&self, report: &Report) -> Result<()> {
        write_json_atomically(&self.intermediate_path, report)
            .context("failed to save intermediate report")
    }

    pub fn load_intermediate(&self) -> Option<Report> {
        let contents = fs::read_to_string(&self.intermediate_path).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

/// Writes to a sibling temp file, syncs it and renames it over `path`, so a
/// crash mid-write leaves either the old or the new document.
fn write_json_atomically<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(&serialized)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to move {} into place", tmp_path.display()))
}
