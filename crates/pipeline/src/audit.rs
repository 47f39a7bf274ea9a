//! Filesystem audit artifacts: per run, an audit JSON mirroring the run
//! row and a ranked shortlist JSON, both named by run id.

use crate::run::PipelineRun;
use nicheradar_core::{Result, RunId};
use nicheradar_market_data::shortlist::ShortlistEntry;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct AuditWriter {
    dir: PathBuf,
}

impl AuditWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Writes `<run_id>.audit.json` with the complete run record.
    pub fn write_run(&self, run: &PipelineRun) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("{}.audit.json", run.run_id));
        let json = serde_json::to_string_pretty(run)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "audit record written");
        Ok(path)
    }

    /// Writes `<run_id>.shortlist.json` with the ranked opportunity list.
    pub fn write_shortlist(&self, run_id: RunId, entries: &[ShortlistEntry]) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("{run_id}.shortlist.json"));
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), items = entries.len(), "shortlist record written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nicheradar_core::Asin;

    #[test]
    fn audit_files_are_named_by_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AuditWriter::new(dir.path());
        let run_id = RunId::new();
        let run = PipelineRun::new(run_id, serde_json::json!({"version": 1}));

        let path = writer.write_run(&run).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{run_id}.audit.json")
        );

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "running");
        assert_eq!(written["config_snapshot"]["version"], 1);
    }

    #[test]
    fn shortlist_file_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AuditWriter::new(dir.path());
        let run_id = RunId::new();
        let entries = vec![ShortlistEntry {
            asin: Asin::parse("B01ABCD234").unwrap(),
            final_score: 82,
            rank_score: 15_000.0,
            window_days: 30,
        }];

        let path = writer.write_shortlist(run_id, &entries).unwrap();
        let decoded: Vec<ShortlistEntry> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].final_score, 82);
    }
}
