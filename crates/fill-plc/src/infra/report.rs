//! Flat text batch reports.
//!
//! Each batch leaves one file in the report directory:
//! `batch_<YYYYmmdd_HHMMSS>.txt` on success, `error_<YYYYmmdd_HHMMSS>.txt`
//! when it aborts. Masses carry one decimal place.

use chrono::{DateTime, Local};
use fill_core::{Recorder, StageResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct FileRecorder {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileRecorder {
    /// The directory is created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reports written by this recorder, oldest first.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, prefix: &str, now: DateTime<Local>, body: &str) -> io::Result<PathBuf> {
        // Recreated in case it was removed while the batch ran.
        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}_{}.txt", prefix, now.format("%Y%m%d_%H%M%S")));
        fs::write(&path, body)?;
        self.written.push(path.clone());
        Ok(path)
    }
}

fn success_report(now: DateTime<Local>, stages: &[StageResult], total_kg: f64) -> String {
    let lines: String = stages
        .iter()
        .map(|stage| format!("{}: {:.1} kg\n", stage.name, stage.achieved_kg))
        .collect();
    format!(
        "Batch report\nDate: {}\n{}Total: {:.1} kg\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        lines,
        total_kg
    )
}

fn error_report(now: DateTime<Local>, reason: &str, weight_kg: f64, stage_delta_kg: f64) -> String {
    format!(
        "PROCESS ERROR\nDate: {}\n{}\nCurrent weight: {:.1} kg\nStage delta: {:.1} kg\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        reason,
        weight_kg,
        stage_delta_kg
    )
}

impl Recorder for FileRecorder {
    fn record_success(&mut self, stages: &[StageResult], total_kg: f64) -> io::Result<()> {
        let now = Local::now();
        let path = self.write("batch", now, &success_report(now, stages, total_kg))?;
        info!(path = %path.display(), "Results saved");
        Ok(())
    }

    fn record_error(&mut self, reason: &str, weight_kg: f64, stage_delta_kg: f64) -> io::Result<()> {
        let now = Local::now();
        let body = error_report(now, reason, weight_kg, stage_delta_kg);
        let path = self.write("error", now, &body)?;
        info!(path = %path.display(), "Error recorded");
        Ok(())
    }
}
