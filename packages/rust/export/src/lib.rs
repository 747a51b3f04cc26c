//! Export of approved leads to files.
//!
//! Writes `real_estate_leads_<ts>.csv`, `real_estate_leads_<ts>.json`, and
//! `lead_generation_report_<ts>.txt` into the output directory. Every file
//! is written to a temp name and renamed into place, and its SHA-256 is
//! recorded in the returned [`ExportReport`].

pub mod render;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use leadgen_shared::{ExportFormat, Lead, LeadGenError, Result, WorkflowState};

pub use render::{CSV_HEADERS, render_csv, render_json, render_report, top_indicators};

/// One written file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMeta {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// What an export run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub artifacts: Vec<ArtifactMeta>,
    pub exported_leads: usize,
}

impl ExportReport {
    /// The CSV if one was written, else the first artifact.
    pub fn primary(&self) -> Option<&ArtifactMeta> {
        self.artifacts
            .iter()
            .find(|a| a.format == ExportFormat::Csv)
            .or_else(|| self.artifacts.first())
    }
}

/// Sink for the export stage.
pub trait LeadExporter: Send + Sync {
    /// Persist `leads` (the approved subset) along with a run summary taken
    /// from `state`.
    fn export(&self, state: &WorkflowState, leads: &[Lead]) -> Result<ExportReport>;
}

/// Writes artifacts into a directory on disk.
#[derive(Debug, Clone)]
pub struct FileExporter {
    output_dir: PathBuf,
    formats: Vec<ExportFormat>,
}

impl FileExporter {
    pub fn new(output_dir: impl Into<PathBuf>, formats: Vec<ExportFormat>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Same as [`LeadExporter::export`] with an explicit clock.
    #[instrument(skip_all, fields(dir = %self.output_dir.display(), leads = leads.len()))]
    pub fn export_at(&self, state: &WorkflowState, leads: &[Lead], now: DateTime<Utc>) -> Result<ExportReport> {
        if leads.is_empty() {
            return Err(LeadGenError::Export("no leads to export".into()));
        }
        if self.formats.is_empty() {
            return Err(LeadGenError::config("no export formats configured"));
        }
        std::fs::create_dir_all(&self.output_dir).map_err(|e| LeadGenError::io(&self.output_dir, e))?;

        let stamp = now.format("%Y%m%d_%H%M%S");
        let mut artifacts = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let (filename, content) = match format {
                ExportFormat::Csv => (format!("real_estate_leads_{stamp}.csv"), render_csv(leads)?),
                ExportFormat::Json => (format!("real_estate_leads_{stamp}.json"), render_json(leads, now)?),
                ExportFormat::Report => (
                    format!("lead_generation_report_{stamp}.txt"),
                    render_report(state, leads, now),
                ),
            };
            artifacts.push(write_atomic(&self.output_dir, &filename, &content, *format)?);
        }

        info!(count = artifacts.len(), leads = leads.len(), "export complete");
        Ok(ExportReport {
            artifacts,
            exported_leads: leads.len(),
        })
    }
}

impl LeadExporter for FileExporter {
    fn export(&self, state: &WorkflowState, leads: &[Lead]) -> Result<ExportReport> {
        self.export_at(state, leads, Utc::now())
    }
}

/// Write `content` to `dir/filename` via a hidden temp file and rename.
pub fn write_atomic(dir: &Path, filename: &str, content: &str, format: ExportFormat) -> Result<ArtifactMeta> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, content).map_err(|e| LeadGenError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, &target) {
        let _ = std::fs::remove_file(&temp);
        return Err(LeadGenError::io(&target, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(file = %filename, size = content.len(), "wrote artifact");
    Ok(ArtifactMeta {
        format,
        path: target,
        sha256,
        size_bytes: content.len(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use leadgen_shared::RawListing;

    use super::*;

    fn approved_lead(address: &str, score: f64) -> Lead {
        let mut lead = Lead::from_listing(RawListing {
            address: address.into(),
            city: "Tempe".into(),
            state: "AZ".into(),
            source: "fsbo".into(),
            ..RawListing::default()
        });
        lead.set_score(score);
        lead
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn writes_all_formats_with_timestamped_names() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(
            dir.path().join("outputs"),
            vec![ExportFormat::Csv, ExportFormat::Json, ExportFormat::Report],
        );
        let state = WorkflowState::new("leads in Tempe, AZ");
        let leads = vec![approved_lead("3 Mill Ave", 77.0)];

        let report = exporter.export_at(&state, &leads, fixed_now()).unwrap();
        let names: Vec<String> = report
            .artifacts
            .iter()
            .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "real_estate_leads_20260314_092653.csv",
                "real_estate_leads_20260314_092653.json",
                "lead_generation_report_20260314_092653.txt",
            ]
        );
        assert_eq!(report.primary().unwrap().format, ExportFormat::Csv);
        assert_eq!(report.exported_leads, 1);

        for artifact in &report.artifacts {
            let bytes = std::fs::read(&artifact.path).unwrap();
            assert_eq!(bytes.len(), artifact.size_bytes);
            assert_eq!(artifact.sha256.len(), 64);
        }
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path(), vec![ExportFormat::Csv]);
        exporter
            .export_at(&WorkflowState::new("q"), &[approved_lead("1 A St", 50.0)], fixed_now())
            .unwrap();

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }
    }

    #[test]
    fn primary_falls_back_to_first_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path(), vec![ExportFormat::Report, ExportFormat::Json]);
        let report = exporter
            .export_at(&WorkflowState::new("q"), &[approved_lead("1 A St", 50.0)], fixed_now())
            .unwrap();
        assert_eq!(report.primary().unwrap().format, ExportFormat::Report);
    }

    #[test]
    fn empty_lead_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path(), vec![ExportFormat::Csv]);
        let err = exporter.export(&WorkflowState::new("q"), &[]).unwrap_err();
        assert!(err.to_string().contains("no leads to export"));
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes the rename fail
        std::fs::create_dir(dir.path().join("leads.csv")).unwrap();

        let err = write_atomic(dir.path(), "leads.csv", "a,b\n", ExportFormat::Csv).unwrap_err();
        assert!(matches!(err, LeadGenError::Io { .. }));
        assert!(!dir.path().join(".leads.csv.tmp").exists());
    }

    #[test]
    fn checksum_matches_content() {
        let dir = tempfile::tempdir().unwrap();
        let meta = write_atomic(dir.path(), "x.txt", "hello", ExportFormat::Report).unwrap();
        assert_eq!(
            meta.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
