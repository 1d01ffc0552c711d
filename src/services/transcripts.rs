use crate::api::error::AppError;
use crate::config::StorageConfig;
use crate::utils::validation::normalized_relative;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

pub const AUDIO_FILE_NAME: &str = "audio.wav";
pub const TRANSCRIPT_FILE_NAME: &str = "transcript.txt";

#[derive(Debug, Deserialize)]
struct TranscriptRow {
    audio: String,
    #[serde(default)]
    transcription: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RowFailure {
    /// 1-based line number in the CSV, header included
    pub row: usize,
    pub audio: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct MaterializeReport {
    pub rows: usize,
    pub audio_copied: usize,
    pub audio_missing: Vec<String>,
    pub transcripts_written: usize,
    pub failures: Vec<RowFailure>,
}

/// Turns an `audio,transcription` table into a folder-per-clip dataset.
///
/// Each row's `audio` column points at a clip folder inside `source_base`;
/// the folder's `audio.wav` is copied to the same relative folder under
/// `destination_base` next to a `transcript.txt`. A bad row is recorded in
/// the report and does not stop the others.
#[derive(Debug, Clone)]
pub struct TranscriptMaterializer {
    audio_prefix: String,
}

impl TranscriptMaterializer {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_prefix(config.audio_path_prefix.clone())
    }

    pub fn with_prefix(audio_prefix: impl Into<String>) -> Self {
        Self {
            audio_prefix: audio_prefix.into(),
        }
    }

    pub fn materialize(
        &self,
        csv_path: &Path,
        source_base: &Path,
        destination_base: &Path,
    ) -> Result<MaterializeReport, AppError> {
        if !csv_path.is_file() {
            return Err(AppError::NotFound(csv_path.to_path_buf()));
        }

        tracing::info!("Processing CSV file: {}", csv_path.display());

        let mut rdr = ReaderBuilder::new().has_headers(true).from_path(csv_path)?;
        if !rdr.headers()?.iter().any(|h| h == "audio") {
            return Err(AppError::InvalidRequest(format!(
                "CSV file {} has no 'audio' column",
                csv_path.display()
            )));
        }

        let mut report = MaterializeReport::default();
        for (idx, result) in rdr.deserialize::<TranscriptRow>().enumerate() {
            let line = idx + 2;
            report.rows += 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!("Error reading CSV row {}: {}", line, e);
                    report.failures.push(RowFailure {
                        row: line,
                        audio: String::new(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if let Err(e) = self.process_row(&row, source_base, destination_base, &mut report) {
                tracing::error!(
                    "Error processing audio file for row {}: {}",
                    row.audio,
                    e
                );
                report.failures.push(RowFailure {
                    row: line,
                    audio: row.audio.clone(),
                    message: e.to_string(),
                });
            }
        }

        tracing::info!(
            "Finished processing CSV file: {} rows, {} audio copied, {} missing, {} failed",
            report.rows,
            report.audio_copied,
            report.audio_missing.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Relative clip folder for an `audio` cell, `None` if it would escape
    fn clip_folder(&self, audio: &str) -> Option<PathBuf> {
        let stripped = if self.audio_prefix.is_empty() {
            audio.to_string()
        } else {
            audio.replacen(&self.audio_prefix, "", 1)
        };
        let stripped = stripped.trim_start_matches('/');
        let folder = Path::new(stripped).parent().unwrap_or(Path::new(""));
        normalized_relative(folder)
    }

    fn process_row(
        &self,
        row: &TranscriptRow,
        source_base: &Path,
        destination_base: &Path,
        report: &mut MaterializeReport,
    ) -> Result<(), AppError> {
        let folder = self.clip_folder(&row.audio).ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "Audio path '{}' points outside the dataset",
                row.audio
            ))
        })?;

        let source_audio = source_base.join(&folder).join(AUDIO_FILE_NAME);
        let destination_folder = destination_base.join(&folder);
        fs::create_dir_all(&destination_folder)?;

        if source_audio.is_file() {
            fs::copy(&source_audio, destination_folder.join(AUDIO_FILE_NAME))?;
            report.audio_copied += 1;
        } else {
            tracing::warn!(
                "Source audio file does not exist: {}",
                source_audio.display()
            );
            report
                .audio_missing
                .push(source_audio.to_string_lossy().to_string());
        }

        fs::write(
            destination_folder.join(TRANSCRIPT_FILE_NAME),
            row.transcription.as_deref().unwrap_or(""),
        )?;
        report.transcripts_written += 1;

        Ok(())
    }
}
