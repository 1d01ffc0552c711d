//! CSV merge and preview.

use crate::api::error::AppError;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SourceSummary {
    #[schema(value_type = String)]
    pub path: PathBuf,
    pub rows: usize,
}

/// Outcome of a successful merge
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MergeReport {
    #[schema(value_type = String)]
    pub output: PathBuf,
    pub header: Vec<String>,
    pub rows_written: usize,
    pub sources: Vec<SourceSummary>,
    /// Inputs without a header line; they contribute no rows
    #[schema(value_type = Vec<String>)]
    pub skipped_empty: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TabularPreview {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

struct Source {
    path: PathBuf,
    header: StringRecord,
    rows: Vec<StringRecord>,
}

/// Concatenates CSV files that share an identical header.
///
/// Rules:
///
/// - The first file with a header line defines the canonical header.
/// - Every other file must carry the same column names in the same order.
/// - A file with no header line at all (empty file) contributes nothing.
/// - The output only appears once every input has been read and validated.
#[derive(Debug, Clone, Default)]
pub struct TabularMerger;

impl TabularMerger {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeReport, AppError> {
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            tracing::error!("Error merging CSV files: File not found: {}", missing.display());
            return Err(AppError::NotFound(missing.clone()));
        }

        let mut canonical: Option<StringRecord> = None;
        let mut sources = Vec::with_capacity(inputs.len());
        let mut skipped_empty = Vec::new();

        for path in inputs {
            let source = read_source(path)?;

            if source.header.is_empty() {
                tracing::warn!(
                    "CSV file {} has no header line, contributing no rows",
                    path.display()
                );
                skipped_empty.push(path.clone());
                continue;
            }

            match &canonical {
                None => canonical = Some(source.header.clone()),
                Some(header) => {
                    if !header.iter().eq(source.header.iter()) {
                        tracing::error!(
                            "Error merging CSV files: CSV file headers mismatch in {}",
                            path.display()
                        );
                        return Err(AppError::SchemaMismatch { file: path.clone() });
                    }
                }
            }

            sources.push(source);
        }

        let header = canonical.ok_or(AppError::NoHeaderFound)?;
        let rows_written = write_atomically(output, &header, &sources)?;

        tracing::info!(
            "Merged CSV file created at: {} ({} rows from {} files)",
            output.display(),
            rows_written,
            sources.len()
        );

        Ok(MergeReport {
            output: output.to_path_buf(),
            header: header.iter().map(str::to_string).collect(),
            rows_written,
            sources: sources
                .into_iter()
                .map(|s| SourceSummary {
                    path: s.path,
                    rows: s.rows.len(),
                })
                .collect(),
            skipped_empty,
        })
    }

    /// Runs [`TabularMerger::merge`] on the blocking pool
    pub async fn merge_blocking(
        &self,
        inputs: Vec<PathBuf>,
        output: PathBuf,
    ) -> Result<MergeReport, AppError> {
        let merger = self.clone();
        tokio::task::spawn_blocking(move || merger.merge(&inputs, &output))
            .await
            .map_err(|e| AppError::Internal(format!("Merge task failed: {}", e)))?
    }
}

fn read_source(path: &Path) -> Result<Source, AppError> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let header = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?);
    }

    Ok(Source {
        path: path.to_path_buf(),
        header,
        rows,
    })
}

fn write_atomically(
    output: &Path,
    header: &StringRecord,
    sources: &[Source],
) -> Result<usize, AppError> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    let mut rows_written = 0;
    {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file_mut());
        wtr.write_record(header)?;
        for source in sources {
            for row in &source.rows {
                wtr.write_record(row)?;
                rows_written += 1;
            }
        }
        wtr.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| AppError::Io(e.error))?;

    Ok(rows_written)
}

/// Header plus at most `limit` data rows of a CSV file
pub fn preview(path: &Path, limit: usize) -> Result<TabularPreview, AppError> {
    if !path.is_file() {
        return Err(AppError::NotFound(path.to_path_buf()));
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let header = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut truncated = false;
    for record in rdr.records() {
        if rows.len() == limit {
            truncated = true;
            break;
        }
        rows.push(record?.iter().map(str::to_string).collect());
    }

    Ok(TabularPreview {
        header,
        rows,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_merge_concatenates_in_input_order() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id,name\n1,alice\n");
        let b = write(&dir, "b.csv", "id,name\n2,bob\n3,carol\n");
        let out = dir.path().join("out/merged.csv");

        let report = TabularMerger::new()
            .merge(&[a.clone(), b.clone()], &out)
            .unwrap();

        assert_eq!(report.header, vec!["id", "name"]);
        assert_eq!(report.rows_written, 3);
        assert_eq!(report.sources[0].rows, 1);
        assert_eq!(report.sources[1].rows, 2);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "id,name\n1,alice\n2,bob\n3,carol\n"
        );
    }

    #[test]
    fn test_header_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id,name\n1,alice\n");
        let c = write(&dir, "c.csv", "id,email\n2,bob@example.com\n");
        let out = dir.path().join("merged.csv");

        let err = TabularMerger::new().merge(&[a, c.clone()], &out).unwrap_err();

        match err {
            AppError::SchemaMismatch { file } => assert_eq!(file, c),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());
        // no stray temp files either
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_column_order_matters() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id,name\n1,alice\n");
        let b = write(&dir, "b.csv", "name,id\nbob,2\n");

        let err = TabularMerger::new()
            .merge(&[a, b], &dir.path().join("m.csv"))
            .unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_missing_input_aborts_before_writing() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id\n1\n");
        let out = dir.path().join("m.csv");

        let err = TabularMerger::new()
            .merge(&[a, dir.path().join("gone.csv")], &out)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_empty_list_has_no_header() {
        let dir = TempDir::new().unwrap();
        let err = TabularMerger::new()
            .merge(&[], &dir.path().join("m.csv"))
            .unwrap_err();
        assert!(matches!(err, AppError::NoHeaderFound));
    }

    #[test]
    fn test_header_less_files_contribute_nothing() {
        let dir = TempDir::new().unwrap();
        let empty = write(&dir, "empty.csv", "");
        let a = write(&dir, "a.csv", "id,name\n1,alice\n");
        let header_only = write(&dir, "h.csv", "id,name\n");
        let out = dir.path().join("m.csv");

        let report = TabularMerger::new()
            .merge(&[empty.clone(), a, header_only], &out)
            .unwrap();

        assert_eq!(report.rows_written, 1);
        assert_eq!(report.skipped_empty, vec![empty.clone()]);
        assert_eq!(fs::read_to_string(&out).unwrap(), "id,name\n1,alice\n");

        let err = TabularMerger::new()
            .merge(&[empty], &dir.path().join("none.csv"))
            .unwrap_err();
        assert!(matches!(err, AppError::NoHeaderFound));
    }

    #[test]
    fn test_quoted_fields_survive_untouched() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id,note\n1,\"hello, world\"\n2,plain\n");
        let out = dir.path().join("m.csv");

        TabularMerger::new().merge(&[a], &out).unwrap();

        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "id,note\n1,\"hello, world\"\n2,plain\n"
        );
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id,name\n1,alice,extra\n");
        let out = dir.path().join("m.csv");

        let err = TabularMerger::new().merge(&[a], &out).unwrap_err();
        assert!(matches!(err, AppError::Csv(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_preview_truncates() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "id\n1\n2\n3\n");

        let preview = preview(&a, 2).unwrap();
        assert_eq!(preview.header, vec!["id"]);
        assert_eq!(preview.rows, vec![vec!["1"], vec!["2"]]);
        assert!(preview.truncated);

        let full = super::preview(&a, 10).unwrap();
        assert_eq!(full.rows.len(), 3);
        assert!(!full.truncated);
    }
}
