use crate::api::error::AppError;
use crate::config::StorageConfig;
use crate::services::archive::{ArchiveExtractor, pack_directory};
use crate::services::reaper::WorkspaceReaper;
use crate::services::tabular::{MergeReport, TabularMerger};
use crate::services::transcripts::{MaterializeReport, TranscriptMaterializer};
use crate::utils::{claim_unique_dir, claim_unique_file};
use serde::Serialize;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Inputs of one processing run, all paths already resolved on disk
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub archive: PathBuf,
    pub tables: Vec<PathBuf>,
    pub package: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineOutcome {
    #[schema(value_type = String)]
    pub workspace: PathBuf,
    pub merge: MergeReport,
    #[schema(value_type = String)]
    pub dataset: PathBuf,
    pub transcripts: MaterializeReport,
    #[schema(value_type = Option<String>)]
    pub bundle: Option<PathBuf>,
}

/// Extract, merge, materialize and optionally bundle, in that order.
///
/// When a stage after extraction fails, the workspace and every derived
/// artifact of the run are reaped. A failed extraction keeps its workspace.
#[derive(Debug, Clone)]
pub struct ProcessingPipeline {
    extractor: ArchiveExtractor,
    merger: TabularMerger,
    materializer: TranscriptMaterializer,
    reaper: WorkspaceReaper,
    merged_root: PathBuf,
    processed_root: PathBuf,
    bundles_root: PathBuf,
}

impl ProcessingPipeline {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            extractor: ArchiveExtractor::new(config),
            merger: TabularMerger::new(),
            materializer: TranscriptMaterializer::new(config),
            reaper: WorkspaceReaper::new(),
            merged_root: config.merged_dir(),
            processed_root: config.processed_dir(),
            bundles_root: config.bundles_dir(),
        }
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutcome, AppError> {
        if request.tables.is_empty() {
            return Err(AppError::InvalidRequest(
                "At least one CSV file is required".to_string(),
            ));
        }
        if let Some(missing) = request.tables.iter().find(|p| !p.is_file()) {
            return Err(AppError::NotFound(missing.clone()));
        }

        let workspace = self.extractor.extract_blocking(request.archive.clone()).await?;

        let mut created = vec![workspace.clone()];
        match self.finish(&request, &workspace, &mut created).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Processing failed, rolling back {} artifacts: {}", created.len(), e);
                for path in created.iter().rev() {
                    if let Err(cleanup) = self.reaper.reap(path).await {
                        tracing::warn!("Rollback left {} behind: {}", path.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    async fn finish(
        &self,
        request: &PipelineRequest,
        workspace: &Path,
        created: &mut Vec<PathBuf>,
    ) -> Result<PipelineOutcome, AppError> {
        let merged_path = claim_unique_file(&self.merged_root, "merged_", ".csv")?;
        created.push(merged_path.clone());
        let merge = self
            .merger
            .merge_blocking(request.tables.clone(), merged_path)
            .await?;

        let dataset = claim_unique_dir(&self.processed_root, "processed_")?;
        created.push(dataset.clone());

        let materializer = self.materializer.clone();
        let csv_path = merge.output.clone();
        let source = workspace.to_path_buf();
        let destination = dataset.clone();
        let transcripts = tokio::task::spawn_blocking(move || {
            materializer.materialize(&csv_path, &source, &destination)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Materialize task failed: {}", e)))??;

        let bundle = if request.package {
            let folder = dataset.clone();
            let output = self.bundles_root.clone();
            let bundle = tokio::task::spawn_blocking(move || pack_directory(&folder, &output))
                .await
                .map_err(|e| AppError::Internal(format!("Packaging task failed: {}", e)))??;
            created.push(bundle.clone());
            Some(bundle)
        } else {
            None
        };

        tracing::info!(
            "✅ Processed {} into {} ({} rows)",
            request.archive.display(),
            dataset.display(),
            merge.rows_written
        );

        Ok(PipelineOutcome {
            workspace: workspace.to_path_buf(),
            merge,
            dataset,
            transcripts,
            bundle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn seed(config: &StorageConfig) -> (PathBuf, Vec<PathBuf>) {
        let uploads = config.data_root.join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let archive = uploads.join("1-clips.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&archive).unwrap());
        zip.start_file("spk1/clip1/audio.wav", FileOptions::default())
            .unwrap();
        zip.write_all(b"RIFF1").unwrap();
        zip.start_file("spk1/clip2/audio.wav", FileOptions::default())
            .unwrap();
        zip.write_all(b"RIFF2").unwrap();
        zip.finish().unwrap();

        let a = uploads.join("2-a.csv");
        std::fs::write(
            &a,
            "audio,transcription\n/data/local-files/?d=spk1/clip1/audio.wav,hello\n",
        )
        .unwrap();
        let b = uploads.join("3-b.csv");
        std::fs::write(
            &b,
            "audio,transcription\n/data/local-files/?d=spk1/clip2/audio.wav,world\n",
        )
        .unwrap();

        (archive, vec![a, b])
    }

    #[tokio::test]
    async fn test_run_builds_dataset_and_bundle() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::rooted_at(dir.path());
        let (archive, tables) = seed(&config);

        let outcome = ProcessingPipeline::new(&config)
            .run(PipelineRequest {
                archive,
                tables,
                package: true,
            })
            .await
            .unwrap();

        assert!(outcome.workspace.join("spk1/clip1/audio.wav").is_file());
        assert_eq!(outcome.merge.rows_written, 2);
        assert_eq!(outcome.transcripts.audio_copied, 2);
        assert_eq!(
            std::fs::read_to_string(outcome.dataset.join("spk1/clip2/transcript.txt")).unwrap(),
            "world"
        );

        let bundle = outcome.bundle.unwrap();
        assert!(bundle.starts_with(std::path::absolute(config.bundles_dir()).unwrap()));
        assert!(bundle.is_file());
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_separate_outputs() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::rooted_at(dir.path());
        let (archive, tables) = seed(&config);
        let pipeline = ProcessingPipeline::new(&config);
        let request = PipelineRequest {
            archive,
            tables,
            package: false,
        };

        let (first, second) = tokio::join!(
            pipeline.run(request.clone()),
            pipeline.run(request.clone())
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.merge.output, second.merge.output);
        assert_ne!(first.dataset, second.dataset);
        assert_eq!(std::fs::read_dir(config.merged_dir()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_merge_rolls_back_workspace() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::rooted_at(dir.path());
        let (archive, mut tables) = seed(&config);
        let odd = config.data_root.join("uploads/4-odd.csv");
        std::fs::write(&odd, "id,name\n1,x\n").unwrap();
        tables.push(odd);

        let err = ProcessingPipeline::new(&config)
            .run(PipelineRequest {
                archive,
                tables,
                package: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SchemaMismatch { .. }));
        assert_eq!(
            std::fs::read_dir(config.extraction_dir()).unwrap().count(),
            0
        );
        assert_eq!(std::fs::read_dir(config.merged_dir()).unwrap().count(), 0);
        assert!(
            !config.processed_dir().exists()
                || std::fs::read_dir(config.processed_dir()).unwrap().count() == 0
        );
    }

    #[tokio::test]
    async fn test_missing_table_rejected_before_extraction() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::rooted_at(dir.path());
        let (archive, _) = seed(&config);

        let err = ProcessingPipeline::new(&config)
            .run(PipelineRequest {
                archive,
                tables: vec![config.data_root.join("nope.csv")],
                package: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!config.extraction_dir().exists());
    }
}
