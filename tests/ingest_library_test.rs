use rust_ingest_backend::api::error::AppError;
use rust_ingest_backend::config::StorageConfig;
use rust_ingest_backend::services::archive::ArchiveExtractor;
use rust_ingest_backend::services::reaper::{ReapOutcome, WorkspaceReaper};
use rust_ingest_backend::services::tabular::TabularMerger;
use rust_ingest_backend::services::upload::{ArtifactKind, NoProgress, UploadSink};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

fn relative_files(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[tokio::test]
async fn test_stored_archive_extracts_to_same_entries() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::rooted_at(dir.path());

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in [("folder/x.txt", "x"), ("folder/deep/z.txt", "z"), ("y.txt", "y")] {
        zip.start_file(name, FileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();

    let sink = UploadSink::new(&config, ArtifactKind::Archive);
    let stored = sink
        .store("boundary", "clips.zip", None, bytes.as_slice(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(stored.size, bytes.len() as u64);

    let workspace = ArchiveExtractor::new(&config)
        .extract_blocking(stored.path.clone())
        .await
        .unwrap();

    assert_eq!(
        relative_files(&workspace),
        BTreeSet::from([
            "folder/deep/z.txt".to_string(),
            "folder/x.txt".to_string(),
            "y.txt".to_string(),
        ])
    );

    let reaper = WorkspaceReaper::new();
    assert_eq!(reaper.reap(&workspace).await.unwrap(), ReapOutcome::Removed);
    assert_eq!(
        reaper.reap(&workspace).await.unwrap(),
        ReapOutcome::AlreadyAbsent
    );
}

#[tokio::test]
async fn test_stored_tables_merge_in_upload_order() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::rooted_at(dir.path());
    let sink = UploadSink::new(&config, ArtifactKind::Tabular);

    let a = sink
        .store("b", "a.csv", None, &b"id,name\n1,alice\n"[..], &NoProgress)
        .await
        .unwrap();
    let b = sink
        .store(
            "b",
            "b.csv",
            None,
            &b"id,name\n2,bob\n3,carol\n"[..],
            &NoProgress,
        )
        .await
        .unwrap();

    let out = config.merged_dir().join("merged.csv");
    let report = TabularMerger::new()
        .merge_blocking(vec![a.path, b.path], out.clone())
        .await
        .unwrap();

    assert_eq!(report.rows_written, 3);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "id,name\n1,alice\n2,bob\n3,carol\n"
    );
}

#[tokio::test]
async fn test_csv_sink_refuses_archives() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::rooted_at(dir.path());
    let sink = UploadSink::new(&config, ArtifactKind::Tabular);

    let err = sink
        .store("b", "clips.zip", None, &b"PK"[..], &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert!(!config.upload_dir(ArtifactKind::Tabular).exists());
}
