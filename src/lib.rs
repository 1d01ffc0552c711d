pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::StorageConfig;
use crate::services::pipeline::ProcessingPipeline;
use crate::services::progress::ProgressRegistry;
use crate::services::reaper::WorkspaceReaper;
use crate::services::upload::{ArtifactKind, UploadSink};
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_zip,
        api::handlers::upload::upload_csvs,
        api::handlers::delete::delete_file,
        api::handlers::preview::preview_zip,
        api::handlers::preview::preview_csv,
        api::handlers::process::process,
        api::handlers::reset::reset,
        api::handlers::progress::upload_progress,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::upload::SkippedUpload,
            api::handlers::delete::DeleteRequest,
            api::handlers::delete::DeleteResponse,
            api::handlers::preview::ArchivePreviewResponse,
            api::handlers::preview::TabularPreviewResponse,
            api::handlers::process::ProcessRequest,
            api::handlers::process::ProcessResponse,
            api::handlers::reset::ResetResponse,
            api::handlers::reset::ClearedDirectory,
            api::handlers::progress::ProgressResponse,
            api::handlers::health::HealthResponse,
            services::archive::ArchiveEntry,
            services::tabular::TabularPreview,
            services::tabular::MergeReport,
            services::tabular::SourceSummary,
            services::transcripts::MaterializeReport,
            services::transcripts::RowFailure,
            services::reaper::ReapOutcome,
            services::upload::SessionState,
        )
    ),
    tags(
        (name = "uploads", description = "Streaming ZIP and CSV uploads"),
        (name = "files", description = "Deletion and cleanup"),
        (name = "preview", description = "Inspect stored files"),
        (name = "processing", description = "Extract, merge and build datasets")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: StorageConfig,
    pub archive_sink: UploadSink,
    pub tabular_sink: UploadSink,
    pub reaper: WorkspaceReaper,
    pub pipeline: ProcessingPipeline,
    pub progress: ProgressRegistry,
}

impl AppState {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            archive_sink: UploadSink::new(&config, ArtifactKind::Archive),
            tabular_sink: UploadSink::new(&config, ArtifactKind::Tabular),
            reaper: WorkspaceReaper::new(),
            pipeline: ProcessingPipeline::new(&config),
            progress: ProgressRegistry::new(),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/uploadZip", post(api::handlers::upload::upload_zip))
        .route("/api/uploadCSVs", post(api::handlers::upload::upload_csvs))
        .route("/api/deleteZip", delete(api::handlers::delete::delete_file))
        .route("/api/deleteFile", delete(api::handlers::delete::delete_file))
        .route("/api/previewZip", get(api::handlers::preview::preview_zip))
        .route("/api/previewCsv", get(api::handlers::preview::preview_csv))
        .route("/api/process", post(api::handlers::process::process))
        .route("/api/reset", post(api::handlers::reset::reset))
        .route(
            "/api/uploadProgress/:request_id",
            get(api::handlers::progress::upload_progress),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_upload_size + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
        ))
        .with_state(state)
}
