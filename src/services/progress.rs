use crate::services::upload::{ProgressObserver, SessionState, UploadProgress};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How long a finished upload stays visible to pollers
const FINISHED_RETENTION: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    progress: UploadProgress,
    updated_at: Instant,
}

/// Upload progress keyed by request id, for callers that poll while the
/// upload request is still in flight.
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    entries: Arc<DashMap<String, Entry>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `request_id`, evicting finished entries that have
    /// been idle for a while.
    pub fn track(&self, request_id: &str, bytes_expected: Option<u64>) -> RegistryProgress {
        self.prune(FINISHED_RETENTION);
        self.entries.insert(
            request_id.to_string(),
            Entry {
                progress: UploadProgress {
                    bytes_received: 0,
                    bytes_expected,
                    state: SessionState::Pending,
                },
                updated_at: Instant::now(),
            },
        );

        RegistryProgress {
            registry: self.clone(),
            request_id: request_id.to_string(),
            offset: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    pub fn get(&self, request_id: &str) -> Option<UploadProgress> {
        self.entries.get(request_id).map(|e| e.progress)
    }

    pub fn prune(&self, max_idle: Duration) {
        self.entries.retain(|_, entry| {
            entry.progress.state == SessionState::Pending || entry.updated_at.elapsed() < max_idle
        });
    }

    fn update(&self, request_id: &str, progress: UploadProgress) {
        self.entries.insert(
            request_id.to_string(),
            Entry {
                progress,
                updated_at: Instant::now(),
            },
        );
    }
}

/// Observer handed to the upload sink for one request.
///
/// A request may carry several files, so byte counts from finished files are
/// carried over and the request-level total keeps growing. Dropped without
/// [`RegistryProgress::finish`], the entry is marked failed so it can be pruned.
pub struct RegistryProgress {
    registry: ProgressRegistry,
    request_id: String,
    offset: AtomicU64,
    finished: AtomicBool,
}

impl RegistryProgress {
    /// Marks the whole request as finished
    pub fn finish(&self, state: SessionState) {
        self.finished.store(true, Ordering::Relaxed);
        if let Some(mut entry) = self.registry.entries.get_mut(&self.request_id) {
            entry.progress.state = state;
            entry.updated_at = Instant::now();
        }
    }
}

impl Drop for RegistryProgress {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Relaxed) {
            tracing::warn!("Upload {} abandoned before completion", self.request_id);
            self.finish(SessionState::Failed);
        }
    }
}

impl ProgressObserver for RegistryProgress {
    fn on_progress(&self, progress: &UploadProgress) {
        let offset = self.offset.load(Ordering::Relaxed);
        let total = UploadProgress {
            bytes_received: offset + progress.bytes_received,
            bytes_expected: progress.bytes_expected,
            // per-file completion is not request completion
            state: SessionState::Pending,
        };
        if progress.state != SessionState::Pending {
            self.offset
                .store(offset + progress.bytes_received, Ordering::Relaxed);
        }
        self.registry.update(&self.request_id, total);
    }
}
