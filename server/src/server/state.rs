//! Shared application state

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, UploadConfig};
use crate::oracle::SegmentationOracle;
use crate::paint::PaintService;
use crate::results::ResultStore;
use crate::session::SessionStore;

use super::upload::UploadDedup;

/// State handed to every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub oracle: Arc<dyn SegmentationOracle>,
    pub painter: Arc<PaintService>,
    pub results: Arc<ResultStore>,
    pub uploads: Arc<UploadDedup>,
    /// Maximum accepted upload size in bytes
    pub max_upload_size: usize,
    pub started_at: Instant,
}

impl AppState {
    /// State with default settings around `oracle`
    pub fn new(oracle: Arc<dyn SegmentationOracle>) -> Self {
        let upload = UploadConfig::default();
        Self {
            sessions: Arc::new(SessionStore::new()),
            painter: Arc::new(PaintService::new(Arc::clone(&oracle), true)),
            oracle,
            results: Arc::new(ResultStore::new("results")),
            uploads: Arc::new(UploadDedup::new(upload.dedup_window)),
            max_upload_size: upload.max_upload_size,
            started_at: Instant::now(),
        }
    }

    /// State built from the loaded configuration
    pub fn from_config(config: &Config, oracle: Arc<dyn SegmentationOracle>) -> Self {
        Self::new(oracle)
            .with_session_store(Arc::new(SessionStore::with_config(config.session.clone())))
            .with_remote_paint(config.remote_paint_enabled)
            .with_results_dir(config.results_dir.clone())
            .with_upload_config(&config.upload)
    }

    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_remote_paint(mut self, enabled: bool) -> Self {
        self.painter = Arc::new(PaintService::new(Arc::clone(&self.oracle), enabled));
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results = Arc::new(ResultStore::new(dir));
        self
    }

    pub fn with_upload_config(mut self, upload: &UploadConfig) -> Self {
        self.uploads = Arc::new(UploadDedup::new(upload.dedup_window));
        self.max_upload_size = upload.max_upload_size;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
