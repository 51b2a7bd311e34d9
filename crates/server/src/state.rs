use std::sync::Arc;

use avcnv_core::{
    Config, FfmpegTranscoder, FileCatalog, FormatCatalog, SanitizedConfig, TaskOrchestrator,
    Transcoder,
};

/// Shared application state
pub struct AppState<T: Transcoder = FfmpegTranscoder> {
    config: Config,
    orchestrator: TaskOrchestrator<T>,
    formats: FormatCatalog,
}

impl<T: Transcoder> AppState<T> {
    pub fn new(config: Config, orchestrator: TaskOrchestrator<T>, formats: FormatCatalog) -> Self {
        Self {
            config,
            orchestrator,
            formats,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &TaskOrchestrator<T> {
        &self.orchestrator
    }

    pub fn catalog(&self) -> &FileCatalog {
        self.orchestrator.catalog()
    }

    pub fn formats(&self) -> &FormatCatalog {
        &self.formats
    }
}

/// Handle type the router is built over.
pub type SharedState<T> = Arc<AppState<T>>;
