pub mod catalog;
pub mod config;
pub mod converter;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod testing;

pub use catalog::{
    CatalogError, ConflictStrategy, FileCatalog, FileInfo, FileSource, StorageConfig,
    UploadOutcome,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig,
};
pub use converter::{
    ConversionOptions, ConverterConfig, ConverterError, EncoderCapabilities, FfmpegTranscoder,
    FormatCatalog, MediaCategory, MediaInfo, OutputFormat, ProcessHandle, ProgressParser,
    Terminator, TranscodeJob, Transcoder,
};
pub use orchestrator::{ConversionRequest, OrchestratorConfig, OrchestratorError, TaskOrchestrator};
pub use registry::{
    FileSnapshot, FileStatus, RegistryConfig, RegistryError, TaskRegistry, TaskSnapshot,
    TaskStatus, TaskSummary,
};
