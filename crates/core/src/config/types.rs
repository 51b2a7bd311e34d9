use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::catalog::StorageConfig;
use crate::converter::ConverterConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::registry::RegistryConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8000
}

/// Config as reported over the API.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub converter: SanitizedConverterConfig,
    pub orchestrator: OrchestratorConfig,
    pub registry: RegistryConfig,
}

/// Converter section without the free-form extra arguments.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConverterConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub log_level: String,
    pub extra_args_configured: bool,
    pub terminate_grace_ms: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            storage: config.storage.clone(),
            converter: SanitizedConverterConfig {
                ffmpeg_path: config.converter.ffmpeg_path.clone(),
                ffprobe_path: config.converter.ffprobe_path.clone(),
                log_level: config.converter.log_level.clone(),
                extra_args_configured: !config.converter.extra_args.is_empty(),
                terminate_grace_ms: config.converter.terminate_grace_ms,
            },
            orchestrator: config.orchestrator.clone(),
            registry: config.registry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.storage.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.orchestrator.audio_parallelism, 3);
        assert_eq!(config.registry.retention_secs, 3600);
    }

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[storage]
upload_dir = "/srv/avcnv/uploads"
local_dir = "/srv/media"
output_dir = "/srv/avcnv/outputs"
max_upload_bytes = 1024

[converter]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
terminate_grace_ms = 1500

[orchestrator]
audio_parallelism = 4

[registry]
retention_secs = 60
sweep_interval_secs = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.local_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.storage.max_upload_bytes, 1024);
        assert_eq!(
            config.converter.ffmpeg_path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        // untouched keys keep their defaults
        assert_eq!(config.converter.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.converter.terminate_grace_ms, 1500);
        assert_eq!(config.orchestrator.audio_parallelism, 4);
        assert_eq!(config.registry.sweep_interval_secs, 5);
    }

    #[test]
    fn test_sanitized_config_hides_extra_args() {
        let mut config = Config::default();
        config.converter.extra_args = vec!["-threads".to_string(), "2".to_string()];

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.converter.extra_args_configured);
        assert_eq!(sanitized.server.port, 8000);

        let json = serde_json::to_value(&sanitized).unwrap();
        assert!(json["converter"].get("extra_args").is_none());
    }
}
