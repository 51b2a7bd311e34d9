use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Audio lane parallelism is within 2..=4
/// - Terminate grace period and sweep interval are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let parallelism = config.orchestrator.audio_parallelism;
    if !(2..=4).contains(&parallelism) {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.audio_parallelism must be between 2 and 4, got {}",
            parallelism
        )));
    }

    if config.orchestrator.spawn_failure_limit == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.spawn_failure_limit cannot be 0".to_string(),
        ));
    }

    if config.converter.terminate_grace_ms == 0 {
        return Err(ConfigError::ValidationError(
            "converter.terminate_grace_ms cannot be 0".to_string(),
        ));
    }

    if config.registry.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "registry.sweep_interval_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
