/// `load_config` module: reads the static YAML config and injects secrets from the environment.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`AppConfig`]; every key is optional
/// - Inject `AZURE_SPEECH_KEY` (secret) and `AZURE_SPEECH_REGION` (override)
/// - Fail with clear diagnostics (path, parse error) surfaced at the CLI boundary
///
/// # Errors
/// All errors use `anyhow::Error` for context-rich diagnostics.
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::config::AppConfig;

pub const SPEECH_KEY_ENV: &str = "AZURE_SPEECH_KEY";
pub const SPEECH_REGION_ENV: &str = "AZURE_SPEECH_REGION";

/// Loads a static YAML config file (no secrets) and injects secrets from env vars.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file deserializes to YAML null; treat it as "all defaults".
    let config: AppConfig = if config_content.trim().is_empty() {
        AppConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    Ok(apply_env(config))
}

/// Config used when no file is given: defaults plus environment.
pub fn default_config() -> AppConfig {
    info!("No config file given, using defaults and environment");
    apply_env(AppConfig::default())
}

fn apply_env(mut config: AppConfig) -> AppConfig {
    match std::env::var(SPEECH_KEY_ENV) {
        Ok(key) if !key.is_empty() => {
            info!("{SPEECH_KEY_ENV} found in env");
            config.speech.api_key = Some(key);
        }
        _ => debug!("{SPEECH_KEY_ENV} not set"),
    }
    if let Ok(region) = std::env::var(SPEECH_REGION_ENV) {
        if !region.is_empty() {
            info!(region = %region, "Overriding speech region from env");
            config.speech.region = region;
        }
    }
    config.trace_loaded();
    config
}
