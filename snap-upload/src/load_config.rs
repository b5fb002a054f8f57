/// `load_config` module: loads the optional static YAML settings and injects the API
/// credential from the environment into an [`UploadConfig`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file (no secrets) into typed settings
/// - Read the client credential from `IMGUR_CLIENT_ID`
/// - Fall back to defaults for every setting the file leaves out
///
/// # Errors
/// All errors use `anyhow::Error` and name the failing input (file path or
/// environment variable); they are surfaced at the CLI boundary.
///
/// Accepted YAML:
///
/// ```yaml
/// upload:
///   direct_url: true
///   endpoint: https://api.imgur.com/3/image
///   timeout_secs: 60
/// ```
use anyhow::Result;
use serde::Deserialize;
use snap_upload_core::UploadConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Environment variable holding the image host client credential.
pub const API_KEY_ENV: &str = "IMGUR_CLIENT_ID";

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadSection {
    pub direct_url: Option<bool>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Loads the static YAML config at `path` (if any) and injects the credential from env.
pub fn load_config(path: Option<&Path>) -> Result<UploadConfig> {
    let file_config = match path {
        Some(path) => read_file_config(path)?,
        None => {
            info!("No config file given, using defaults");
            FileConfig::default()
        }
    };

    let api_key = match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            info!("{API_KEY_ENV} found in env");
            key
        }
        Ok(_) => {
            error!("{API_KEY_ENV} environment variable is empty");
            anyhow::bail!("{API_KEY_ENV} environment variable is empty");
        }
        Err(e) => {
            error!(error = ?e, "{API_KEY_ENV} environment variable not set");
            return Err(anyhow::anyhow!(
                "{API_KEY_ENV} environment variable not set: {e}"
            ));
        }
    };

    let section = file_config.upload;
    let mut config = UploadConfig::new(api_key);
    if let Some(direct_url) = section.direct_url {
        config.direct_url = direct_url;
    }
    if let Some(endpoint) = section.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(timeout_secs) = section.timeout_secs {
        if timeout_secs == 0 {
            error!("upload.timeout_secs must be positive");
            anyhow::bail!("upload.timeout_secs must be positive");
        }
        config.timeout_secs = timeout_secs;
    }

    config.trace_loaded();
    Ok(config)
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path,
                e
            ));
        }
    };

    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
