use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use docsync_core::config::SyncOptions;

use crate::backend::BackendConfig;

/// Structure-only YAML file; secrets and identifiers come from env.
#[derive(Deserialize)]
struct StaticConfig {
    source_dir: PathBuf,
    state_file: PathBuf,
    backend: BackendSection,
    #[serde(default)]
    exclude: Vec<String>,
    retry_limit: Option<u32>,
    upload_concurrency: Option<usize>,
    media_container_name: Option<String>,
    publish_assets: Option<bool>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Deserialize)]
struct BackendSection {
    base_url: String,
}

/// Fully merged configuration for one run.
#[derive(Debug)]
pub struct LoadedConfig {
    pub options: SyncOptions,
    pub backend: BackendConfig,
}

/// Loads a static YAML config file (no secrets) and injects required env
/// vars: `DOCSYNC_API_TOKEN` for credentials and
/// `DOCSYNC_ROOT_CONTAINER_ID` for the remote root container.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadedConfig> {
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

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let root_container_id = match std::env::var("DOCSYNC_ROOT_CONTAINER_ID") {
        Ok(id) if !id.trim().is_empty() => id,
        Ok(_) => {
            error!("DOCSYNC_ROOT_CONTAINER_ID is set but empty");
            anyhow::bail!("DOCSYNC_ROOT_CONTAINER_ID is set but empty");
        }
        Err(e) => {
            error!(error = ?e, "DOCSYNC_ROOT_CONTAINER_ID environment variable not set");
            anyhow::bail!("DOCSYNC_ROOT_CONTAINER_ID environment variable not set: {e}");
        }
    };

    let api_token = match std::env::var("DOCSYNC_API_TOKEN") {
        Ok(token) => {
            info!("DOCSYNC_API_TOKEN found in env");
            token
        }
        Err(e) => {
            error!(error = ?e, "DOCSYNC_API_TOKEN environment variable not set");
            anyhow::bail!("DOCSYNC_API_TOKEN environment variable not set: {e}");
        }
    };

    let mut options = SyncOptions::new(
        static_conf.source_dir,
        static_conf.state_file,
        root_container_id,
    );
    options.exclude = static_conf.exclude;
    options.dry_run = static_conf.dry_run;
    if let Some(retry_limit) = static_conf.retry_limit {
        options.retry_limit = retry_limit;
    }
    if let Some(upload_concurrency) = static_conf.upload_concurrency {
        options.upload_concurrency = upload_concurrency;
    }
    if let Some(name) = static_conf.media_container_name {
        options.media_container_name = name;
    }
    if let Some(publish) = static_conf.publish_assets {
        options.publish_assets = publish;
    }

    info!(
        base_url = %static_conf.backend.base_url,
        source_dir = %options.source_dir.display(),
        "Config loaded and merged successfully"
    );

    Ok(LoadedConfig {
        options,
        backend: BackendConfig {
            base_url: static_conf.backend.base_url,
            api_token,
        },
    })
}
