/// `load_config` module: loads the static YAML config and injects secrets from the environment.
///
/// This is the only place where untrusted YAML is parsed and mapped onto the
/// strongly-typed settings the engine is built from.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary. Parse
/// failures always mention "parse" so callers and tests can tell them apart
/// from I/O failures.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use depchain_core::reconcile::ReconcileSettings;
use depchain_core::release::TagMapping;
use depchain_core::store::RetryPolicy;
use depchain_core::DependencyKind;
use serde::Deserialize;
use tracing::{error, info};

/// Environment variable holding the store API token.
pub const TOKEN_ENV: &str = "PDC_TOKEN";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub kind: DependencyKind,
    pub store: StoreSection,
    pub build_system: BuildSystemSection,
    #[serde(default)]
    pub tags: TagsSection,
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub apply: ApplySection,
}

#[derive(Debug, Deserialize)]
pub struct StoreSection {
    pub url: String,
    /// Injected from the environment, never read from the file.
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildSystemSection {
    /// JSON export of the build system's tags, builds and artifacts.
    pub snapshot: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagsSection {
    #[serde(default)]
    pub tracked: Vec<String>,
    #[serde(flatten)]
    pub mapping: TagMapping,
}

#[derive(Debug, Deserialize)]
pub struct SweepSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_retries")]
    pub page_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_page_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for SweepSection {
    fn default() -> Self {
        SweepSection {
            concurrency: default_concurrency(),
            page_retries: default_page_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplySection {
    #[serde(default)]
    pub check_existing: bool,
}

impl CliConfig {
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            concurrency: self.sweep.concurrency,
            check_existing: self.apply.check_existing,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.sweep.page_retries,
            delay: Duration::from_millis(self.sweep.retry_delay_ms),
        }
    }
}

/// Loads a static YAML config file and injects the store token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.sweep.concurrency == 0 {
        return Err(anyhow::anyhow!(
            "Invalid config: sweep.concurrency must be at least 1"
        ));
    }
    if config.store.url.trim().is_empty() {
        return Err(anyhow::anyhow!("Invalid config: store.url must not be empty"));
    }

    config.store.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
    info!(
        kind = ?config.kind,
        store_url = %config.store.url,
        token_set = config.store.token.is_some(),
        tracked = ?config.tags.tracked,
        "Loaded config"
    );

    Ok(config)
}
