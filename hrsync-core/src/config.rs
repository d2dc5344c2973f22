//! Process configuration.
//!
//! Resolved once at process start: `<home>/.hrsync/config.yaml` (optional)
//! is loaded first, then environment overrides are applied. The resulting
//! [`Config`] is passed down explicitly; nothing below the binaries reads the
//! environment.
//!
//! | Variable            | Field                    |
//! |---------------------|--------------------------|
//! | `HRIMS_BASE_URL`    | `hrims.base_url`         |
//! | `HRIMS_API_KEY`     | `hrims.api_key`          |
//! | `HRIMS_TOKEN`       | `hrims.token`            |
//! | `HRSYNC_DATA_DIR`   | `data_dir`               |
//! | `HRSYNC_BIND`       | `server.bind`            |

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding institution files, checkpoints and (by default) objects.
    /// Empty means `<home>/.hrsync`.
    #[serde(default)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub hrims: HrimsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Connection settings for the external HRIMS API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrimsConfig {
    pub base_url: String,
    pub endpoint: String,
    pub api_key: String,
    pub token: String,
    pub request_ids: RequestIds,
    /// Per-call timeout for single-employee requests.
    pub timeout_secs: u64,
    /// Timeout for institution-level bulk requests.
    pub bulk_timeout_secs: u64,
}

/// HRIMS `RequestId` discriminators, one per artifact request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestIds {
    pub photo: String,
    pub documents: String,
    pub certificates: String,
    pub institution_photos: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Object store root; defaults to `<data_dir>/objects`.
    pub root: Option<PathBuf>,
    /// Prefix under which stored objects are referenced, e.g. `/api/files`.
    pub reference_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub employee_delay_ms: u64,
    pub institution_delay_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Employees per checkpointed batch.
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

pub const DEFAULT_REFERENCE_PREFIX: &str = "/api/files";

impl Default for HrimsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint: "/api/Employees".to_string(),
            api_key: String::new(),
            token: String::new(),
            request_ids: RequestIds::default(),
            timeout_secs: 30,
            bulk_timeout_secs: 30 * 60,
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self {
            photo: "203".to_string(),
            documents: "206".to_string(),
            certificates: "207".to_string(),
            institution_photos: "204".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            employee_delay_ms: 100,
            institution_delay_ms: 2_000,
            max_retries: 2,
            retry_backoff_ms: 1_000,
            batch_size: 25,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

// Credentials never reach logs.
impl fmt::Debug for HrimsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HrimsConfig")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("token", &redact(&self.token))
            .field("request_ids", &self.request_ids)
            .field("timeout_secs", &self.timeout_secs)
            .field("bulk_timeout_secs", &self.bulk_timeout_secs)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl HrimsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    /// Both static credentials and the base URL must be present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "missing HRIMS base URL (set HRIMS_BASE_URL or hrims.base_url)".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "missing HRIMS API key (set HRIMS_API_KEY or hrims.api_key)".to_string(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "missing HRIMS token (set HRIMS_TOKEN or hrims.token)".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.bulk_timeout_secs == 0 {
            return Err(ConfigError::Invalid("HRIMS timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn employee_delay(&self) -> Duration {
        Duration::from_millis(self.employee_delay_ms)
    }

    pub fn institution_delay(&self) -> Duration {
        Duration::from_millis(self.institution_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Pipeline with no pacing at all; used by tests and dry local runs.
    pub fn unpaced() -> Self {
        Self {
            employee_delay_ms: 0,
            institution_delay_ms: 0,
            retry_backoff_ms: 0,
            ..Self::default()
        }
    }
}

impl Config {
    /// Defaults rooted at `<home>/.hrsync`.
    pub fn default_at(home: &Path) -> Self {
        Self {
            data_dir: hrsync_root(home),
            hrims: HrimsConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Load `<home>/.hrsync/config.yaml` (if present) and apply overrides from
    /// `lookup`, which is normally `|k| std::env::var(k).ok()`.
    pub fn load_at(
        home: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            Self::default_at(home)
        };
        if config.data_dir.as_os_str().is_empty() {
            config.data_dir = hrsync_root(home);
        }
        config.apply_overrides(lookup);
        if config.pipeline.batch_size == 0 {
            return Err(ConfigError::Invalid("pipeline.batch_size must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// `load_at` using the process home directory and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::load_at(&home, |key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("HRIMS_BASE_URL") {
            self.hrims.base_url = v;
        }
        if let Some(v) = get("HRIMS_API_KEY") {
            self.hrims.api_key = v;
        }
        if let Some(v) = get("HRIMS_TOKEN") {
            self.hrims.token = v;
        }
        if let Some(v) = get("HRSYNC_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("HRSYNC_BIND") {
            self.server.bind = v;
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("objects"))
    }

    pub fn reference_prefix(&self) -> &str {
        self.storage
            .reference_prefix
            .as_deref()
            .unwrap_or(DEFAULT_REFERENCE_PREFIX)
    }
}

/// `<home>/.hrsync`
pub fn hrsync_root(home: &Path) -> PathBuf {
    home.join(".hrsync")
}

/// `<home>/.hrsync/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    hrsync_root(home).join("config.yaml")
}
