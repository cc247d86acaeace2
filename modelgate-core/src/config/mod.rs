//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
    pub policy: PolicyConfig,
    pub engines: EnginesConfig,
    pub models: MountedModelsConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout applied by the HTTP layer (seconds)
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 60,
        }
    }
}

/// On-disk storage layout and upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory; uploads, results and logs live underneath it
    pub data_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            max_upload_bytes: 5 * 1024 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Create the storage directories if they do not exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.uploads_dir())?;
        std::fs::create_dir_all(self.results_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// Job scheduling and retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum number of jobs in the `running` state at any instant
    pub max_concurrent: usize,
    /// Terminal jobs older than this are removed by the retention sweep
    pub retention_days: u64,
    /// Interval between retention sweep passes (seconds)
    pub sweep_interval_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            retention_days: 30,
            sweep_interval_seconds: 3600,
        }
    }
}

impl JobsConfig {
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Default scan policy applied when a request does not override it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub strict_default: bool,
    pub enable_picklescan_default: bool,
    /// Generate the AI-SBOM even when the verdict is FAIL
    pub run_sbom_on_fail: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strict_default: true,
            enable_picklescan_default: true,
            run_sbom_on_fail: true,
        }
    }
}

/// Per-engine invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub enabled: bool,
    /// Executable name or absolute path
    pub executable: String,
    pub timeout_seconds: u64,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Settings for both external engines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub modelscan: EngineConfig,
    pub picklescan: EngineConfig,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            modelscan: EngineConfig {
                enabled: true,
                executable: "modelscan".to_string(),
                timeout_seconds: 600,
            },
            picklescan: EngineConfig {
                enabled: true,
                executable: "picklescan".to_string(),
                timeout_seconds: 300,
            },
        }
    }
}

/// Read-only mounted model directory
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MountedModelsConfig {
    /// Root of the pre-mounted model directory; `None` disables mounted scans
    pub root: Option<PathBuf>,
    /// Maximum directory depth considered when listing mounted models
    pub max_depth: Option<usize>,
}

/// Safety ceilings for archive extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
    /// Maximum declared decompressed/compressed ratio per ZIP entry
    pub max_compression_ratio: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_entry_bytes: 4 * 1024 * 1024 * 1024,
            max_total_bytes: 16 * 1024 * 1024 * 1024,
            max_compression_ratio: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Include the emitting module path in log lines
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            include_targets: true,
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from the optional `config/default` file and
    /// `MODELGATE__`-prefixed environment variables.
    ///
    /// Environment variables use `__` as the section separator, e.g.
    /// `MODELGATE__JOBS__MAX_CONCURRENT=4`.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("MODELGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}
