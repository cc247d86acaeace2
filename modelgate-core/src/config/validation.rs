//! Configuration validation module

use crate::config::{Config, EnginesConfig, ExtractionConfig, JobsConfig, ServerConfig, StorageConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Storage configuration error: {message}")]
    Storage { message: String },

    #[error("Jobs configuration error: {message}")]
    Jobs { message: String },

    #[error("Engine configuration error: {message}")]
    Engines { message: String },

    #[error("Extraction configuration error: {message}")]
    Extraction { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn jobs(message: impl Into<String>) -> Self {
        Self::Jobs {
            message: message.into(),
        }
    }

    pub fn engines(message: impl Into<String>) -> Self {
        Self::Engines {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::server("host must not be empty"));
        }
        if self.port == 0 {
            return Err(ValidationError::server("port must be non-zero"));
        }
        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ValidationError::storage("data_dir must not be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ValidationError::storage("max_upload_bytes must be positive"));
        }
        Ok(())
    }
}

impl Validate for JobsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent == 0 {
            return Err(ValidationError::jobs("max_concurrent must be at least 1"));
        }
        if self.retention_days == 0 {
            return Err(ValidationError::jobs("retention_days must be at least 1"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ValidationError::jobs("sweep_interval_seconds must be positive"));
        }
        Ok(())
    }
}

impl Validate for EnginesConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        for (name, engine) in [("modelscan", &self.modelscan), ("picklescan", &self.picklescan)] {
            if engine.executable.is_empty() {
                return Err(ValidationError::engines(format!(
                    "{name} executable must not be empty"
                )));
            }
            if engine.timeout_seconds == 0 {
                return Err(ValidationError::engines(format!(
                    "{name} timeout_seconds must be positive"
                )));
            }
        }
        Ok(())
    }
}

impl Validate for ExtractionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_entries == 0 {
            return Err(ValidationError::extraction("max_entries must be positive"));
        }
        if self.max_entry_bytes == 0 || self.max_total_bytes == 0 {
            return Err(ValidationError::extraction("size ceilings must be positive"));
        }
        if self.max_entry_bytes > self.max_total_bytes {
            return Err(ValidationError::extraction(
                "max_entry_bytes must not exceed max_total_bytes",
            ));
        }
        if self.max_compression_ratio == 0 {
            return Err(ValidationError::extraction(
                "max_compression_ratio must be positive",
            ));
        }
        Ok(())
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.jobs.validate()?;
        self.engines.validate()?;
        self.extraction.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.jobs.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Jobs { .. })
        ));
    }

    #[test]
    fn entry_ceiling_must_fit_total_ceiling() {
        let mut config = Config::default();
        config.extraction.max_entry_bytes = config.extraction.max_total_bytes + 1;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Extraction { .. })
        ));
    }
}
