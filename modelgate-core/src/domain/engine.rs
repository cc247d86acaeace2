//! Scan engine trait definition

use std::path::Path;

use async_trait::async_trait;

use super::finding::{EngineKind, EngineResult};
use super::format::ModelKind;

/// Errors from a single engine invocation
///
/// Exit codes 0 and 1 are in-band for both supported engines (1 signals
/// findings were detected); anything else is a crash.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{engine} could not be launched: {source}")]
    Launch {
        engine: EngineKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine} timed out after {seconds}s")]
    Timeout { engine: EngineKind, seconds: u64 },

    #[error("{engine} exited with code {exit_code}: {stderr}")]
    Crashed {
        engine: EngineKind,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to parse {engine} output: {detail}")]
    UnparsableOutput { engine: EngineKind, detail: String },
}

impl EngineError {
    pub fn engine(&self) -> EngineKind {
        match self {
            Self::Launch { engine, .. }
            | Self::Timeout { engine, .. }
            | Self::Crashed { engine, .. }
            | Self::UnparsableOutput { engine, .. } => *engine,
        }
    }
}

/// Trait all external scan engines implement
///
/// Each engine runs as an isolated subprocess against a single model file and
/// maps its native output onto the unified [`EngineResult`]. Mapping must be
/// a pure function of the native payload.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Engine identifier
    fn kind(&self) -> EngineKind;

    /// Whether this engine produces meaningful results for the given format.
    ///
    /// Returning `false` is not an error: the pipeline records the skip and
    /// the engine contributes zero findings for that file.
    fn supports(&self, kind: ModelKind) -> bool;

    /// Scan one model file, constrained to `workdir`.
    async fn scan(&self, target: &Path, workdir: &Path) -> Result<EngineResult, EngineError>;
}
