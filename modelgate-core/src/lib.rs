//! Modelgate core - shared domain model and infrastructure
//!
//! This crate carries everything the scanning pipeline and the orchestrator
//! have in common:
//!
//! - the unified [`domain::finding::Finding`] model all engines normalize into
//! - the [`domain::engine::ScanEngine`] trait external engines implement
//! - model/archive format classification
//! - configuration loading and validation
//! - safe extraction of untrusted archives
//!
//! # Usage
//!
//! ```rust,ignore
//! use modelgate_core::{Config, init_tracing};
//!
//! let config = Config::load()?;
//! init_tracing(&config.logging)?;
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
