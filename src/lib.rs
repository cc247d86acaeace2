//! Modelgate - main application library
//!
//! This is the binary crate that wires the member crates together: it loads
//! configuration, builds the engine set, starts the worker pool and the
//! retention sweep, and serves the HTTP API.

mod app;

pub use app::{create_app, AppHandle};
pub use modelgate_core::{init_tracing, Config};

// Re-export for convenience
pub use modelgate_core;
pub use modelgate_engines;
pub use modelgate_orchestrator;
