//! Core types for DocGraph: document identity, the data shapes produced by
//! each pipeline stage, the collaborator traits the cache drives, loaders,
//! configuration and logging bootstrap.

pub mod config;
pub mod document;
pub mod error;
pub mod loader;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::{AnalysisConfig, DependantStrategy, LoggingConfig, Settings};
pub use document::*;
pub use error::*;
pub use loader::{FsLoader, InMemoryLoader};
pub use logging::init_tracing;
pub use traits::*;
pub use types::*;
