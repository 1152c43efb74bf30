//! Generational caching of the parse, scan and analyze stages.
//!
//! [`AnalysisCache`] is one immutable-by-contract generation of per-document
//! results; [`AnalysisContext`] drives the pipeline through it and publishes
//! successor generations when documents change.

pub mod cache;
pub mod context;
pub mod entry;

pub use cache::{AnalysisCache, CacheStats};
pub use context::{AnalysisContext, Generation};
pub use entry::{CacheEntry, EntryState, Outcome};
