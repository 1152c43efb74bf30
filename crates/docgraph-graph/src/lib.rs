//! Dependency tracking for DocGraph.
//!
//! Two views of the same relation: an incrementally maintained persistent
//! [`DependencyGraph`], and an inverted import index rebuilt on demand from
//! settled documents.

pub mod dependency_graph;
pub mod importers;

pub use dependency_graph::DependencyGraph;
pub use importers::{build_inverted_index, get_importers_of, InvertedIndex};
