//! Rebuild the "who imports whom" relation from already produced documents.
//!
//! This is the fallback used when the incremental dependency graph cannot be
//! trusted (or has not been populated yet): it only looks at settled results
//! and never triggers any analysis.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use docgraph_core::{Document, DocumentId, Feature, ScannedDocument};
use rayon::prelude::*;
use tracing::debug;

/// imported document -> documents importing it
pub type InvertedIndex = HashMap<DocumentId, HashSet<DocumentId>>;

/// Build an inverted import index.
///
/// Analyzed documents take precedence; a scanned document is only consulted
/// when no analyzed document with the same id was supplied. Imports declared
/// inside inline documents are attributed to the top-level document that
/// contains them.
pub fn build_inverted_index(
    documents: &[Arc<Document>],
    scanned_documents: &[Arc<ScannedDocument>],
) -> InvertedIndex {
    let analyzed: HashSet<&DocumentId> = documents.iter().map(|d| &d.url).collect();

    let mut pairs: Vec<(DocumentId, DocumentId)> = documents
        .par_iter()
        .flat_map_iter(|doc| {
            let mut imports = Vec::new();
            collect_document_imports(doc, &mut imports);
            imports
                .into_iter()
                .map(|imported| (imported, doc.url.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    pairs.par_extend(
        scanned_documents
            .par_iter()
            .filter(|scanned| !analyzed.contains(&scanned.url))
            .flat_map_iter(|scanned| {
                scanned
                    .imported_urls()
                    .into_iter()
                    .map(|imported| (imported, scanned.url.clone()))
                    .collect::<Vec<_>>()
            }),
    );

    let mut index = InvertedIndex::new();
    for (imported, importer) in pairs {
        index.entry(imported).or_default().insert(importer);
    }
    debug!(
        "built inverted index over {} documents ({} imported)",
        documents.len() + scanned_documents.len(),
        index.len()
    );
    index
}

fn collect_document_imports(doc: &Document, out: &mut Vec<DocumentId>) {
    for feature in &doc.features {
        match feature {
            Feature::Import(import) => out.push(import.url.clone()),
            Feature::InlineDocument(inline) => collect_document_imports(inline, out),
            Feature::Other { .. } => {}
        }
    }
}

/// `path` together with every document transitively importing it.
pub fn get_importers_of(path: &DocumentId, index: &InvertedIndex) -> HashSet<DocumentId> {
    let mut visited: HashSet<DocumentId> = HashSet::new();
    let mut queue: VecDeque<DocumentId> = VecDeque::new();
    visited.insert(path.clone());
    queue.push_back(path.clone());

    while let Some(current) = queue.pop_front() {
        if let Some(importers) = index.get(&current) {
            for importer in importers {
                if visited.insert(importer.clone()) {
                    queue.push_back(importer.clone());
                }
            }
        }
    }
    visited
}
