use crate::{Document, DocumentId, ParsedDocument, Result, ScannedDocument};
use async_trait::async_trait;
use std::sync::Arc;

/// Reads raw document contents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Whether `url` is something this loader can read at all. Imports of
    /// unloadable documents are recorded as dependencies but never scanned.
    fn can_load(&self, url: &DocumentId) -> bool;

    async fn load(&self, url: &DocumentId) -> Result<String>;
}

/// Turns raw contents into a `ParsedDocument`.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, url: &DocumentId, contents: String) -> Result<ParsedDocument>;
}

/// Extracts declared features (imports, inline documents, ...) from an AST.
pub trait DocumentScanner: Send + Sync {
    fn scan(&self, parsed: &ParsedDocument) -> Result<ScannedDocument>;
}

/// Read access to the settled scanned documents of one cache generation.
pub trait ScannedLookup: Send + Sync {
    fn scanned(&self, url: &DocumentId) -> Option<Arc<ScannedDocument>>;
}

/// Links the raw features of a scanned document against the rest of the
/// corpus. Every document transitively imported by `scanned` has been scanned
/// before this is called, so `lookup` sees the whole import closure.
pub trait DocumentResolver: Send + Sync {
    fn resolve(&self, scanned: &ScannedDocument, lookup: &dyn ScannedLookup) -> Result<Document>;
}
