//! Data shapes exchanged between the pipeline stages and the cache.
//!
//! The cache treats these as values: once a stage produces one it is wrapped
//! in an `Arc` and never mutated again.

use crate::DocumentId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Output of the parser. The AST is opaque to the cache.
#[derive(Clone)]
pub struct ParsedDocument {
    pub url: DocumentId,
    pub contents: String,
    pub ast: Arc<dyn Any + Send + Sync>,
}

impl ParsedDocument {
    pub fn new(
        url: DocumentId,
        contents: impl Into<String>,
        ast: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            url,
            contents: contents.into(),
            ast,
        }
    }

    /// Borrow the AST as the concrete type the parser produced.
    pub fn ast_as<T: Any>(&self) -> Option<&T> {
        self.ast.downcast_ref::<T>()
    }
}

impl fmt::Debug for ParsedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedDocument")
            .field("url", &self.url)
            .field("contents_len", &self.contents.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImport {
    pub url: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedInlineDocument {
    pub scanned_document: ScannedDocument,
}

/// A feature declared by a document, as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedFeature {
    /// A declared dependency on another document.
    Import(ScannedImport),
    /// A nested sub-document (inline script, style, ...).
    InlineDocument(ScannedInlineDocument),
    /// Anything else the scanner reports; the cache only carries it.
    Other { kind: String, name: String },
}

/// Output of the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDocument {
    pub url: DocumentId,
    pub features: Vec<ScannedFeature>,
    pub warnings: Vec<String>,
}

impl ScannedDocument {
    pub fn new(url: DocumentId, features: Vec<ScannedFeature>) -> Self {
        Self {
            url,
            features,
            warnings: Vec::new(),
        }
    }

    /// Every imported URL declared by this document or any inline document
    /// nested in it, at any depth, in declaration order.
    pub fn imported_urls(&self) -> Vec<DocumentId> {
        let mut out = Vec::new();
        collect_scanned_imports(self, &mut out);
        out
    }
}

fn collect_scanned_imports(doc: &ScannedDocument, out: &mut Vec<DocumentId>) {
    for feature in &doc.features {
        match feature {
            ScannedFeature::Import(import) => out.push(import.url.clone()),
            ScannedFeature::InlineDocument(inline) => {
                collect_scanned_imports(&inline.scanned_document, out)
            }
            ScannedFeature::Other { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub url: DocumentId,
}

/// A resolved feature of an analyzed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Import(Import),
    InlineDocument(Arc<Document>),
    Other { kind: String, name: String },
}

impl Feature {
    pub fn kind(&self) -> &str {
        match self {
            Feature::Import(_) => "import",
            Feature::InlineDocument(_) => "inline-document",
            Feature::Other { kind, .. } => kind,
        }
    }
}

/// Output of the resolver: a fully cross-referenced document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: DocumentId,
    pub features: Vec<Feature>,
    pub warnings: Vec<String>,
}

impl Document {
    pub fn new(url: DocumentId, features: Vec<Feature>) -> Self {
        Self {
            url,
            features,
            warnings: Vec::new(),
        }
    }

    /// Features declared directly by this document. With `imports_only`
    /// set, only `Import` features are returned. Features of inline
    /// documents are reachable through their `InlineDocument` wrapper.
    pub fn get_features(&self, imports_only: bool) -> impl Iterator<Item = &Feature> {
        self.features
            .iter()
            .filter(move |f| !imports_only || matches!(f, Feature::Import(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(url: &str) -> ScannedFeature {
        ScannedFeature::Import(ScannedImport { url: url.into() })
    }

    fn inline(features: Vec<ScannedFeature>) -> ScannedFeature {
        ScannedFeature::InlineDocument(ScannedInlineDocument {
            scanned_document: ScannedDocument::new("page.html".into(), features),
        })
    }

    #[test]
    fn imported_urls_recurse_into_inline_documents() {
        let doc = ScannedDocument::new(
            "page.html".into(),
            vec![
                import("a.html"),
                inline(vec![import("b.js"), inline(vec![import("c.js")])]),
                ScannedFeature::Other {
                    kind: "element".into(),
                    name: "x-app".into(),
                },
            ],
        );
        let urls: Vec<String> = doc.imported_urls().iter().map(|u| u.to_string()).collect();
        assert_eq!(urls, vec!["a.html", "b.js", "c.js"]);
    }

    #[test]
    fn get_features_filters_imports() {
        let doc = Document::new(
            "page.html".into(),
            vec![
                Feature::Import(Import { url: "a.html".into() }),
                Feature::Other {
                    kind: "element".into(),
                    name: "x-app".into(),
                },
            ],
        );
        assert_eq!(doc.get_features(false).count(), 2);
        let imports: Vec<&Feature> = doc.get_features(true).collect();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind(), "import");
    }

    #[test]
    fn parsed_document_ast_downcast() {
        let parsed = ParsedDocument::new("a.html".into(), "<p>", Arc::new(vec![1u32, 2, 3]));
        assert_eq!(parsed.ast_as::<Vec<u32>>(), Some(&vec![1, 2, 3]));
        assert!(parsed.ast_as::<String>().is_none());
    }
}
