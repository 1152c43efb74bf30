use crate::{DocGraphError, DocumentId, DocumentLoader, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loader backed by a map of url -> contents, optionally layered over
/// another loader. Entries in the map shadow the fallback, which makes it
/// usable as an editor overlay for unsaved buffers.
#[derive(Default)]
pub struct InMemoryLoader {
    files: DashMap<DocumentId, String>,
    fallback: Option<Arc<dyn DocumentLoader>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: Arc<dyn DocumentLoader>) -> Self {
        Self {
            files: DashMap::new(),
            fallback: Some(fallback),
        }
    }

    pub fn insert(&self, url: impl Into<DocumentId>, contents: impl Into<String>) {
        self.files.insert(url.into(), contents.into());
    }

    pub fn remove(&self, url: &DocumentId) -> Option<String> {
        self.files.remove(url).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl DocumentLoader for InMemoryLoader {
    fn can_load(&self, url: &DocumentId) -> bool {
        self.files.contains_key(url)
            || self
                .fallback
                .as_ref()
                .map(|f| f.can_load(url))
                .unwrap_or(false)
    }

    async fn load(&self, url: &DocumentId) -> Result<String> {
        if let Some(contents) = self.files.get(url).map(|e| e.value().clone()) {
            return Ok(contents);
        }
        match &self.fallback {
            Some(fallback) => fallback.load(url).await,
            None => Err(DocGraphError::CannotLoad(url.clone())),
        }
    }
}

/// Loader reading documents relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a url onto a path under the root. Urls with a scheme, absolute
    /// paths and paths escaping the root via `..` are not loadable.
    fn path_for(&self, url: &DocumentId) -> Option<PathBuf> {
        let raw = url.as_str();
        if raw.is_empty() || raw.contains("://") {
            return None;
        }
        let rel = Path::new(raw);
        let mut out = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(out)
    }
}

#[async_trait]
impl DocumentLoader for FsLoader {
    fn can_load(&self, url: &DocumentId) -> bool {
        self.path_for(url).is_some()
    }

    async fn load(&self, url: &DocumentId) -> Result<String> {
        let path = self
            .path_for(url)
            .ok_or_else(|| DocGraphError::CannotLoad(url.clone()))?;
        debug!("loading {} from {:?}", url, path);
        let contents = tokio::fs::read_to_string(&path).await?;
        Ok(contents)
    }
}
