use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use docgraph_core::{
    DependantStrategy, DocGraphError, Document, DocumentId, DocumentLoader, DocumentParser,
    DocumentResolver, DocumentScanner, ParsedDocument, Result, ScannedDocument, Settings, Stage,
    StageError,
};
use docgraph_graph::{build_inverted_index, get_importers_of, DependencyGraph};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::AnalysisCache;
use crate::entry::{CacheEntry, Outcome};

/// A cache generation together with the dependency graph built while
/// documents were scanned in it.
pub struct Generation {
    cache: AnalysisCache,
    graph: ArcSwap<DependencyGraph>,
}

impl Generation {
    pub fn new(cache: AnalysisCache, graph: DependencyGraph) -> Self {
        Self {
            cache,
            graph: ArcSwap::from_pointee(graph),
        }
    }

    pub fn number(&self) -> u64 {
        self.cache.generation()
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Snapshot of the graph as recorded so far.
    pub fn graph(&self) -> Arc<DependencyGraph> {
        self.graph.load_full()
    }

    /// Record the direct imports of `node`. Edges already present are not
    /// re-published.
    pub fn record_dependencies(&self, node: &DocumentId, dependencies: &[DocumentId]) {
        {
            let graph = self.graph.load();
            if graph.contains(node) && dependencies.iter().all(|d| graph.depends_on(node, d)) {
                return;
            }
        }
        self.graph
            .rcu(|graph| graph.add_dependencies_of(node, dependencies.iter().cloned()));
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("number", &self.number())
            .field("stats", &self.cache.stats())
            .field("graph_nodes", &self.graph.load().len())
            .finish()
    }
}

/// Collaborators driven by the cache. Cloned into every computation.
///
/// Parse, scan and dependency computations capture only the pipeline and the
/// entries they build on, never a generation: they are carried into successor
/// generations while still pending and must settle the same way for all of
/// them.
struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    parser: Arc<dyn DocumentParser>,
    scanner: Arc<dyn DocumentScanner>,
    resolver: Arc<dyn DocumentResolver>,
}

fn stage_failure(url: &DocumentId, stage: Stage, err: &DocGraphError) -> StageError {
    let failure = StageError::from_error(url, stage, err);
    warn!("{}", failure);
    failure
}

impl Pipeline {
    fn parse_entry(
        self: &Arc<Self>,
        cache: &AnalysisCache,
        id: &DocumentId,
    ) -> Arc<CacheEntry<ParsedDocument>> {
        let this = Arc::clone(self);
        let url = id.clone();
        cache.get_or_compute_parsed(id, move || this.load_and_parse(url))
    }

    async fn load_and_parse(self: Arc<Self>, url: DocumentId) -> Outcome<ParsedDocument> {
        if !self.loader.can_load(&url) {
            let err = DocGraphError::CannotLoad(url.clone());
            return Err(stage_failure(&url, Stage::Load, &err));
        }
        let contents = self
            .loader
            .load(&url)
            .await
            .map_err(|e| stage_failure(&url, Stage::Load, &e))?;
        let parsed = self
            .parser
            .parse(&url, contents)
            .map_err(|e| stage_failure(&url, Stage::Parse, &e))?;
        Ok(Arc::new(parsed))
    }

    fn scan_entry(
        self: &Arc<Self>,
        cache: &AnalysisCache,
        id: &DocumentId,
    ) -> Arc<CacheEntry<ScannedDocument>> {
        let this = Arc::clone(self);
        let url = id.clone();
        cache.get_or_compute_scanned(id, move || {
            let parsed = this.parse_entry(cache, &url);
            this.scan_parsed(parsed, url)
        })
    }

    async fn scan_parsed(
        self: Arc<Self>,
        parsed: Arc<CacheEntry<ParsedDocument>>,
        url: DocumentId,
    ) -> Outcome<ScannedDocument> {
        let parsed = parsed.get().await?;
        let scanned = self
            .scanner
            .scan(&parsed)
            .map_err(|e| stage_failure(&url, Stage::Scan, &e))?;
        Ok(Arc::new(scanned))
    }

    fn dependencies_entry(
        self: &Arc<Self>,
        cache: &AnalysisCache,
        id: &DocumentId,
    ) -> Arc<CacheEntry<Vec<DocumentId>>> {
        let this = Arc::clone(self);
        let url = id.clone();
        cache.get_or_compute_dependencies_scanned(id, move || {
            collect_imports(this.scan_entry(cache, &url), url)
        })
    }

    /// Direct imports of `id`. Every caller records them in its own
    /// generation's graph and starts scanning the loadable ones there, so an
    /// entry carried over from an earlier generation still feeds the current
    /// graph.
    async fn scan_dependencies(
        self: &Arc<Self>,
        gen: &Generation,
        id: &DocumentId,
    ) -> Outcome<Vec<DocumentId>> {
        let imports = self.dependencies_entry(gen.cache(), id).get().await?;
        gen.record_dependencies(id, &imports);
        for import in imports.iter().filter(|u| self.loader.can_load(u)) {
            self.scan_entry(gen.cache(), import).drive();
        }
        Ok(imports)
    }

    /// Analyses are never carried into a successor while pending, so this
    /// computation only ever runs on behalf of the generation that created it.
    fn analyze_entry(
        self: &Arc<Self>,
        gen: &Arc<Generation>,
        id: &DocumentId,
    ) -> Arc<CacheEntry<Document>> {
        let this = Arc::clone(self);
        let weak = Arc::downgrade(gen);
        let url = id.clone();
        gen.cache()
            .get_or_compute_analyzed(id, move || this.resolve_closure(weak, url))
    }

    async fn resolve_closure(
        self: Arc<Self>,
        gen: Weak<Generation>,
        url: DocumentId,
    ) -> Outcome<Document> {
        let gen = gen.upgrade().ok_or_else(|| {
            StageError::new(url.clone(), Stage::Analyze, "analysis generation was dropped")
        })?;
        self.scan_closure(&gen, &url).await?;
        let scanned = self.scan_entry(gen.cache(), &url).get().await?;
        let document = self
            .resolver
            .resolve(&scanned, gen.cache())
            .map_err(|e| stage_failure(&url, Stage::Analyze, &e))?;
        Ok(Arc::new(document))
    }

    /// Scan every loadable document reachable from `root`, one breadth level
    /// at a time. Only dependency entries are awaited, never analyses, so
    /// import cycles cannot deadlock. Failures below the root are left in the
    /// cache for the resolver to observe as missing documents.
    async fn scan_closure(
        self: &Arc<Self>,
        gen: &Generation,
        root: &DocumentId,
    ) -> std::result::Result<(), StageError> {
        let mut visited: HashSet<DocumentId> = HashSet::new();
        visited.insert(root.clone());
        let mut level = vec![root.clone()];

        while !level.is_empty() {
            let results =
                join_all(level.iter().map(|url| self.scan_dependencies(gen, url))).await;
            let mut next = Vec::new();
            for (url, result) in level.iter().zip(results) {
                match result {
                    Ok(imports) => {
                        for import in imports.iter() {
                            if self.loader.can_load(import) && visited.insert(import.clone()) {
                                next.push(import.clone());
                            }
                        }
                    }
                    Err(err) if url == root => return Err(err),
                    Err(err) => debug!("import {} of {} unavailable: {}", url, root, err),
                }
            }
            level = next;
        }
        Ok(())
    }
}

async fn collect_imports(
    scanned: Arc<CacheEntry<ScannedDocument>>,
    url: DocumentId,
) -> Outcome<Vec<DocumentId>> {
    let scanned = scanned.get().await?;
    let mut seen = HashSet::new();
    let imports: Vec<DocumentId> = scanned
        .imported_urls()
        .into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect();
    debug!("{} imports {} documents", url, imports.len());
    Ok(Arc::new(imports))
}

/// Drives parse, scan and analysis of documents through generational caches
/// and handles invalidation when documents change.
///
/// Readers fetch the current [`Generation`] and pass it explicitly to every
/// pipeline call; edits publish a new generation without touching the old
/// one.
pub struct AnalysisContext {
    pipeline: Arc<Pipeline>,
    settings: Settings,
    current: ArcSwap<Generation>,
    writer: Mutex<()>,
}

impl AnalysisContext {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        parser: Arc<dyn DocumentParser>,
        scanner: Arc<dyn DocumentScanner>,
        resolver: Arc<dyn DocumentResolver>,
        settings: Settings,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| DocGraphError::Config(e.to_string()))?;
        Ok(Self {
            pipeline: Arc::new(Pipeline {
                loader,
                parser,
                scanner,
                resolver,
            }),
            settings,
            current: ArcSwap::from_pointee(Generation::new(
                AnalysisCache::new(),
                DependencyGraph::new(),
            )),
            writer: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn can_load(&self, url: &DocumentId) -> bool {
        self.pipeline.loader.can_load(url)
    }

    pub async fn parse(&self, gen: &Generation, id: &DocumentId) -> Outcome<ParsedDocument> {
        self.pipeline.parse_entry(gen.cache(), id).get().await
    }

    pub async fn scan(&self, gen: &Generation, id: &DocumentId) -> Outcome<ScannedDocument> {
        self.pipeline.scan_entry(gen.cache(), id).get().await
    }

    /// Scan `id`, record its imports in `gen`'s graph and start scanning the
    /// loadable ones. Resolves to the direct imports.
    pub async fn scan_dependencies(
        &self,
        gen: &Generation,
        id: &DocumentId,
    ) -> Outcome<Vec<DocumentId>> {
        self.pipeline.scan_dependencies(gen, id).await
    }

    pub async fn analyze(&self, gen: &Arc<Generation>, id: &DocumentId) -> Outcome<Document> {
        self.pipeline.analyze_entry(gen, id).get().await
    }

    pub async fn analyze_current(&self, id: &DocumentId) -> Outcome<Document> {
        let gen = self.current();
        self.analyze(&gen, id).await
    }

    /// Analyze `ids` against one generation, at most
    /// `analysis.max_concurrent_analyses` at a time. Results keep input order.
    pub async fn analyze_all<I>(&self, ids: I) -> Vec<(DocumentId, Outcome<Document>)>
    where
        I: IntoIterator<Item = DocumentId>,
    {
        let gen = self.current();
        let limit = self.settings.analysis.max_concurrent_analyses.max(1);
        stream::iter(ids)
            .map(|id| {
                let gen = Arc::clone(&gen);
                async move {
                    let outcome = self.analyze(&gen, &id).await;
                    (id, outcome)
                }
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// Documents that must be re-analyzed when `path` changes, excluding
    /// `path` itself.
    pub fn dependants_of(&self, path: &DocumentId) -> HashSet<DocumentId> {
        let gen = self.current();
        self.compute_dependants(&gen, path)
    }

    fn compute_dependants(&self, gen: &Generation, path: &DocumentId) -> HashSet<DocumentId> {
        let graph = gen.graph();
        let use_graph = self.settings.analysis.dependant_strategy == DependantStrategy::Graph;
        if use_graph && !graph.is_empty() {
            return graph.get_all_dependants_of(path);
        }
        let index = build_inverted_index(
            &gen.cache().analyzed_documents(),
            &gen.cache().scanned_documents(),
        );
        let mut importers = get_importers_of(path, &index);
        importers.remove(path);
        importers
    }

    /// Publish a generation in which `paths` and everything depending on
    /// them will be recomputed. The previous generation is left intact for
    /// anyone still holding it.
    pub fn files_changed(&self, paths: &[DocumentId]) -> Arc<Generation> {
        let _guard = self.writer.lock();
        let base = self.current.load_full();
        if paths.is_empty() {
            return base;
        }

        // dependants come from the graph as it was before any invalidation
        let dependants: Vec<HashSet<DocumentId>> = paths
            .iter()
            .map(|path| self.compute_dependants(&base, path))
            .collect();

        let cache = base
            .cache()
            .on_paths_changed(paths.iter().zip(dependants.iter()));
        let graph = base.graph().invalidate_paths(paths.iter());

        let next = Arc::new(Generation::new(cache, graph));
        self.current.store(Arc::clone(&next));
        info!(
            "published generation {} after {} changed files ({} dependants)",
            next.number(),
            paths.len(),
            dependants.iter().map(HashSet::len).sum::<usize>()
        );
        next
    }

    /// Drop every cached result.
    pub fn clear_caches(&self) -> Arc<Generation> {
        let _guard = self.writer.lock();
        let base = self.current.load_full();
        let cleared = base.cache().cleared();
        let next = Arc::new(Generation::new(cleared, DependencyGraph::new()));
        self.current.store(Arc::clone(&next));
        info!("cleared caches, generation {}", next.number());
        next
    }
}

impl fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("settings", &self.settings)
            .field("generation", &self.current.load().number())
            .finish_non_exhaustive()
    }
}
