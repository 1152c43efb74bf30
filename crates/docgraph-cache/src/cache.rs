use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use docgraph_core::{Document, DocumentId, ParsedDocument, ScannedDocument, ScannedLookup};
use im::{HashMap as PMap, HashSet as PSet};
use tracing::debug;

use crate::entry::{CacheEntry, EntryState, Outcome};

type EntryMap<T> = PMap<DocumentId, Arc<CacheEntry<T>>>;

/// Entry counts of one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub generation: u64,
    pub parsed: usize,
    pub scanned: usize,
    pub analyzed: usize,
    pub dependencies_scanned: usize,
    pub settled_scanned: usize,
    pub settled_analyzed: usize,
}

/// One generation of cached pipeline results.
///
/// Maps only grow within a generation: the first computation registered for
/// a (document, stage) pair is the one every later requester gets. Edits never
/// touch an existing generation; [`AnalysisCache::on_path_changed`] builds a
/// successor that shares every still valid entry by reference.
///
/// Each map is a persistent `im::HashMap` behind an `ArcSwap`, so a fork
/// costs the invalidated keys rather than the size of the cache.
pub struct AnalysisCache {
    generation: u64,
    parsed: ArcSwap<EntryMap<ParsedDocument>>,
    scanned: ArcSwap<EntryMap<ScannedDocument>>,
    analyzed: ArcSwap<EntryMap<Document>>,
    /// Set once the imports of a document have been collected. The value is
    /// the list of direct imports.
    dependencies_scanned: ArcSwap<EntryMap<Vec<DocumentId>>>,
    /// Documents whose analysis was registered as a computation in this
    /// generation. Superset of the analyses still in flight.
    analyses_started: ArcSwap<PSet<DocumentId>>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::with_generation(0)
    }
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            parsed: ArcSwap::from_pointee(PMap::new()),
            scanned: ArcSwap::from_pointee(PMap::new()),
            analyzed: ArcSwap::from_pointee(PMap::new()),
            dependencies_scanned: ArcSwap::from_pointee(PMap::new()),
            analyses_started: ArcSwap::from_pointee(PSet::new()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn parsed(&self, id: &DocumentId) -> Option<Arc<CacheEntry<ParsedDocument>>> {
        lookup(&self.parsed, id)
    }

    pub fn scanned(&self, id: &DocumentId) -> Option<Arc<CacheEntry<ScannedDocument>>> {
        lookup(&self.scanned, id)
    }

    pub fn analyzed(&self, id: &DocumentId) -> Option<Arc<CacheEntry<Document>>> {
        lookup(&self.analyzed, id)
    }

    pub fn dependencies_scanned(
        &self,
        id: &DocumentId,
    ) -> Option<Arc<CacheEntry<Vec<DocumentId>>>> {
        lookup(&self.dependencies_scanned, id)
    }

    /// Entry for the parse of `id`, registering `make()` as its computation
    /// when there is none yet. `make` must only build the future, not poll it.
    /// Under a race it may be called even though another writer's entry wins,
    /// in which case its future is dropped unpolled.
    pub fn get_or_compute_parsed<F, Fut>(
        &self,
        id: &DocumentId,
        make: F,
    ) -> Arc<CacheEntry<ParsedDocument>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<ParsedDocument>> + Send + 'static,
    {
        get_or_compute(&self.parsed, "parsed", id, make)
    }

    pub fn get_or_compute_scanned<F, Fut>(
        &self,
        id: &DocumentId,
        make: F,
    ) -> Arc<CacheEntry<ScannedDocument>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<ScannedDocument>> + Send + 'static,
    {
        get_or_compute(&self.scanned, "scanned", id, make)
    }

    pub fn get_or_compute_analyzed<F, Fut>(
        &self,
        id: &DocumentId,
        make: F,
    ) -> Arc<CacheEntry<Document>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<Document>> + Send + 'static,
    {
        if let Some(existing) = lookup(&self.analyzed, id) {
            debug!("analyzed cache hit for {}", id);
            return existing;
        }
        let fresh = Arc::new(CacheEntry::pending(make()));
        // recorded before the entry becomes visible; forks rely on this order
        self.analyses_started
            .rcu(|started| Arc::new(started.update(id.clone())));
        insert_if_absent(&self.analyzed, "analyzed", id, fresh)
    }

    pub fn get_or_compute_dependencies_scanned<F, Fut>(
        &self,
        id: &DocumentId,
        make: F,
    ) -> Arc<CacheEntry<Vec<DocumentId>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<Vec<DocumentId>>> + Send + 'static,
    {
        get_or_compute(&self.dependencies_scanned, "dependencies_scanned", id, make)
    }

    /// Successfully scanned document for `id`, if it has settled.
    pub fn settled_scanned(&self, id: &DocumentId) -> Option<Arc<ScannedDocument>> {
        self.scanned.load().get(id).and_then(|e| e.value())
    }

    pub fn settled_analyzed(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.analyzed.load().get(id).and_then(|e| e.value())
    }

    pub fn scanned_documents(&self) -> Vec<Arc<ScannedDocument>> {
        settled_values(&self.scanned)
    }

    pub fn analyzed_documents(&self) -> Vec<Arc<Document>> {
        settled_values(&self.analyzed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generation: self.generation,
            parsed: self.parsed.load().len(),
            scanned: self.scanned.load().len(),
            analyzed: self.analyzed.load().len(),
            dependencies_scanned: self.dependencies_scanned.load().len(),
            settled_scanned: count_settled(&self.scanned),
            settled_analyzed: count_settled(&self.analyzed),
        }
    }

    /// An empty successor generation.
    pub fn cleared(&self) -> AnalysisCache {
        AnalysisCache::with_generation(self.generation + 1)
    }

    /// Successor generation after `path` changed.
    ///
    /// * `path` loses every entry.
    /// * each of `dependants` loses its analysis and its dependencies-scanned
    ///   marker but keeps its parse and scan.
    /// * any other analysis still in flight is dropped; if it has already
    ///   produced an outcome, that outcome is carried as a resolved entry.
    /// * everything else is shared with this generation.
    pub fn on_path_changed(
        &self,
        path: &DocumentId,
        dependants: &HashSet<DocumentId>,
    ) -> AnalysisCache {
        self.on_paths_changed([(path, dependants)])
    }

    /// Successor generation after several paths changed at once. Equivalent
    /// to chaining [`AnalysisCache::on_path_changed`] per path, but forks a
    /// single generation.
    pub fn on_paths_changed<'a, I>(&self, changes: I) -> AnalysisCache
    where
        I: IntoIterator<Item = (&'a DocumentId, &'a HashSet<DocumentId>)>,
    {
        let mut parsed = (*self.parsed.load_full()).clone();
        let mut scanned = (*self.scanned.load_full()).clone();
        let mut dependencies = (*self.dependencies_scanned.load_full()).clone();
        // the map is read before the started set: an analysis visible in the
        // map is then always listed in the set
        let mut analyzed = (*self.analyzed.load_full()).clone();
        let started = self.analyses_started.load_full();

        let mut paths = 0usize;
        let mut dependant_count = 0usize;
        for (path, dependants) in changes {
            parsed.remove(path);
            scanned.remove(path);
            analyzed.remove(path);
            dependencies.remove(path);
            for dependant in dependants {
                analyzed.remove(dependant);
                dependencies.remove(dependant);
            }
            paths += 1;
            dependant_count += dependants.len();
        }

        let mut dropped_pending = 0usize;
        for id in started.iter() {
            let entry = match analyzed.get(id) {
                Some(entry) if entry.is_pending() => Arc::clone(entry),
                _ => continue,
            };
            match entry.state() {
                EntryState::Settled(outcome) => {
                    analyzed.insert(id.clone(), Arc::new(CacheEntry::resolved(outcome)));
                }
                EntryState::Pending => {
                    analyzed.remove(id);
                    dropped_pending += 1;
                }
            }
        }

        let next = AnalysisCache {
            generation: self.generation + 1,
            parsed: ArcSwap::from_pointee(parsed),
            scanned: ArcSwap::from_pointee(scanned),
            analyzed: ArcSwap::from_pointee(analyzed),
            dependencies_scanned: ArcSwap::from_pointee(dependencies),
            analyses_started: ArcSwap::from_pointee(PSet::new()),
        };
        debug!(
            "forked cache generation {} -> {} for {} paths \
             ({} dependants, {} pending analyses dropped)",
            self.generation,
            next.generation,
            paths,
            dependant_count,
            dropped_pending
        );
        next
    }
}

impl ScannedLookup for AnalysisCache {
    fn scanned(&self, url: &DocumentId) -> Option<Arc<ScannedDocument>> {
        self.settled_scanned(url)
    }
}

impl fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("stats", &self.stats())
            .finish()
    }
}

fn lookup<T>(map: &ArcSwap<EntryMap<T>>, id: &DocumentId) -> Option<Arc<CacheEntry<T>>> {
    map.load().get(id).cloned()
}

fn get_or_compute<T, F, Fut>(
    map: &ArcSwap<EntryMap<T>>,
    stage: &str,
    id: &DocumentId,
    make: F,
) -> Arc<CacheEntry<T>>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    if let Some(existing) = lookup(map, id) {
        debug!("{} cache hit for {}", stage, id);
        return existing;
    }
    insert_if_absent(map, stage, id, Arc::new(CacheEntry::pending(make())))
}

/// Publish `fresh` under `id` unless another writer got there first, and
/// return whichever entry ended up in the map.
fn insert_if_absent<T>(
    map: &ArcSwap<EntryMap<T>>,
    stage: &str,
    id: &DocumentId,
    fresh: Arc<CacheEntry<T>>,
) -> Arc<CacheEntry<T>> {
    map.rcu(|current| {
        if current.contains_key(id) {
            Arc::clone(current)
        } else {
            Arc::new(current.update(id.clone(), Arc::clone(&fresh)))
        }
    });
    match lookup(map, id) {
        Some(winner) => {
            if Arc::ptr_eq(&winner, &fresh) {
                debug!("{} cache miss for {}", stage, id);
            }
            winner
        }
        None => fresh,
    }
}

fn settled_values<T>(map: &ArcSwap<EntryMap<T>>) -> Vec<Arc<T>>
where
    T: Send + Sync + 'static,
{
    map.load().values().filter_map(|e| e.value()).collect()
}

fn count_settled<T>(map: &ArcSwap<EntryMap<T>>) -> usize
where
    T: Send + Sync + 'static,
{
    map.load()
        .values()
        .filter(|e| matches!(e.state(), EntryState::Settled(_)))
        .count()
}
