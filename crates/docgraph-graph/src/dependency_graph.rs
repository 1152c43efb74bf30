use std::collections::{HashSet, VecDeque};

use docgraph_core::DocumentId;
use im::{HashMap as PMap, HashSet as PSet};
use tracing::debug;

/// Persistent graph of "document depends on document" edges.
///
/// Every mutating operation returns a new graph and leaves the receiver
/// untouched. Both maps are `im` persistent hash maps, so a fork only copies
/// the paths it changes and the rest is shared with the predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// node -> documents it depends on
    forward: PMap<DocumentId, PSet<DocumentId>>,
    /// node -> documents that directly depend on it
    reverse: PMap<DocumentId, PSet<DocumentId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` depends on each of `dependencies`, in addition to
    /// whatever was recorded for it before.
    pub fn add_dependencies_of<I>(&self, node: &DocumentId, dependencies: I) -> DependencyGraph
    where
        I: IntoIterator<Item = DocumentId>,
    {
        let mut forward = self.forward.clone();
        let mut reverse = self.reverse.clone();

        let mut out = forward.get(node).cloned().unwrap_or_default();
        for dep in dependencies {
            let mut incoming = reverse.get(&dep).cloned().unwrap_or_default();
            incoming.insert(node.clone());
            reverse.insert(dep.clone(), incoming);
            out.insert(dep);
        }
        forward.insert(node.clone(), out);

        DependencyGraph { forward, reverse }
    }

    /// Every document with a path of dependency edges leading to `node`.
    /// `node` itself is never part of the result, even on a cycle.
    pub fn get_all_dependants_of(&self, node: &DocumentId) -> HashSet<DocumentId> {
        let mut visited: HashSet<DocumentId> = HashSet::new();
        let mut queue: VecDeque<DocumentId> = VecDeque::new();
        queue.push_back(node.clone());

        while let Some(current) = queue.pop_front() {
            if let Some(dependants) = self.reverse.get(&current) {
                for dependant in dependants.iter() {
                    if dependant != node && visited.insert(dependant.clone()) {
                        queue.push_back(dependant.clone());
                    }
                }
            }
        }
        visited
    }

    /// New graph with every edge touching any of `paths` removed, whether the
    /// path is the source or the target. Other edges are kept.
    pub fn invalidate_paths<'a, I>(&self, paths: I) -> DependencyGraph
    where
        I: IntoIterator<Item = &'a DocumentId>,
    {
        let mut forward = self.forward.clone();
        let mut reverse = self.reverse.clone();

        for path in paths {
            if let Some(deps) = forward.remove(path) {
                for dep in deps.iter() {
                    detach(&mut reverse, dep, path, true);
                }
            }
            if let Some(dependants) = reverse.remove(path) {
                for dependant in dependants.iter() {
                    detach(&mut forward, dependant, path, false);
                }
            }
            debug!("invalidated graph edges of {}", path);
        }

        DependencyGraph { forward, reverse }
    }

    /// Direct dependencies of `node`.
    pub fn dependencies_of(&self, node: &DocumentId) -> HashSet<DocumentId> {
        self.forward
            .get(node)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependants of `node`.
    pub fn dependants_of(&self, node: &DocumentId) -> HashSet<DocumentId> {
        self.reverse
            .get(node)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the edge `from -> to` is recorded.
    pub fn depends_on(&self, from: &DocumentId, to: &DocumentId) -> bool {
        self.forward
            .get(from)
            .map(|s| s.contains(to))
            .unwrap_or(false)
    }

    pub fn contains(&self, node: &DocumentId) -> bool {
        self.forward.contains_key(node) || self.reverse.contains_key(node)
    }

    /// Number of distinct documents mentioned by the graph.
    pub fn len(&self) -> usize {
        self.forward.len()
            + self
                .reverse
                .keys()
                .filter(|k| !self.forward.contains_key(*k))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|s| s.len()).sum()
    }
}

/// Remove `other` from the set stored under `key`. Empty reverse sets are
/// dropped; forward sets are kept so a scanned node stays recorded.
fn detach(
    map: &mut PMap<DocumentId, PSet<DocumentId>>,
    key: &DocumentId,
    other: &DocumentId,
    drop_empty: bool,
) {
    if let Some(set) = map.get(key) {
        let mut set = set.clone();
        set.remove(other);
        if set.is_empty() && drop_empty {
            map.remove(key);
        } else {
            map.insert(key.clone(), set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DocumentId {
        DocumentId::from(s)
    }

    fn ids(items: &[&str]) -> HashSet<DocumentId> {
        items.iter().map(|s| id(s)).collect()
    }

    fn diamond() -> DependencyGraph {
        DependencyGraph::new()
            .add_dependencies_of(&id("a"), vec![id("common")])
            .add_dependencies_of(&id("b"), vec![id("common")])
            .add_dependencies_of(&id("base"), vec![id("a"), id("b")])
    }

    #[test]
    fn transitive_dependants() {
        let graph = diamond();
        assert_eq!(graph.get_all_dependants_of(&id("common")), ids(&["a", "b", "base"]));
        assert_eq!(graph.get_all_dependants_of(&id("a")), ids(&["base"]));
        assert!(graph.get_all_dependants_of(&id("base")).is_empty());
        assert!(graph.get_all_dependants_of(&id("unknown")).is_empty());
    }

    #[test]
    fn additions_accumulate() {
        let graph = DependencyGraph::new()
            .add_dependencies_of(&id("a"), vec![id("b")])
            .add_dependencies_of(&id("a"), vec![id("c")]);
        assert_eq!(graph.dependencies_of(&id("a")), ids(&["b", "c"]));
        assert!(graph.depends_on(&id("a"), &id("c")));
        assert!(!graph.depends_on(&id("c"), &id("a")));
        assert_eq!(graph.dependants_of(&id("c")), ids(&["a"]));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn receiver_is_untouched() {
        let before = diamond();
        let after = before.add_dependencies_of(&id("extra"), vec![id("common")]);
        assert!(!before.contains(&id("extra")));
        assert!(after.get_all_dependants_of(&id("common")).contains(&id("extra")));

        let invalidated = before.invalidate_paths([&id("a")]);
        assert_eq!(before.get_all_dependants_of(&id("common")), ids(&["a", "b", "base"]));
        assert_eq!(invalidated.get_all_dependants_of(&id("common")), ids(&["b", "base"]));
    }

    #[test]
    fn invalidate_removes_edges_in_both_directions() {
        let graph = diamond().invalidate_paths([&id("a")]);
        assert!(!graph.contains(&id("a")));
        assert_eq!(graph.dependencies_of(&id("base")), ids(&["b"]));
        assert_eq!(graph.dependants_of(&id("common")), ids(&["b"]));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn cycles_terminate_and_exclude_seed() {
        let graph = DependencyGraph::new()
            .add_dependencies_of(&id("a"), vec![id("b")])
            .add_dependencies_of(&id("b"), vec![id("c")])
            .add_dependencies_of(&id("c"), vec![id("a")]);
        assert_eq!(graph.get_all_dependants_of(&id("a")), ids(&["b", "c"]));

        let self_loop = DependencyGraph::new().add_dependencies_of(&id("x"), vec![id("x")]);
        assert!(self_loop.get_all_dependants_of(&id("x")).is_empty());
    }

    #[test]
    fn invalidating_unknown_node_is_identity() {
        let graph = diamond();
        let forked = graph.invalidate_paths([&id("nowhere")]);
        assert_eq!(forked, graph);
        for node in ["a", "b", "base", "common"] {
            assert_eq!(
                forked.get_all_dependants_of(&id(node)),
                graph.get_all_dependants_of(&id(node))
            );
        }
    }

    #[test]
    fn node_without_dependencies_is_recorded() {
        let graph = DependencyGraph::new().add_dependencies_of(&id("leaf"), Vec::new());
        assert!(graph.contains(&id("leaf")));
        assert!(!graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}
