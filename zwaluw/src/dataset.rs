/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The dataset boundary: the engine consumes graphs through the `Graph`
//! trait and never assumes a particular storage backend. `MemoryGraph` is
//! the in-memory reference implementation used by tests and examples.

use rustc_hash::{FxHashMap, FxHashSet};
use shared::dictionary::Dictionary;
use shared::triple::Triple;
use std::sync::{Arc, RwLock};

/// A find pattern over encoded terms; `None` is a wildcard position.
pub type IdPattern = (Option<u32>, Option<u32>, Option<u32>);

/// Storage capability the engine evaluates against. All calls are pull
/// driven: `find` is only issued once a downstream consumer demanded a row,
/// and a deferred backend blocks inside its own `find`. Cancellation is the
/// consumer dropping the iterator.
pub trait Graph: Send + Sync {
    fn find<'a>(&'a self, pattern: &IdPattern) -> Box<dyn Iterator<Item = Triple> + 'a>;

    fn insert(&mut self, triple: Triple) -> bool;

    fn delete(&mut self, triple: &Triple) -> bool;

    /// Upper-bound guess of how many triples match. Join ordering uses this;
    /// correctness never depends on it.
    fn estimate_cardinality(&self, pattern: &IdPattern) -> usize;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type NestedIndex = FxHashMap<u32, FxHashMap<u32, FxHashSet<u32>>>;

/// In-memory graph with the three permutation indexes the engine probes:
/// SPO, POS and OSP.
#[derive(Debug, Default, Clone)]
pub struct MemoryGraph {
    spo: NestedIndex,
    pos: NestedIndex,
    osp: NestedIndex,
    size: usize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        MemoryGraph::default()
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.spo
            .get(&triple.subject)
            .and_then(|preds| preds.get(&triple.predicate))
            .map_or(false, |objects| objects.contains(&triple.object))
    }

    fn collect(&self, pattern: &IdPattern) -> Vec<Triple> {
        let mut out = Vec::new();
        match *pattern {
            (Some(s), Some(p), Some(o)) => {
                let triple = Triple::new(s, p, o);
                if self.contains(&triple) {
                    out.push(triple);
                }
            }
            (Some(s), Some(p), None) => {
                if let Some(objects) = self.spo.get(&s).and_then(|preds| preds.get(&p)) {
                    out.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                }
            }
            (Some(s), None, Some(o)) => {
                if let Some(preds) = self.spo.get(&s) {
                    for (&p, objects) in preds {
                        if objects.contains(&o) {
                            out.push(Triple::new(s, p, o));
                        }
                    }
                }
            }
            (Some(s), None, None) => {
                if let Some(preds) = self.spo.get(&s) {
                    for (&p, objects) in preds {
                        out.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                    }
                }
            }
            (None, Some(p), Some(o)) => {
                if let Some(objects) = self.pos.get(&p) {
                    if let Some(subjects) = objects.get(&o) {
                        out.extend(subjects.iter().map(|&s| Triple::new(s, p, o)));
                    }
                }
            }
            (None, Some(p), None) => {
                if let Some(objects) = self.pos.get(&p) {
                    for (&o, subjects) in objects {
                        out.extend(subjects.iter().map(|&s| Triple::new(s, p, o)));
                    }
                }
            }
            (None, None, Some(o)) => {
                if let Some(subjects) = self.osp.get(&o) {
                    for (&s, preds) in subjects {
                        out.extend(preds.iter().map(|&p| Triple::new(s, p, o)));
                    }
                }
            }
            (None, None, None) => {
                for (&s, preds) in &self.spo {
                    for (&p, objects) in preds {
                        out.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                    }
                }
            }
        }
        out
    }
}

impl Graph for MemoryGraph {
    fn find<'a>(&'a self, pattern: &IdPattern) -> Box<dyn Iterator<Item = Triple> + 'a> {
        Box::new(self.collect(pattern).into_iter())
    }

    fn insert(&mut self, triple: Triple) -> bool {
        if self.contains(&triple) {
            return false;
        }
        let Triple {
            subject: s,
            predicate: p,
            object: o,
        } = triple;
        self.spo.entry(s).or_default().entry(p).or_default().insert(o);
        self.pos.entry(p).or_default().entry(o).or_default().insert(s);
        self.osp.entry(o).or_default().entry(s).or_default().insert(p);
        self.size += 1;
        true
    }

    fn delete(&mut self, triple: &Triple) -> bool {
        if !self.contains(triple) {
            return false;
        }
        let Triple {
            subject: s,
            predicate: p,
            object: o,
        } = *triple;
        remove_from_index(&mut self.spo, s, p, o);
        remove_from_index(&mut self.pos, p, o, s);
        remove_from_index(&mut self.osp, o, s, p);
        self.size -= 1;
        true
    }

    fn estimate_cardinality(&self, pattern: &IdPattern) -> usize {
        match *pattern {
            (Some(s), Some(p), Some(o)) => usize::from(self.contains(&Triple::new(s, p, o))),
            (Some(s), Some(p), None) => self
                .spo
                .get(&s)
                .and_then(|preds| preds.get(&p))
                .map_or(0, FxHashSet::len),
            (Some(s), None, _) => self
                .spo
                .get(&s)
                .map_or(0, |preds| preds.values().map(FxHashSet::len).sum()),
            (None, Some(p), Some(o)) => self
                .pos
                .get(&p)
                .and_then(|objects| objects.get(&o))
                .map_or(0, FxHashSet::len),
            (None, Some(p), None) => self
                .pos
                .get(&p)
                .map_or(0, |objects| objects.values().map(FxHashSet::len).sum()),
            (None, None, Some(o)) => self
                .osp
                .get(&o)
                .map_or(0, |subjects| subjects.values().map(FxHashSet::len).sum()),
            (None, None, None) => self.size,
        }
    }

    fn clear(&mut self) {
        self.spo.clear();
        self.pos.clear();
        self.osp.clear();
        self.size = 0;
    }

    fn len(&self) -> usize {
        self.size
    }
}

fn remove_from_index(index: &mut NestedIndex, a: u32, b: u32, c: u32) {
    if let Some(inner) = index.get_mut(&a) {
        if let Some(leaf) = inner.get_mut(&b) {
            leaf.remove(&c);
            if leaf.is_empty() {
                inner.remove(&b);
            }
        }
        if inner.is_empty() {
            index.remove(&a);
        }
    }
}

/// Produces a graph for an IRI the dataset has never seen; used for lazy and
/// federated graph resolution.
pub type GraphFactory = Box<dyn Fn(&str) -> Option<Box<dyn Graph>> + Send + Sync>;

/// A resolved active graph: either owned by the dataset or produced (and
/// cached) by the graph factory.
pub enum GraphHandle<'a> {
    Borrowed(&'a dyn Graph),
    Shared(Arc<dyn Graph>),
}

impl GraphHandle<'_> {
    pub fn graph(&self) -> &dyn Graph {
        match self {
            GraphHandle::Borrowed(g) => *g,
            GraphHandle::Shared(g) => g.as_ref(),
        }
    }
}

/// Named-graph registry plus the dictionary every graph of the dataset is
/// encoded against. The session owns one `Dataset`; query evaluation only
/// needs `&Dataset` (the dictionary interns computed values behind a lock).
pub struct Dataset {
    dictionary: RwLock<Dictionary>,
    default_graph: Box<dyn Graph>,
    named: FxHashMap<String, Box<dyn Graph>>,
    factory: Option<GraphFactory>,
    resolved: RwLock<FxHashMap<String, Arc<dyn Graph>>>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    pub fn new() -> Self {
        Dataset {
            dictionary: RwLock::new(Dictionary::new()),
            default_graph: Box::new(MemoryGraph::new()),
            named: FxHashMap::default(),
            factory: None,
            resolved: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn with_default_graph(graph: Box<dyn Graph>) -> Self {
        Dataset {
            default_graph: graph,
            ..Dataset::new()
        }
    }

    pub fn encode(&self, value: &str) -> u32 {
        self.dictionary
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .encode(value)
    }

    pub fn lookup(&self, value: &str) -> Option<u32> {
        self.dictionary
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .lookup(value)
    }

    pub fn decode(&self, id: u32) -> Option<String> {
        self.dictionary
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .decode(id)
            .map(str::to_string)
    }

    pub fn decode_triple(&self, triple: &Triple) -> String {
        self.dictionary
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .decode_triple(triple)
    }

    /// Encodes and inserts one triple into the default graph.
    pub fn insert_default(&mut self, subject: &str, predicate: &str, object: &str) -> bool {
        let triple = {
            let mut dict = self.dictionary.write().unwrap_or_else(|e| e.into_inner());
            Triple::new(dict.encode(subject), dict.encode(predicate), dict.encode(object))
        };
        self.default_graph.insert(triple)
    }

    /// Encodes and inserts one triple into a named graph, creating the graph
    /// if this dataset has not seen the IRI yet.
    pub fn insert_named(&mut self, graph_iri: &str, subject: &str, predicate: &str, object: &str) -> bool {
        let triple = {
            let mut dict = self.dictionary.write().unwrap_or_else(|e| e.into_inner());
            Triple::new(dict.encode(subject), dict.encode(predicate), dict.encode(object))
        };
        self.named
            .entry(graph_iri.to_string())
            .or_insert_with(|| Box::new(MemoryGraph::new()))
            .insert(triple)
    }

    pub fn default_graph(&self) -> &dyn Graph {
        self.default_graph.as_ref()
    }

    pub fn default_graph_mut(&mut self) -> &mut dyn Graph {
        self.default_graph.as_mut()
    }

    pub fn add_named_graph(&mut self, iri: &str, graph: Box<dyn Graph>) {
        self.named.insert(iri.to_string(), graph);
    }

    pub fn get_named_graph(&self, iri: &str) -> Option<&dyn Graph> {
        self.named.get(iri).map(|g| g.as_ref())
    }

    pub fn named_graph_mut(&mut self, iri: &str) -> Option<&mut (dyn Graph + 'static)> {
        match self.named.get_mut(iri) {
            Some(g) => Some(g.as_mut()),
            None => None,
        }
    }

    pub fn graph_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_graph_factory(&mut self, factory: Option<GraphFactory>) {
        self.factory = factory;
    }

    /// Resolves a graph IRI against the named registry, falling back to the
    /// factory. Factory-produced graphs are cached so repeated references
    /// inside one query observe the same graph.
    pub fn resolve_graph(&self, iri: &str) -> Option<GraphHandle<'_>> {
        if let Some(graph) = self.named.get(iri) {
            return Some(GraphHandle::Borrowed(graph.as_ref()));
        }
        {
            let resolved = self.resolved.read().unwrap_or_else(|e| e.into_inner());
            if let Some(graph) = resolved.get(iri) {
                return Some(GraphHandle::Shared(Arc::clone(graph)));
            }
        }
        let factory = self.factory.as_ref()?;
        let produced: Arc<dyn Graph> = Arc::from(factory(iri)?);
        let mut resolved = self.resolved.write().unwrap_or_else(|e| e.into_inner());
        let entry = resolved
            .entry(iri.to_string())
            .or_insert_with(|| Arc::clone(&produced));
        Some(GraphHandle::Shared(Arc::clone(entry)))
    }
}

/// The set of graphs a pattern is matched against: one graph normally,
/// several when `FROM` selects more than one default graph (union
/// semantics, deduplicated).
pub struct GraphView<'a> {
    handles: Vec<GraphHandle<'a>>,
    id: String,
}

impl<'a> GraphView<'a> {
    pub fn new(handles: Vec<GraphHandle<'a>>, id: String) -> Self {
        GraphView { handles, id }
    }

    /// Cache-key component identifying the active graph selection.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn find(&self, pattern: &IdPattern) -> Vec<Triple> {
        if self.handles.len() == 1 {
            return self.handles[0].graph().find(pattern).collect();
        }
        let mut seen: FxHashSet<Triple> = FxHashSet::default();
        for handle in &self.handles {
            seen.extend(handle.graph().find(pattern));
        }
        seen.into_iter().collect()
    }

    pub fn estimate(&self, pattern: &IdPattern) -> usize {
        self.handles
            .iter()
            .map(|h| h.graph().estimate_cardinality(pattern))
            .sum()
    }

    /// Every subject and object of the view. Property paths with both
    /// endpoints unbound enumerate this set; completeness matters more than
    /// speed here.
    pub fn entities(&self) -> Vec<u32> {
        let mut out: FxHashSet<u32> = FxHashSet::default();
        for triple in self.find(&(None, None, None)) {
            out.insert(triple.subject);
            out.insert(triple.object);
        }
        let mut entities: Vec<u32> = out.into_iter().collect();
        entities.sort_unstable();
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(triples: &[(u32, u32, u32)]) -> MemoryGraph {
        let mut g = MemoryGraph::new();
        for &(s, p, o) in triples {
            g.insert(Triple::new(s, p, o));
        }
        g
    }

    #[test]
    fn test_find_by_each_pattern_shape() {
        let g = graph_with(&[(1, 10, 2), (1, 10, 3), (2, 11, 3)]);
        assert_eq!(g.find(&(Some(1), Some(10), None)).count(), 2);
        assert_eq!(g.find(&(None, Some(11), None)).count(), 1);
        assert_eq!(g.find(&(None, None, Some(3))).count(), 2);
        assert_eq!(g.find(&(None, None, None)).count(), 3);
        assert_eq!(g.find(&(Some(1), None, Some(2))).count(), 1);
        assert_eq!(g.find(&(Some(9), None, None)).count(), 0);
    }

    #[test]
    fn test_insert_is_set_semantics() {
        let mut g = MemoryGraph::new();
        assert!(g.insert(Triple::new(1, 2, 3)));
        assert!(!g.insert(Triple::new(1, 2, 3)));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_delete_cleans_indexes() {
        let mut g = graph_with(&[(1, 2, 3)]);
        assert!(g.delete(&Triple::new(1, 2, 3)));
        assert!(!g.delete(&Triple::new(1, 2, 3)));
        assert_eq!(g.len(), 0);
        assert_eq!(g.find(&(None, None, None)).count(), 0);
    }

    #[test]
    fn test_cardinality_estimates() {
        let g = graph_with(&[(1, 10, 2), (1, 10, 3), (2, 10, 3)]);
        assert_eq!(g.estimate_cardinality(&(None, Some(10), None)), 3);
        assert_eq!(g.estimate_cardinality(&(Some(1), None, None)), 2);
        assert_eq!(g.estimate_cardinality(&(None, None, None)), 3);
    }

    #[test]
    fn test_dataset_graph_factory_caches() {
        let mut dataset = Dataset::new();
        dataset.set_graph_factory(Some(Box::new(|_iri| {
            Some(Box::new(MemoryGraph::new()) as Box<dyn Graph>)
        })));
        assert!(dataset.resolve_graph("http://example.org/g").is_some());
        let cached = dataset
            .resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len();
        assert_eq!(cached, 1);
    }

    #[test]
    fn test_view_union_deduplicates() {
        let a = graph_with(&[(1, 2, 3), (4, 5, 6)]);
        let b = graph_with(&[(1, 2, 3)]);
        let view = GraphView::new(
            vec![GraphHandle::Borrowed(&a), GraphHandle::Borrowed(&b)],
            "a,b".to_string(),
        );
        assert_eq!(view.find(&(None, None, None)).len(), 2);
        assert_eq!(view.entities(), vec![1, 3, 4, 6]);
    }
}
