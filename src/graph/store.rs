//! De-duplicating triple store with subject lookup and describe closure

use crate::graph::triple::{Node, Triple};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A set of triples
///
/// Statements are shared as `Arc<Triple>` so merging page graphs into the
/// master graph (and rebuilding it on eviction) never copies term data.
/// Lookups by subject use an index; lookups by predicate scan.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// All statements
    triples: HashSet<Arc<Triple>>,

    /// Subject value -> statements in insertion order
    by_subject: HashMap<String, Vec<Arc<Triple>>>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a statement. Returns false when it was already present.
    pub fn assert(&mut self, triple: Triple) -> bool {
        self.assert_shared(Arc::new(triple))
    }

    /// Insert a statement built from its three terms
    pub fn assert_spo(&mut self, subject: Node, predicate: Node, object: Node) -> bool {
        self.assert(Triple::new(subject, predicate, object))
    }

    fn assert_shared(&mut self, triple: Arc<Triple>) -> bool {
        if self.triples.contains(&triple) {
            return false;
        }

        self.by_subject
            .entry(triple.subject.value().to_string())
            .or_default()
            .push(Arc::clone(&triple));
        self.triples.insert(triple);
        true
    }

    /// Union `other` into this graph, returning how many statements were new
    pub fn merge(&mut self, other: &Graph) -> usize {
        let mut added = 0;
        for triple in &other.triples {
            if self.assert_shared(Arc::clone(triple)) {
                added += 1;
            }
        }
        added
    }

    /// All statements whose subject value equals `subject`
    pub fn select_subject(&self, subject: &str) -> Vec<Arc<Triple>> {
        self.by_subject.get(subject).cloned().unwrap_or_default()
    }

    /// All statements whose predicate value equals `predicate`
    pub fn select_predicate(&self, predicate: &str) -> Vec<Arc<Triple>> {
        self.triples
            .iter()
            .filter(|t| t.predicate.value() == predicate)
            .cloned()
            .collect()
    }

    /// Transitive closure of [`Graph::select_subject`] starting at `root`
    ///
    /// Every collected statement's object (IRI or blank node) is explored as
    /// a further subject. The guard is the set of statements already
    /// collected, so cycles terminate once nothing new turns up.
    pub fn recursive_describe(&self, root: &str) -> Vec<Arc<Triple>> {
        let mut collected: HashSet<Arc<Triple>> = HashSet::new();
        let mut described = Vec::new();
        let mut pending = vec![root.to_string()];

        while let Some(subject) = pending.pop() {
            for triple in self.select_subject(&subject) {
                if !collected.insert(Arc::clone(&triple)) {
                    continue;
                }
                if !triple.object.is_literal() {
                    pending.push(triple.object.value().to_string());
                }
                described.push(triple);
            }
        }

        described
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate statements in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Triple>> {
        self.triples.iter()
    }

    /// Distinct subject values
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.by_subject.keys().map(String::as_str)
    }

    /// Render as N-Triples, one statement per line, sorted for stable output
    pub fn to_ntriples(&self) -> String {
        let mut lines: Vec<String> = self.triples.iter().map(|t| t.to_string()).collect();
        lines.sort();

        let mut out = String::new();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        for triple in iter {
            graph.assert(triple);
        }
        graph
    }
}
