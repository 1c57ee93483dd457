//! Union-find over segment observations.

use linemap_core::ImageId;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// A 2D segment identified by its image and local index.
pub type NodeKey = (ImageId, usize);

/// Union-find forest with union by rank and path halving.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Append a singleton set and return its element.
    pub fn push(&mut self) -> usize {
        let idx = self.parent.len();
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    pub fn find(&mut self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            self.parent[idx] = self.parent[self.parent[idx]];
            idx = self.parent[idx];
        }
        idx
    }

    /// Join the sets of `a` and `b`. Returns `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    /// Sets with at least `min_size` elements, each sorted ascending and
    /// ordered by their smallest element.
    pub fn groups(&mut self, min_size: usize) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.parent.len() {
            let root = self.find(idx);
            by_root.entry(root).or_default().push(idx);
        }
        let mut out: Vec<Vec<usize>> = by_root
            .into_values()
            .filter(|members| members.len() >= min_size)
            .collect();
        out.sort_by_key(|members| members[0]);
        out
    }
}

/// Arena of observation nodes joined by a union-find forest.
///
/// Node indices follow insertion order, so inserting keys in sorted order
/// makes component ordering reproducible.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceGraph {
    keys: Vec<NodeKey>,
    index: HashMap<NodeKey, usize>,
    sets: DisjointSet,
    num_edges: usize,
}

impl CorrespondenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key`, inserting a singleton node if it is new.
    pub fn add_node(&mut self, key: NodeKey) -> usize {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.sets.push();
        self.keys.push(key);
        self.index.insert(key, idx);
        idx
    }

    pub fn node(&self, key: &NodeKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, idx: usize) -> NodeKey {
        self.keys[idx]
    }

    pub fn num_nodes(&self) -> usize {
        self.keys.len()
    }

    /// Number of accepted links, including ones inside an existing component.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn add_edge(&mut self, a: NodeKey, b: NodeKey) {
        let ia = self.add_node(a);
        let ib = self.add_node(b);
        self.num_edges += 1;
        self.sets.union(ia, ib);
    }

    /// Connected components with at least `min_size` nodes.
    pub fn components(&mut self, min_size: usize) -> Vec<Vec<usize>> {
        self.sets.groups(min_size)
    }
}
