//! HNSW graph construction, search and removal.
//!
//! ## Structure
//!
//! Every node is assigned a level `floor(-ln(U) * level_mult)` on insertion
//! and takes part in layers `0..=level`. Upper layers are sparse and serve as
//! an express lane for the greedy descent that precedes the dense layer-0
//! search.
//!
//! - Layer 0 neighbor lists hold at most `2 * m` handles, upper layers `m`.
//! - The entry point is always a live node of maximum level.
//! - Search results are ordered by ascending distance, ties broken by id.
//!
//! ## Removal
//!
//! Removed nodes stay in the node list as tombstones so handles remain
//! stable. Their handles are scrubbed from every neighbor list and each
//! affected node is reconnected to the closest of the removed node's former
//! neighbors, so a tombstone is never visited or returned by a search.

use super::HnswError;
use super::codec;
use super::distance::cosine_distance;
use crate::storage::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recall_context::Metadata;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

/// Upper bound on node levels, far above anything `level_mult` produces in
/// practice.
pub const MAX_LEVEL: usize = 32;

/// Construction and search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum neighbors per node on layers above 0 (layer 0 allows `2 * m`)
    pub m: usize,
    /// Beam width while inserting
    pub ef_construction: usize,
    /// Minimum beam width while searching
    pub ef_search: usize,
    /// Level multiplier; `1 / ln(m)` when unset
    pub level_mult: Option<f64>,
    /// Seed for level assignment, for reproducible graphs
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            level_mult: None,
            seed: None,
        }
    }
}

impl HnswConfig {
    pub fn new(m: usize) -> Self {
        Self {
            m,
            ..Self::default()
        }
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_level_mult(mut self, level_mult: f64) -> Self {
        self.level_mult = Some(level_mult);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The effective level multiplier.
    pub fn level_multiplier(&self) -> f64 {
        self.level_mult
            .unwrap_or_else(|| 1.0 / (self.m.max(2) as f64).ln())
    }

    /// Neighbor list capacity at `layer`.
    pub fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }

    pub fn validate(&self) -> Result<(), HnswError> {
        if self.m < 2 {
            return Err(HnswError::InvalidConfig("m must be at least 2".into()));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(HnswError::InvalidConfig(
                "ef_construction and ef_search must be positive".into(),
            ));
        }
        let level_mult = self.level_multiplier();
        if !level_mult.is_finite() || level_mult <= 0.0 {
            return Err(HnswError::InvalidConfig(format!(
                "level_mult must be a positive number, got {level_mult}"
            )));
        }
        Ok(())
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    pub level: usize,
    /// `neighbors[layer]` for `layer` in `0..=level`
    pub neighbors: Vec<Vec<u32>>,
    pub deleted: bool,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub metadata: Metadata,
}

/// Graph shape summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    /// Nodes in the list, tombstones included
    pub nodes: usize,
    pub live: usize,
    pub deleted: usize,
    pub max_level: usize,
    pub dimensions: Option<usize>,
    /// Directed edge count per layer, layer 0 first
    pub edges_per_layer: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    handle: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

/// In-memory HNSW index over cosine distance.
pub struct HnswIndex {
    pub(crate) config: HnswConfig,
    pub(crate) nodes: Vec<Node>,
    pub(crate) lookup: HashMap<String, u32>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_level: usize,
    pub(crate) dimensions: Option<usize>,
    rng: StdRng,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("live", &self.lookup.len())
            .field("entry_point", &self.entry_point)
            .field("max_level", &self.max_level)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

impl HnswIndex {
    /// Create an empty index. Out-of-range parameters are clamped
    /// (`m >= 2`, beam widths `>= 1`).
    pub fn new(mut config: HnswConfig) -> Self {
        config.m = config.m.max(2);
        config.ef_construction = config.ef_construction.max(1);
        config.ef_search = config.ef_search.max(1);
        let rng = make_rng(config.seed);
        Self {
            config,
            nodes: Vec::new(),
            lookup: HashMap::new(),
            entry_point: None,
            max_level: 0,
            dimensions: None,
            rng,
        }
    }

    /// Assemble an index from decoded parts, rebuilding the id lookup from
    /// live nodes.
    pub(crate) fn from_parts(
        config: HnswConfig,
        nodes: Vec<Node>,
        entry_point: Option<u32>,
        max_level: usize,
        dimensions: Option<usize>,
    ) -> Result<Self, HnswError> {
        let mut lookup = HashMap::new();
        for (handle, node) in nodes.iter().enumerate() {
            if node.deleted {
                continue;
            }
            if lookup.insert(node.id.clone(), handle as u32).is_some() {
                return Err(HnswError::Corrupt(format!(
                    "id {:?} appears on more than one live node",
                    node.id
                )));
            }
        }
        let rng = make_rng(config.seed);
        Ok(Self {
            config,
            nodes,
            lookup,
            entry_point,
            max_level,
            dimensions,
            rng,
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Reseed level assignment, e.g. after [`unmarshal`](Self::unmarshal).
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.lookup.get(id).map(|&h| &self.nodes[h as usize])
    }

    /// Live ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lookup.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Live nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|node| !node.deleted)
    }

    /// Dimensionality fixed by the first insert.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn deleted_count(&self) -> usize {
        self.nodes.len() - self.lookup.len()
    }

    pub fn stats(&self) -> IndexStats {
        let mut edges_per_layer = vec![0usize; self.max_level + 1];
        for node in self.iter() {
            for (layer, list) in node.neighbors.iter().enumerate() {
                if layer < edges_per_layer.len() {
                    edges_per_layer[layer] += list.len();
                }
            }
        }
        IndexStats {
            nodes: self.nodes.len(),
            live: self.len(),
            deleted: self.deleted_count(),
            max_level: self.max_level,
            dimensions: self.dimensions,
            edges_per_layer,
        }
    }

    /// Check that `embedding` could be inserted or searched with.
    pub fn validate_vector(&self, embedding: &[f32]) -> Result<(), HnswError> {
        if embedding.is_empty() {
            return Err(HnswError::EmptyVector);
        }
        match self.dimensions {
            Some(expected) if expected != embedding.len() => Err(HnswError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    fn random_level(&mut self) -> usize {
        // random() is in [0, 1), so u is in (0, 1]
        let u: f64 = 1.0 - self.rng.random::<f64>();
        let level = (-u.ln() * self.config.level_multiplier()).floor();
        (level as usize).min(MAX_LEVEL)
    }

    fn neighbors_at(&self, handle: u32, layer: usize) -> &[u32] {
        self.nodes[handle as usize]
            .neighbors
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn distance_to(&self, query: &[f32], handle: u32) -> f32 {
        cosine_distance(query, &self.nodes[handle as usize].vector)
    }

    /// Insert `vector`, replacing any live vector with the same id.
    pub fn insert(&mut self, vector: Vector) -> Result<(), HnswError> {
        self.validate_vector(&vector.embedding)?;
        if self.lookup.contains_key(&vector.id) {
            self.remove(std::slice::from_ref(&vector.id));
        }
        if self.nodes.len() >= u32::MAX as usize {
            return Err(HnswError::CapacityExceeded);
        }

        self.dimensions.get_or_insert(vector.embedding.len());
        let level = self.random_level();
        let handle = self.nodes.len() as u32;
        let query = vector.embedding.clone();

        self.nodes.push(Node {
            id: vector.id.clone(),
            vector: vector.embedding,
            metadata: vector.metadata,
            level,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.lookup.insert(vector.id, handle);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(handle);
            self.max_level = level;
            return Ok(());
        };

        let mut current = entry;
        for layer in (level + 1..=self.max_level).rev() {
            current = self.greedy_closest(&query, current, layer);
        }

        let mut entries = vec![current];
        for layer in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, &entries, self.config.ef_construction, layer);
            let max = self.config.max_neighbors(layer);
            let selected: Vec<u32> = found
                .iter()
                .map(|c| c.handle)
                .filter(|&h| h != handle)
                .take(max)
                .collect();

            for &neighbor in &selected {
                let list = &mut self.nodes[neighbor as usize].neighbors[layer];
                list.push(handle);
                if list.len() > max {
                    self.prune(neighbor, layer, max);
                }
            }
            self.nodes[handle as usize].neighbors[layer] = selected;
            entries = found.into_iter().map(|c| c.handle).collect();
        }

        if level > self.max_level {
            self.entry_point = Some(handle);
            self.max_level = level;
        }
        Ok(())
    }

    /// Keep only the `max` closest neighbors of `handle` at `layer`.
    fn prune(&mut self, handle: u32, layer: usize, max: usize) {
        let base = &self.nodes[handle as usize];
        let mut scored: Vec<Candidate> = base.neighbors[layer]
            .iter()
            .map(|&h| Candidate {
                distance: cosine_distance(&base.vector, &self.nodes[h as usize].vector),
                handle: h,
            })
            .collect();
        scored.sort();
        scored.truncate(max);
        self.nodes[handle as usize].neighbors[layer] =
            scored.into_iter().map(|c| c.handle).collect();
    }

    fn greedy_closest(&self, query: &[f32], start: u32, layer: usize) -> u32 {
        self.search_layer(query, &[start], 1, layer)
            .first()
            .map(|c| c.handle)
            .unwrap_or(start)
    }

    /// Best-first search of one layer, returning up to `ef` candidates in
    /// ascending distance order.
    fn search_layer(&self, query: &[f32], entries: &[u32], ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &entry in entries {
            if !visited.insert(entry) || self.nodes[entry as usize].deleted {
                continue;
            }
            let candidate = Candidate {
                distance: self.distance_to(query, entry),
                handle: entry,
            };
            candidates.push(Reverse(candidate));
            results.push(candidate);
            if results.len() > ef {
                results.pop();
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= ef
                && results
                    .peek()
                    .is_some_and(|worst| current.distance > worst.distance)
            {
                break;
            }

            for &neighbor in self.neighbors_at(current.handle, layer) {
                if !visited.insert(neighbor) || self.nodes[neighbor as usize].deleted {
                    continue;
                }
                let distance = self.distance_to(query, neighbor);
                let closer = results.peek().is_none_or(|worst| distance < worst.distance);
                if results.len() < ef || closer {
                    let candidate = Candidate {
                        distance,
                        handle: neighbor,
                    };
                    candidates.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// The `k` nearest live vectors to `query`.
    ///
    /// An empty index yields no hits rather than an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, HnswError> {
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        self.validate_vector(query)?;

        let mut current = entry;
        for layer in (1..=self.max_level).rev() {
            current = self.greedy_closest(query, current, layer);
        }

        let ef = self.config.ef_search.max(k);
        let mut hits: Vec<SearchHit> = self
            .search_layer(query, &[current], ef, 0)
            .into_iter()
            .map(|c| {
                let node = &self.nodes[c.handle as usize];
                SearchHit {
                    id: node.id.clone(),
                    distance: c.distance,
                    metadata: node.metadata.clone(),
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Remove `ids` from the index, returning how many were present.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let mut former: HashMap<u32, Vec<Vec<u32>>> = HashMap::new();
        for id in ids {
            if let Some(handle) = self.lookup.remove(id) {
                let node = &mut self.nodes[handle as usize];
                node.deleted = true;
                let cleared = vec![Vec::new(); node.neighbors.len()];
                former.insert(handle, std::mem::replace(&mut node.neighbors, cleared));
            }
        }
        if former.is_empty() {
            return 0;
        }

        // Reconnect every live node that pointed at a removed one
        let mut repairs: Vec<(u32, usize, Vec<u32>)> = Vec::new();
        for (handle, node) in self.nodes.iter().enumerate() {
            if node.deleted {
                continue;
            }
            let handle = handle as u32;
            for (layer, list) in node.neighbors.iter().enumerate() {
                if !list.iter().any(|h| former.contains_key(h)) {
                    continue;
                }
                let mut pool: HashSet<u32> = list
                    .iter()
                    .copied()
                    .filter(|h| !former.contains_key(h))
                    .collect();
                for removed in list.iter().filter(|h| former.contains_key(h)) {
                    let Some(lists) = former.get(removed) else {
                        continue;
                    };
                    for &candidate in lists.get(layer).into_iter().flatten() {
                        if candidate != handle && !former.contains_key(&candidate) {
                            pool.insert(candidate);
                        }
                    }
                }
                let mut scored: Vec<Candidate> = pool
                    .into_iter()
                    .map(|h| Candidate {
                        distance: cosine_distance(&node.vector, &self.nodes[h as usize].vector),
                        handle: h,
                    })
                    .collect();
                scored.sort();
                scored.truncate(self.config.max_neighbors(layer));
                repairs.push((handle, layer, scored.into_iter().map(|c| c.handle).collect()));
            }
        }
        for (handle, layer, list) in repairs {
            self.nodes[handle as usize].neighbors[layer] = list;
        }

        if self.entry_point.is_some_and(|e| former.contains_key(&e)) {
            self.elect_entry_point();
        }
        former.len()
    }

    /// Make the highest-level live node the entry point.
    fn elect_entry_point(&mut self) {
        let best = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.deleted)
            .max_by(|(ha, a), (hb, b)| a.level.cmp(&b.level).then_with(|| hb.cmp(ha)));
        match best {
            Some((handle, node)) => {
                self.entry_point = Some(handle as u32);
                self.max_level = node.level;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// A fresh graph holding only the live vectors, built with the same
    /// configuration.
    pub fn compacted(&self) -> Result<Self, HnswError> {
        let mut rebuilt = Self::new(self.config.clone());
        rebuilt.dimensions = self.dimensions;
        for node in self.iter() {
            rebuilt.insert(Vector::new(node.id.clone(), node.vector.clone(), node.metadata.clone()))?;
        }
        Ok(rebuilt)
    }

    /// Encode the graph as a binary snapshot.
    pub fn marshal(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Decode a snapshot produced by [`marshal`](Self::marshal).
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, HnswError> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(id: &str, embedding: &[f32]) -> Vector {
        Vector::new(id, embedding.to_vec(), Metadata::new())
    }

    fn seeded() -> HnswIndex {
        HnswIndex::new(HnswConfig::default().with_seed(7))
    }

    /// Deterministic pseudo-random vectors without pulling in an RNG.
    fn synthetic(n: usize, dims: usize) -> Vec<Vector> {
        let mut state = 0x2545_f491_u64;
        (0..n)
            .map(|i| {
                let embedding = (0..dims)
                    .map(|_| {
                        state ^= state << 13;
                        state ^= state >> 7;
                        state ^= state << 17;
                        (state % 1000) as f32 / 1000.0 - 0.5
                    })
                    .collect::<Vec<f32>>();
                Vector::new(format!("v{i}"), embedding, Metadata::new())
            })
            .collect()
    }

    #[test]
    fn test_nearest_neighbors_in_order() {
        let mut index = seeded();
        index.insert(vector("1", &[1.0, 0.0, 0.0])).unwrap();
        index.insert(vector("2", &[0.9, 0.1, 0.0])).unwrap();
        index.insert(vector("3", &[0.0, 1.0, 0.0])).unwrap();
        index.insert(vector("4", &[0.0, 0.0, 1.0])).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_empty_index_search() {
        let index = seeded();
        assert!(index.search(&[1.0, 2.0], 5).unwrap().is_empty());
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), None);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = seeded();
        index.insert(vector("a", &[1.0, 0.0])).unwrap();
        assert!(matches!(
            index.insert(vector("b", &[1.0, 0.0, 0.0])),
            Err(HnswError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(HnswError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.insert(vector("c", &[])),
            Err(HnswError::EmptyVector)
        ));
    }

    #[test]
    fn test_self_retrieval() {
        let mut index = seeded();
        let vectors = synthetic(200, 12);
        for v in vectors.clone() {
            index.insert(v).unwrap();
        }

        for v in vectors.iter().step_by(17) {
            let hits = index.search(&v.embedding, 1).unwrap();
            assert_eq!(hits[0].id, v.id);
            assert!(hits[0].distance.abs() < 1e-5);
        }
    }

    #[test]
    fn test_neighbor_cap() {
        let config = HnswConfig::new(4).with_ef_construction(32).with_seed(11);
        let mut index = HnswIndex::new(config);
        for v in synthetic(300, 8) {
            index.insert(v).unwrap();
        }

        for node in index.iter() {
            for (layer, list) in node.neighbors.iter().enumerate() {
                let cap = if layer == 0 { 8 } else { 4 };
                assert!(list.len() <= cap, "layer {layer} has {} neighbors", list.len());
                assert!(!list.contains(&index.lookup[&node.id]));
            }
        }
    }

    #[test]
    fn test_insert_existing_id_replaces() {
        let mut index = seeded();
        index.insert(vector("a", &[1.0, 0.0])).unwrap();
        index.insert(vector("b", &[0.0, 1.0])).unwrap();
        index.insert(vector("a", &[0.0, 1.0])).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap().vector, vec![0.0, 1.0]);
        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_remove_scrubs_neighbors() {
        let mut index = seeded();
        for v in synthetic(50, 6) {
            index.insert(v).unwrap();
        }
        let doomed: Vec<String> = (0..50).step_by(3).map(|i| format!("v{i}")).collect();
        let removed = index.remove(&doomed);
        assert_eq!(removed, doomed.len());
        assert_eq!(index.remove(&["missing".to_string()]), 0);

        let tombstones: HashSet<u32> = index
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.deleted)
            .map(|(h, _)| h as u32)
            .collect();
        for node in index.iter() {
            for list in &node.neighbors {
                assert!(list.iter().all(|h| !tombstones.contains(h)));
            }
        }

        let hits = index.search(&index.get("v1").unwrap().vector.clone(), 50).unwrap();
        assert!(hits.iter().all(|h| !doomed.contains(&h.id)));
        assert_eq!(hits[0].id, "v1");
    }

    #[test]
    fn test_entry_point_reelected() {
        let mut index = seeded();
        for v in synthetic(40, 4) {
            index.insert(v).unwrap();
        }
        let entry = index.entry_point.unwrap();
        let entry_id = index.nodes[entry as usize].id.clone();
        index.remove(&[entry_id]);

        let new_entry = index.entry_point.unwrap();
        let top = index.iter().map(|n| n.level).max().unwrap();
        assert!(!index.nodes[new_entry as usize].deleted);
        assert_eq!(index.nodes[new_entry as usize].level, top);
        assert_eq!(index.max_level, top);

        index.remove(&index.ids());
        assert!(index.entry_point.is_none());
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().is_empty());
        // Dimensions stay fixed once set
        assert!(index.insert(vector("x", &[1.0])).is_err());
    }

    #[test]
    fn test_compacted_drops_tombstones() {
        let mut index = seeded();
        for v in synthetic(30, 5) {
            index.insert(v).unwrap();
        }
        index.remove(&(0..20).map(|i| format!("v{i}")).collect::<Vec<_>>());
        assert_eq!(index.deleted_count(), 20);

        let compacted = index.compacted().unwrap();
        assert_eq!(compacted.len(), 10);
        assert_eq!(compacted.deleted_count(), 0);
        assert_eq!(compacted.ids(), index.ids());
    }

    #[test]
    fn test_stats() {
        let mut index = seeded();
        index.insert(vector("a", &[1.0, 0.0])).unwrap();
        index.insert(vector("b", &[0.0, 1.0])).unwrap();
        index.remove(&["b".to_string()]);

        let stats = index.stats();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.dimensions, Some(2));
        assert_eq!(stats.edges_per_layer[0], 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(HnswConfig::default().validate().is_ok());
        assert!(HnswConfig::new(1).validate().is_err());
        assert!(HnswConfig::default().with_ef_search(0).validate().is_err());
        assert!(HnswConfig::default().with_level_mult(-1.0).validate().is_err());
        assert!((HnswConfig::new(16).level_multiplier() - 1.0 / 16f64.ln()).abs() < 1e-12);
        assert_eq!(HnswConfig::new(16).max_neighbors(0), 32);
        assert_eq!(HnswConfig::new(16).max_neighbors(3), 16);
    }
}
