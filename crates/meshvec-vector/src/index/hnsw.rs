//! HNSW index implementation.

use std::path::Path;

use meshvec_core::{Metric, VectorHandle};
use tracing::debug;

use super::config::HnswConfig;
use super::graph::{search_layer, select_neighbors_heuristic, Candidate, HnswGraph, HnswNode};
use super::snapshot::{self, IndexSnapshot, NodeSnapshot};
use super::traits::{AnnIndex, SearchResult};
use crate::error::VectorError;

/// Random level generator for HNSW.
///
/// Levels follow an exponential distribution, as in the HNSW paper.
#[derive(Debug)]
struct LevelGenerator {
    ml: f64,
    rng_state: u64,
}

impl LevelGenerator {
    #[allow(clippy::cast_possible_truncation)]
    fn new(ml: f64) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(12345);
        // xorshift never leaves zero
        Self { ml, rng_state: seed | 1 }
    }

    /// Generate a random level for a new node.
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    fn generate_level(&mut self) -> usize {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;

        let uniform = (x as f64) / (u64::MAX as f64);
        let level = (-uniform.ln() * self.ml).floor() as usize;
        level.min(16)
    }
}

/// In-memory HNSW (Hierarchical Navigable Small World) index.
///
/// Callers provide exclusive access for mutation (`&mut self`); the index has
/// no internal locking.
#[derive(Debug)]
pub struct HnswIndex {
    graph: HnswGraph,
    config: HnswConfig,
    capacity: usize,
    tombstones: usize,
    level_gen: LevelGenerator,
}

impl HnswIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new(dimension: usize, metric: Metric, capacity: usize, config: HnswConfig) -> Self {
        let level_gen = LevelGenerator::new(config.level_factor);
        Self { graph: HnswGraph::new(dimension, metric), config, capacity, tombstones: 0, level_gen }
    }

    /// Load an index from a snapshot file written by [`AnnIndex::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Snapshot`] if the file is malformed and
    /// [`VectorError::Io`] if it cannot be read.
    pub fn restore(path: &Path) -> Result<Self, VectorError> {
        let bytes = std::fs::read(path)?;
        let index = Self::from_snapshot_bytes(&bytes)?;
        debug!(path = %path.display(), handles = index.len(), "restored index snapshot");
        Ok(index)
    }

    /// Decode an index from snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Snapshot`] if the bytes are malformed.
    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        let snap = snapshot::decode(bytes)?;
        let mut graph = HnswGraph::new(snap.dimension, snap.metric);
        let mut tombstones = 0;
        for node in snap.nodes {
            if node.vector.len() != snap.dimension {
                return Err(VectorError::Snapshot(format!(
                    "handle {} has {} components, expected {}",
                    node.handle,
                    node.vector.len(),
                    snap.dimension
                )));
            }
            if node.connections.len() != node.max_layer + 1 {
                return Err(VectorError::Snapshot(format!(
                    "handle {} has {} connection layers, expected {}",
                    node.handle,
                    node.connections.len(),
                    node.max_layer + 1
                )));
            }
            if node.deleted {
                tombstones += 1;
            }
            graph.nodes.insert(
                node.handle,
                HnswNode {
                    handle: node.handle,
                    vector: node.vector,
                    max_layer: node.max_layer,
                    connections: node.connections,
                    deleted: node.deleted,
                },
            );
        }
        if let Some(ep) = snap.entry_point {
            if !graph.contains(ep) {
                return Err(VectorError::Snapshot(format!("entry point {ep} is missing")));
            }
        }
        graph.entry_point = snap.entry_point;
        graph.max_layer = snap.max_layer;

        let level_gen = LevelGenerator::new(snap.config.level_factor);
        Ok(Self { graph, config: snap.config, capacity: snap.capacity, tombstones, level_gen })
    }

    /// Encode the whole index as snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Encoding`] if serialization fails.
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>, VectorError> {
        let mut nodes: Vec<NodeSnapshot> = self
            .graph
            .nodes
            .values()
            .map(|n| NodeSnapshot {
                handle: n.handle,
                vector: n.vector.clone(),
                max_layer: n.max_layer,
                connections: n.connections.clone(),
                deleted: n.deleted,
            })
            .collect();
        nodes.sort_by_key(|n| n.handle);

        snapshot::encode(&IndexSnapshot {
            dimension: self.graph.dimension,
            metric: self.graph.metric,
            capacity: self.capacity,
            config: self.config.clone(),
            entry_point: self.graph.entry_point,
            max_layer: self.graph.max_layer,
            nodes,
        })
    }

    /// Get the configuration for this index.
    #[must_use]
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Get the distance metric for this index.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.graph.metric
    }

    /// Raise the capacity bound.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidArgument`] if `capacity` is below the
    /// number of handles already stored.
    pub fn resize(&mut self, capacity: usize) -> Result<(), VectorError> {
        if capacity < self.graph.len() {
            return Err(VectorError::InvalidArgument(format!(
                "capacity {capacity} is below the {} handles already stored",
                self.graph.len()
            )));
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Insert a node, connecting it to the graph.
    ///
    /// This implements the HNSW insert algorithm (Algorithm 1 from the paper).
    fn insert_internal(&mut self, handle: VectorHandle, vector: &[f32]) {
        let node_level = self.level_gen.generate_level();
        let new_node = HnswNode::new(handle, vector.to_vec(), node_level);

        let Some(entry_point) = self.graph.entry_point else {
            self.graph.insert_node(new_node);
            return;
        };
        let current_max_layer = self.graph.max_layer;

        // Greedy descent to the layer where the new node starts.
        let mut current_ep = vec![entry_point];
        for layer in (node_level + 1..=current_max_layer).rev() {
            let candidates = search_layer(&self.graph, vector, &current_ep, 1, layer, false);
            current_ep = candidates.into_iter().map(|c| c.handle).collect();
            if current_ep.is_empty() {
                current_ep = vec![entry_point];
            }
        }

        self.graph.insert_node(new_node);

        let start_layer = node_level.min(current_max_layer);
        for layer in (0..=start_layer).rev() {
            let candidates: Vec<Candidate> = search_layer(
                &self.graph,
                vector,
                &current_ep,
                self.config.ef_construction,
                layer,
                false,
            )
            .into_iter()
            .filter(|c| c.handle != handle)
            .collect();

            let max_conn = self.config.max_neighbours(layer);
            let neighbors = select_neighbors_heuristic(&self.graph, &candidates, max_conn);

            if let Some(node) = self.graph.get_node_mut(handle) {
                node.set_connections(layer, neighbors.clone());
            }

            let mut to_prune = Vec::new();
            for &neighbor_id in &neighbors {
                if let Some(neighbor) = self.graph.get_node_mut(neighbor_id) {
                    neighbor.add_connection(layer, handle);
                    if neighbor.connections_at(layer).len() > max_conn {
                        to_prune.push(neighbor_id);
                    }
                }
            }

            for neighbor_id in to_prune {
                let Some(neighbor) = self.graph.get_node(neighbor_id) else { continue };
                let scored: Vec<Candidate> = neighbor
                    .connections_at(layer)
                    .iter()
                    .filter_map(|&id| {
                        self.graph
                            .get_node(id)
                            .map(|n| Candidate::new(id, self.graph.distance(&neighbor.vector, &n.vector)))
                    })
                    .collect();
                let pruned = select_neighbors_heuristic(&self.graph, &scored, max_conn);
                if let Some(neighbor) = self.graph.get_node_mut(neighbor_id) {
                    neighbor.set_connections(layer, pruned);
                }
            }

            current_ep = candidates.into_iter().map(|c| c.handle).collect();
            if current_ep.is_empty() {
                current_ep = if neighbors.is_empty() { vec![entry_point] } else { neighbors };
            }
        }
    }
}

impl AnnIndex for HnswIndex {
    fn insert(&mut self, handle: VectorHandle, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.graph.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.graph.dimension,
                actual: vector.len(),
            });
        }

        if let Some(old) = self.graph.remove_node(handle) {
            if old.deleted {
                self.tombstones -= 1;
            }
        } else if self.graph.len() >= self.capacity {
            return Err(VectorError::CapacityExceeded { capacity: self.capacity });
        }

        self.insert_internal(handle, vector);
        Ok(())
    }

    fn tombstone(&mut self, handle: VectorHandle) -> Result<(), VectorError> {
        match self.graph.get_node_mut(handle) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                self.tombstones += 1;
                Ok(())
            }
            _ => Err(VectorError::NotFound(format!("handle {handle}"))),
        }
    }

    fn fetch(&self, handle: VectorHandle) -> Result<Vec<f32>, VectorError> {
        match self.graph.get_node(handle) {
            Some(node) if !node.deleted => Ok(node.vector.clone()),
            _ => Err(VectorError::NotFound(format!("handle {handle}"))),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchResult>, VectorError> {
        if query.len() != self.graph.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.graph.dimension,
                actual: query.len(),
            });
        }

        let Some(entry_point) = self.graph.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let ef = ef.max(k);

        let mut current_ep = vec![entry_point];
        for layer in (1..=self.graph.max_layer).rev() {
            let candidates = search_layer(&self.graph, query, &current_ep, 1, layer, false);
            current_ep = candidates.into_iter().map(|c| c.handle).collect();
            if current_ep.is_empty() {
                current_ep = vec![entry_point];
            }
        }

        let candidates = search_layer(&self.graph, query, &current_ep, ef, 0, true);
        Ok(candidates.into_iter().take(k).map(|c| SearchResult::new(c.handle, c.distance)).collect())
    }

    fn snapshot(&self, path: &Path) -> Result<(), VectorError> {
        let bytes = self.to_snapshot_bytes()?;
        snapshot::write_file(path, &bytes)
    }

    fn is_live(&self, handle: VectorHandle) -> bool {
        self.graph.is_live(handle)
    }

    fn contains(&self, handle: VectorHandle) -> bool {
        self.graph.contains(handle)
    }

    fn handles(&self) -> Vec<VectorHandle> {
        let mut handles: Vec<_> = self.graph.nodes.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    fn len(&self) -> usize {
        self.graph.len()
    }

    fn live_count(&self) -> usize {
        self.graph.len() - self.tombstones
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn dimension(&self) -> usize {
        self.graph.dimension
    }
}
