//! HNSW graph data structure.
//!
//! The graph is a multi-layer structure where each node can have connections
//! to other nodes in the same layer. Tombstoned nodes stay in the graph so
//! that searches can route through them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use meshvec_core::{Metric, VectorHandle};

use crate::distance;

/// A node in the HNSW graph.
#[derive(Debug, Clone)]
pub struct HnswNode {
    /// The handle this node represents.
    pub handle: VectorHandle,
    /// The stored vector.
    pub vector: Vec<f32>,
    /// The maximum layer this node appears in.
    pub max_layer: usize,
    /// `connections[layer]` = neighbour handles on that layer.
    pub connections: Vec<Vec<VectorHandle>>,
    /// Whether the node has been tombstoned.
    pub deleted: bool,
}

impl HnswNode {
    /// Create a new live HNSW node.
    #[inline]
    pub fn new(handle: VectorHandle, vector: Vec<f32>, max_layer: usize) -> Self {
        let connections = vec![Vec::new(); max_layer + 1];
        Self { handle, vector, max_layer, connections, deleted: false }
    }

    /// Get the connections at a specific layer.
    #[inline]
    #[must_use]
    pub fn connections_at(&self, layer: usize) -> &[VectorHandle] {
        self.connections.get(layer).map_or(&[], |c| c.as_slice())
    }

    /// Add a connection at a specific layer.
    #[inline]
    pub fn add_connection(&mut self, layer: usize, neighbor: VectorHandle) {
        if layer < self.connections.len() && !self.connections[layer].contains(&neighbor) {
            self.connections[layer].push(neighbor);
        }
    }

    /// Remove a connection at a specific layer.
    #[inline]
    pub fn remove_connection(&mut self, layer: usize, neighbor: VectorHandle) {
        if layer < self.connections.len() {
            self.connections[layer].retain(|&id| id != neighbor);
        }
    }

    /// Set the connections at a specific layer, replacing existing ones.
    #[inline]
    pub fn set_connections(&mut self, layer: usize, neighbors: Vec<VectorHandle>) {
        if layer < self.connections.len() {
            self.connections[layer] = neighbors;
        }
    }
}

/// The HNSW graph structure.
#[derive(Debug)]
pub struct HnswGraph {
    /// All nodes in the graph, live and tombstoned.
    pub nodes: HashMap<VectorHandle, HnswNode>,
    /// The entry point node (highest level node).
    pub entry_point: Option<VectorHandle>,
    /// The current maximum layer in the graph.
    pub max_layer: usize,
    /// The distance metric.
    pub metric: Metric,
    /// The dimension of stored vectors.
    pub dimension: usize,
}

impl HnswGraph {
    /// Create a new empty HNSW graph.
    #[must_use]
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self { nodes: HashMap::new(), entry_point: None, max_layer: 0, metric, dimension }
    }

    /// Get a node by handle.
    #[inline]
    #[must_use]
    pub fn get_node(&self, handle: VectorHandle) -> Option<&HnswNode> {
        self.nodes.get(&handle)
    }

    /// Get a mutable node by handle.
    #[inline]
    pub fn get_node_mut(&mut self, handle: VectorHandle) -> Option<&mut HnswNode> {
        self.nodes.get_mut(&handle)
    }

    /// Check if a node (live or tombstoned) exists in the graph.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: VectorHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    /// Number of nodes, including tombstones.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Calculate the distance between two vectors.
    #[inline]
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        distance::distance(self.metric, a, b)
    }

    /// Calculate the distance from a query to a node.
    #[inline]
    #[must_use]
    pub fn distance_to_node(&self, query: &[f32], handle: VectorHandle) -> Option<f32> {
        self.nodes.get(&handle).map(|node| self.distance(query, &node.vector))
    }

    /// Whether a node exists and is not tombstoned.
    #[inline]
    #[must_use]
    pub fn is_live(&self, handle: VectorHandle) -> bool {
        self.nodes.get(&handle).is_some_and(|n| !n.deleted)
    }

    /// Insert a node into the graph.
    pub fn insert_node(&mut self, node: HnswNode) {
        let handle = node.handle;
        let max_layer = node.max_layer;

        if self.entry_point.is_none() || max_layer > self.max_layer {
            self.entry_point = Some(handle);
            self.max_layer = max_layer;
        }

        self.nodes.insert(handle, node);
    }

    /// Physically remove a node and every edge pointing at it.
    ///
    /// Used when a handle is re-inserted with a new vector.
    pub fn remove_node(&mut self, handle: VectorHandle) -> Option<HnswNode> {
        let node = self.nodes.remove(&handle)?;

        for layer in 0..=node.max_layer {
            for &neighbor_id in node.connections_at(layer) {
                if let Some(neighbor) = self.nodes.get_mut(&neighbor_id) {
                    neighbor.remove_connection(layer, handle);
                }
            }
        }

        if self.entry_point == Some(handle) {
            self.update_entry_point();
        }

        Some(node)
    }

    /// Find a new entry point after removal.
    fn update_entry_point(&mut self) {
        let new_entry = self
            .nodes
            .iter()
            .max_by_key(|(id, node)| (node.max_layer, std::cmp::Reverse(**id)))
            .map(|(&id, node)| (id, node.max_layer));

        if let Some((id, max_layer)) = new_entry {
            self.entry_point = Some(id);
            self.max_layer = max_layer;
        } else {
            self.entry_point = None;
            self.max_layer = 0;
        }
    }
}

/// A candidate during HNSW search.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// The handle of this candidate.
    pub handle: VectorHandle,
    /// The distance to the query.
    pub distance: f32,
}

impl Candidate {
    /// Create a new candidate.
    #[inline]
    #[must_use]
    pub const fn new(handle: VectorHandle, distance: f32) -> Self {
        Self { handle, distance }
    }
}

impl PartialEq for Candidate {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.handle == other.handle
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap. NaN compares equal to keep the order total.
        other.distance.partial_cmp(&self.distance).unwrap_or(Ordering::Equal)
    }
}

/// A max-heap candidate for tracking the worst element in the result set.
#[derive(Debug, Clone, Copy)]
pub struct MaxCandidate(pub Candidate);

impl PartialEq for MaxCandidate {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MaxCandidate {}

impl PartialOrd for MaxCandidate {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MaxCandidate {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.distance.partial_cmp(&other.0.distance).unwrap_or(Ordering::Equal)
    }
}

/// Greedy search of one layer.
///
/// Returns up to `ef` candidates closest to `query`, sorted by distance.
/// With `live_only`, tombstoned nodes are still traversed but never
/// returned.
pub fn search_layer(
    graph: &HnswGraph,
    query: &[f32],
    entry_points: &[VectorHandle],
    ef: usize,
    layer: usize,
    live_only: bool,
) -> Vec<Candidate> {
    if entry_points.is_empty() {
        return Vec::new();
    }

    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut results: BinaryHeap<MaxCandidate> = BinaryHeap::new();
    let mut visited: HashSet<VectorHandle> = HashSet::new();

    let admit = |handle: VectorHandle| !live_only || graph.is_live(handle);

    for &ep in entry_points {
        if let Some(dist) = graph.distance_to_node(query, ep) {
            visited.insert(ep);
            let candidate = Candidate::new(ep, dist);
            candidates.push(candidate);
            if admit(ep) {
                results.push(MaxCandidate(candidate));
            }
        }
    }

    while let Some(current) = candidates.pop() {
        let furthest_result = results.peek().map_or(f32::INFINITY, |c| c.0.distance);
        if results.len() >= ef && current.distance > furthest_result {
            break;
        }

        let Some(node) = graph.get_node(current.handle) else { continue };
        for &neighbor_id in node.connections_at(layer) {
            if !visited.insert(neighbor_id) {
                continue;
            }

            let Some(neighbor_dist) = graph.distance_to_node(query, neighbor_id) else { continue };
            let furthest_result = results.peek().map_or(f32::INFINITY, |c| c.0.distance);

            if results.len() < ef || neighbor_dist < furthest_result {
                let neighbor_candidate = Candidate::new(neighbor_id, neighbor_dist);
                candidates.push(neighbor_candidate);
                if admit(neighbor_id) {
                    results.push(MaxCandidate(neighbor_candidate));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
    }

    let mut result_vec: Vec<Candidate> = results.into_iter().map(|mc| mc.0).collect();
    result_vec.sort_by(|a, b| {
        a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal).then(a.handle.cmp(&b.handle))
    });
    result_vec
}

/// Select neighbours using the diversity heuristic (Algorithm 4 of the HNSW
/// paper), topping up with the closest remaining candidates.
pub fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[Candidate],
    m: usize,
) -> Vec<VectorHandle> {
    if candidates.len() <= m {
        return candidates.iter().map(|c| c.handle).collect();
    }

    let mut selected: Vec<VectorHandle> = Vec::with_capacity(m);
    let mut remaining: Vec<Candidate> = candidates.to_vec();
    remaining.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

    for candidate in &remaining {
        if selected.len() >= m {
            break;
        }

        let Some(candidate_node) = graph.get_node(candidate.handle) else { continue };

        let is_good = selected.iter().all(|&selected_id| {
            graph.get_node(selected_id).map_or(true, |selected_node| {
                graph.distance(&candidate_node.vector, &selected_node.vector) >= candidate.distance
            })
        });

        if is_good || selected.is_empty() {
            selected.push(candidate.handle);
        }
    }

    for candidate in &remaining {
        if selected.len() >= m {
            break;
        }
        if !selected.contains(&candidate.handle) {
            selected.push(candidate.handle);
        }
    }

    selected
}
