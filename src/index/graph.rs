//! Approximate graph index: a navigable-small-world structure.
//!
//! Each inserted vector becomes a node linked to its nearest existing
//! nodes; search walks the graph greedily with a bounded candidate beam.
//! Construction breadth (`ef_construction`) and search breadth
//! (`ef_search`) trade recall for speed. Worth using above ~10k entries;
//! below that the flat scan is usually faster and always exact.

use crate::config::IndexStrategy;
use crate::error::IndexResult;
use crate::index::{SlotId, VectorIndex, inner_product, validate_dimensions};
use crate::types::Score;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug)]
struct Node {
    id: SlotId,
    vector: Vec<f32>,
    neighbors: Vec<usize>,
}

/// Candidate during graph traversal, ordered by similarity.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    similarity: f32,
    node: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.similarity.total_cmp(&other.similarity) == Ordering::Equal && self.node == other.node
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
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Navigable-small-world graph index.
#[derive(Debug)]
pub struct GraphIndex {
    dimension: usize,
    max_neighbors: usize,
    ef_construction: usize,
    ef_search: usize,
    nodes: Vec<Node>,
    tombstones: HashSet<SlotId>,
}

impl GraphIndex {
    #[must_use]
    pub fn new(
        dimension: usize,
        max_neighbors: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Self {
        Self {
            dimension,
            max_neighbors: max_neighbors.max(2),
            ef_construction: ef_construction.max(4),
            ef_search: ef_search.max(4),
            nodes: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Beam search over the graph from node 0, returning up to `ef`
    /// candidates, best first. Tombstoned nodes are traversed but the
    /// caller filters them from results.
    fn beam_search(&self, query: &[f32], ef: usize) -> Vec<Candidate> {
        if self.nodes.is_empty() {
            return Vec::new();
        }

        let mut visited = HashSet::new();
        let mut frontier = BinaryHeap::new();
        // Min-heap of the current best ef results, worst on top
        let mut best: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();

        let start = Candidate {
            similarity: inner_product(query, &self.nodes[0].vector),
            node: 0,
        };
        visited.insert(0);
        frontier.push(start);
        best.push(std::cmp::Reverse(start));

        while let Some(candidate) = frontier.pop() {
            let worst_kept = best.peek().map_or(f32::NEG_INFINITY, |r| r.0.similarity);
            if best.len() >= ef && candidate.similarity < worst_kept {
                break;
            }

            for &neighbor in &self.nodes[candidate.node].neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let next = Candidate {
                    similarity: inner_product(query, &self.nodes[neighbor].vector),
                    node: neighbor,
                };
                let worst_kept = best.peek().map_or(f32::NEG_INFINITY, |r| r.0.similarity);
                if best.len() < ef || next.similarity > worst_kept {
                    frontier.push(next);
                    best.push(std::cmp::Reverse(next));
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut results: Vec<Candidate> = best.into_iter().map(|r| r.0).collect();
        results.sort_by(|a, b| b.cmp(a));
        results
    }

    fn insert_one(&mut self, id: SlotId, vector: Vec<f32>) {
        self.tombstones.remove(&id);
        let new_idx = self.nodes.len();

        let links: Vec<usize> = if self.nodes.is_empty() {
            Vec::new()
        } else {
            self.beam_search(&vector, self.ef_construction)
                .into_iter()
                .take(self.max_neighbors)
                .map(|c| c.node)
                .collect()
        };

        self.nodes.push(Node {
            id,
            vector,
            neighbors: links.clone(),
        });

        // Backlinks, pruned to the best max_neighbors by similarity
        for linked in links {
            self.nodes[linked].neighbors.push(new_idx);
            if self.nodes[linked].neighbors.len() > self.max_neighbors {
                let base = self.nodes[linked].vector.clone();
                let mut neighbors = std::mem::take(&mut self.nodes[linked].neighbors);
                neighbors.sort_by(|&a, &b| {
                    inner_product(&base, &self.nodes[b].vector)
                        .total_cmp(&inner_product(&base, &self.nodes[a].vector))
                });
                neighbors.truncate(self.max_neighbors);
                self.nodes[linked].neighbors = neighbors;
            }
        }
    }
}

impl VectorIndex for GraphIndex {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Graph
    }

    fn add(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        validate_dimensions(entries, self.dimension)?;
        for (id, vector) in entries {
            self.insert_one(*id, vector.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(SlotId, Score)> {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }

        let ef = self.ef_search.max(k);
        self.beam_search(query, ef)
            .into_iter()
            .filter(|c| !self.tombstones.contains(&self.nodes[c.node].id))
            .take(k)
            .map(|c| {
                (
                    self.nodes[c.node].id,
                    Score::from_inner_product(c.similarity),
                )
            })
            .collect()
    }

    fn remove(&mut self, ids: &[SlotId]) {
        self.tombstones.extend(ids.iter().copied());
    }

    fn rebuild(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        validate_dimensions(entries, self.dimension)?;
        self.nodes.clear();
        self.tombstones.clear();
        for (id, vector) in entries {
            self.insert_one(*id, vector.clone());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !self.tombstones.contains(&n.id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::ring_vectors;

    fn build(n: usize, dimension: usize) -> (GraphIndex, Vec<(SlotId, Vec<f32>)>) {
        let mut index = GraphIndex::new(dimension, 8, 32, 32);
        let vectors = ring_vectors(n, dimension);
        index.add(&vectors).unwrap();
        (index, vectors)
    }

    #[test]
    fn test_self_query_recall() {
        let (index, vectors) = build(50, 16);

        let mut found = 0;
        for (id, vector) in &vectors {
            let results = index.search(vector, 1);
            if results.first().is_some_and(|(rid, _)| rid == id) {
                found += 1;
            }
        }
        // Approximate structure, but with breadth 32 over 50 nodes recall
        // should be near perfect
        assert!(found >= 45, "recall too low: {found}/50");
    }

    #[test]
    fn test_results_sorted_descending() {
        let (index, vectors) = build(30, 16);
        let results = index.search(&vectors[7].1, 10);
        for window in results.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
    }

    #[test]
    fn test_empty_graph_returns_empty() {
        let index = GraphIndex::new(8, 8, 16, 16);
        assert!(index.search(&vec![1.0; 8], 3).is_empty());
    }

    #[test]
    fn test_tombstoned_nodes_excluded_from_results() {
        let (mut index, vectors) = build(10, 16);
        index.remove(&[3]);
        let results = index.search(&vectors[3].1, 10);
        assert!(results.iter().all(|(id, _)| *id != 3));
        assert_eq!(index.len(), 9);
    }

    #[test]
    fn test_rebuild_drops_tombstones() {
        let (mut index, vectors) = build(10, 16);
        index.remove(&[0, 1, 2]);
        let survivors: Vec<_> = vectors.into_iter().skip(3).collect();
        index.rebuild(&survivors).unwrap();
        assert_eq!(index.len(), 7);
        let results = index.search(&survivors[0].1, 1);
        assert_eq!(results[0].0, survivors[0].0);
    }

    #[test]
    fn test_neighbor_lists_stay_bounded() {
        let (index, _) = build(100, 16);
        for node in &index.nodes {
            assert!(node.neighbors.len() <= index.max_neighbors);
        }
    }
}
