//! Tree topologies for the mutual-exclusion network
//!
//! Adjacency is fixed at construction and immutable afterwards. Every
//! constructor validates tree-ness (connected, exactly n-1 edges), so a
//! `TreeTopology` value is a proof that the network is a tree.

use crate::error::{CoreError, Result};
use crate::NodeId;
use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Undirected tree over nodes `0..n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeTopology {
    adjacency: Vec<Vec<NodeId>>,
}

impl TreeTopology {
    /// Build a topology from an explicit edge list over nodes `0..nodes`.
    pub fn from_edges(nodes: usize, edges: &[(NodeId, NodeId)]) -> Result<Self> {
        if nodes == 0 {
            return Err(CoreError::InvalidTopology("no nodes".into()));
        }
        if edges.len() != nodes - 1 {
            return Err(CoreError::InvalidTopology(format!(
                "a tree over {} nodes needs {} edges, got {}",
                nodes,
                nodes - 1,
                edges.len()
            )));
        }

        let mut graph = UnGraph::<NodeId, ()>::default();
        let indices: Vec<_> = (0..nodes).map(|i| graph.add_node(i as NodeId)).collect();
        for &(a, b) in edges {
            if a as usize >= nodes {
                return Err(CoreError::UnknownNode(a));
            }
            if b as usize >= nodes {
                return Err(CoreError::UnknownNode(b));
            }
            if a == b {
                return Err(CoreError::InvalidTopology(format!("self-loop at {}", a)));
            }
            graph.add_edge(indices[a as usize], indices[b as usize], ());
        }
        if connected_components(&graph) != 1 {
            return Err(CoreError::InvalidTopology("graph is not connected".into()));
        }

        let mut adjacency = vec![Vec::new(); nodes];
        for &(a, b) in edges {
            adjacency[a as usize].push(b);
            adjacency[b as usize].push(a);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        Ok(Self { adjacency })
    }

    /// Path topology `0 - 1 - … - (n-1)`.
    pub fn line(nodes: usize) -> Result<Self> {
        let edges: Vec<_> = (1..nodes as NodeId).map(|i| (i - 1, i)).collect();
        Self::from_edges(nodes, &edges)
    }

    /// Star topology with node 0 at the centre.
    pub fn star(nodes: usize) -> Result<Self> {
        let edges: Vec<_> = (1..nodes as NodeId).map(|i| (0, i)).collect();
        Self::from_edges(nodes, &edges)
    }

    /// Uniformly random labeled tree, decoded from a random Prüfer sequence.
    pub fn random<R: Rng + ?Sized>(nodes: usize, rng: &mut R) -> Result<Self> {
        if nodes < 2 {
            return Self::from_edges(nodes, &[]);
        }

        let sequence: Vec<usize> = (0..nodes - 2).map(|_| rng.gen_range(0..nodes)).collect();

        let mut degree = vec![1usize; nodes];
        for &s in &sequence {
            degree[s] += 1;
        }

        // Min-heap of current leaves; always join the smallest leaf to the
        // next sequence entry.
        let mut leaves: BinaryHeap<Reverse<usize>> = degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 1)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut edges = Vec::with_capacity(nodes - 1);
        for &s in &sequence {
            let Reverse(leaf) = leaves
                .pop()
                .ok_or_else(|| CoreError::InvalidTopology("exhausted leaves".into()))?;
            edges.push((leaf as NodeId, s as NodeId));
            degree[s] -= 1;
            if degree[s] == 1 {
                leaves.push(Reverse(s));
            }
        }

        let Reverse(u) = leaves
            .pop()
            .ok_or_else(|| CoreError::InvalidTopology("exhausted leaves".into()))?;
        let Reverse(v) = leaves
            .pop()
            .ok_or_else(|| CoreError::InvalidTopology("exhausted leaves".into()))?;
        edges.push((u as NodeId, v as NodeId));

        Self::from_edges(nodes, &edges)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Iterator over all node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        0..self.adjacency.len() as NodeId
    }

    /// Direct neighbours of `node`, in ascending id order.
    pub fn neighbors(&self, node: NodeId) -> Result<&[NodeId]> {
        self.adjacency
            .get(node as usize)
            .map(|v| v.as_slice())
            .ok_or(CoreError::UnknownNode(node))
    }

    /// All edges as `(low, high)` pairs.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut out = Vec::with_capacity(self.adjacency.len().saturating_sub(1));
        for (a, list) in self.adjacency.iter().enumerate() {
            for &b in list {
                if (a as NodeId) < b {
                    out.push((a as NodeId, b));
                }
            }
        }
        out
    }
}
