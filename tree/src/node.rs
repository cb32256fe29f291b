use std::collections::HashMap;

use anyhow::Result;
use common::Fingerprint;
use engine::PositionKey;

#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_usize(i: usize) -> Self {
        Self(i as u32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub action: String,
    pub child: NodeId,
    /// Probability that this move is played. Zero for the engine's suggested move when
    /// the corpus never played it.
    pub probability: f64,
}

#[derive(Clone, Debug)]
pub struct PositionNode {
    key: PositionKey,
    edges: Vec<Edge>,
    total_count: u64,
}

impl PositionNode {
    pub(crate) fn new(key: PositionKey, edges: Vec<Edge>, total_count: u64) -> Self {
        Self {
            key,
            edges,
            total_count,
        }
    }

    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// How often the position was reached in the corpus.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn is_leaf(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Immutable arena of positions. Parents refer to children by id, never the reverse.
#[derive(Debug, Default)]
pub struct PositionTree {
    nodes: Vec<PositionNode>,
    index: HashMap<PositionKey, NodeId>,
}

impl PositionTree {
    pub(crate) fn new(nodes: Vec<PositionNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.key.clone(), NodeId::from_usize(i)))
            .collect();

        Self { nodes, index }
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &PositionNode {
        &self.nodes[id.as_usize()]
    }

    pub fn find(&self, key: &PositionKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PositionNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::from_usize(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds every position with its count and outgoing move probabilities, in key order.
    pub fn fingerprint(&self, fingerprint: &mut Fingerprint) -> Result<()> {
        let mut nodes = self.nodes.iter().collect::<Vec<_>>();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));

        for node in nodes {
            let edges = node
                .edges
                .iter()
                .map(|e| (e.action.as_str(), &self.get(e.child).key, e.probability))
                .collect::<Vec<_>>();

            fingerprint
                .add(&node.key)?
                .add(&node.total_count)?
                .add(&edges)?;
        }

        Ok(())
    }
}
