//! In-memory node store.
//!
//! Seeded from the previous artifact, then mutated by document merges and
//! citation updates. Iteration order is insertion order: stored nodes first,
//! new ids appended, a replaced id keeps its slot.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use citegraph_shared::{Node, Result};

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// The id was new.
    Inserted,
    /// The id existed; its record was replaced and its citation count carried over.
    Replaced,
}

/// Ordered map from node id to node.
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    changed: bool,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from previously materialized nodes.
    ///
    /// A repeated id replaces the earlier record in place. Seeding does not
    /// mark the store as changed.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut store = Self::new();
        for node in nodes {
            store.upsert(node);
        }
        store
    }

    /// Merge freshly parsed document metadata.
    ///
    /// Rejects metadata without a usable `id`. For a known id the incoming
    /// record replaces the stored one, except that the stored citation count
    /// is carried forward (an unknown count becomes 0).
    pub fn merge_document(&mut self, metadata: Map<String, Value>) -> Result<MergeResult> {
        let node = Node::from_metadata(metadata)?;
        Ok(self.merge_node(node))
    }

    /// Merge an already-built node with the same rules as [`Self::merge_document`].
    pub fn merge_node(&mut self, mut node: Node) -> MergeResult {
        self.changed = true;

        if let Some(&slot) = self.index.get(&node.id) {
            node.citations = Some(self.nodes[slot].citations.unwrap_or(0));
            debug!(id = %node.id, citations = ?node.citations, "replacing node");
            self.nodes[slot] = node;
            MergeResult::Replaced
        } else {
            debug!(id = %node.id, "inserting node");
            self.upsert(node);
            MergeResult::Inserted
        }
    }

    /// Record a citation count for `id`. Returns `false` if the id is unknown.
    pub fn set_citations(&mut self, id: &str, citations: Option<u64>) -> bool {
        match self.index.get(id) {
            Some(&slot) => {
                self.nodes[slot].citations = citations;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether at least one document has been merged.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    fn upsert(&mut self, node: Node) {
        match self.index.get(&node.id) {
            Some(&slot) => self.nodes[slot] = node,
            None => {
                self.index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }
}
