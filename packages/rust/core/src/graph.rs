//! Link reconstruction and node ordering.
//!
//! Links are never carried over from a previous artifact. They are rebuilt
//! from every node's declared parents on each run, so a link exists exactly
//! when both of its endpoints do.

use std::collections::HashSet;

use tracing::{debug, warn};

use citegraph_shared::{Artifact, Link, Node};

/// A declared parent that produced no link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// Node declaring the parent.
    pub node: String,
    /// The missing parent id, or the JSON text of a non-identifier entry.
    pub parent: String,
}

/// Output of [`rebuild_links`].
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    pub links: Vec<Link>,
    pub dangling: Vec<DanglingRef>,
}

impl LinkSet {
    pub fn dangling_count(&self) -> usize {
        self.dangling.len()
    }
}

/// Rebuild all parent → child links for `nodes`.
///
/// Order follows node order, then each node's parent order. Parents that do
/// not name a node in the set, and entries that are not identifiers at all,
/// are reported in [`LinkSet::dangling`] and produce no link.
pub fn rebuild_links(nodes: &[Node]) -> LinkSet {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut set = LinkSet::default();

    for node in nodes {
        for parent in node.parents.ids() {
            if known.contains(parent) {
                set.links.push(Link::new(parent, node.id.as_str()));
            } else {
                warn!(node = %node.id, parent, "dangling parent reference");
                set.dangling.push(DanglingRef {
                    node: node.id.clone(),
                    parent: parent.to_string(),
                });
            }
        }

        for entry in node.parents.unlinkable() {
            warn!(node = %node.id, parent = %entry, "parent entry is not an identifier");
            set.dangling.push(DanglingRef {
                node: node.id.clone(),
                parent: entry,
            });
        }
    }

    debug!(links = set.links.len(), dangling = set.dangling.len(), "links rebuilt");
    set
}

/// Stable sort by year ascending; a missing year sorts as 0.
pub fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by_key(Node::sort_year);
}

/// Build the output artifact: links from the unsorted node order, then nodes
/// sorted by year.
pub fn build_artifact(nodes: Vec<Node>) -> (Artifact, Vec<DanglingRef>) {
    let LinkSet { links, dangling } = rebuild_links(&nodes);
    let mut nodes = nodes;
    sort_nodes(&mut nodes);
    (Artifact { nodes, links }, dangling)
}
