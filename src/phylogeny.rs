//! A rooted, ordered tree of clonal groups (§4.1).
//!
//! Modeled as a flat arena rather than a pointer/graph structure, per the
//! design notes: ids are dense `0..size()`, assigned in insertion order,
//! root is always `0`, and every node has at most two descendants. This
//! mirrors how `grammar::vaftree::Node` is a plain tree of owned children
//! rather than a `petgraph` graph — the invariants here (dense ids, `<=2`
//! children, always-connected) are easier to enforce on a small bespoke
//! arena than on a general-purpose graph type.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Node<T> {
    value: T,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A rooted tree of group values, `<=2` children per node, dense ids in
/// insertion order with `root == 0`. `Serialize`/`Deserialize` (bounded by the
/// value type) let a phylogeny summary round-trip through JSON the way a
/// [`crate::calling::VariantCall`] does when emitted by the CLI entry point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phylogeny<T> {
    nodes: Vec<Node<T>>,
}

impl<T: PartialEq> PartialEq for Phylogeny<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| {
            a.value == b.value && a.parent == b.parent && a.children == b.children
        })
    }
}

impl<T> Phylogeny<T> {
    /// Create a new single-node phylogeny with `value` at the root.
    pub fn with_root(value: T) -> Self {
        Phylogeny {
            nodes: vec![Node {
                value,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Number of groups in the phylogeny.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Add a new group `value` as a descendant of `parent`. Returns the new
    /// group's id (always `size() - 1` after the call, since ids are dense
    /// and insertion-ordered). Fails if `parent` is out of range or already
    /// has two children.
    pub fn add_descendant(&mut self, value: T, parent: usize) -> Result<usize, Error> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or(Error::ParentFull { parent, child: self.nodes.len() })?;
        if parent_node.children.len() >= 2 {
            return Err(Error::ParentFull {
                parent,
                child: self.nodes.len(),
            });
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    pub fn group(&self, id: usize) -> &T {
        &self.nodes[id].value
    }

    pub fn group_mut(&mut self, id: usize) -> &mut T {
        &mut self.nodes[id].value
    }

    pub fn parent(&self, id: usize) -> Option<usize> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: usize) -> &[usize] {
        &self.nodes[id].children
    }

    pub fn num_descendants(&self, id: usize) -> usize {
        self.nodes[id].children.len()
    }

    /// All group ids in pre-order (root first, then each child subtree in
    /// insertion order).
    pub fn group_ids(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.visit_preorder(0, &mut order);
        order
    }

    /// All `(id, value)` pairs in pre-order.
    pub fn groups(&self) -> Vec<(usize, &T)> {
        self.group_ids()
            .into_iter()
            .map(|id| (id, self.group(id)))
            .collect()
    }

    fn visit_preorder(&self, id: usize, order: &mut Vec<usize>) {
        order.push(id);
        for &child in &self.nodes[id].children {
            self.visit_preorder(child, order);
        }
    }

    /// Structural copy with a new value type, preserving ids, parentage,
    /// and child order exactly. Used to produce a "shape-only" phylogeny
    /// for the template of the next model-selection level (§4.5.1), and to
    /// elide per-group posteriors down to a bare shape for the emitted
    /// phylogeny summary (§4.8).
    pub fn transform<U, F: FnMut(&T) -> U>(&self, mut f: F) -> Phylogeny<U> {
        Phylogeny {
            nodes: self
                .nodes
                .iter()
                .map(|n| Node {
                    value: f(&n.value),
                    parent: n.parent,
                    children: n.children.clone(),
                })
                .collect(),
        }
    }

    /// Validate the `<=2`-children invariant holds for every node (used as
    /// a defensive check after external code has mutated a phylogeny it
    /// built by hand, e.g. deserialization).
    pub fn check_invariants(&self) -> Result<(), Error> {
        for (id, node) in self.nodes.iter().enumerate() {
            if node.children.len() > 2 {
                return Err(Error::TooManyDescendants {
                    id,
                    count: node.children.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_root_has_size_one() {
        let p = Phylogeny::with_root(());
        assert_eq!(p.size(), 1);
        assert_eq!(p.group_ids(), vec![0]);
    }

    #[test]
    fn add_descendant_assigns_dense_ids() {
        let mut p = Phylogeny::with_root(0);
        let a = p.add_descendant(1, 0).unwrap();
        let b = p.add_descendant(2, 0).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(p.num_descendants(0), 2);
    }

    #[test]
    fn third_child_is_rejected() {
        let mut p = Phylogeny::with_root(0);
        p.add_descendant(1, 0).unwrap();
        p.add_descendant(2, 0).unwrap();
        assert!(p.add_descendant(3, 0).is_err());
    }

    #[test]
    fn preorder_visits_left_child_before_right() {
        let mut p = Phylogeny::with_root(0);
        let left = p.add_descendant(1, 0).unwrap();
        let _right = p.add_descendant(2, 0).unwrap();
        p.add_descendant(3, left).unwrap();
        // root, left child, left's child, right child
        assert_eq!(p.group_ids(), vec![0, 1, 3, 2]);
    }

    #[test]
    fn differing_child_order_is_not_equal() {
        let mut a = Phylogeny::with_root(0);
        a.add_descendant(1, 0).unwrap();
        a.add_descendant(2, 0).unwrap();

        let mut b = Phylogeny::with_root(0);
        b.add_descendant(2, 0).unwrap();
        b.add_descendant(1, 0).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn transform_preserves_shape() {
        let mut p = Phylogeny::with_root(10);
        p.add_descendant(20, 0).unwrap();
        let shapes = p.transform(|_| ());
        assert_eq!(shapes.size(), 2);
        assert_eq!(shapes.children(0), &[1]);
    }
}
