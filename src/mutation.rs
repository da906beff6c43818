//! Tree mutation engine.
//!
//! Every operation validates before touching the tree, so a failed call leaves the tree
//! (and its version) exactly as it was.

use crate::ast::{Group, GroupKind, Leaf, Node, NodeId, QueryTree, Term};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NotFound(NodeId),

    #[error("index {index} out of bounds for group with {len} children")]
    InvalidIndex { index: usize, len: usize },

    #[error("cannot place {node} inside {target}: {target} is {node} or one of its descendants")]
    Cycle { node: NodeId, target: NodeId },

    #[error("duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("the root group cannot be moved, removed or combined")]
    RootImmutable,
}

pub type TreeResult<T> = Result<T, TreeError>;

impl QueryTree {
    /// Splices `node` into the children of `parent_id` at `index`.
    pub fn insert(&mut self, parent_id: &NodeId, node: Node, index: usize) -> TreeResult<()> {
        let len = self.child_count(parent_id)?;
        if index > len {
            return Err(TreeError::InvalidIndex { index, len });
        }
        self.check_fresh_ids(&node)?;
        let parent = self
            .root
            .find_group_mut(parent_id)
            .ok_or_else(|| TreeError::NotFound(parent_id.clone()))?;
        debug!(node = %node.id(), parent = %parent_id, index, "insert");
        parent.children.insert(index, node);
        self.bump();
        Ok(())
    }

    /// Appends a new leaf built from `term` to `parent_id` and returns its id.
    pub fn add_term(&mut self, parent_id: &NodeId, term: Term) -> TreeResult<NodeId> {
        let leaf = self.new_leaf(term);
        let id = leaf.id.clone();
        let index = self.child_count(parent_id)?;
        self.insert(parent_id, Node::Leaf(leaf), index)?;
        Ok(id)
    }

    /// Appends a new empty group to `parent_id` and returns its id.
    pub fn add_group(&mut self, parent_id: &NodeId, kind: GroupKind) -> TreeResult<NodeId> {
        let group = self.new_group(kind);
        let id = group.id.clone();
        let index = self.child_count(parent_id)?;
        self.insert(parent_id, Node::Group(group), index)?;
        Ok(id)
    }

    /// Removes a node with its whole subtree and hands it back.
    ///
    /// A group emptied by the removal stays in place unless the tree prunes empty groups,
    /// in which case emptied ancestors are removed up to (not including) the root.
    pub fn remove(&mut self, node_id: &NodeId) -> TreeResult<Node> {
        if node_id == self.root_id() {
            return Err(TreeError::RootImmutable);
        }
        let (removed, parent_id, _) = self.detach(node_id)?;
        if self.prune_empty_groups {
            self.prune_from(parent_id);
        }
        debug!(node = %node_id, size = removed.size(), "remove");
        self.bump();
        Ok(removed)
    }

    /// Re-parents a node (with its subtree) under `new_parent_id` at `index`.
    ///
    /// The index is clamped to the parent's length after the node was detached.
    pub fn move_node(&mut self, node_id: &NodeId, new_parent_id: &NodeId, index: usize) -> TreeResult<()> {
        if node_id == self.root_id() {
            return Err(TreeError::RootImmutable);
        }
        let node = self
            .find(node_id)
            .ok_or_else(|| TreeError::NotFound(node_id.clone()))?;
        if node_id == new_parent_id || node.has_descendant(new_parent_id) {
            return Err(TreeError::Cycle {
                node: node_id.clone(),
                target: new_parent_id.clone(),
            });
        }
        if self.find_group(new_parent_id).is_none() {
            return Err(TreeError::NotFound(new_parent_id.clone()));
        }

        let (node, _, _) = self.detach(node_id)?;
        let parent = self
            .root
            .find_group_mut(new_parent_id)
            .ok_or_else(|| TreeError::NotFound(new_parent_id.clone()))?;
        let index = index.min(parent.children.len());
        debug!(node = %node_id, parent = %new_parent_id, index, "move");
        parent.children.insert(index, node);
        self.bump();
        Ok(())
    }

    /// Merges two nodes under a group of `kind` and returns that group's id.
    ///
    /// A leaf combined with a group that already has `kind` joins that group at the end.
    /// Otherwise both operands are wrapped in a new group: at the earlier operand's slot when
    /// they are siblings (keeping their relative order), else at `a`'s slot.
    pub fn combine(&mut self, a: &NodeId, b: &NodeId, kind: GroupKind) -> TreeResult<NodeId> {
        if a == self.root_id() || b == self.root_id() {
            return Err(TreeError::RootImmutable);
        }
        let node_a = self.find(a).ok_or_else(|| TreeError::NotFound(a.clone()))?;
        let node_b = self.find(b).ok_or_else(|| TreeError::NotFound(b.clone()))?;
        if a == b || node_a.has_descendant(b) {
            return Err(TreeError::Cycle {
                node: b.clone(),
                target: a.clone(),
            });
        }
        if node_b.has_descendant(a) {
            return Err(TreeError::Cycle {
                node: a.clone(),
                target: b.clone(),
            });
        }

        match (node_a, node_b) {
            (Node::Leaf(_), Node::Group(group)) if group.kind == kind => {
                let end = group.children.len();
                self.move_node(a, b, end)?;
                debug!(leaf = %a, group = %b, "combine into existing group");
                return Ok(b.clone());
            }
            (Node::Group(group), Node::Leaf(_)) if group.kind == kind => {
                let end = group.children.len();
                self.move_node(b, a, end)?;
                debug!(leaf = %b, group = %a, "combine into existing group");
                return Ok(a.clone());
            }
            _ => {}
        }

        let (parent_a, index_a) = self
            .parent_of(a)
            .ok_or_else(|| TreeError::NotFound(a.clone()))?;
        let (parent_b, index_b) = self
            .parent_of(b)
            .ok_or_else(|| TreeError::NotFound(b.clone()))?;
        let group_id = self.next_id();

        if parent_a == parent_b {
            let parent = self
                .root
                .find_group_mut(&parent_a)
                .ok_or_else(|| TreeError::NotFound(parent_a.clone()))?;
            let (lo, hi) = if index_a < index_b {
                (index_a, index_b)
            } else {
                (index_b, index_a)
            };
            let second = parent.children.remove(hi);
            let first = parent.children.remove(lo);
            let group = Group::with_children(group_id.clone(), kind, vec![first, second]);
            parent.children.insert(lo, Node::Group(group));
        } else {
            // parent_a differs from parent_b, so detaching b leaves index_a valid.
            let (node_b, _, _) = self.detach(b)?;
            let parent = self
                .root
                .find_group_mut(&parent_a)
                .ok_or_else(|| TreeError::NotFound(parent_a.clone()))?;
            let node_a = parent.children.remove(index_a);
            let group = Group::with_children(group_id.clone(), kind, vec![node_a, node_b]);
            parent.children.insert(index_a, Node::Group(group));
        }

        debug!(a = %a, b = %b, group = %group_id, %kind, "combine into new group");
        self.bump();
        Ok(group_id)
    }

    /// Switches a group between AND and OR. Returns whether anything changed.
    pub fn set_group_kind(&mut self, group_id: &NodeId, kind: GroupKind) -> TreeResult<bool> {
        let group = self
            .root
            .find_group_mut(group_id)
            .ok_or_else(|| TreeError::NotFound(group_id.clone()))?;
        if group.kind == kind {
            return Ok(false);
        }
        group.kind = kind;
        debug!(group = %group_id, %kind, "set group kind");
        self.bump();
        Ok(true)
    }

    /// Replaces the condition of a leaf, keeping its id and position.
    pub fn update_leaf(&mut self, leaf_id: &NodeId, term: Term) -> TreeResult<()> {
        let leaf = self
            .root
            .find_leaf_mut(leaf_id)
            .ok_or_else(|| TreeError::NotFound(leaf_id.clone()))?;
        *leaf = Leaf::new(leaf_id.clone(), term);
        debug!(leaf = %leaf_id, querystring = %leaf.querystring, "update leaf");
        self.bump();
        Ok(())
    }

    /// Drops every child of the root.
    pub fn clear(&mut self) {
        if !self.root.children.is_empty() {
            self.root.children.clear();
            self.bump();
        }
    }

    fn child_count(&self, group_id: &NodeId) -> TreeResult<usize> {
        self.find_group(group_id)
            .map(|group| group.children.len())
            .ok_or_else(|| TreeError::NotFound(group_id.clone()))
    }

    fn check_fresh_ids(&self, node: &Node) -> TreeResult<()> {
        let mut incoming = Vec::new();
        node.collect_ids(&mut incoming);
        let mut seen = HashSet::new();
        for id in incoming {
            if self.contains(&id) || !seen.insert(id.clone()) {
                return Err(TreeError::DuplicateId(id));
            }
        }
        Ok(())
    }

    /// Unlinks a non-root node from its parent without bumping the version.
    fn detach(&mut self, node_id: &NodeId) -> TreeResult<(Node, NodeId, usize)> {
        let (parent_id, index) = self
            .parent_of(node_id)
            .ok_or_else(|| TreeError::NotFound(node_id.clone()))?;
        let parent = self
            .root
            .find_group_mut(&parent_id)
            .ok_or_else(|| TreeError::NotFound(parent_id.clone()))?;
        let node = parent.children.remove(index);
        Ok((node, parent_id, index))
    }

    fn prune_from(&mut self, mut group_id: NodeId) {
        while &group_id != self.root_id() {
            let is_empty = self
                .find_group(&group_id)
                .map(|group| group.children.is_empty())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            match self.detach(&group_id) {
                Ok((_, parent_id, _)) => {
                    debug!(group = %group_id, "pruned empty group");
                    group_id = parent_id;
                }
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use crate::serializer::serialize;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn exact(field: &str, value: &str) -> Term {
        Term::field(field, Operator::Exact, value)
    }

    /// root(AND) [ a, g(OR) [ b, c ], d ]
    fn sample() -> QueryTree {
        let mut tree = QueryTree::default();
        let root = tree.root_id().clone();
        let a = tree.add_term(&root, Term::text("asthma")).unwrap();
        let g = tree.add_group(&root, GroupKind::Or).unwrap();
        let b = tree.add_term(&g, Term::text("covid")).unwrap();
        let c = tree.add_term(&g, Term::text("flu")).unwrap();
        let d = tree.add_term(&root, Term::text("malaria")).unwrap();
        assert_eq!(
            vec![a, g, b, c, d],
            vec![id("node-1"), id("node-2"), id("node-3"), id("node-4"), id("node-5")]
        );
        tree
    }

    #[test]
    fn test_insert_grows_parent_by_one() {
        let mut tree = sample();
        let before: Vec<NodeId> = tree.ids();
        let leaf = tree.new_leaf(Term::text("zika"));
        let new_id = leaf.id.clone();
        tree.insert(&id("node-2"), Node::Leaf(leaf), 1).unwrap();

        let group = tree.find_group(&id("node-2")).unwrap();
        assert_eq!(group.children.len(), 3);
        assert_eq!(group.children[1].id(), &new_id);
        for old in before {
            assert!(tree.contains(&old));
        }
    }

    #[test]
    fn test_insert_errors() {
        let mut tree = sample();
        let version = tree.version();
        let leaf = tree.new_leaf(Term::text("zika"));

        let err = tree.insert(&id("missing"), Node::Leaf(leaf.clone()), 0).unwrap_err();
        assert_eq!(err, TreeError::NotFound(id("missing")));

        // a leaf is not a valid parent
        let err = tree.insert(&id("node-1"), Node::Leaf(leaf.clone()), 0).unwrap_err();
        assert_eq!(err, TreeError::NotFound(id("node-1")));

        let err = tree.insert(&id("node-2"), Node::Leaf(leaf), 3).unwrap_err();
        assert_eq!(err, TreeError::InvalidIndex { index: 3, len: 2 });

        let dup = Node::Leaf(Leaf::raw(id("node-3"), None, "dup"));
        let err = tree.insert(&id("node-2"), dup, 0).unwrap_err();
        assert_eq!(err, TreeError::DuplicateId(id("node-3")));

        assert_eq!(tree.version(), version);
    }

    #[test]
    fn test_insert_reports_parent_before_duplicate() {
        let mut tree = sample();
        let version = tree.version();

        let dup = Node::Leaf(Leaf::raw(id("node-3"), None, "dup"));
        let err = tree.insert(&id("missing"), dup.clone(), 0).unwrap_err();
        assert_eq!(err, TreeError::NotFound(id("missing")));

        let err = tree.insert(&id("node-2"), dup, 5).unwrap_err();
        assert_eq!(err, TreeError::InvalidIndex { index: 5, len: 2 });

        assert_eq!(tree.version(), version);
    }

    #[test]
    fn test_insert_at_end_is_allowed() {
        let mut tree = sample();
        let leaf = tree.new_leaf(Term::text("zika"));
        tree.insert(&id("node-2"), Node::Leaf(leaf), 2).unwrap();
        assert_eq!(tree.find_group(&id("node-2")).unwrap().children.len(), 3);
    }

    #[test]
    fn test_remove_drops_whole_subtree() {
        let mut tree = sample();
        let removed = tree.remove(&id("node-2")).unwrap();
        assert_eq!(removed.size(), 3);
        for gone in ["node-2", "node-3", "node-4"] {
            assert!(!tree.contains(&id(gone)));
        }
        assert!(tree.contains(&id("node-1")));
        assert!(tree.contains(&id("node-5")));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_keeps_empty_group_by_default() {
        let mut tree = sample();
        tree.remove(&id("node-3")).unwrap();
        tree.remove(&id("node-4")).unwrap();
        let group = tree.find_group(&id("node-2")).unwrap();
        assert!(group.children.is_empty());
        assert_eq!(serialize(&tree), "(asthma AND malaria)");
    }

    #[test]
    fn test_remove_prunes_when_configured() {
        let mut tree = sample().with_prune_empty_groups(true);
        let root = tree.root_id().clone();
        let outer = tree.add_group(&root, GroupKind::And).unwrap();
        let inner = tree.add_group(&outer, GroupKind::Or).unwrap();
        let only = tree.add_term(&inner, Term::text("rabies")).unwrap();

        tree.remove(&only).unwrap();
        assert!(!tree.contains(&inner));
        assert!(!tree.contains(&outer));
        assert!(tree.contains(&id("node-2")));

        tree.remove(&id("node-1")).unwrap();
        tree.remove(&id("node-5")).unwrap();
        tree.remove(&id("node-2")).unwrap();
        assert!(tree.is_empty());
        assert!(tree.contains(&root));
    }

    #[test]
    fn test_remove_errors() {
        let mut tree = sample();
        assert_eq!(tree.remove(&id("nope")).unwrap_err(), TreeError::NotFound(id("nope")));
        assert_eq!(tree.remove(&NodeId::root()).unwrap_err(), TreeError::RootImmutable);
    }

    #[test]
    fn test_move_reparents_and_clamps() {
        let mut tree = sample();
        tree.move_node(&id("node-1"), &id("node-2"), 99).unwrap();
        let group = tree.find_group(&id("node-2")).unwrap();
        assert_eq!(group.children.last().unwrap().id(), &id("node-1"));
        assert_eq!(tree.parent_of(&id("node-1")), Some((id("node-2"), 2)));
        assert_eq!(tree.root().children.len(), 2);
    }

    #[test]
    fn test_move_within_same_parent() {
        let mut tree = sample();
        tree.move_node(&id("node-5"), &NodeId::root(), 0).unwrap();
        let order: Vec<_> = tree.root().children.iter().map(|n| n.id().clone()).collect();
        assert_eq!(order, vec![id("node-5"), id("node-1"), id("node-2")]);
    }

    #[test]
    fn test_move_into_descendant_is_cycle_and_noop() {
        let mut tree = sample();
        let inner = tree.add_group(&id("node-2"), GroupKind::And).unwrap();
        let snapshot = tree.clone();

        let err = tree.move_node(&id("node-2"), &inner, 0).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
        let err = tree.move_node(&id("node-2"), &id("node-2"), 0).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
        assert_eq!(tree, snapshot);
    }

    #[test]
    fn test_move_errors() {
        let mut tree = sample();
        let snapshot = tree.clone();
        assert_eq!(
            tree.move_node(&id("x"), &NodeId::root(), 0).unwrap_err(),
            TreeError::NotFound(id("x"))
        );
        assert_eq!(
            tree.move_node(&id("node-1"), &id("x"), 0).unwrap_err(),
            TreeError::NotFound(id("x"))
        );
        assert_eq!(
            tree.move_node(&id("node-1"), &id("node-5"), 0).unwrap_err(),
            TreeError::NotFound(id("node-5"))
        );
        assert_eq!(tree, snapshot);
    }

    #[test]
    fn test_combine_two_leaves() {
        let mut tree = QueryTree::default();
        let root = tree.root_id().clone();
        let a = tree.add_term(&root, exact("field", "asthma")).unwrap();
        let b = tree.add_term(&root, exact("field", "covid")).unwrap();

        let group_id = tree.combine(&a, &b, GroupKind::And).unwrap();
        let group = tree.find_group(&group_id).unwrap();
        assert_eq!(group.kind, GroupKind::And);
        let children: Vec<_> = group.children.iter().map(|n| n.id().clone()).collect();
        assert_eq!(children, vec![a, b]);
        assert_eq!(tree.root().children.len(), 1);
    }

    #[test]
    fn test_combine_siblings_keeps_relative_order() {
        let mut tree = sample();
        let group_id = tree.combine(&id("node-5"), &id("node-1"), GroupKind::Or).unwrap();
        let group = tree.find_group(&group_id).unwrap();
        let children: Vec<_> = group.children.iter().map(|n| n.id().clone()).collect();
        assert_eq!(children, vec![id("node-1"), id("node-5")]);
        assert_eq!(tree.parent_of(&group_id), Some((NodeId::root(), 0)));
    }

    #[test]
    fn test_combine_leaf_into_same_kind_group() {
        let mut tree = sample();
        let version = tree.version();
        let result = tree.combine(&id("node-1"), &id("node-2"), GroupKind::Or).unwrap();
        assert_eq!(result, id("node-2"));
        let group = tree.find_group(&id("node-2")).unwrap();
        assert_eq!(group.children.len(), 3);
        assert_eq!(group.children[2].id(), &id("node-1"));
        assert!(tree.version() > version);
    }

    #[test]
    fn test_combine_leaf_with_opposite_kind_group_wraps() {
        let mut tree = sample();
        let result = tree.combine(&id("node-5"), &id("node-2"), GroupKind::And).unwrap();
        assert_ne!(result, id("node-2"));
        let group = tree.find_group(&result).unwrap();
        let children: Vec<_> = group.children.iter().map(|n| n.id().clone()).collect();
        assert_eq!(children, vec![id("node-2"), id("node-5")]);
    }

    #[test]
    fn test_combine_across_parents_uses_a_position() {
        let mut tree = sample();
        let result = tree.combine(&id("node-3"), &id("node-5"), GroupKind::And).unwrap();
        assert_eq!(tree.parent_of(&result), Some((id("node-2"), 0)));
        let group = tree.find_group(&result).unwrap();
        let children: Vec<_> = group.children.iter().map(|n| n.id().clone()).collect();
        assert_eq!(children, vec![id("node-3"), id("node-5")]);
        assert!(tree.root().children.iter().all(|n| n.id() != &id("node-5")));
    }

    #[test]
    fn test_combine_errors_leave_tree_unchanged() {
        let mut tree = sample();
        let snapshot = tree.clone();
        assert_eq!(
            tree.combine(&id("node-1"), &id("x"), GroupKind::And).unwrap_err(),
            TreeError::NotFound(id("x"))
        );
        assert!(matches!(
            tree.combine(&id("node-2"), &id("node-3"), GroupKind::And).unwrap_err(),
            TreeError::Cycle { .. }
        ));
        assert!(matches!(
            tree.combine(&id("node-1"), &id("node-1"), GroupKind::And).unwrap_err(),
            TreeError::Cycle { .. }
        ));
        assert_eq!(
            tree.combine(&NodeId::root(), &id("node-1"), GroupKind::And).unwrap_err(),
            TreeError::RootImmutable
        );
        assert_eq!(tree, snapshot);
    }

    #[test]
    fn test_set_group_kind() {
        let mut tree = sample();
        let version = tree.version();
        assert!(!tree.set_group_kind(&id("node-2"), GroupKind::Or).unwrap());
        assert_eq!(tree.version(), version);
        assert!(tree.set_group_kind(&id("node-2"), GroupKind::And).unwrap());
        assert_eq!(tree.version(), version + 1);
        assert_eq!(
            tree.set_group_kind(&id("node-1"), GroupKind::And).unwrap_err(),
            TreeError::NotFound(id("node-1"))
        );
    }

    #[test]
    fn test_update_leaf_rewrites_querystring() {
        let mut tree = sample();
        tree.update_leaf(&id("node-1"), Term::field("name", Operator::StartsWith, "asth"))
            .unwrap();
        let leaf = tree.find(&id("node-1")).unwrap().as_leaf().unwrap();
        assert_eq!(leaf.querystring, "asth*");
        assert_eq!(leaf.field.as_deref(), Some("name"));
        assert!(tree.update_leaf(&id("node-2"), Term::text("x")).is_err());
    }

    #[test]
    fn test_end_to_end_build_and_remove() {
        let mut tree = QueryTree::default();
        let root = tree.root_id().clone();
        let a = tree.add_term(&root, exact("field", "asthma")).unwrap();
        let b = tree.add_term(&root, exact("field", "covid")).unwrap();
        tree.combine(&a, &b, GroupKind::And).unwrap();
        assert_eq!(serialize(&tree), r#"(field:"asthma" AND field:"covid")"#);
        tree.remove(&b).unwrap();
        assert_eq!(serialize(&tree), r#"field:"asthma""#);
    }
}
