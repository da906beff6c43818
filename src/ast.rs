//! Query tree model: search-term leaves nested inside AND/OR groups.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Id of the root group of every tree.
pub const ROOT_ID: &str = "root";

/// Unique identifier of a node, unique across the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{value}' for {what}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

/// Boolean operator joining the children of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupKind {
    #[default]
    And,
    Or,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::And => "AND",
            GroupKind::Or => "OR",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            GroupKind::And => GroupKind::Or,
            GroupKind::Or => GroupKind::And,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(GroupKind::And),
            "OR" => Ok(GroupKind::Or),
            _ => Err(UnknownVariant {
                what: "group kind",
                value: s.to_string(),
            }),
        }
    }
}

/// How a leaf matches its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
    Range,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Exact,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Exists,
        Operator::NotExists,
        Operator::Range,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Exact => "exact",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts-with",
            Operator::EndsWith => "ends-with",
            Operator::Exists => "exists",
            Operator::NotExists => "not-exists",
            Operator::Range => "range",
        }
    }

    /// Guesses the operator that produced a querystring from its quotes and wildcards.
    pub fn infer(querystring: &str) -> Option<Operator> {
        let s = querystring.trim();
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            Some(Operator::Exact)
        } else if s.len() >= 2 && s.starts_with('*') && s.ends_with('*') {
            Some(Operator::Contains)
        } else if s.starts_with('*') {
            Some(Operator::EndsWith)
        } else if s.ends_with('*') {
            Some(Operator::StartsWith)
        } else {
            None
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "exact" => Ok(Operator::Exact),
            "contains" => Ok(Operator::Contains),
            "startswith" => Ok(Operator::StartsWith),
            "endswith" => Ok(Operator::EndsWith),
            "exists" => Ok(Operator::Exists),
            "notexists" => Ok(Operator::NotExists),
            "range" => Ok(Operator::Range),
            _ => Err(UnknownVariant {
                what: "operator",
                value: s.to_string(),
            }),
        }
    }
}

/// Value of a leaf: free text, or a range whose missing bounds are open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeafValue {
    Text(String),
    Range {
        start: Option<String>,
        end: Option<String>,
    },
}

impl LeafValue {
    pub fn text(value: impl Into<String>) -> Self {
        LeafValue::Text(value.into())
    }

    pub fn range(start: Option<&str>, end: Option<&str>) -> Self {
        LeafValue::Range {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }
}

impl Default for LeafValue {
    fn default() -> Self {
        LeafValue::Text(String::new())
    }
}

/// User input for a leaf, before it is given an id and a querystring.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Term {
    pub field: Option<String>,
    pub operator: Option<Operator>,
    pub value: LeafValue,
}

impl Term {
    /// Free text searched across all fields.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            field: None,
            operator: None,
            value: LeafValue::text(value),
        }
    }

    pub fn field(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(operator),
            value: LeafValue::text(value),
        }
    }

    pub fn range(field: impl Into<String>, start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(Operator::Range),
            value: LeafValue::range(start, end),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(Operator::Exists),
            value: LeafValue::default(),
        }
    }

    pub fn not_exists(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(Operator::NotExists),
            value: LeafValue::default(),
        }
    }
}

/// A single search condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    pub value: LeafValue,
    /// The value as the backend expects it (quoted, wildcarded, escaped).
    pub querystring: String,
}

impl Leaf {
    pub fn new(id: NodeId, term: Term) -> Self {
        let querystring = crate::serializer::build_querystring(&term);
        Self {
            id,
            field: term.field,
            operator: term.operator,
            value: term.value,
            querystring,
        }
    }

    /// Builds a leaf around a querystring that is already in backend form.
    pub fn raw(id: NodeId, field: Option<String>, querystring: impl Into<String>) -> Self {
        let querystring = querystring.into();
        Self {
            id,
            field,
            operator: Operator::infer(&querystring),
            value: LeafValue::Text(querystring.clone()),
            querystring,
        }
    }

    pub fn term(&self) -> Term {
        Term {
            field: self.field.clone(),
            operator: self.operator,
            value: self.value.clone(),
        }
    }
}

/// A boolean container of ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: NodeId,
    pub kind: GroupKind,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Leaf(Leaf),
    Group(Group),
}

impl Node {
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Leaf(leaf) => &leaf.id,
            Node::Group(group) => &group.id,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(group) => Some(group),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Group(_) => None,
        }
    }

    /// True if `id` names a strict descendant of this node.
    pub fn has_descendant(&self, id: &NodeId) -> bool {
        match self {
            Node::Leaf(_) => false,
            Node::Group(group) => group.find(id).is_some(),
        }
    }

    pub fn collect_ids(&self, out: &mut Vec<NodeId>) {
        out.push(self.id().clone());
        if let Node::Group(group) = self {
            for child in &group.children {
                child.collect_ids(out);
            }
        }
    }

    /// Number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Group(group) => 1 + group.children.iter().map(Node::size).sum::<usize>(),
        }
    }
}

impl From<Leaf> for Node {
    fn from(leaf: Leaf) -> Self {
        Node::Leaf(leaf)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}

impl Group {
    pub fn new(id: NodeId, kind: GroupKind) -> Self {
        Self {
            id,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(id: NodeId, kind: GroupKind, children: Vec<Node>) -> Self {
        Self { id, kind, children }
    }

    /// Finds a strict descendant by id.
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        for child in &self.children {
            if child.id() == id {
                return Some(child);
            }
            if let Node::Group(group) = child {
                if let Some(found) = group.find(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Finds this group or a descendant group by id.
    pub fn find_group(&self, id: &NodeId) -> Option<&Group> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            Node::Group(group) => group.find_group(id),
            Node::Leaf(_) => None,
        })
    }

    pub fn find_group_mut(&mut self, id: &NodeId) -> Option<&mut Group> {
        if &self.id == id {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Group(group) = child {
                if let Some(found) = group.find_group_mut(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn find_leaf_mut(&mut self, id: &NodeId) -> Option<&mut Leaf> {
        for child in &mut self.children {
            match child {
                Node::Leaf(leaf) if &leaf.id == id => return Some(leaf),
                Node::Leaf(_) => {}
                Node::Group(group) => {
                    if let Some(found) = group.find_leaf_mut(id) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Returns the id of the group directly holding `id` and its index there.
    pub fn locate(&self, id: &NodeId) -> Option<(NodeId, usize)> {
        for (index, child) in self.children.iter().enumerate() {
            if child.id() == id {
                return Some((self.id.clone(), index));
            }
            if let Node::Group(group) = child {
                if let Some(found) = group.locate(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn collect_ids(&self, out: &mut Vec<NodeId>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| match child {
                Node::Leaf(_) => 1,
                Node::Group(group) => group.depth(),
            })
            .max()
            .unwrap_or(0)
    }
}

/// The builder's expression tree, always rooted at a group.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTree {
    pub(crate) root: Group,
    pub(crate) version: u64,
    pub(crate) next_id: u64,
    pub(crate) id_prefix: String,
    pub(crate) prune_empty_groups: bool,
}

impl Default for QueryTree {
    fn default() -> Self {
        Self::new(GroupKind::And)
    }
}

impl QueryTree {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            root: Group::new(NodeId::root(), kind),
            version: 0,
            next_id: 1,
            id_prefix: "node-".to_string(),
            prune_empty_groups: false,
        }
    }

    /// Adopts an existing group as the root, rejecting duplicate ids.
    pub fn from_root(root: Group) -> Result<Self, crate::mutation::TreeError> {
        let mut ids = Vec::new();
        root.collect_ids(&mut ids);
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                return Err(crate::mutation::TreeError::DuplicateId(id));
            }
        }
        Ok(Self {
            root,
            ..Self::default()
        })
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn with_prune_empty_groups(mut self, prune: bool) -> Self {
        self.prune_empty_groups = prune;
        self
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root.id
    }

    /// Incremented by every mutation that changed the tree.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Number of nodes below the root.
    pub fn len(&self) -> usize {
        self.root.children.iter().map(Node::size).sum()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        id == &self.root.id || self.root.find(id).is_some()
    }

    /// Looks up a non-root node.
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.root.find(id)
    }

    pub fn find_group(&self, id: &NodeId) -> Option<&Group> {
        self.root.find_group(id)
    }

    pub fn parent_of(&self, id: &NodeId) -> Option<(NodeId, usize)> {
        self.root.locate(id)
    }

    /// True if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        if ancestor == &self.root.id {
            return id != ancestor && self.root.find(id).is_some();
        }
        self.find(ancestor)
            .map(|node| node.has_descendant(id))
            .unwrap_or(false)
    }

    /// All ids in pre-order, root first.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.root.collect_ids(&mut out);
        out
    }

    /// Allocates an id that is not used anywhere in the tree.
    pub fn next_id(&mut self) -> NodeId {
        loop {
            let candidate = NodeId(format!("{}{}", self.id_prefix, self.next_id));
            self.next_id += 1;
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Creates a detached leaf with a fresh id.
    pub fn new_leaf(&mut self, term: Term) -> Leaf {
        let id = self.next_id();
        Leaf::new(id, term)
    }

    /// Creates a detached, empty group with a fresh id.
    pub fn new_group(&mut self, kind: GroupKind) -> Group {
        let id = self.next_id();
        Group::new(id, kind)
    }

    pub(crate) fn bump(&mut self) {
        self.version += 1;
    }
}
