//! A query builder session: one tree, one drag gesture at a time, and the searches issued from it.

use crate::ast::{GroupKind, Node, NodeId, QueryTree, Term};
use crate::config::BuilderConfig;
use crate::drag_drop::{apply_drop, DragAdapter, DragError, DropIntent, DropOutcome, DropZone};
use crate::mutation::{TreeError, TreeResult};
use crate::serializer::serialize;
use crate::storage::{LocalStore, StorageError};
use crate::validation::{validate_query_string, ValidationReport};
use tracing::{debug, info, warn};

/// Storage key of the recently searched query strings.
pub const RECENT_QUERIES_KEY: &str = "recent-queries";
const RECENT_QUERIES_LIMIT: usize = 10;

/// Identifies one issued search. Only the latest ticket's response should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub seq: u64,
    pub query: String,
}

#[derive(Debug)]
pub struct BuilderSession {
    config: BuilderConfig,
    tree: QueryTree,
    drag: DragAdapter,
    store: Option<LocalStore>,
    search_seq: u64,
}

impl BuilderSession {
    pub fn new(config: BuilderConfig) -> Self {
        let tree = Self::empty_tree(&config);
        let drag = DragAdapter::new(config.default_kind);
        info!(kind = %config.default_kind, "query builder session started");
        Self {
            config,
            tree,
            drag,
            store: None,
            search_seq: 0,
        }
    }

    /// Persists recent searches in `store`.
    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    fn empty_tree(config: &BuilderConfig) -> QueryTree {
        QueryTree::new(config.default_kind)
            .with_id_prefix(config.id_prefix.clone())
            .with_prune_empty_groups(config.prune_empty_groups)
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn tree(&self) -> &QueryTree {
        &self.tree
    }

    pub fn drag(&self) -> &DragAdapter {
        &self.drag
    }

    pub fn query_string(&self) -> String {
        serialize(&self.tree)
    }

    pub fn add_term(&mut self, parent: &NodeId, term: Term) -> TreeResult<NodeId> {
        self.tree.add_term(parent, term)
    }

    pub fn add_group(&mut self, parent: &NodeId, kind: GroupKind) -> TreeResult<NodeId> {
        self.tree.add_group(parent, kind)
    }

    pub fn remove(&mut self, id: &NodeId) -> TreeResult<Node> {
        self.tree.remove(id)
    }

    pub fn move_node(&mut self, id: &NodeId, parent: &NodeId, index: usize) -> TreeResult<()> {
        self.tree.move_node(id, parent, index)
    }

    pub fn combine(&mut self, a: &NodeId, b: &NodeId, kind: GroupKind) -> TreeResult<NodeId> {
        self.tree.combine(a, b, kind)
    }

    pub fn set_group_kind(&mut self, group: &NodeId, kind: GroupKind) -> TreeResult<bool> {
        self.tree.set_group_kind(group, kind)
    }

    /// Flips a group between AND and OR, returning the new kind.
    pub fn toggle_group_kind(&mut self, group: &NodeId) -> TreeResult<GroupKind> {
        let kind = self
            .tree
            .find_group(group)
            .ok_or_else(|| TreeError::NotFound(group.clone()))?
            .kind
            .toggled();
        self.tree.set_group_kind(group, kind)?;
        Ok(kind)
    }

    pub fn update_leaf(&mut self, id: &NodeId, term: Term) -> TreeResult<()> {
        self.tree.update_leaf(id, term)
    }

    /// Empties the tree and abandons any gesture in progress.
    pub fn reset(&mut self) {
        self.drag.cancel();
        self.tree.clear();
        info!(version = self.tree.version(), "query reset");
    }

    pub fn begin_drag(&mut self, source: NodeId) -> Result<(), DragError> {
        self.drag.begin(&self.tree, source)
    }

    pub fn hover(&mut self, target: NodeId, intent: DropIntent) -> Result<DropZone, DragError> {
        self.drag.hover(&self.tree, target, intent)
    }

    pub fn drop_dragged(&mut self) -> Result<DropOutcome, DragError> {
        self.drag.drop(&mut self.tree)
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    /// Resolves and commits a complete gesture at once.
    pub fn apply_drop(&mut self, source: &NodeId, target: &NodeId, intent: DropIntent) -> DropOutcome {
        apply_drop(&mut self.tree, source, target, intent, self.config.default_kind)
    }

    /// Validates a hand-edited query string and, if it is valid, replaces the tree with it.
    pub fn load_query_string(&mut self, querystring: &str) -> ValidationReport {
        let mut report = validate_query_string(querystring);
        if let Some(parsed) = report.tree.take() {
            let version = self.tree.version();
            let mut tree = parsed
                .with_id_prefix(self.config.id_prefix.clone())
                .with_prune_empty_groups(self.config.prune_empty_groups);
            tree.version = version;
            tree.bump();
            self.drag.cancel();
            self.tree = tree;
            info!(query = %report.querystring, version = self.tree.version(), "query loaded from text");
            report.tree = Some(self.tree.clone());
        }
        report
    }

    /// Issues a ticket for searching the current query. Any earlier ticket becomes stale.
    ///
    /// Failing to record the query in the recent list is logged and does not stop the search.
    pub fn begin_search(&mut self) -> SearchTicket {
        self.search_seq += 1;
        let ticket = SearchTicket {
            seq: self.search_seq,
            query: self.query_string(),
        };
        if !ticket.query.is_empty() {
            if let Err(err) = self.remember_query(&ticket.query) {
                warn!(error = %err, "cannot remember query");
            }
        }
        info!(seq = ticket.seq, query = %ticket.query, "search issued");
        ticket
    }

    /// True if a response for `ticket` should be shown, false if a newer search superseded it.
    pub fn accept_response(&self, ticket: &SearchTicket) -> bool {
        let fresh = ticket.seq == self.search_seq;
        if !fresh {
            debug!(seq = ticket.seq, latest = self.search_seq, "dropping stale search response");
        }
        fresh
    }

    pub fn recent_queries(&self) -> Vec<String> {
        self.store
            .as_ref()
            .map(|store| store.read_string_list(RECENT_QUERIES_KEY, &[]))
            .unwrap_or_default()
    }

    fn remember_query(&mut self, query: &str) -> Result<(), StorageError> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let mut recent = store.read_string_list(RECENT_QUERIES_KEY, &[]);
        recent.retain(|q| q != query);
        recent.insert(0, query.to_string());
        recent.truncate(RECENT_QUERIES_LIMIT);
        store.write_string_list(RECENT_QUERIES_KEY, &recent)
    }
}

impl Default for BuilderSession {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}
