//! Drag-and-drop adapter.
//!
//! Turns a gesture (`Idle → Dragging → Resolved`) into one of the mutation primitives.
//! Drop targets are resolved into a [`DropPlan`] before anything is committed, so an invalid
//! target shows no drop zone and a rejected drop leaves the tree untouched.

use crate::ast::{GroupKind, Node, NodeId, QueryTree};
use crate::mutation::TreeError;
use thiserror::Error;
use tracing::{debug, warn};

/// Where the pointer wants the dragged node to go relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropIntent {
    ReorderBefore,
    ReorderAfter,
    NestInto,
    CombineWith,
}

/// The drop zone to highlight while hovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropZone {
    None,
    Before,
    After,
    Inside,
    Combine,
}

/// A validated mutation, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPlan {
    Move {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    Combine {
        node: NodeId,
        target: NodeId,
        kind: GroupKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("nothing to drop onto")]
    NoTarget,

    #[error("cannot drop {node} onto itself or its own descendant {target}")]
    OwnSubtree { node: NodeId, target: NodeId },

    #[error("the root group only accepts drops inside it")]
    RootTarget,

    #[error(transparent)]
    Mutation(#[from] TreeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Moved {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    Combined {
        group: NodeId,
    },
    Rejected(RejectReason),
}

impl DropOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, DropOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub target: NodeId,
    pub intent: DropIntent,
    pub zone: DropZone,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Dragging {
        source: NodeId,
        hover: Option<Hover>,
    },
    Resolved(DropOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("a drag of {0} is already in progress")]
    AlreadyDragging(NodeId),

    #[error("cannot drag unknown node {0}")]
    UnknownSource(NodeId),

    #[error("the root group cannot be dragged")]
    RootNotDraggable,

    #[error("no drag in progress")]
    NotDragging,
}

/// Sequences one drag gesture at a time against a tree.
#[derive(Debug, Clone, Default)]
pub struct DragAdapter {
    state: GestureState,
    combine_kind: GroupKind,
}

impl DragAdapter {
    /// `combine_kind` is the kind of group created when two leaves are dropped onto each other.
    pub fn new(combine_kind: GroupKind) -> Self {
        Self {
            state: GestureState::Idle,
            combine_kind,
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, GestureState::Dragging { .. })
    }

    pub fn begin(&mut self, tree: &QueryTree, source: NodeId) -> Result<(), DragError> {
        if let GestureState::Dragging { source: current, .. } = &self.state {
            return Err(DragError::AlreadyDragging(current.clone()));
        }
        if &source == tree.root_id() {
            return Err(DragError::RootNotDraggable);
        }
        if tree.find(&source).is_none() {
            return Err(DragError::UnknownSource(source));
        }
        debug!(%source, "drag started");
        self.state = GestureState::Dragging {
            source,
            hover: None,
        };
        Ok(())
    }

    /// Records the current target and returns the zone to highlight, `DropZone::None` if invalid.
    pub fn hover(&mut self, tree: &QueryTree, target: NodeId, intent: DropIntent) -> Result<DropZone, DragError> {
        let combine_kind = self.combine_kind;
        let GestureState::Dragging { source, hover } = &mut self.state else {
            return Err(DragError::NotDragging);
        };
        let zone = match resolve(tree, source, &target, intent, combine_kind) {
            Ok(plan) => zone_for(&plan, &target, intent),
            Err(_) => DropZone::None,
        };
        *hover = Some(Hover {
            target,
            intent,
            zone,
        });
        Ok(zone)
    }

    /// Pointer left every target.
    pub fn leave(&mut self) {
        if let GestureState::Dragging { hover, .. } = &mut self.state {
            *hover = None;
        }
    }

    /// Commits the drop at the last hovered target.
    pub fn drop(&mut self, tree: &mut QueryTree) -> Result<DropOutcome, DragError> {
        if !self.is_dragging() {
            return Err(DragError::NotDragging);
        }
        let GestureState::Dragging { source, hover } = std::mem::take(&mut self.state) else {
            return Err(DragError::NotDragging);
        };
        let outcome = match hover {
            None => DropOutcome::Rejected(RejectReason::NoTarget),
            Some(hover) => apply_drop(tree, &source, &hover.target, hover.intent, self.combine_kind),
        };
        match &outcome {
            DropOutcome::Rejected(reason) => warn!(%source, %reason, "drop rejected"),
            applied => debug!(%source, outcome = ?applied, "drop applied"),
        }
        self.state = GestureState::Resolved(outcome.clone());
        Ok(outcome)
    }

    /// Abandons the gesture without touching the tree.
    pub fn cancel(&mut self) {
        if self.is_dragging() {
            debug!("drag cancelled");
        }
        self.state = GestureState::Idle;
    }
}

/// Resolves and commits a whole gesture in one call.
pub fn apply_drop(
    tree: &mut QueryTree,
    source: &NodeId,
    target: &NodeId,
    intent: DropIntent,
    combine_kind: GroupKind,
) -> DropOutcome {
    let plan = match resolve(tree, source, target, intent, combine_kind) {
        Ok(plan) => plan,
        Err(reason) => return DropOutcome::Rejected(reason),
    };
    let result = match plan {
        DropPlan::Combine { node, target, kind } => tree
            .combine(&node, &target, kind)
            .map(|group| DropOutcome::Combined { group }),
        DropPlan::Move { node, parent, index } => tree
            .move_node(&node, &parent, index)
            .map(|()| {
                let index = tree.parent_of(&node).map(|(_, i)| i).unwrap_or(index);
                DropOutcome::Moved { node, parent, index }
            }),
    };
    result.unwrap_or_else(|err| DropOutcome::Rejected(RejectReason::Mutation(err)))
}

/// Maps a gesture onto a mutation without applying it.
///
/// `CombineWith` on a leaf combines; `NestInto` on a group appends inside it; every other
/// gesture places the source next to the target in the target's parent.
pub fn resolve(
    tree: &QueryTree,
    source: &NodeId,
    target: &NodeId,
    intent: DropIntent,
    combine_kind: GroupKind,
) -> Result<DropPlan, RejectReason> {
    let source_node = tree
        .find(source)
        .ok_or_else(|| TreeError::NotFound(source.clone()))?;
    if source == target || source_node.has_descendant(target) {
        return Err(RejectReason::OwnSubtree {
            node: source.clone(),
            target: target.clone(),
        });
    }

    if target == tree.root_id() {
        return match intent {
            DropIntent::NestInto => Ok(DropPlan::Move {
                node: source.clone(),
                parent: target.clone(),
                index: end_index(tree, source, tree.root().children.len(), target),
            }),
            _ => Err(RejectReason::RootTarget),
        };
    }

    let target_node = tree
        .find(target)
        .ok_or_else(|| TreeError::NotFound(target.clone()))?;

    match (intent, target_node) {
        (DropIntent::CombineWith, Node::Leaf(_)) => Ok(DropPlan::Combine {
            node: source.clone(),
            target: target.clone(),
            kind: combine_kind,
        }),
        (DropIntent::NestInto, Node::Group(group)) => Ok(DropPlan::Move {
            node: source.clone(),
            parent: target.clone(),
            index: end_index(tree, source, group.children.len(), target),
        }),
        _ => {
            let (parent, target_index) = tree
                .parent_of(target)
                .ok_or_else(|| TreeError::NotFound(target.clone()))?;
            let mut index = match intent {
                DropIntent::ReorderBefore => target_index,
                _ => target_index + 1,
            };
            // detaching an earlier sibling shifts the target one slot left
            if let Some((source_parent, source_index)) = tree.parent_of(source) {
                if source_parent == parent && source_index < target_index {
                    index -= 1;
                }
            }
            Ok(DropPlan::Move {
                node: source.clone(),
                parent,
                index,
            })
        }
    }
}

/// Index that appends to `parent` once `source` has been detached.
fn end_index(tree: &QueryTree, source: &NodeId, len: usize, parent: &NodeId) -> usize {
    match tree.parent_of(source) {
        Some((source_parent, _)) if &source_parent == parent => len.saturating_sub(1),
        _ => len,
    }
}

fn zone_for(plan: &DropPlan, target: &NodeId, intent: DropIntent) -> DropZone {
    match plan {
        DropPlan::Combine { .. } => DropZone::Combine,
        DropPlan::Move { parent, .. } if parent == target => DropZone::Inside,
        DropPlan::Move { .. } => match intent {
            DropIntent::ReorderBefore => DropZone::Before,
            _ => DropZone::After,
        },
    }
}
