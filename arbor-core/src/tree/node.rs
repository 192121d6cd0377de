//! Typed conversation tree nodes
//!
//! A context holds a forest of rooted trees. Every node is tagged with its
//! placement kind instead of carrying loose `isRoot`/`isDirectBranch` flags:
//!
//! - `Root` - starts a top-level conversation, has no parent
//! - `DirectBranch` - attached to a root, rendered at the root's indentation
//! - `Child` - nested under its parent, one indentation level deeper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TurnId;
use crate::tree::pathway;

/// Placement of a node relative to its root
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    DirectBranch,
    Child,
}

impl NodeKind {
    /// Kind of a branch created under `parent`.
    ///
    /// Branches off a root or off a direct branch stay flattened at the root's
    /// level; branches off anything nested become nested children.
    pub fn for_branch_of(parent: &Node) -> Self {
        match parent.kind {
            NodeKind::Root | NodeKind::DirectBranch => NodeKind::DirectBranch,
            NodeKind::Child => NodeKind::Child,
        }
    }
}

/// One turn in the conversation tree
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub turn_id: TurnId,
    /// Root turn of the conversation this node belongs to
    pub conversation_id: TurnId,
    pub parent_turn_id: Option<TurnId>,
    pub kind: NodeKind,
    pub branch_label: Option<String>,
    pub children: Vec<Node>,
    /// Only ever populated on roots
    pub direct_branches: Vec<Node>,
    pub time_created: DateTime<Utc>,
}

impl Node {
    /// A new root; its conversation id is its own turn id
    pub fn root(turn_id: TurnId, time_created: DateTime<Utc>) -> Self {
        Self {
            turn_id,
            conversation_id: turn_id,
            parent_turn_id: None,
            kind: NodeKind::Root,
            branch_label: None,
            children: Vec::new(),
            direct_branches: Vec::new(),
            time_created,
        }
    }

    /// A new branch under `parent`, classified by [`NodeKind::for_branch_of`]
    pub fn branch_of(parent: &Node, turn_id: TurnId, time_created: DateTime<Utc>) -> Self {
        Self::attached_to(parent, NodeKind::for_branch_of(parent), turn_id, time_created)
    }

    /// A new nested continuation of `parent`, always a `Child`
    pub fn child_of(parent: &Node, turn_id: TurnId, time_created: DateTime<Utc>) -> Self {
        Self::attached_to(parent, NodeKind::Child, turn_id, time_created)
    }

    fn attached_to(
        parent: &Node,
        kind: NodeKind,
        turn_id: TurnId,
        time_created: DateTime<Utc>,
    ) -> Self {
        Self {
            turn_id,
            conversation_id: parent.conversation_id,
            parent_turn_id: Some(parent.turn_id),
            kind,
            branch_label: None,
            children: Vec::new(),
            direct_branches: Vec::new(),
            time_created,
        }
    }

    pub fn with_branch_label(mut self, label: impl Into<String>) -> Self {
        self.branch_label = Some(label.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }

    pub fn is_direct_branch(&self) -> bool {
        self.kind == NodeKind::DirectBranch
    }

    /// Everything attached after this node: direct branches first, then children
    pub fn attached(&self) -> impl Iterator<Item = &Node> {
        self.direct_branches.iter().chain(self.children.iter())
    }
}

/// All trees known for one context
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Forest {
    roots: Vec<Node>,
}

impl Forest {
    pub fn new(roots: Vec<Node>) -> Self {
        Self { roots }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<Node> {
        self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total node count across every tree
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(pathway::count_nodes).sum()
    }

    pub fn contains(&self, turn_id: TurnId) -> bool {
        pathway::find_node(&self.roots, turn_id).is_some()
    }

    pub fn get(&self, turn_id: TurnId) -> Option<&Node> {
        pathway::find_node(&self.roots, turn_id)
    }

    /// Insert a node at the position its kind dictates.
    ///
    /// Roots are appended to the forest, direct branches to the owning root of
    /// their parent, children to their parent. Returns `false` without
    /// touching the forest when the parent is unknown or the turn id is
    /// already present.
    pub fn attach(&mut self, node: Node) -> bool {
        if self.contains(node.turn_id) {
            return false;
        }

        match (node.kind, node.parent_turn_id) {
            (NodeKind::Root, _) => {
                self.roots.push(node);
                true
            }
            (NodeKind::DirectBranch, Some(parent)) => {
                let Some(root_id) =
                    pathway::find_owning_root(&self.roots, parent).map(|root| root.turn_id)
                else {
                    return false;
                };
                match self.roots.iter_mut().find(|root| root.turn_id == root_id) {
                    Some(root) => {
                        root.direct_branches.push(node);
                        true
                    }
                    None => false,
                }
            }
            (NodeKind::Child, Some(parent)) => {
                match pathway::find_node_mut(&mut self.roots, parent) {
                    Some(parent_node) => {
                        parent_node.children.push(node);
                        true
                    }
                    None => false,
                }
            }
            (_, None) => false,
        }
    }
}
