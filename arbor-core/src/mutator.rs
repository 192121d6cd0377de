//! Branch and root creation with optimistic local insertion
//!
//! The server is asked to create the node first. Once it answers with the new
//! turn id, the node is attached to the cached tree right away so the UI can
//! move to it, and `reconcile` later replaces the whole cached tree with the
//! server's copy.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::ConversationBackend;
use crate::error::{ArborError, Result};
use crate::ids::{ContextId, TurnId};
use crate::store::{self, TreeStore};
use crate::tree::node::{Forest, Node};

/// A node the server has created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Created {
    pub turn_id: TurnId,
    pub parent: Option<TurnId>,
    /// Whether the node could be attached to the cached tree ahead of the refetch
    pub attached_locally: bool,
}

pub struct BranchMutator<B: ConversationBackend + ?Sized> {
    backend: Arc<B>,
    store: Arc<TreeStore>,
    context: ContextId,
}

impl<B: ConversationBackend + ?Sized> BranchMutator<B> {
    pub fn new(backend: Arc<B>, store: Arc<TreeStore>, context: ContextId) -> Self {
        Self {
            backend,
            store,
            context,
        }
    }

    /// Ask the server for a new branch under `parent` and attach it locally
    pub async fn create_branch(&self, parent: TurnId) -> Result<Created> {
        let reply = self
            .backend
            .create_branch(&self.context, parent)
            .await
            .map_err(ArborError::transport)?;
        let turn_id = reply.into_outcome().map_err(ArborError::Rejected)?;

        let attached_locally = self
            .store
            .update(&self.context, |forest| attach_branch(forest, parent, turn_id));
        if !attached_locally {
            warn!(parent = %parent, turn = %turn_id, "Parent not in cached tree; waiting for refetch");
        }

        info!(context = %self.context, parent = %parent, turn = %turn_id, "Branch created");
        Ok(Created {
            turn_id,
            parent: Some(parent),
            attached_locally,
        })
    }

    /// Ask the server for a new top-level conversation and attach it locally
    pub async fn create_root(&self) -> Result<Created> {
        let reply = self
            .backend
            .create_root(&self.context)
            .await
            .map_err(ArborError::transport)?;
        let turn_id = reply.into_outcome().map_err(ArborError::Rejected)?;

        let attached_locally = self
            .store
            .update(&self.context, |forest| forest.attach(Node::root(turn_id, Utc::now())));

        info!(context = %self.context, turn = %turn_id, "Root created");
        Ok(Created {
            turn_id,
            parent: None,
            attached_locally,
        })
    }

    /// Replace the cached tree, optimistic nodes included, with the server's
    pub async fn reconcile(&self) -> Result<Arc<Forest>> {
        store::refetch(self.backend.as_ref(), &self.store, &self.context)
            .await
            .map_err(ArborError::transport)
    }
}

fn attach_branch(forest: &mut Forest, parent: TurnId, turn_id: TurnId) -> bool {
    let node = match forest.get(parent) {
        Some(parent_node) => Node::branch_of(parent_node, turn_id, Utc::now()),
        None => return false,
    };
    forest.attach(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation};
    use crate::tree::node::NodeKind;

    fn setup() -> (Arc<MemoryBackend>, Arc<TreeStore>, BranchMutator<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(TreeStore::new());
        let mutator = BranchMutator::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            ContextId::from("ctx"),
        );
        (backend, store, mutator)
    }

    #[tokio::test]
    async fn test_branch_is_visible_before_refetch() {
        let (_backend, store, mutator) = setup();
        let root = mutator.create_root().await.unwrap();
        assert!(root.attached_locally);

        let branch = mutator.create_branch(root.turn_id).await.unwrap();
        assert!(branch.attached_locally);

        let forest = store.snapshot(&ContextId::from("ctx"));
        let node = forest.get(branch.turn_id).unwrap();
        assert_eq!(node.parent_turn_id, Some(root.turn_id));
        assert_eq!(node.kind, NodeKind::DirectBranch);
    }

    #[tokio::test]
    async fn test_branch_of_branch_stays_direct() {
        let (_backend, store, mutator) = setup();
        let root = mutator.create_root().await.unwrap();
        let first = mutator.create_branch(root.turn_id).await.unwrap();
        let second = mutator.create_branch(first.turn_id).await.unwrap();

        let forest = store.snapshot(&ContextId::from("ctx"));
        let node = forest.get(second.turn_id).unwrap();
        assert_eq!(node.parent_turn_id, Some(first.turn_id));
        assert!(node.is_direct_branch());
        assert_eq!(forest.roots()[0].direct_branches.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_matches_server() {
        let (backend, store, mutator) = setup();
        let root = mutator.create_root().await.unwrap();
        mutator.create_branch(root.turn_id).await.unwrap();

        let reconciled = mutator.reconcile().await.unwrap();
        assert_eq!(reconciled.node_count(), 2);
        assert_eq!(
            crate::tree::all_turn_ids(&reconciled),
            crate::tree::all_turn_ids(&backend.forest(&ContextId::from("ctx")))
        );
        assert_eq!(store.snapshot(&ContextId::from("ctx")).node_count(), 2);
    }

    #[tokio::test]
    async fn test_failures_leave_tree_untouched() {
        let (backend, store, mutator) = setup();
        let root = mutator.create_root().await.unwrap();

        backend.fail_next(Operation::CreateBranch);
        let err = mutator.create_branch(root.turn_id).await.unwrap_err();
        assert!(matches!(err, ArborError::Transport(_)));

        backend.reject_next(Operation::CreateBranch, "limit reached");
        let err = mutator.create_branch(root.turn_id).await.unwrap_err();
        assert!(matches!(err, ArborError::Rejected(ref m) if m == "limit reached"));

        assert_eq!(store.snapshot(&ContextId::from("ctx")).node_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_parent_in_cache_is_fail_safe() {
        let (backend, store, mutator) = setup();
        // server knows the root, the local cache does not
        let root = backend
            .create_root(&ContextId::from("ctx"))
            .await
            .unwrap()
            .into_outcome()
            .unwrap();

        let branch = mutator.create_branch(root).await.unwrap();
        assert!(!branch.attached_locally);
        assert!(store.snapshot(&ContextId::from("ctx")).is_empty());

        mutator.reconcile().await.unwrap();
        assert!(store.snapshot(&ContextId::from("ctx")).contains(branch.turn_id));
    }
}
