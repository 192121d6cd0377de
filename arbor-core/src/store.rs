//! Tree cache keyed by context
//!
//! Holds the last tree fetched for each context. A fetch replaces the cached
//! tree wholesale: there is no merging and no ordering between in-flight
//! fetches, so whichever response lands last wins. Optimistic edits are
//! applied to a private copy and swapped in.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::backend::ConversationBackend;
use crate::ids::ContextId;
use crate::tree::node::Forest;
use crate::tree::wire;

#[derive(Debug, Default)]
pub struct TreeStore {
    trees: RwLock<HashMap<ContextId, Arc<Forest>>>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last cached tree for a context, if any has been fetched
    pub fn get(&self, context: &ContextId) -> Option<Arc<Forest>> {
        self.trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context)
            .cloned()
    }

    /// Cached tree, or an empty forest when nothing has been fetched
    pub fn snapshot(&self, context: &ContextId) -> Arc<Forest> {
        self.get(context).unwrap_or_default()
    }

    /// Overwrite the cached tree for a context
    pub fn replace(&self, context: &ContextId, forest: Forest) -> Arc<Forest> {
        let forest = Arc::new(forest);
        debug!(context = %context, nodes = forest.node_count(), "Replacing cached tree");
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.clone(), Arc::clone(&forest));
        forest
    }

    /// Apply an edit to the cached tree, starting from empty if none is cached
    pub fn update<R>(&self, context: &ContextId, edit: impl FnOnce(&mut Forest) -> R) -> R {
        let mut trees = self.trees.write().unwrap_or_else(PoisonError::into_inner);
        let entry = trees.entry(context.clone()).or_default();
        edit(Arc::make_mut(entry))
    }

    pub fn clear(&self, context: &ContextId) {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context);
    }
}

/// Fetch the authoritative tree and overwrite the cache with it.
///
/// An empty or malformed payload is cached as the empty forest. A transport
/// failure leaves the cache untouched.
pub async fn refetch<B>(
    backend: &B,
    store: &TreeStore,
    context: &ContextId,
) -> anyhow::Result<Arc<Forest>>
where
    B: ConversationBackend + ?Sized,
{
    let payload = backend.fetch_tree(context).await?;
    let forest = wire::parse_lenient(payload.as_ref());
    Ok(store.replace(context, forest))
}
