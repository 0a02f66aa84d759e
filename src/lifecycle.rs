//! Lifecycle: explicit namespace initialization, clearing, and the
//! deferred-deletion queue's drain step.

use crate::{node_store, Error, Result, Store, Value};

/// Explicitly initializes a namespace's Tree. Unlike the lazy
/// `get_or_create_tree` used by writes, this errors if the namespace
/// already has a Tree, so a caller can distinguish "first write created
/// this for me" from "I asked for this and it already existed".
pub fn init<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    max_node_size: Option<u32>,
    default_fanout: u32,
) -> Result<(), S::Error> {
    if node_store::get_tree(store, namespace)?.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    node_store::get_or_create_tree(store, namespace, max_node_size, default_fanout)?;
    Ok(())
}

/// Empties a namespace: if a Tree exists, deletes the record and hands its
/// root node to the deferred-deletion queue, then recreates an empty Tree
/// at `max_node_size` (falling back to the just-deleted tree's own fanout,
/// then to `default_fanout`, exactly like `get_or_create_tree`). Safe to
/// call on a namespace with no Tree yet; it simply creates one.
pub fn clear<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    max_node_size: Option<u32>,
    default_fanout: u32,
) -> Result<(), S::Error> {
    let preserved_fanout = if let Some((tree_id, tree)) = node_store::get_tree(store, namespace)? {
        node_store::delete_tree(store, tree_id)?;
        store.schedule_delete(tree.root);
        log::debug!(
            "cleared namespace {:?}, scheduled subtree at {:?} for deferred deletion",
            namespace,
            tree.root
        );
        Some(tree.max_node_size)
    } else {
        None
    };

    node_store::get_or_create_tree(store, namespace, max_node_size.or(preserved_fanout), default_fanout)?;
    Ok(())
}

/// Performs one bounded unit of deferred deletion: pops a single queued
/// node, deletes it, and re-enqueues its direct children (if any) for a
/// future step. Returns `false` once the queue is drained. A whole
/// namespace's worth of nodes is reclaimed over many calls to this, never
/// in one unbounded recursive sweep.
pub fn run_scheduled_deletion_step<S: Store>(store: &mut S) -> Result<bool, S::Error> {
    let Some(node_id) = store.pop_scheduled_delete() else {
        return Ok(false);
    };

    if let Some(node) = store.get_node(node_id).map_err(Error::Store)? {
        for child in &node.subtrees {
            store.schedule_delete(*child);
        }
        let children = node.subtrees.len();
        node_store::delete_node(store, node_id)?;
        log::trace!("deferred-deleted node {:?}, enqueued {} children", node_id, children);
    }

    Ok(true)
}
