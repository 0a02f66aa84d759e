//! The Node Store: a typed view over the `tree` and `node` tables.

use crate::{Error, Id, NodeRecord, Result, Store, TreeRecord, Value};

pub const DEFAULT_MAX_NODE_SIZE: u32 = 16;

pub fn validate_fanout<E: std::error::Error + 'static>(max_node_size: u32) -> Result<u32, E> {
    if max_node_size < 4 || max_node_size % 2 != 0 {
        return Err(Error::InvalidFanout(max_node_size));
    }
    Ok(max_node_size / 2)
}

pub fn get_tree<S: Store>(
    store: &S,
    namespace: &Option<Value>,
) -> Result<Option<(Id, TreeRecord)>, S::Error> {
    store.get_tree_by_namespace(namespace).map_err(Error::Store)
}

pub fn must_get_tree<S: Store>(store: &S, namespace: &Option<Value>) -> Result<(Id, TreeRecord), S::Error> {
    get_tree(store, namespace)?.ok_or(Error::NotInitialized)
}

/// Default fanout for a newly-created tree: the fanout of the
/// default-namespace tree if one exists, else `fallback`.
fn default_max_node_size<S: Store>(store: &S, fallback: u32) -> Result<u32, S::Error> {
    Ok(get_tree(store, &None)?
        .map(|(_, t)| t.max_node_size)
        .unwrap_or(fallback))
}

pub fn get_or_create_tree<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    max_node_size: Option<u32>,
    fallback_max_node_size: u32,
) -> Result<(Id, TreeRecord), S::Error> {
    if let Some(existing) = get_tree(store, namespace)? {
        return Ok(existing);
    }

    let max_node_size = match max_node_size {
        Some(m) => m,
        None => default_max_node_size(store, fallback_max_node_size)?,
    };
    validate_fanout::<S::Error>(max_node_size)?;

    let root = insert_node(store, NodeRecord::default())?;
    let record = TreeRecord {
        namespace: namespace.clone(),
        root,
        max_node_size,
    };
    let id = store.insert_tree(record.clone()).map_err(Error::Store)?;

    log::debug!(
        "created tree for namespace {:?} with max_node_size={}",
        namespace,
        max_node_size
    );

    Ok((id, record))
}

pub fn patch_tree<S: Store>(store: &mut S, id: Id, record: TreeRecord) -> Result<(), S::Error> {
    store.patch_tree(id, record).map_err(Error::Store)
}

pub fn delete_tree<S: Store>(store: &mut S, id: Id) -> Result<(), S::Error> {
    store.delete_tree(id).map_err(Error::Store)
}

pub fn get_node<S: Store>(store: &S, id: Id) -> Result<NodeRecord, S::Error> {
    store
        .get_node(id)
        .map_err(Error::Store)?
        .ok_or_else(|| Error::InvariantViolation(format!("node {:?} not found", id)))
}

pub fn insert_node<S: Store>(store: &mut S, record: NodeRecord) -> Result<Id, S::Error> {
    store.insert_node(record).map_err(Error::Store)
}

pub fn patch_node<S: Store>(store: &mut S, id: Id, record: NodeRecord) -> Result<(), S::Error> {
    store.patch_node(id, record).map_err(Error::Store)
}

pub fn delete_node<S: Store>(store: &mut S, id: Id) -> Result<(), S::Error> {
    store.delete_node(id).map_err(Error::Store)
}
