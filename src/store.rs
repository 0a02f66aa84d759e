//! The Store Adapter contract: the narrow interface the engine consumes
//! from the host document store. A real host adapter is not implemented
//! here, but the trait itself, and the records it moves, live in this
//! crate because every other component is generic over it.

use serde::{Deserialize, Serialize};

use crate::Value;

/// An opaque identifier for a document (a `tree` or `node` record) in the
/// host store. Node ids and tree ids share this representation; they are
/// never compared against each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(pub u64);

/// One record per namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeRecord {
    pub namespace: Option<Value>,
    pub root: Id,
    pub max_node_size: u32,
}

/// A B-tree node. `subtrees` is empty for a leaf, or one longer than
/// `items` for an internal node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub items: Vec<(Value, String)>,
    pub subtrees: Vec<Id>,
}

impl NodeRecord {
    pub fn is_leaf(&self) -> bool {
        self.subtrees.is_empty()
    }
}

/// The storage primitive the engine is built against.
///
/// Modeled as a plain (non-`dyn`-safe-by-necessity, but object-safe in
/// practice) synchronous trait, matching the teacher's own `dyn Storage`
/// design: every method borrows `self` for exactly the duration of one
/// call, and no state is cached by the engine across calls. Synchronous
/// rather than `async fn`, matching a host document store whose operations
/// complete within a single transactional step.
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_tree(&self, id: Id) -> Result<Option<TreeRecord>, Self::Error>;

    /// Unique lookup via the `by_namespace` index.
    fn get_tree_by_namespace(
        &self,
        namespace: &Option<Value>,
    ) -> Result<Option<(Id, TreeRecord)>, Self::Error>;

    fn insert_tree(&mut self, record: TreeRecord) -> Result<Id, Self::Error>;

    fn patch_tree(&mut self, id: Id, record: TreeRecord) -> Result<(), Self::Error>;

    fn delete_tree(&mut self, id: Id) -> Result<(), Self::Error>;

    /// All Tree records ordered by id (the only total, store-provided order
    /// over namespaces).
    fn list_trees(&self) -> Result<Vec<(Id, TreeRecord)>, Self::Error>;

    fn get_node(&self, id: Id) -> Result<Option<NodeRecord>, Self::Error>;

    fn insert_node(&mut self, record: NodeRecord) -> Result<Id, Self::Error>;

    fn patch_node(&mut self, id: Id, record: NodeRecord) -> Result<(), Self::Error>;

    fn delete_node(&mut self, id: Id) -> Result<(), Self::Error>;

    /// Deferred-work scheduling: queue a node for asynchronous recursive
    /// deletion. The host scheduler drains this queue out of band;
    /// `lifecycle::run_scheduled_deletion_step` is this crate's stand-in for
    /// that drain, one bounded work item at a time.
    fn schedule_delete(&mut self, node: Id);

    fn pop_scheduled_delete(&mut self) -> Option<Id>;
}
