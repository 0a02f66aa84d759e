//! An in-memory reference `Store`, for this crate's own tests and for any
//! downstream crate wiring up an in-process test double. Not a production
//! adapter; see `src/store.rs`.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use crate::{Id, NodeRecord, Store, TreeRecord, Value};

#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: HashMap<Id, TreeRecord>,
    nodes: HashMap<Id, NodeRecord>,
    scheduled: VecDeque<Id>,
    next_id: u64,
    node_reads: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        id
    }

    /// Number of node records currently live. Exposed for tests asserting
    /// that merges/scheduled deletion actually free nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of deletions still queued but not yet drained.
    pub fn pending_deletions(&self) -> usize {
        self.scheduled.len()
    }

    /// Number of `get_node` calls served since the last `reset_node_reads`.
    /// Exposed for tests asserting the range walker's laziness: a bounded
    /// walk or a deep cursor resume should cost O(page + height) reads,
    /// not O(tree size).
    pub fn node_reads(&self) -> usize {
        self.node_reads.get()
    }

    pub fn reset_node_reads(&self) {
        self.node_reads.set(0);
    }
}

impl Store for MemoryStore {
    type Error = std::convert::Infallible;

    fn get_tree(&self, id: Id) -> Result<Option<TreeRecord>, Self::Error> {
        Ok(self.trees.get(&id).cloned())
    }

    fn get_tree_by_namespace(
        &self,
        namespace: &Option<Value>,
    ) -> Result<Option<(Id, TreeRecord)>, Self::Error> {
        Ok(self
            .trees
            .iter()
            .find(|(_, t)| &t.namespace == namespace)
            .map(|(id, t)| (*id, t.clone())))
    }

    fn insert_tree(&mut self, record: TreeRecord) -> Result<Id, Self::Error> {
        let id = self.fresh_id();
        self.trees.insert(id, record);
        Ok(id)
    }

    fn patch_tree(&mut self, id: Id, record: TreeRecord) -> Result<(), Self::Error> {
        self.trees.insert(id, record);
        Ok(())
    }

    fn delete_tree(&mut self, id: Id) -> Result<(), Self::Error> {
        self.trees.remove(&id);
        Ok(())
    }

    fn list_trees(&self) -> Result<Vec<(Id, TreeRecord)>, Self::Error> {
        let mut all: Vec<_> = self.trees.iter().map(|(id, t)| (*id, t.clone())).collect();
        all.sort_by_key(|(id, _)| *id);
        Ok(all)
    }

    fn get_node(&self, id: Id) -> Result<Option<NodeRecord>, Self::Error> {
        self.node_reads.set(self.node_reads.get() + 1);
        Ok(self.nodes.get(&id).cloned())
    }

    fn insert_node(&mut self, record: NodeRecord) -> Result<Id, Self::Error> {
        let id = self.fresh_id();
        self.nodes.insert(id, record);
        Ok(id)
    }

    fn patch_node(&mut self, id: Id, record: NodeRecord) -> Result<(), Self::Error> {
        self.nodes.insert(id, record);
        Ok(())
    }

    fn delete_node(&mut self, id: Id) -> Result<(), Self::Error> {
        self.nodes.remove(&id);
        Ok(())
    }

    fn schedule_delete(&mut self, node: Id) {
        self.scheduled.push_back(node);
    }

    fn pop_scheduled_delete(&mut self) -> Option<Id> {
        self.scheduled.pop_front()
    }
}
