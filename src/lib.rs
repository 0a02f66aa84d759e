//! `btree_index`: a namespaced, ordered B-tree index over an external
//! transactional document store.
//!
//! The crate is generic over the host's [`Store`] trait; it defines no
//! wire format of its own and holds no connection. A host wires up `Store`
//! against whatever document store it already has, and gets point lookups,
//! ordered range pagination, and namespace management on top of it.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod node_store;
pub mod pagination;
pub mod store;
pub mod testing;
pub mod value;

pub use catalog::NamespacePage;
pub use engine::{Bound, Order};
pub use error::{Error, Result};
pub use pagination::Page;
pub use store::{Id, NodeRecord, Store, TreeRecord};
pub use value::Value;

/// Tunable defaults for namespaces created without an explicit fanout.
#[derive(Clone, Debug)]
pub struct Config {
    pub default_max_node_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { default_max_node_size: node_store::DEFAULT_MAX_NODE_SIZE }
    }
}

/// The facade: every external operation, generic over the host [`Store`].
///
/// Holds no cached tree state of its own; every call re-reads whatever it
/// needs from `S` and writes back through it, so a `BTreeIndex` is cheap to
/// construct around a store handle per request.
pub struct BTreeIndex<S: Store> {
    store: S,
    config: Config,
}

impl<S: Store> BTreeIndex<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: S, config: Config) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Explicitly creates a namespace's Tree; errors if one already exists.
    pub fn init(&mut self, namespace: Option<Value>, max_node_size: Option<u32>) -> Result<(), S::Error> {
        lifecycle::init(&mut self.store, &namespace, max_node_size, self.config.default_max_node_size)
    }

    /// Empties a namespace: queues its existing nodes for deferred
    /// deletion and recreates an empty Tree, preserving its fanout unless
    /// `max_node_size` overrides it.
    pub fn clear(&mut self, namespace: Option<Value>, max_node_size: Option<u32>) -> Result<(), S::Error> {
        lifecycle::clear(&mut self.store, &namespace, max_node_size, self.config.default_max_node_size)
    }

    /// Clears every namespace in the store.
    pub fn clear_all(&mut self) -> Result<(), S::Error> {
        catalog::clear_all(&mut self.store, self.config.default_max_node_size)
    }

    /// Performs one bounded unit of deferred node deletion. Returns `false`
    /// once the queue is empty; callers drive this in a loop (or via the
    /// host's own scheduler) until it does.
    pub fn run_scheduled_deletion_step(&mut self) -> Result<bool, S::Error> {
        lifecycle::run_scheduled_deletion_step(&mut self.store)
    }

    pub fn insert(&mut self, namespace: Option<Value>, key: Value, value: String) -> Result<(), S::Error> {
        engine::insert(&mut self.store, &namespace, key, value, self.config.default_max_node_size)
    }

    pub fn insert_if_does_not_exist(
        &mut self,
        namespace: Option<Value>,
        key: Value,
        value: String,
    ) -> Result<(), S::Error> {
        engine::insert_if_does_not_exist(&mut self.store, &namespace, key, value, self.config.default_max_node_size)
    }

    pub fn delete(&mut self, namespace: Option<Value>, key: &Value) -> Result<(Value, String), S::Error> {
        engine::delete(&mut self.store, &namespace, key, self.config.default_max_node_size)
    }

    pub fn delete_if_exists(&mut self, namespace: Option<Value>, key: &Value) -> Result<(), S::Error> {
        engine::delete_if_exists(&mut self.store, &namespace, key, self.config.default_max_node_size)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn replace(
        &mut self,
        namespace: Option<Value>,
        new_namespace: Option<Value>,
        current_key: &Value,
        new_key: Value,
        value: String,
    ) -> Result<(), S::Error> {
        engine::replace(
            &mut self.store,
            &namespace,
            &new_namespace,
            current_key,
            new_key,
            value,
            self.config.default_max_node_size,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn replace_or_insert(
        &mut self,
        namespace: Option<Value>,
        new_namespace: Option<Value>,
        current_key: &Value,
        new_key: Value,
        value: String,
    ) -> Result<(), S::Error> {
        engine::replace_or_insert(
            &mut self.store,
            &namespace,
            &new_namespace,
            current_key,
            new_key,
            value,
            self.config.default_max_node_size,
        )
    }

    pub fn get(&self, namespace: Option<Value>, key: &Value) -> Result<Option<(Value, String)>, S::Error> {
        engine::get_in_namespace(&self.store, &namespace, key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn paginate(
        &self,
        namespace: Option<Value>,
        order: Order,
        k1: Option<Value>,
        k2: Option<Value>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, S::Error> {
        pagination::paginate(&self.store, &namespace, order, k1, k2, cursor, limit)
    }

    pub fn paginate_namespaces(&self, cursor: Option<&str>, limit: usize) -> Result<NamespacePage, S::Error> {
        catalog::paginate_namespaces(&self.store, cursor, limit)
    }

    /// Re-walks the whole namespace, re-checking every structural
    /// invariant. Not on any write path; exposed for tests and operational
    /// sanity checks.
    pub fn validate(&self, namespace: Option<Value>) -> Result<(), S::Error> {
        engine::validate(&self.store, &namespace)
    }
}
