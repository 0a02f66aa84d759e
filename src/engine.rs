//! The B-tree Engine: insert, delete, get, range filter, rotate, merge,
//! split, root promotion and collapse.
//!
//! Insert and delete are expressed recursively, descent-then-fixup, exactly
//! like the teacher's own `apply_at`/`get_at`. Recursion depth is bounded by
//! tree height (`log_{M/2}(N)`), so this does not risk stack exhaustion in
//! practice; the range walker below instead uses an explicit frame stack,
//! since a page walk's "depth" (the number of pages produced) is unbounded
//! in principle.

use crate::{node_store, Error, Id, NodeRecord, Result, Store, TreeRecord, Value};

fn locate(items: &[(Value, String)], key: &Value) -> std::result::Result<usize, usize> {
    items.binary_search_by(|(k, _)| k.cmp(key))
}

struct PushUp {
    separator: (Value, String),
    left: Id,
    right: Id,
}

fn split<S: Store>(
    store: &mut S,
    node_id: Id,
    mut node: NodeRecord,
    min: usize,
    max: usize,
) -> Result<Option<PushUp>, S::Error> {
    if node.items.len() <= max {
        node_store::patch_node(store, node_id, node)?;
        return Ok(None);
    }

    debug_assert_eq!(node.items.len(), max + 1, "node overflowed by more than one item");

    let is_leaf = node.is_leaf();
    let right_items = node.items.split_off(min + 1);
    let separator = node.items.pop().expect("split point exists");
    let right_subtrees = if is_leaf { Vec::new() } else { node.subtrees.split_off(min + 1) };

    node_store::patch_node(store, node_id, node)?;
    let right_id = node_store::insert_node(
        store,
        NodeRecord { items: right_items, subtrees: right_subtrees },
    )?;

    log::trace!("split node {:?}, new sibling {:?}", node_id, right_id);

    Ok(Some(PushUp { separator, left: node_id, right: right_id }))
}

fn insert_at<S: Store>(
    store: &mut S,
    node_id: Id,
    key: &Value,
    value: &str,
    min: usize,
    max: usize,
) -> Result<Option<PushUp>, S::Error> {
    let mut node = node_store::get_node(store, node_id)?;
    let idx = match locate(&node.items, key) {
        Ok(_) => return Err(Error::DuplicateKey),
        Err(i) => i,
    };

    if node.is_leaf() {
        node.items.insert(idx, (key.clone(), value.to_string()));
    } else {
        let child_id = node.subtrees[idx];
        let Some(pu) = insert_at(store, child_id, key, value, min, max)? else {
            return Ok(None);
        };
        node.items.insert(idx, pu.separator);
        node.subtrees.splice(idx..=idx, [pu.left, pu.right]);
    }

    split(store, node_id, node, min, max)
}

pub fn insert<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    key: Value,
    value: String,
    default_fanout: u32,
) -> Result<(), S::Error> {
    let (tree_id, tree) = node_store::get_or_create_tree(store, namespace, None, default_fanout)?;
    let min = (tree.max_node_size / 2) as usize;
    let max = tree.max_node_size as usize;

    if let Some(pu) = insert_at(store, tree.root, &key, &value, min, max)? {
        let new_root = node_store::insert_node(
            store,
            NodeRecord { items: vec![pu.separator], subtrees: vec![pu.left, pu.right] },
        )?;
        node_store::patch_tree(store, tree_id, TreeRecord { root: new_root, ..tree })?;
        log::debug!("root of namespace {:?} promoted to {:?}", namespace, new_root);
    }

    Ok(())
}

fn get<S: Store>(store: &S, node_id: Id, key: &Value) -> Result<Option<(Value, String)>, S::Error> {
    let node = node_store::get_node(store, node_id)?;
    match locate(&node.items, key) {
        Ok(i) => Ok(Some(node.items[i].clone())),
        Err(i) => {
            if node.is_leaf() {
                Ok(None)
            } else {
                get(store, node.subtrees[i], key)
            }
        }
    }
}

pub fn get_in_namespace<S: Store>(
    store: &S,
    namespace: &Option<Value>,
    key: &Value,
) -> Result<Option<(Value, String)>, S::Error> {
    let (_, tree) = node_store::must_get_tree(store, namespace)?;
    get(store, tree.root, key)
}

fn find_max<S: Store>(store: &S, node_id: Id) -> Result<(Value, String), S::Error> {
    let node = node_store::get_node(store, node_id)?;
    if node.is_leaf() {
        node.items
            .last()
            .cloned()
            .ok_or_else(|| Error::InvariantViolation(format!("leaf {:?} is empty during find_max", node_id)))
    } else {
        let last_child = *node.subtrees.last().expect("internal node has subtrees");
        find_max(store, last_child)
    }
}

fn rebalance_after_delete<S: Store>(
    store: &mut S,
    parent_id: Id,
    child_index: usize,
    min: usize,
) -> Result<(), S::Error> {
    let mut parent = node_store::get_node(store, parent_id)?;
    let child_id = parent.subtrees[child_index];
    let mut child = node_store::get_node(store, child_id)?;

    if child.items.len() >= min {
        return Ok(());
    }

    // rule 1: rotate right from the left sibling
    if child_index > 0 {
        let left_id = parent.subtrees[child_index - 1];
        let mut left = node_store::get_node(store, left_id)?;
        if left.items.len() > min {
            let old_separator = parent.items[child_index - 1].clone();
            child.items.insert(0, old_separator);
            if !child.is_leaf() {
                let moved = left.subtrees.pop().expect("internal sibling has a trailing subtree");
                child.subtrees.insert(0, moved);
            }
            parent.items[child_index - 1] = left.items.pop().expect("left sibling has a surplus item");

            node_store::patch_node(store, left_id, left)?;
            node_store::patch_node(store, child_id, child)?;
            node_store::patch_node(store, parent_id, parent)?;
            log::trace!("rotated right into {:?} from left sibling {:?}", child_id, left_id);
            return Ok(());
        }
    }

    // rule 2: rotate left from the right sibling
    if child_index + 1 < parent.subtrees.len() {
        let right_id = parent.subtrees[child_index + 1];
        let mut right = node_store::get_node(store, right_id)?;
        if right.items.len() > min {
            let old_separator = parent.items[child_index].clone();
            child.items.push(old_separator);
            if !child.is_leaf() {
                let moved = right.subtrees.remove(0);
                child.subtrees.push(moved);
            }
            parent.items[child_index] = right.items.remove(0);

            node_store::patch_node(store, right_id, right)?;
            node_store::patch_node(store, child_id, child)?;
            node_store::patch_node(store, parent_id, parent)?;
            log::trace!("rotated left into {:?} from right sibling {:?}", child_id, right_id);
            return Ok(());
        }
    }

    // rule 3: merge, preferring the left sibling when one exists
    if child_index > 0 {
        let left_id = parent.subtrees[child_index - 1];
        let mut left = node_store::get_node(store, left_id)?;
        let separator = parent.items.remove(child_index - 1);
        left.items.push(separator);
        left.items.extend(child.items);
        left.subtrees.extend(child.subtrees);
        parent.subtrees.remove(child_index);

        node_store::patch_node(store, left_id, left)?;
        node_store::delete_node(store, child_id)?;
        node_store::patch_node(store, parent_id, parent)?;
        log::trace!("merged {:?} into left sibling {:?}", child_id, left_id);
    } else {
        let right_id = parent.subtrees[child_index + 1];
        let right = node_store::get_node(store, right_id)?;
        let separator = parent.items.remove(child_index);
        child.items.push(separator);
        child.items.extend(right.items);
        child.subtrees.extend(right.subtrees);
        parent.subtrees.remove(child_index + 1);

        node_store::patch_node(store, child_id, child)?;
        node_store::delete_node(store, right_id)?;
        node_store::patch_node(store, parent_id, parent)?;
        log::trace!("merged right sibling {:?} into {:?}", right_id, child_id);
    }

    Ok(())
}

fn delete_at<S: Store>(
    store: &mut S,
    node_id: Id,
    key: &Value,
    min: usize,
) -> Result<(Value, String), S::Error> {
    let mut node = node_store::get_node(store, node_id)?;

    match locate(&node.items, key) {
        Ok(i) => {
            if node.is_leaf() {
                let removed = node.items.remove(i);
                node_store::patch_node(store, node_id, node)?;
                Ok(removed)
            } else {
                let removed = node.items[i].clone();
                let child_id = node.subtrees[i];
                let predecessor = find_max(store, child_id)?;
                node.items[i] = predecessor.clone();
                node_store::patch_node(store, node_id, node)?;
                delete_at(store, child_id, &predecessor.0, min)?;
                rebalance_after_delete(store, node_id, i, min)?;
                Ok(removed)
            }
        }
        Err(i) => {
            if node.is_leaf() {
                Err(Error::MissingKey)
            } else {
                let child_id = node.subtrees[i];
                let removed = delete_at(store, child_id, key, min)?;
                rebalance_after_delete(store, node_id, i, min)?;
                Ok(removed)
            }
        }
    }
}

pub fn delete<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    key: &Value,
    default_fanout: u32,
) -> Result<(Value, String), S::Error> {
    let (tree_id, tree) = node_store::get_or_create_tree(store, namespace, None, default_fanout)?;
    let min = (tree.max_node_size / 2) as usize;

    let removed = delete_at(store, tree.root, key, min)?;

    let root = node_store::get_node(store, tree.root)?;
    if !root.is_leaf() && root.items.is_empty() {
        debug_assert_eq!(root.subtrees.len(), 1, "uncollapsed root has {} subtrees", root.subtrees.len());
        let new_root = root.subtrees[0];
        node_store::delete_node(store, tree.root)?;
        node_store::patch_tree(store, tree_id, TreeRecord { root: new_root, ..tree })?;
        log::debug!("root of namespace {:?} collapsed to {:?}", namespace, new_root);
    }

    Ok(removed)
}

pub fn delete_if_exists<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    key: &Value,
    default_fanout: u32,
) -> Result<(), S::Error> {
    match delete(store, namespace, key, default_fanout) {
        Ok(_) => Ok(()),
        Err(Error::MissingKey) => Ok(()),
        Err(e) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn replace<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    new_namespace: &Option<Value>,
    current_key: &Value,
    new_key: Value,
    value: String,
    default_fanout: u32,
) -> Result<(), S::Error> {
    delete(store, namespace, current_key, default_fanout)?;
    insert(store, new_namespace, new_key, value, default_fanout)
}

#[allow(clippy::too_many_arguments)]
pub fn replace_or_insert<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    new_namespace: &Option<Value>,
    current_key: &Value,
    new_key: Value,
    value: String,
    default_fanout: u32,
) -> Result<(), S::Error> {
    match delete(store, namespace, current_key, default_fanout) {
        Ok(_) => {}
        Err(Error::MissingKey) => {}
        Err(e) => return Err(e),
    }
    insert(store, new_namespace, new_key, value, default_fanout)
}

pub fn insert_if_does_not_exist<S: Store>(
    store: &mut S,
    namespace: &Option<Value>,
    key: Value,
    value: String,
    default_fanout: u32,
) -> Result<(), S::Error> {
    replace_or_insert(store, namespace, namespace, &key.clone(), key, value, default_fanout)
}

/// Iteration order for the range walk and pagination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A one-sided bound used by the range filter. `Exclusive` is how a resumed
/// pagination cursor is expressed, which is what keeps cursors stable
/// across intervening writes: a cursor pins "strictly after this key", not
/// a row offset.
#[derive(Clone, Debug)]
pub enum Bound {
    Unbounded,
    Inclusive(Value),
    Exclusive(Value),
}

impl Bound {
    fn allows_low(&self, v: &Value) -> bool {
        match self {
            Bound::Unbounded => true,
            Bound::Inclusive(b) => v >= b,
            Bound::Exclusive(b) => v > b,
        }
    }

    fn allows_high(&self, v: &Value) -> bool {
        match self {
            Bound::Unbounded => true,
            Bound::Inclusive(b) => v <= b,
            Bound::Exclusive(b) => v < b,
        }
    }
}

/// Whether a subtree known to hold only keys in `(lower, upper)` (either
/// end open, i.e. unknown) is guaranteed to hold only keys within
/// `[low, high]`. Uses just the neighbouring separator keys already held
/// in the parent node, not the subtree's own contents, which is what lets
/// a caller skip loading the subtree entirely.
fn wholly_in(low: &Bound, high: &Bound, lower: Option<&Value>, upper: Option<&Value>) -> bool {
    let low_ok = match low {
        Bound::Unbounded => true,
        Bound::Inclusive(b) | Bound::Exclusive(b) => lower.is_some_and(|lo| lo >= b),
    };
    let high_ok = match high {
        Bound::Unbounded => true,
        Bound::Inclusive(b) | Bound::Exclusive(b) => upper.is_some_and(|hi| hi <= b),
    };
    low_ok && high_ok
}

/// The symmetric check: whether a subtree bounded by `(lower, upper)` is
/// guaranteed to hold no key within `[low, high]` at all, so it can be
/// dropped from the walk without ever being loaded.
fn wholly_out(low: &Bound, high: &Bound, lower: Option<&Value>, upper: Option<&Value>) -> bool {
    let below_low = match low {
        Bound::Unbounded => false,
        Bound::Inclusive(b) | Bound::Exclusive(b) => upper.is_some_and(|hi| hi <= b),
    };
    let above_high = match high {
        Bound::Unbounded => false,
        Bound::Inclusive(b) | Bound::Exclusive(b) => lower.is_some_and(|lo| lo >= b),
    };
    below_low || above_high
}

/// One level of the walk. `node` is loaded lazily, the first time the
/// frame reaches the top of the stack and its items or children are
/// actually needed. `trusted` marks a subtree already proven (via
/// `wholly_in`, from the key context of its parent) to hold only keys in
/// range, so every item and child it yields can skip the bound checks
/// that an untrusted frame still re-runs on every item.
struct Frame {
    id: Id,
    node: Option<NodeRecord>,
    step: usize,
    descended: bool,
    trusted: bool,
    lower: Option<Value>,
    upper: Option<Value>,
}

/// The range filter of §4.3.5: an in-order (or reverse) walk that produces
/// a mix of concrete items and, for subtrees already provably within
/// `[low, high]`, opaque references it never loads unless a caller keeps
/// pulling. This is the fast path that lets an unbounded or deep-cursor
/// page cost O(page size + tree height) node loads rather than O(tree
/// size): once a subtree is found wholly in range from its parent's own
/// separator keys, the walker descends into it only on demand and never
/// bound-checks its contents again, in the spirit of the teacher's
/// `TreeIterator` (`visited_nodes: Vec<Node<K, V>>`).
pub struct RangeWalker {
    order: Order,
    low: Bound,
    high: Bound,
    stack: Vec<Frame>,
}

impl RangeWalker {
    pub fn new<S: Store>(_store: &S, root: Id, low: Bound, high: Bound, order: Order) -> Result<Self, S::Error> {
        let trusted = wholly_in(&low, &high, None, None);
        let frame = Frame { id: root, node: None, step: 0, descended: false, trusted, lower: None, upper: None };
        Ok(Self { order, low, high, stack: vec![frame] })
    }

    pub fn next<S: Store>(&mut self, store: &S) -> Result<Option<(Value, String)>, S::Error> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            if frame.node.is_none() {
                frame.node = Some(node_store::get_node(store, frame.id)?);
            }
            let node = frame.node.as_ref().expect("just loaded above");
            let total = node.items.len();

            if !node.is_leaf() && !frame.descended {
                let child_pos = match self.order {
                    Order::Asc => frame.step,
                    Order::Desc => total - frame.step,
                };
                let child_lower = if child_pos == 0 { frame.lower.clone() } else { Some(node.items[child_pos - 1].0.clone()) };
                let child_upper =
                    if child_pos == total { frame.upper.clone() } else { Some(node.items[child_pos].0.clone()) };
                let child_id = node.subtrees[child_pos];
                frame.descended = true;

                let skip = !frame.trusted && wholly_out(&self.low, &self.high, child_lower.as_ref(), child_upper.as_ref());
                if skip {
                    log::trace!("range walk skipped subtree {:?}, provably out of range", child_id);
                    continue;
                }

                let child_trusted = frame.trusted || wholly_in(&self.low, &self.high, child_lower.as_ref(), child_upper.as_ref());
                self.stack.push(Frame {
                    id: child_id,
                    node: None,
                    step: 0,
                    descended: false,
                    trusted: child_trusted,
                    lower: child_lower,
                    upper: child_upper,
                });
                continue;
            }

            if frame.step == total {
                self.stack.pop();
                continue;
            }

            let item_pos = match self.order {
                Order::Asc => frame.step,
                Order::Desc => total - 1 - frame.step,
            };
            let (key, value) = node.items[item_pos].clone();
            let trusted = frame.trusted;
            frame.step += 1;
            frame.descended = false;

            if trusted {
                return Ok(Some((key, value)));
            }

            let past_far_bound = match self.order {
                Order::Asc => !self.high.allows_high(&key),
                Order::Desc => !self.low.allows_low(&key),
            };
            if past_far_bound {
                self.stack.clear();
                return Ok(None);
            }

            let within_near_bound = match self.order {
                Order::Asc => self.low.allows_low(&key),
                Order::Desc => self.high.allows_high(&key),
            };
            if !within_near_bound {
                continue;
            }

            return Ok(Some((key, value)));
        }
    }
}

/// `validate`: walks the whole tree re-checking every structural invariant,
/// returning `InvariantViolation` on the first break found.
pub fn validate<S: Store>(store: &S, namespace: &Option<Value>) -> Result<(), S::Error> {
    let Some((_, tree)) = node_store::get_tree(store, namespace)? else {
        return Ok(());
    };
    let min = (tree.max_node_size / 2) as usize;
    let max = tree.max_node_size as usize;
    check_node(store, tree.root, true, min, max, None, None)?;
    Ok(())
}

fn violation<E: std::error::Error + 'static>(node_id: Id, msg: String) -> Error<E> {
    log::warn!("invariant violation at node {:?}: {}", node_id, msg);
    Error::InvariantViolation(msg)
}

fn check_node<S: Store>(
    store: &S,
    node_id: Id,
    is_root: bool,
    min: usize,
    max: usize,
    lower: Option<&Value>,
    upper: Option<&Value>,
) -> Result<usize, S::Error> {
    let node = node_store::get_node(store, node_id)?;

    if is_root {
        if node.items.len() > max {
            return Err(violation(node_id, format!("root has {} items, expected <= {}", node.items.len(), max)));
        }
        if !node.is_leaf() && node.items.is_empty() {
            return Err(violation(node_id, "root is uncollapsed: internal with zero items".to_string()));
        }
    } else if node.items.len() < min || node.items.len() > max {
        return Err(violation(
            node_id,
            format!("node has {} items, expected {}..={}", node.items.len(), min, max),
        ));
    }

    if !node.is_leaf() && node.subtrees.len() != node.items.len() + 1 {
        return Err(violation(
            node_id,
            format!("internal node has {} subtrees for {} items", node.subtrees.len(), node.items.len()),
        ));
    }

    for w in node.items.windows(2) {
        if w[0].0 >= w[1].0 {
            return Err(violation(node_id, "items are not strictly ascending".to_string()));
        }
    }
    if let (Some((first, _)), Some(lo)) = (node.items.first(), lower) {
        if first <= lo {
            return Err(violation(node_id, "first item does not exceed the inherited lower bound".to_string()));
        }
    }
    if let (Some((last, _)), Some(hi)) = (node.items.last(), upper) {
        if last >= hi {
            return Err(violation(node_id, "last item does not precede the inherited upper bound".to_string()));
        }
    }

    if node.is_leaf() {
        return Ok(0);
    }

    let mut depth = None;
    for (i, &child_id) in node.subtrees.iter().enumerate() {
        let child_lower = if i == 0 { lower } else { Some(&node.items[i - 1].0) };
        let child_upper = if i == node.items.len() { upper } else { Some(&node.items[i].0) };
        let child_depth = check_node(store, child_id, false, min, max, child_lower, child_upper)?;
        match depth {
            None => depth = Some(child_depth),
            Some(d) if d != child_depth => {
                return Err(violation(node_id, "children are not all at the same depth".to_string()));
            }
            _ => {}
        }
    }

    Ok(depth.unwrap_or(0) + 1)
}
