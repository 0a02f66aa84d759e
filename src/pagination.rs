//! The Pagination Engine: cursor-based, resumable, bidirectional range
//! pagination over a single namespace's tree.

use crate::engine::{Bound, Order, RangeWalker};
use crate::{node_store, Error, Result, Store, Value};

/// One page of an ordered range scan.
///
/// `cursor` is `Some` exactly when `done` is `false`: pass it back as the
/// next call's cursor to resume past the last item in `items`. A cursor
/// encodes a key, not a row offset, so it stays valid even if items before
/// or after it are inserted or removed between calls.
#[derive(Debug)]
pub struct Page {
    pub items: Vec<(Value, String)>,
    pub cursor: Option<String>,
    pub done: bool,
}

fn encode_cursor(key: &Value) -> String {
    serde_json::to_string(key).expect("Value always serializes")
}

fn decode_cursor<E: std::error::Error + 'static>(cursor: &str) -> Result<Value, E> {
    serde_json::from_str(cursor).map_err(|_| Error::InvalidCursor)
}

/// A cursor from the caller pins an inclusive endpoint (`k1`/`k2`); a
/// resumed cursor pins a strictly-after endpoint (see `Bound::Exclusive`).
#[allow(clippy::too_many_arguments)]
pub fn paginate<S: Store>(
    store: &S,
    namespace: &Option<Value>,
    order: Order,
    k1: Option<Value>,
    k2: Option<Value>,
    cursor: Option<&str>,
    limit: usize,
) -> Result<Page, S::Error> {
    if limit == 0 {
        return Err(Error::InvalidLimit);
    }

    let Some((_, tree)) = node_store::get_tree(store, namespace)? else {
        return Ok(Page { items: Vec::new(), cursor: None, done: true });
    };

    let cursor_value = cursor.map(decode_cursor::<S::Error>).transpose()?;
    let (low, high) = match order {
        Order::Asc => (
            cursor_value
                .map(Bound::Exclusive)
                .unwrap_or_else(|| k1.map(Bound::Inclusive).unwrap_or(Bound::Unbounded)),
            k2.map(Bound::Inclusive).unwrap_or(Bound::Unbounded),
        ),
        Order::Desc => (
            k1.map(Bound::Inclusive).unwrap_or(Bound::Unbounded),
            cursor_value
                .map(Bound::Exclusive)
                .unwrap_or_else(|| k2.map(Bound::Inclusive).unwrap_or(Bound::Unbounded)),
        ),
    };

    let mut walker = RangeWalker::new(store, tree.root, low, high, order)?;
    let mut items = Vec::with_capacity(limit);
    for _ in 0..limit {
        match walker.next(store)? {
            Some(item) => items.push(item),
            None => break,
        }
    }

    let has_more = walker.next(store)?.is_some();
    let cursor = if has_more { items.last().map(|(k, _)| encode_cursor(k)) } else { None };

    Ok(Page { done: !has_more, cursor, items })
}
