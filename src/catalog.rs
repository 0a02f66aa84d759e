//! The Namespace Catalog: enumerate namespaces and bulk-clear the whole
//! store. Namespaces are listed in the store's own natural order (its Tree
//! records' insertion order, via `Store::list_trees`) rather than the
//! `Value` total order, since namespace values themselves are never sorted
//! by this crate.

use crate::store::Id;
use crate::{lifecycle, Error, Result, Store, Value};

#[derive(Debug)]
pub struct NamespacePage {
    pub namespaces: Vec<Option<Value>>,
    pub cursor: Option<String>,
    pub done: bool,
}

pub fn paginate_namespaces<S: Store>(
    store: &S,
    cursor: Option<&str>,
    limit: usize,
) -> Result<NamespacePage, S::Error> {
    if limit == 0 {
        return Err(Error::InvalidLimit);
    }

    let after = cursor
        .map(|c| serde_json::from_str::<Id>(c).map_err(|_| Error::InvalidCursor))
        .transpose()?;

    let all = store.list_trees().map_err(Error::Store)?;
    let start = match after {
        Some(id) => all.iter().position(|(i, _)| *i == id).map(|p| p + 1).unwrap_or(all.len()),
        None => 0,
    };

    let page: Vec<_> = all.iter().skip(start).take(limit).collect();
    let has_more = start + page.len() < all.len();
    let cursor = if has_more {
        page.last().map(|(id, _)| serde_json::to_string(id).expect("Id always serializes"))
    } else {
        None
    };

    Ok(NamespacePage {
        done: !has_more,
        cursor,
        namespaces: page.into_iter().map(|(_, t)| t.namespace.clone()).collect(),
    })
}

/// Clears every namespace in the store, one Tree record at a time, and
/// additionally clears the default (`None`) namespace even if it never had
/// a Tree; that is where a store-wide default fanout would otherwise have
/// nowhere to live once every namespace is empty.
pub fn clear_all<S: Store>(store: &mut S, default_fanout: u32) -> Result<(), S::Error> {
    let trees = store.list_trees().map_err(Error::Store)?;
    let mut cleared_default = false;

    for (_, tree) in &trees {
        if tree.namespace.is_none() {
            cleared_default = true;
        }
        lifecycle::clear(store, &tree.namespace, None, default_fanout)?;
    }

    if !cleared_default {
        lifecycle::clear(store, &None, None, default_fanout)?;
    }

    Ok(())
}
