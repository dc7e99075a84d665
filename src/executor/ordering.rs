use roaring::RoaringBitmap;
use crate::core::error::{Error, Result};
use crate::core::types::{Handle, KeyValue};
use crate::query::types::{OrderingStrategy, SortOrder};
use crate::schema::schema::IndexType;
use crate::store::datastore::{property_values, DataStore};

/// Candidates produced by a resolution step
pub enum Selection {
    Unordered(RoaringBitmap),
    Ordered(Vec<Handle>),   // already in the requested order
}

impl Selection {
    pub fn len(&self) -> usize {
        match self {
            Selection::Unordered(set) => set.len() as usize,
            Selection::Ordered(handles) => handles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bitmap(self) -> RoaringBitmap {
        match self {
            Selection::Unordered(set) => set,
            Selection::Ordered(handles) => handles.into_iter().collect(),
        }
    }

    pub fn into_handles(self) -> Vec<Handle> {
        match self {
            Selection::Unordered(set) => set.iter().collect(),
            Selection::Ordered(handles) => handles,
        }
    }
}

/// ORDER BY needs an ordered index on the property
pub fn check_order_by(store: &DataStore, property: &str) -> Result<()> {
    match store.try_get_index(property) {
        Some(index) if index.index_type() == IndexType::Ordered => Ok(()),
        _ => Err(Error::invalid_order_by(property)),
    }
}

/// Sorting `n` candidates costs n*log2(n); scanning the ordered index costs the collection size
pub fn prefer_in_memory_sort(selected: usize, total: usize) -> bool {
    if selected <= 1 {
        return true;
    }
    let n = selected as f64;
    n * n.log2() < total as f64
}

fn sort_key(store: &DataStore, handle: Handle, property: &str) -> KeyValue {
    store
        .get(handle)
        .and_then(|object| property_values(store.schema(), object, property).into_iter().next())
        .unwrap_or_else(|| KeyValue::null(property))
}

/// Put the candidates in ORDER BY order.
///
/// Both strategies agree on ties: equal values keep ascending handle order in either direction.
pub fn order_selection(
    store: &DataStore,
    selection: Selection,
    property: &str,
    order: SortOrder,
) -> Result<(Vec<Handle>, OrderingStrategy)> {
    let set = match selection {
        Selection::Ordered(handles) => return Ok((handles, OrderingStrategy::FreeFromScan)),
        Selection::Unordered(set) => set,
    };

    if prefer_in_memory_sort(set.len() as usize, store.len()) {
        let mut keyed: Vec<(KeyValue, Handle)> = set.iter().map(|h| (sort_key(store, h, property), h)).collect();
        keyed.sort_by(|(va, ha), (vb, hb)| {
            let by_value = if order.is_descending() { vb.cmp(va) } else { va.cmp(vb) };
            by_value.then_with(|| ha.cmp(hb))
        });
        return Ok((keyed.into_iter().map(|(_, h)| h).collect(), OrderingStrategy::InMemorySort));
    }

    let Some(index) = store.try_get_index(property).filter(|i| i.index_type() == IndexType::Ordered) else {
        return Err(Error::invalid_order_by(property));
    };
    let handles = index
        .get_all(order.is_descending())
        .into_iter()
        .filter(|h| set.contains(*h))
        .collect();
    Ok((handles, OrderingStrategy::IndexScan))
}
