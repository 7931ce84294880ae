//! Dataset-shape types shared by every core crate: items, chunks, and the
//! metadata bag attached to a payload.
//!
//! This crate is intentionally inert: no cache, no async, no I/O. `V` is the
//! caller-supplied payload type threaded through the whole engine, the same
//! way a generic widget library threads a message type through its update
//! loop.

use std::collections::HashMap;
use std::fmt;

/// Opaque, stable identifier for a logical item. IDs are supplied by the
/// data source and must be unique for the lifetime of the dataset; the
/// engine never interprets their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn loading_placeholder(logical_index: usize) -> Self {
        Self(format!("loading-{logical_index}"))
    }

    pub(crate) fn missing_placeholder(logical_index: usize) -> Self {
        Self(format!("missing-{logical_index}"))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Untyped side-channel metadata. Kept separate from `V` so data sources can
/// attach renderer hints (icons, styling keys) without widening the payload
/// type every consumer has to match on.
pub type Metadata = HashMap<String, String>;

/// A typed payload plus the bookkeeping flags the engine reads back on every
/// chunk load (§3 "Item").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<V> {
    pub id: ItemId,
    pub value: V,
    pub selected: bool,
    pub disabled: bool,
    pub hidden: bool,
    pub metadata: Metadata,
}

impl<V> Item<V> {
    pub fn new(id: impl Into<ItemId>, value: V) -> Self {
        Self {
            id: id.into(),
            value,
            selected: false,
            disabled: false,
            hidden: false,
            metadata: Metadata::new(),
        }
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// A contiguous, resident window of items (§3 "Chunk"). `start` is always a
/// multiple of the data source's configured chunk size except for a final,
/// short chunk at the end of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<V> {
    pub start: usize,
    pub items: Vec<Item<V>>,
    pub loaded_at_request: u64,
}

impl<V> Chunk<V> {
    /// Builds a chunk, asserting the per-item logical-index invariant
    /// (`items[k].logical_index == start + k`) implicitly by construction:
    /// callers supply items already in window order.
    pub fn new(start: usize, items: Vec<Item<V>>, loaded_at_request: u64) -> Self {
        Self {
            start,
            items,
            loaded_at_request,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `end` is exclusive; a short final chunk yields `start + items.len()`
    /// rather than `start + chunk_size`.
    pub fn end_exclusive(&self) -> usize {
        self.start + self.items.len()
    }

    /// Item at absolute logical index `i`, or `None` if `i` falls outside
    /// this chunk's resident range (covers both negative offsets and the
    /// short-final-chunk case from §4.3 rule 4).
    pub fn item_at(&self, i: usize) -> Option<&Item<V>> {
        i.checked_sub(self.start).and_then(|offset| self.items.get(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_formats_placeholders_per_contract() {
        assert_eq!(ItemId::loading_placeholder(7).as_str(), "loading-7");
        assert_eq!(ItemId::missing_placeholder(7).as_str(), "missing-7");
    }

    #[test]
    fn chunk_item_at_respects_window() {
        let chunk = Chunk::new(
            10,
            vec![Item::new("a", 1), Item::new("b", 2), Item::new("c", 3)],
            0,
        );
        assert_eq!(chunk.item_at(10).map(|i| &i.value), Some(&1));
        assert_eq!(chunk.item_at(12).map(|i| &i.value), Some(&3));
        assert_eq!(chunk.item_at(13), None);
        assert_eq!(chunk.item_at(9), None);
        assert_eq!(chunk.end_exclusive(), 13);
    }

    #[test]
    fn short_final_chunk_reports_its_true_end() {
        let chunk: Chunk<u32> = Chunk::new(90, vec![Item::new("x", 9)], 5);
        assert_eq!(chunk.end_exclusive(), 91);
        assert_eq!(chunk.len(), 1);
    }
}
