//! The data-source and selection-store contracts (§4.6, §6 "Data-source
//! contract"). Everything here is a trait the host application implements;
//! the engine crates only ever hold a `dyn`-compatible trait object, never a
//! concrete data source.

use async_trait::async_trait;
use vtcore_model::{Chunk, ItemId};

/// Parameters of an outbound load request (§4.3 "Request decision").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub start: usize,
    /// At most the configured chunk size, already clipped by `total_items - start`.
    pub count: usize,
    pub request_id: u64,
    pub filters: Vec<(String, String)>,
    pub sort: Vec<String>,
}

/// The asynchronous answer to a [`LoadRequest`] (§4.3 "Completion merge").
/// `total_items_snapshot` lets the coordinator detect staleness without the
/// data source knowing anything about engine-internal bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCompletion<V> {
    pub request_id: u64,
    pub start: usize,
    pub items: Vec<vtcore_model::Item<V>>,
    pub total_items_snapshot: usize,
}

impl<V> ChunkCompletion<V> {
    /// Converts this completion into a resident [`Chunk`], truncating to the
    /// originally requested window if the data source over-delivered (§9
    /// "Open questions": over-delivery is truncated, not rejected).
    pub fn into_chunk(mut self, requested_count: usize) -> Chunk<V> {
        self.items.truncate(requested_count);
        Chunk::new(self.start, self.items, self.request_id)
    }
}

/// Which selection primitive an acknowledgement corresponds to (§4.6).
/// `Batch` is an addition beyond the literal four-tag list: cascading
/// selection (§4.5) needs a single atomic acknowledgement covering an
/// entire affected subtree, not one ack per descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOpTag {
    Toggle,
    ToggleById,
    SelectAll,
    Clear,
    Range,
    Batch,
}

/// Asynchronous acknowledgement from the selection store (§4.6). Opaque to
/// the engine: it is surfaced to the host as an event and never read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAck {
    pub success: bool,
    pub index: Option<usize>,
    pub id: Option<ItemId>,
    pub selected: bool,
    pub op: SelectionOpTag,
    pub affected_ids: Vec<ItemId>,
}

impl SelectionAck {
    pub fn batch(selected: bool, affected_ids: Vec<ItemId>) -> Self {
        Self {
            success: true,
            index: None,
            id: None,
            selected,
            op: SelectionOpTag::Batch,
            affected_ids,
        }
    }
}

/// The selection store the data source must implement (§4.6). The engine
/// never caches selection state; it re-reads `Item::selected` off whatever
/// chunk it loads next, so eviction can never lose a selection.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn set_selected(&self, index: usize, flag: bool) -> SelectionAck;
    async fn set_selected_by_id(&self, id: &ItemId, flag: bool) -> SelectionAck;
    async fn select_all(&self) -> SelectionAck;
    async fn clear_selection(&self) -> SelectionAck;
    /// `start`/`end` are inclusive and unordered; implementations must
    /// normalize (§4.6 "the contract requires the data source to normalize").
    async fn select_range(&self, start: usize, end: usize) -> SelectionAck;
    /// Applies the same flag to every ID in `ids` as a single atomic
    /// operation. Used by cascading tree selection (§4.5).
    async fn select_many(&self, ids: Vec<ItemId>, flag: bool) -> SelectionAck;
}

/// The flat (list/table) data-source contract (§6). `V` is the payload type;
/// implementations are expected to be cheap to clone or live behind an
/// `Arc`, since the engine holds a long-lived reference to one.
#[async_trait]
pub trait DataSource<V>: SelectionStore {
    /// Snapshot of the dataset's current size. Asynchronous because most
    /// real sources (databases, paginated APIs) cannot answer this for free.
    async fn total_items(&self) -> usize;

    /// Services one [`LoadRequest`]. Implementations must tag the
    /// completion with `request.request_id` so the engine can route stale
    /// completions (§5 "Ordering guarantees").
    async fn load_chunk(&self, request: LoadRequest) -> ChunkCompletion<V>;

    /// Optional synchronous fast path for in-memory sources (§6
    /// "loadChunkImmediate"). The default falls back to `None`, telling the
    /// caller to fall back to `load_chunk`.
    fn load_chunk_immediate(&self, _request: &LoadRequest) -> Option<ChunkCompletion<V>> {
        None
    }

    fn item_id(&self, value: &V) -> ItemId;
}

/// Node identity in a tree data source; an alias rather than a new type
/// because tree nodes and flat items share the same ID space contract.
pub type NodeId = ItemId;

/// The hierarchical data-source contract (§4.5 "Input"). `childrenOf`/`roots`
/// return node IDs rather than owned subtrees so the engine can represent
/// the tree as an arena indexed by ID (§9 "Arena/index over pointers")
/// without the data source handing out borrowed structure.
#[async_trait]
pub trait TreeDataSource<V>: SelectionStore {
    async fn roots(&self) -> Vec<NodeId>;
    async fn children_of(&self, id: &NodeId) -> Vec<NodeId>;
    fn is_expanded(&self, id: &NodeId) -> bool;
    /// Mutates local expansion state. Synchronous: unlike chunk loads, tree
    /// structure/expansion is assumed to live with the host, not a remote
    /// store (an Open Question resolution — the literal spec only lists
    /// `isExpanded` as a query with no explicit toggle-mutation method).
    fn set_expanded(&self, id: &NodeId, expanded: bool);
    fn node_value(&self, id: &NodeId) -> Option<V>;
    fn has_children(&self, id: &NodeId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_truncates_overdelivery() {
        let completion = ChunkCompletion {
            request_id: 1,
            start: 0,
            items: vec![
                vtcore_model::Item::new("a", 1),
                vtcore_model::Item::new("b", 2),
                vtcore_model::Item::new("c", 3),
            ],
            total_items_snapshot: 100,
        };
        let chunk = completion.into_chunk(2);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.start, 0);
    }
}
