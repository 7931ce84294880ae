//! The tree flattener (C5): projects a partially-expanded tree into the flat
//! index space C4 understands, and adapts a [`TreeDataSource`] into a plain
//! [`DataSource`] so list-mode machinery (cache, coordinator, controller)
//! can be reused unchanged for tree mode (§4.5: "C5 sits in front of C4").

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use smallvec::SmallVec;
use tracing::warn;
use vtcore_model::Item;
use vtcore_source::{
    ChunkCompletion, DataSource, LoadRequest, NodeId, SelectionAck, SelectionStore,
    TreeDataSource,
};

/// One entry of the flattened pre-order sequence (§3 "Tree node (C5)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub depth: usize,
    pub has_children: bool,
    /// One boolean per ancestor level (closest ancestor last), `true` when
    /// that ancestor is its parent's final child. Connector renderers use
    /// this to decide whether to draw a vertical continuation line.
    pub is_last_sibling: SmallVec<[bool; 8]>,
}

/// A flattened tree row as a list-mode payload: the node's own value plus
/// the structural metadata a table/tree renderer needs, so `TreeRow<V>` can
/// flow through `vtcore-viewport`'s `ListEngine` unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow<V> {
    pub id: NodeId,
    pub value: V,
    pub depth: usize,
    pub has_children: bool,
    pub is_last_sibling: SmallVec<[bool; 8]>,
    pub parent_id: Option<NodeId>,
}

/// Pre-order depth-first flattening with cycle detection (§9 "Cyclic
/// structures"): a node ID revisited within the same traversal is a
/// contract violation (§7 kind 4), not undefined behaviour here — the
/// walk stops descending into it and the caller is told.
pub async fn build_flat_entries<V, S>(source: &S) -> (Vec<FlatEntry>, Vec<String>)
where
    S: TreeDataSource<V> + ?Sized,
{
    let mut entries = Vec::new();
    let mut violations = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let roots = source.roots().await;
    let root_count = roots.len();
    for (i, root) in roots.into_iter().enumerate() {
        let is_last = i + 1 == root_count;
        walk(
            source,
            &root,
            None,
            0,
            SmallVec::new(),
            is_last,
            &mut visited,
            &mut entries,
            &mut violations,
        )
        .await;
    }
    (entries, violations)
}

#[allow(clippy::too_many_arguments)]
fn walk<'a, V, S>(
    source: &'a S,
    id: &'a NodeId,
    parent_id: Option<NodeId>,
    depth: usize,
    ancestors_last: SmallVec<[bool; 8]>,
    is_last_sibling: bool,
    visited: &'a mut HashSet<NodeId>,
    entries: &'a mut Vec<FlatEntry>,
    violations: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>>
where
    S: TreeDataSource<V> + ?Sized,
{
    Box::pin(async move {
        if !visited.insert(id.clone()) {
            violations.push(format!("cycle detected at node {id}"));
            warn!(target: "vtcore::tree", node = %id, "cycle detected, stopping traversal at this node");
            return;
        }

        let mut my_last = ancestors_last.clone();
        my_last.push(is_last_sibling);

        let has_children = source.has_children(id);
        entries.push(FlatEntry {
            id: id.clone(),
            parent_id: parent_id.clone(),
            depth,
            has_children,
            is_last_sibling: my_last.clone(),
        });

        if has_children && source.is_expanded(id) {
            let children = source.children_of(id).await;
            let child_count = children.len();
            for (i, child) in children.into_iter().enumerate() {
                let is_last = i + 1 == child_count;
                walk(
                    source,
                    &child,
                    Some(id.clone()),
                    depth + 1,
                    my_last.clone(),
                    is_last,
                    &mut *visited,
                    &mut *entries,
                    &mut *violations,
                )
                .await;
            }
        }
    })
}

/// Walks the authoritative tree (not the flattened view) applying `flag` to
/// `root` and every descendant as one atomic `select_many` call (§4.5
/// "Cascading selection").
pub async fn cascade_select<V, S>(source: &S, root: &NodeId, flag: bool) -> SelectionAck
where
    S: TreeDataSource<V> + ?Sized,
{
    let mut ids = vec![root.clone()];
    let mut frontier = vec![root.clone()];
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(root.clone());
    while let Some(id) = frontier.pop() {
        for child in source.children_of(&id).await {
            if visited.insert(child.clone()) {
                ids.push(child.clone());
                frontier.push(child);
            }
        }
    }
    source.select_many(ids, flag).await
}

/// Lazily-built, cached flattened view of a [`TreeDataSource`], exposed as a
/// plain [`DataSource<TreeRow<V>>`] so `vtcore-viewport`'s `ListEngine` can
/// drive tree mode without knowing trees exist.
pub struct FlattenedTreeSource<V, S> {
    source: Arc<S>,
    cache: Mutex<Option<Vec<FlatEntry>>>,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V, S> FlattenedTreeSource<V, S>
where
    S: TreeDataSource<V>,
{
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
            _marker: std::marker::PhantomData,
        }
    }

    /// Drops the cached flattening. Called after any expand/collapse
    /// toggle (§4.5 "Expansion changes": "invalidates the flattened index
    /// space from that node onward" — this crate takes the simpler,
    /// equally-correct option of invalidating the whole cache).
    pub fn invalidate(&self) {
        *self.cache.lock().expect("tree cache lock poisoned") = None;
    }

    async fn ensure_built(&self) -> Vec<FlatEntry> {
        {
            let guard = self.cache.lock().expect("tree cache lock poisoned");
            if let Some(entries) = guard.as_ref() {
                return entries.clone();
            }
        }
        let (entries, violations) = build_flat_entries(self.source.as_ref()).await;
        for v in &violations {
            warn!(target: "vtcore::tree", "{v}");
        }
        *self.cache.lock().expect("tree cache lock poisoned") = Some(entries.clone());
        entries
    }

    /// Flat index of `id` in the current flattening, if it is still
    /// visible (used by the viewport controller to relocate the cursor
    /// after a toggle, §4.5 step 4). Only consults the cache; callers must
    /// `ensure` a rebuild (e.g. via `total_items`) first.
    pub fn find_flat_index(&self, id: &NodeId) -> Option<usize> {
        self.cache
            .lock()
            .expect("tree cache lock poisoned")
            .as_ref()
            .and_then(|entries| entries.iter().position(|e| &e.id == id))
    }

    /// Node ID currently flattened at `index`, if the cache has been built
    /// and `index` is in range. Used by the viewport controller to capture
    /// "the node under the cursor" before a toggle invalidates the cache.
    pub fn id_at(&self, index: usize) -> Option<NodeId> {
        self.cache
            .lock()
            .expect("tree cache lock poisoned")
            .as_ref()
            .and_then(|entries| entries.get(index))
            .map(|entry| entry.id.clone())
    }

    fn row_at(&self, entries: &[FlatEntry], index: usize) -> Option<Item<TreeRow<V>>>
    where
        V: Clone,
    {
        let entry = entries.get(index)?;
        let value = self.source.node_value(&entry.id)?;
        let row = TreeRow {
            id: entry.id.clone(),
            value,
            depth: entry.depth,
            has_children: entry.has_children,
            is_last_sibling: entry.is_last_sibling.clone(),
            parent_id: entry.parent_id.clone(),
        };
        Some(Item::new(entry.id.clone(), row))
    }
}

#[async_trait]
impl<V, S> SelectionStore for FlattenedTreeSource<V, S>
where
    V: Send + Sync,
    S: TreeDataSource<V>,
{
    async fn set_selected(&self, index: usize, flag: bool) -> SelectionAck {
        self.source.set_selected(index, flag).await
    }

    async fn set_selected_by_id(&self, id: &vtcore_model::ItemId, flag: bool) -> SelectionAck {
        self.source.set_selected_by_id(id, flag).await
    }

    async fn select_all(&self) -> SelectionAck {
        self.source.select_all().await
    }

    async fn clear_selection(&self) -> SelectionAck {
        self.source.clear_selection().await
    }

    async fn select_range(&self, start: usize, end: usize) -> SelectionAck {
        self.source.select_range(start, end).await
    }

    async fn select_many(&self, ids: Vec<vtcore_model::ItemId>, flag: bool) -> SelectionAck {
        self.source.select_many(ids, flag).await
    }
}

#[async_trait]
impl<V, S> DataSource<TreeRow<V>> for FlattenedTreeSource<V, S>
where
    V: Clone + Send + Sync,
    S: TreeDataSource<V>,
{
    async fn total_items(&self) -> usize {
        self.ensure_built().await.len()
    }

    async fn load_chunk(&self, request: LoadRequest) -> ChunkCompletion<TreeRow<V>> {
        let entries = self.ensure_built().await;
        let end = (request.start + request.count).min(entries.len());
        let items = (request.start..end)
            .filter_map(|i| self.row_at(&entries, i))
            .collect();
        ChunkCompletion {
            request_id: request.request_id,
            start: request.start,
            items,
            total_items_snapshot: entries.len(),
        }
    }

    fn load_chunk_immediate(&self, request: &LoadRequest) -> Option<ChunkCompletion<TreeRow<V>>> {
        let guard = self.cache.lock().expect("tree cache lock poisoned");
        let entries = guard.as_ref()?;
        let end = (request.start + request.count).min(entries.len());
        let items = (request.start..end)
            .filter_map(|i| self.row_at(entries, i))
            .collect();
        Some(ChunkCompletion {
            request_id: request.request_id,
            start: request.start,
            items,
            total_items_snapshot: entries.len(),
        })
    }

    fn item_id(&self, value: &TreeRow<V>) -> vtcore_model::ItemId {
        value.id.clone()
    }
}
