//! The viewport controller (C4): owns cursor/viewport state, is the sole
//! mutator of it, and drives the load coordinator (C3) after every
//! transition (§4.4). [`TreeEngine`] adapts the same machinery to tree mode
//! by sitting a [`vtcore_tree::FlattenedTreeSource`] in front of it (§4.5).

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use vtcore_events::{Intent, ObservabilityEvent, VisibleEntry};
use vtcore_geometry::{
    clamp_index, clamp_viewport_start, compute_bounding_area, reposition_for_cursor,
    update_viewport_flags, GeometryError, ViewportConfig, ViewportState,
};
use vtcore_loader::LoadCoordinator;
use vtcore_source::{ChunkCompletion, DataSource, NodeId, SelectionAck, SelectionOpTag, TreeDataSource};
use vtcore_tree::{cascade_select, FlattenedTreeSource, TreeRow};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// The authoritative render input for one dispatch cycle (§6
/// "VisibleItemsChanged").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleSlice<V> {
    pub items: Vec<VisibleEntry<V>>,
    pub placeholder_count: usize,
    pub viewport: ViewportState,
}

/// Everything a dispatch produces: the new visible slice (when geometry was
/// touched), outbound load requests the host must fulfill, observability
/// events, and a flag asking the host to re-read `total_items` (§4.3
/// "Refresh").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome<V> {
    pub visible: Option<VisibleSlice<V>>,
    pub requests: Vec<vtcore_source::LoadRequest>,
    pub events: Vec<ObservabilityEvent>,
    /// Set by `Intent::Refresh`/`SetFilters`/`SetSort`: the handler itself
    /// never awaits (§5 "Intent handlers never suspend"), so the host is
    /// responsible for awaiting `DataSource::total_items` and feeding the
    /// result back through [`Engine::apply_total_items`].
    pub refresh_total_items_requested: bool,
}

impl<V> Default for DispatchOutcome<V> {
    fn default() -> Self {
        Self {
            visible: None,
            requests: Vec::new(),
            events: Vec::new(),
            refresh_total_items_requested: false,
        }
    }
}

/// The list-mode engine (C4 + C3 + C2 wired together). `V` is the payload
/// type; `S` is the host's data source.
pub struct Engine<V, S> {
    source: Arc<S>,
    config: ViewportConfig,
    viewport: ViewportState,
    total_items: usize,
    coordinator: LoadCoordinator<V>,
    filters: Vec<(String, String)>,
    sort: Vec<String>,
}

impl<V, S> Engine<V, S>
where
    V: Clone,
    S: DataSource<V>,
{
    /// Cold-starts the engine against `source`'s current `total_items`
    /// (§8 "Cold start"). Not an intent handler — awaiting here is
    /// construction, not dispatch.
    pub async fn new(source: Arc<S>, config: ViewportConfig) -> (Self, DispatchOutcome<V>) {
        let total_items = source.total_items().await;
        let viewport = ViewportState::new(&config, total_items);
        let mut engine = Self {
            source,
            config,
            viewport,
            total_items,
            coordinator: LoadCoordinator::new(),
            filters: Vec::new(),
            sort: Vec::new(),
        };
        let outcome = engine.recompute();
        (engine, outcome)
    }

    pub async fn with_raw_config(
        source: Arc<S>,
        height: usize,
        top_threshold: usize,
        bottom_threshold: usize,
        chunk_size: usize,
        initial_index: usize,
        bounding_before: usize,
        bounding_after: usize,
    ) -> Result<(Self, DispatchOutcome<V>), EngineError> {
        let config = ViewportConfig::new(
            height,
            top_threshold,
            bottom_threshold,
            chunk_size,
            initial_index,
            bounding_before,
            bounding_after,
        )?;
        Ok(Self::new(source, config).await)
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Drops every resident and in-flight chunk without touching
    /// cursor/viewport state (§4.5 "Expansion changes" step 2: a tree
    /// toggle that shifts the flat-index space must not leave chunks
    /// addressed under the old layout resident under the same starts).
    pub fn clear_chunk_cache(&mut self) {
        self.coordinator.refresh();
    }

    /// Swaps in a new geometry configuration (§6 "ConfigChanged" is the
    /// notification; the new values themselves arrive out of band through
    /// this method — an Open Question resolution, since the literal intent
    /// carries no payload).
    pub fn apply_config(&mut self, config: ViewportConfig) -> DispatchOutcome<V> {
        self.config = config;
        self.recompute()
    }

    /// Every public, state-mutating operation funnels through `dispatch`
    /// except the four async selection methods and chunk-completion/
    /// total-items feedback, which the host calls directly (§5: selection
    /// acknowledgements and load completions are not synchronous intents).
    pub fn dispatch(&mut self, intent: Intent) -> DispatchOutcome<V> {
        match intent {
            Intent::CursorUp => {
                self.viewport.cursor_index = self.viewport.cursor_index.saturating_sub(1);
                self.recompute()
            }
            Intent::CursorDown => {
                self.viewport.cursor_index =
                    clamp_index(self.viewport.cursor_index.saturating_add(1), self.total_items);
                self.recompute()
            }
            Intent::PageUp => {
                self.viewport.cursor_index =
                    self.viewport.cursor_index.saturating_sub(self.config.height);
                self.recompute()
            }
            Intent::PageDown => {
                self.viewport.cursor_index = clamp_index(
                    self.viewport.cursor_index.saturating_add(self.config.height),
                    self.total_items,
                );
                self.recompute()
            }
            Intent::JumpToStart => {
                self.viewport.cursor_index = 0;
                self.recompute()
            }
            Intent::JumpToEnd => {
                self.viewport.cursor_index = self.total_items.saturating_sub(1);
                self.recompute()
            }
            Intent::JumpTo(i) => {
                self.viewport.cursor_index = clamp_index(i, self.total_items);
                self.recompute()
            }
            Intent::Refresh => {
                self.coordinator.refresh();
                DispatchOutcome {
                    refresh_total_items_requested: true,
                    ..Default::default()
                }
            }
            Intent::ConfigChanged => self.recompute(),
            Intent::SetFilters(filters) => {
                self.filters = filters;
                self.coordinator.refresh();
                DispatchOutcome {
                    refresh_total_items_requested: true,
                    ..Default::default()
                }
            }
            Intent::SetSort(sort) => {
                self.sort = sort;
                self.coordinator.refresh();
                DispatchOutcome {
                    refresh_total_items_requested: true,
                    ..Default::default()
                }
            }
            Intent::Tick => self.recompute(),
            other => {
                warn!(target: "vtcore::viewport", intent = ?other, "intent requires an async method, ignoring in dispatch");
                Default::default()
            }
        }
    }

    /// Merges an arriving load completion (§4.3 "Completion merge").
    pub fn apply_completion(&mut self, completion: ChunkCompletion<V>) -> DispatchOutcome<V> {
        let requested_count = self.config.chunk_size.min(self.total_items.saturating_sub(completion.start));
        let event = self.coordinator.handle_completion(completion, self.total_items, requested_count);
        let mut outcome = self.recompute();
        outcome.events.insert(0, event);
        outcome
    }

    /// Responds to a new `total_items` snapshot from the host (§4.4
    /// "Total-items change").
    pub fn apply_total_items(&mut self, new_total: usize) -> DispatchOutcome<V> {
        let changed = new_total != self.total_items;
        self.total_items = new_total;
        self.viewport.cursor_index = clamp_index(self.viewport.cursor_index, new_total);
        self.viewport.viewport_start =
            clamp_viewport_start(self.viewport.viewport_start, self.config.height, new_total);
        let mut events = self.coordinator.invalidate_beyond(new_total);
        if changed {
            events.push(ObservabilityEvent::TotalItemsChanged { new_total });
        }
        let mut outcome = self.recompute();
        events.extend(outcome.events);
        outcome.events = events;
        outcome
    }

    pub(crate) fn recompute(&mut self) -> DispatchOutcome<V> {
        reposition_for_cursor(&mut self.viewport, &self.config, self.total_items);
        update_viewport_flags(&mut self.viewport, &self.config, self.total_items);
        let bounding = compute_bounding_area(&self.viewport, &self.config, self.total_items);

        let (mut requests, mut events) =
            self.coordinator.requests_for(&bounding, self.config.chunk_size, self.total_items);
        events.extend(self.coordinator.evict(&bounding));

        let slice = self.coordinator.assemble_visible_slice(
            self.viewport.viewport_start,
            self.config.height,
            self.config.chunk_size,
            self.total_items,
        );
        requests.extend(slice.requests);
        events.extend(slice.events);

        DispatchOutcome {
            visible: Some(VisibleSlice {
                items: slice.items,
                placeholder_count: slice.placeholder_count,
                viewport: self.viewport,
            }),
            requests,
            events,
            refresh_total_items_requested: false,
        }
    }

    /// `selected`/id of the item currently resident at logical index
    /// `index`, read straight off the cache (the engine never keeps a
    /// separate selection copy, §4.6).
    pub fn selected_at(&self, index: usize) -> Option<(vtcore_model::ItemId, bool)> {
        let start = vtcore_geometry::chunk_start_for(index, self.config.chunk_size);
        self.coordinator
            .cache()
            .get(start)
            .and_then(|chunk| chunk.item_at(index))
            .map(|item| (item.id.clone(), item.selected))
    }

    pub async fn toggle_selection_current(&self) -> SelectionAck {
        match self.selected_at(self.viewport.cursor_index) {
            Some((id, selected)) => self.source.set_selected_by_id(&id, !selected).await,
            None => SelectionAck {
                success: false,
                index: Some(self.viewport.cursor_index),
                id: None,
                selected: false,
                op: SelectionOpTag::Toggle,
                affected_ids: Vec::new(),
            },
        }
    }

    pub async fn select_all(&self) -> SelectionAck {
        self.source.select_all().await
    }

    pub async fn clear_selection(&self) -> SelectionAck {
        self.source.clear_selection().await
    }

    /// Normalizes `a`/`b` before forwarding (§9 "Open questions": the
    /// engine also normalizes, in addition to the data source being
    /// required to).
    pub async fn select_range(&self, a: usize, b: usize) -> SelectionAck {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        self.source.select_range(start, end).await
    }
}

/// Tree-mode engine: wraps an `Engine<TreeRow<V>, FlattenedTreeSource<V, S>>`
/// so C1-C4 are reused verbatim, plus the expand/collapse/cascade
/// operations that only make sense with direct access to the tree source
/// (§4.5).
pub struct TreeEngine<V, S> {
    inner: Engine<TreeRow<V>, FlattenedTreeSource<V, S>>,
    tree_source: Arc<S>,
    flattened: Arc<FlattenedTreeSource<V, S>>,
    cascading: bool,
}

impl<V, S> TreeEngine<V, S>
where
    V: Clone + Send + Sync,
    S: TreeDataSource<V>,
{
    pub async fn new(tree_source: Arc<S>, config: ViewportConfig) -> (Self, DispatchOutcome<TreeRow<V>>) {
        let flattened = Arc::new(FlattenedTreeSource::new(tree_source.clone()));
        let (inner, outcome) = Engine::new(flattened.clone(), config).await;
        (
            Self {
                inner,
                tree_source,
                flattened,
                cascading: false,
            },
            outcome,
        )
    }

    pub fn viewport(&self) -> &ViewportState {
        self.inner.viewport()
    }

    pub fn total_items(&self) -> usize {
        self.inner.total_items()
    }

    /// The adapted [`DataSource<TreeRow<V>>`] that outbound [`LoadRequest`]s
    /// from [`DispatchOutcome`] must be fulfilled against — not the raw
    /// `TreeDataSource`, since chunk addresses live in flat-index space
    /// (§4.5 "materialized lazily per chunk request").
    pub fn flattened_source(&self) -> &Arc<FlattenedTreeSource<V, S>> {
        &self.flattened
    }

    pub fn set_cascading(&mut self, cascading: bool) {
        self.cascading = cascading;
    }

    pub fn dispatch(&mut self, intent: Intent) -> DispatchOutcome<TreeRow<V>> {
        match intent {
            Intent::ToggleNodeAtCursor
            | Intent::ExpandAll
            | Intent::CollapseAll
            | Intent::SetCascading(_)
            | Intent::ToggleSelectionCurrent
            | Intent::SelectAll
            | Intent::ClearSelection
            | Intent::SelectRange(_, _) => {
                warn!(target: "vtcore::viewport", ?intent, "tree intent requires an async method, ignoring in dispatch");
                self.inner.recompute()
            }
            other => self.inner.dispatch(other),
        }
    }

    pub fn apply_completion(&mut self, completion: ChunkCompletion<TreeRow<V>>) -> DispatchOutcome<TreeRow<V>> {
        self.inner.apply_completion(completion)
    }

    /// Toggles the node at the current cursor (§4.5 "Expansion changes").
    pub async fn toggle_node_at_cursor(&mut self) -> DispatchOutcome<TreeRow<V>> {
        let cursor_index = self.inner.viewport().cursor_index;
        let Some(id) = self.flattened.id_at(cursor_index) else {
            return self.inner.recompute();
        };
        let now_expanded = !self.tree_source.is_expanded(&id);
        self.tree_source.set_expanded(&id, now_expanded);
        self.flattened.invalidate();
        self.relocate_after_invalidate(Some(id)).await
    }

    pub async fn expand_all(&mut self) -> DispatchOutcome<TreeRow<V>> {
        self.set_all_expanded(true).await
    }

    pub async fn collapse_all(&mut self) -> DispatchOutcome<TreeRow<V>> {
        self.set_all_expanded(false).await
    }

    async fn set_all_expanded(&mut self, flag: bool) -> DispatchOutcome<TreeRow<V>> {
        let mut stack = self.tree_source.roots().await;
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            self.tree_source.set_expanded(&id, flag);
            for child in self.tree_source.children_of(&id).await {
                stack.push(child);
            }
        }
        self.flattened.invalidate();
        self.relocate_after_invalidate(None).await
    }

    async fn relocate_after_invalidate(&mut self, captured_id: Option<NodeId>) -> DispatchOutcome<TreeRow<V>> {
        // The toggle already invalidated the flattened-entry cache; the
        // chunk cache addresses that same flat-index space and must be
        // dropped too, or stale pre-toggle rows survive under unchanged
        // chunk starts (§4.5 step 2).
        self.inner.clear_chunk_cache();
        let new_total = self.flattened.total_items().await;
        let mut outcome = self.inner.apply_total_items(new_total);
        if let Some(id) = captured_id {
            if let Some(new_index) = self.flattened.find_flat_index(&id) {
                outcome = self.inner.dispatch(Intent::JumpTo(new_index));
            }
        }
        outcome
    }

    pub async fn toggle_selection_current(&self) -> SelectionAck {
        if !self.cascading {
            return self.inner.toggle_selection_current().await;
        }
        let cursor_index = self.inner.viewport().cursor_index;
        let Some(id) = self.flattened.id_at(cursor_index) else {
            return SelectionAck {
                success: false,
                index: Some(cursor_index),
                id: None,
                selected: false,
                op: SelectionOpTag::Toggle,
                affected_ids: Vec::new(),
            };
        };
        let currently_selected = self
            .inner
            .selected_at(cursor_index)
            .map(|(_, selected)| selected)
            .unwrap_or(false);
        cascade_select(self.tree_source.as_ref(), &id, !currently_selected).await
    }

    pub async fn select_all(&self) -> SelectionAck {
        self.inner.select_all().await
    }

    pub async fn clear_selection(&self) -> SelectionAck {
        self.inner.clear_selection().await
    }

    pub async fn select_range(&self, a: usize, b: usize) -> SelectionAck {
        self.inner.select_range(a, b).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use vtcore_model::Item;
    use vtcore_source::{LoadRequest, SelectionStore};

    struct InMemorySource {
        items: Vec<u32>,
        selected: StdMutex<std::collections::HashSet<usize>>,
        request_counter: AtomicU64,
    }

    #[async_trait::async_trait]
    impl SelectionStore for InMemorySource {
        async fn set_selected(&self, index: usize, flag: bool) -> SelectionAck {
            if flag {
                self.selected.lock().unwrap().insert(index);
            } else {
                self.selected.lock().unwrap().remove(&index);
            }
            SelectionAck {
                success: true,
                index: Some(index),
                id: None,
                selected: flag,
                op: SelectionOpTag::Toggle,
                affected_ids: Vec::new(),
            }
        }
        async fn set_selected_by_id(&self, id: &vtcore_model::ItemId, flag: bool) -> SelectionAck {
            let index: usize = id.as_str().parse().unwrap();
            self.set_selected(index, flag).await
        }
        async fn select_all(&self) -> SelectionAck {
            let mut guard = self.selected.lock().unwrap();
            for i in 0..self.items.len() {
                guard.insert(i);
            }
            SelectionAck {
                success: true,
                index: None,
                id: None,
                selected: true,
                op: SelectionOpTag::SelectAll,
                affected_ids: Vec::new(),
            }
        }
        async fn clear_selection(&self) -> SelectionAck {
            self.selected.lock().unwrap().clear();
            SelectionAck {
                success: true,
                index: None,
                id: None,
                selected: false,
                op: SelectionOpTag::Clear,
                affected_ids: Vec::new(),
            }
        }
        async fn select_range(&self, start: usize, end: usize) -> SelectionAck {
            let mut guard = self.selected.lock().unwrap();
            for i in start..=end {
                guard.insert(i);
            }
            SelectionAck {
                success: true,
                index: None,
                id: None,
                selected: true,
                op: SelectionOpTag::Range,
                affected_ids: Vec::new(),
            }
        }
        async fn select_many(&self, ids: Vec<vtcore_model::ItemId>, flag: bool) -> SelectionAck {
            let mut guard = self.selected.lock().unwrap();
            for id in &ids {
                let index: usize = id.as_str().parse().unwrap();
                if flag {
                    guard.insert(index);
                } else {
                    guard.remove(&index);
                }
            }
            SelectionAck::batch(flag, ids)
        }
    }

    #[async_trait::async_trait]
    impl DataSource<u32> for InMemorySource {
        async fn total_items(&self) -> usize {
            self.items.len()
        }

        async fn load_chunk(&self, request: LoadRequest) -> ChunkCompletion<u32> {
            let end = (request.start + request.count).min(self.items.len());
            let selected = self.selected.lock().unwrap().clone();
            let items = (request.start..end)
                .map(|i| Item::new(i.to_string(), self.items[i]).with_selected(selected.contains(&i)))
                .collect();
            ChunkCompletion {
                request_id: request.request_id,
                start: request.start,
                items,
                total_items_snapshot: self.items.len(),
            }
        }

        fn item_id(&self, value: &u32) -> vtcore_model::ItemId {
            vtcore_model::ItemId::new(value.to_string())
        }
    }

    fn cfg() -> ViewportConfig {
        ViewportConfig::new(5, 1, 1, 10, 0, 4, 4).unwrap()
    }

    fn source(n: usize) -> Arc<InMemorySource> {
        Arc::new(InMemorySource {
            items: (0..n as u32).collect(),
            selected: StdMutex::new(std::collections::HashSet::new()),
            request_counter: AtomicU64::new(0),
        })
    }

    async fn drain_loads(engine: &mut Engine<u32, InMemorySource>, mut outcome: DispatchOutcome<u32>) -> DispatchOutcome<u32> {
        loop {
            if outcome.requests.is_empty() {
                return outcome;
            }
            let request = outcome.requests.remove(0);
            let completion = engine.source().load_chunk(request).await;
            outcome = engine.apply_completion(completion);
        }
    }

    #[tokio::test]
    async fn cold_start_produces_single_request_for_chunk_zero() {
        let (mut engine, outcome) = Engine::new(source(100), cfg()).await;
        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.requests[0].start, 0);
        let outcome = drain_loads(&mut engine, outcome).await;
        let visible = outcome.visible.unwrap();
        assert_eq!(visible.placeholder_count, 0);
        assert_eq!(visible.items.len(), 5);
    }

    #[tokio::test]
    async fn jump_to_end_evicts_first_chunk() {
        let (mut engine, outcome) = Engine::new(source(100), cfg()).await;
        let outcome = drain_loads(&mut engine, outcome).await;
        assert!(outcome.events.is_empty() || outcome.requests.is_empty());
        let outcome = engine.dispatch(Intent::JumpToEnd);
        let outcome = drain_loads(&mut engine, outcome).await;
        assert_eq!(engine.viewport().cursor_index, 99);
        assert_eq!(engine.viewport().viewport_start, 95);
        assert!(engine.viewport().at_dataset_end);
        let evicted = outcome
            .events
            .iter()
            .any(|e| matches!(e, ObservabilityEvent::ChunkUnloaded { chunk_start: 0 }));
        assert!(evicted);
    }

    #[tokio::test]
    async fn total_items_shrinking_clamps_cursor_and_invalidates_chunks() {
        let (mut engine, outcome) = Engine::new(source(100), cfg()).await;
        let _ = drain_loads(&mut engine, outcome).await;
        let outcome = engine.dispatch(Intent::JumpToEnd);
        let _ = drain_loads(&mut engine, outcome).await;
        let outcome = engine.apply_total_items(50);
        assert_eq!(engine.viewport().cursor_index, 49);
        assert_eq!(engine.viewport().viewport_start, 45);
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, ObservabilityEvent::TotalItemsChanged { new_total: 50 })));
    }

    #[tokio::test]
    async fn empty_dataset_has_no_requests_and_empty_slice() {
        let (engine, outcome) = Engine::new(source(0), cfg()).await;
        assert!(outcome.requests.is_empty());
        assert_eq!(outcome.visible.unwrap().items.len(), 0);
        assert_eq!(engine.viewport().cursor_index, 0);
    }

    #[tokio::test]
    async fn toggle_selection_current_round_trips_through_data_source() {
        let (mut engine, outcome) = Engine::new(source(10), cfg()).await;
        let _ = drain_loads(&mut engine, outcome).await;
        let ack = engine.toggle_selection_current().await;
        assert!(ack.success);
        assert!(ack.selected);
    }

    struct FakeTree {
        children: std::collections::HashMap<NodeId, Vec<NodeId>>,
        expanded: StdMutex<std::collections::HashSet<NodeId>>,
        values: std::collections::HashMap<NodeId, u32>,
        roots: Vec<NodeId>,
    }

    #[async_trait::async_trait]
    impl SelectionStore for FakeTree {
        async fn set_selected(&self, index: usize, _flag: bool) -> SelectionAck {
            SelectionAck {
                success: false,
                index: Some(index),
                id: None,
                selected: false,
                op: SelectionOpTag::Toggle,
                affected_ids: Vec::new(),
            }
        }
        async fn set_selected_by_id(&self, _id: &vtcore_model::ItemId, _flag: bool) -> SelectionAck {
            unreachable!("not exercised by this test")
        }
        async fn select_all(&self) -> SelectionAck {
            unreachable!("not exercised by this test")
        }
        async fn clear_selection(&self) -> SelectionAck {
            unreachable!("not exercised by this test")
        }
        async fn select_range(&self, _start: usize, _end: usize) -> SelectionAck {
            unreachable!("not exercised by this test")
        }
        async fn select_many(&self, ids: Vec<vtcore_model::ItemId>, flag: bool) -> SelectionAck {
            SelectionAck::batch(flag, ids)
        }
    }

    #[async_trait::async_trait]
    impl TreeDataSource<u32> for FakeTree {
        async fn roots(&self) -> Vec<NodeId> {
            self.roots.clone()
        }
        async fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
            self.children.get(id).cloned().unwrap_or_default()
        }
        fn is_expanded(&self, id: &NodeId) -> bool {
            self.expanded.lock().unwrap().contains(id)
        }
        fn set_expanded(&self, id: &NodeId, expanded: bool) {
            let mut guard = self.expanded.lock().unwrap();
            if expanded {
                guard.insert(id.clone());
            } else {
                guard.remove(id);
            }
        }
        fn node_value(&self, id: &NodeId) -> Option<u32> {
            self.values.get(id).copied()
        }
        fn has_children(&self, id: &NodeId) -> bool {
            self.children.get(id).is_some_and(|c| !c.is_empty())
        }
    }

    fn root_with_four_children() -> FakeTree {
        let root = NodeId::new("root");
        let children: Vec<NodeId> = (0..4).map(|i| NodeId::new(format!("child-{i}"))).collect();
        let mut children_map = std::collections::HashMap::new();
        children_map.insert(root.clone(), children.clone());
        let mut values = std::collections::HashMap::new();
        values.insert(root.clone(), 0);
        for (i, c) in children.iter().enumerate() {
            values.insert(c.clone(), i as u32 + 1);
        }
        FakeTree {
            children: children_map,
            expanded: StdMutex::new(std::collections::HashSet::new()),
            values,
            roots: vec![root],
        }
    }

    async fn drain_tree_loads(
        engine: &mut TreeEngine<u32, FakeTree>,
        mut outcome: DispatchOutcome<TreeRow<u32>>,
    ) -> DispatchOutcome<TreeRow<u32>> {
        loop {
            if outcome.requests.is_empty() {
                return outcome;
            }
            let request = outcome.requests.remove(0);
            let completion = engine.flattened_source().load_chunk(request).await;
            outcome = engine.apply_completion(completion);
        }
    }

    #[tokio::test]
    async fn expanding_tree_node_invalidates_chunk_cache_so_children_load_as_real_rows() {
        let tree = Arc::new(root_with_four_children());
        let cfg = ViewportConfig::new(5, 1, 1, 10, 0, 4, 4).unwrap();
        let (mut engine, outcome) = TreeEngine::new(tree, cfg).await;
        let outcome = drain_tree_loads(&mut engine, outcome).await;
        assert_eq!(engine.total_items(), 1);
        let visible = outcome.visible.unwrap();
        assert!(matches!(visible.items[0], VisibleEntry::Real(_)));

        let outcome = engine.toggle_node_at_cursor().await;
        let outcome = drain_tree_loads(&mut engine, outcome).await;
        assert_eq!(engine.total_items(), 5);

        let visible = outcome.visible.unwrap();
        // Without clearing the stale chunk-0 cache entry, flat indices 1..4
        // would surface as MissingPlaceholder instead of the new children.
        for (i, entry) in visible.items.iter().enumerate() {
            assert!(
                matches!(entry, VisibleEntry::Real(_)),
                "flat index {i} expected a real row after expansion, got {entry:?}"
            );
        }
    }
}
