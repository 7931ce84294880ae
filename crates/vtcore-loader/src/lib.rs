//! The load coordinator (C3): decides which chunks to request, deduplicates
//! in-flight loads, merges completions into the cache, and assembles the
//! visible slice handed to the renderer (§4.3).

use tracing::debug;
use vtcore_cache::ChunkCache;
use vtcore_events::{ObservabilityEvent, VisibleEntry};
use vtcore_geometry::BoundingArea;
use vtcore_model::Item;
use vtcore_source::{ChunkCompletion, LoadRequest};

/// Result of [`LoadCoordinator::assemble_visible_slice`]: the authoritative
/// render input plus every observability event the assembly triggered
/// (loads newly kicked off while walking the viewport).
pub struct AssembledSlice<V> {
    pub items: Vec<VisibleEntry<V>>,
    pub placeholder_count: usize,
    pub requests: Vec<LoadRequest>,
    pub events: Vec<ObservabilityEvent>,
}

/// Wraps a [`ChunkCache`] with the request-decision and completion-merge
/// logic of §4.3. Owns no viewport state; the viewport controller (C4)
/// drives it with bounding areas and intent-derived parameters.
pub struct LoadCoordinator<V> {
    cache: ChunkCache<V>,
    next_request_id: u64,
}

impl<V> Default for LoadCoordinator<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LoadCoordinator<V> {
    pub fn new() -> Self {
        Self {
            cache: ChunkCache::new(),
            next_request_id: 0,
        }
    }

    pub fn cache(&self) -> &ChunkCache<V> {
        &self.cache
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Requests any chunk in `bounding` that is neither resident nor
    /// in-flight (§4.3 "Request decision"). Marks each requested start as
    /// in-flight before returning.
    pub fn requests_for(
        &mut self,
        bounding: &BoundingArea,
        chunk_size: usize,
        total_items: usize,
    ) -> (Vec<LoadRequest>, Vec<ObservabilityEvent>) {
        let mut requests = Vec::new();
        let mut events = Vec::new();
        for start in bounding.chunk_starts(chunk_size) {
            if self.cache.contains(start) || self.cache.contains_in_flight(start) {
                continue;
            }
            let count = chunk_size.min(total_items.saturating_sub(start));
            if count == 0 {
                continue;
            }
            let request = LoadRequest {
                start,
                count,
                request_id: self.next_id(),
                filters: Vec::new(),
                sort: Vec::new(),
            };
            self.cache.mark_in_flight(start, request.request_id);
            debug!(target: "vtcore::loader", start, request_id = request.request_id, "chunk load requested");
            events.push(ObservabilityEvent::ChunkLoadingStarted {
                chunk_start: start,
                request: request.clone(),
            });
            requests.push(request);
        }
        (requests, events)
    }

    /// Merges an arriving completion into the cache, or discards it as
    /// stale if its `total_items_snapshot` no longer matches, or if it does
    /// not correspond to the coordinator's live in-flight request for that
    /// start (§4.3 "Completion merge", §5 "Ordering guarantees", §5
    /// "Cancellation": "Refresh clears in-flight IDs: subsequently arriving
    /// pre-refresh completions are treated as stale"). A `Refresh` clears
    /// the in-flight set without touching `total_items`, so the snapshot
    /// check alone cannot catch a pre-refresh completion arriving after a
    /// post-refresh re-request for the same start is already in flight —
    /// the request-id comparison is what catches that case.
    pub fn handle_completion(
        &mut self,
        completion: ChunkCompletion<V>,
        current_total_items: usize,
        requested_count: usize,
    ) -> ObservabilityEvent {
        let start = completion.start;
        let in_flight_id = self.cache.clear_in_flight(start);
        let stale = completion.total_items_snapshot != current_total_items
            || in_flight_id != Some(completion.request_id);
        if stale {
            debug!(
                target: "vtcore::loader",
                start,
                request_id = completion.request_id,
                in_flight_id = ?in_flight_id,
                "discarding stale chunk completion"
            );
            return ObservabilityEvent::StaleCompletionDiscarded { chunk_start: start };
        }
        let item_count = completion.items.len().min(requested_count);
        let chunk = completion.into_chunk(requested_count);
        self.cache.insert(chunk);
        ObservabilityEvent::ChunkLoadingCompleted {
            chunk_start: start,
            item_count,
        }
    }

    pub fn evict(&mut self, bounding: &BoundingArea) -> Vec<ObservabilityEvent> {
        self.cache
            .evict_outside(bounding)
            .into_iter()
            .map(|e| ObservabilityEvent::ChunkUnloaded {
                chunk_start: e.chunk_start,
            })
            .collect()
    }

    pub fn invalidate_beyond(&mut self, new_total: usize) -> Vec<ObservabilityEvent> {
        self.cache
            .invalidate_beyond(new_total)
            .into_iter()
            .map(|e| ObservabilityEvent::ChunkUnloaded {
                chunk_start: e.chunk_start,
            })
            .collect()
    }

    pub fn refresh(&mut self) {
        self.cache.clear();
    }
}

impl<V: Clone> LoadCoordinator<V> {
    /// Produces exactly `min(height, total_items - viewport_start)` entries
    /// (§4.3 "Visible-slice assembly"), synchronously requesting any chunk
    /// needed along the way and yielding placeholders for it in the
    /// meantime.
    pub fn assemble_visible_slice(
        &mut self,
        viewport_start: usize,
        height: usize,
        chunk_size: usize,
        total_items: usize,
    ) -> AssembledSlice<V> {
        let want = height.min(total_items.saturating_sub(viewport_start));
        let mut items = Vec::with_capacity(want);
        let mut placeholder_count = 0;
        let mut requests = Vec::new();
        let mut events = Vec::new();

        for i in viewport_start..viewport_start + want {
            let s = vtcore_geometry::chunk_start_for(i, chunk_size);
            match self.cache.get(s) {
                Some(chunk) if i < chunk.end_exclusive() => {
                    let item: &Item<V> = chunk.item_at(i).expect("index within chunk bounds");
                    items.push(VisibleEntry::Real(item.clone()));
                }
                Some(_chunk) => {
                    // Resident but short (final chunk, or a contract
                    // violation from the data source): §4.3 rule 4.
                    placeholder_count += 1;
                    items.push(VisibleEntry::MissingPlaceholder { logical_index: i });
                    events.push(ObservabilityEvent::ContractViolation {
                        detail: format!("chunk at {s} missing item {i}"),
                    });
                }
                None => {
                    placeholder_count += 1;
                    items.push(VisibleEntry::LoadingPlaceholder { logical_index: i });
                    if !self.cache.contains_in_flight(s) {
                        let count = chunk_size.min(total_items.saturating_sub(s));
                        if count > 0 {
                            let request = LoadRequest {
                                start: s,
                                count,
                                request_id: self.next_id(),
                                filters: Vec::new(),
                                sort: Vec::new(),
                            };
                            self.cache.mark_in_flight(s, request.request_id);
                            events.push(ObservabilityEvent::ChunkLoadingStarted {
                                chunk_start: s,
                                request: request.clone(),
                            });
                            requests.push(request);
                        }
                    }
                }
            }
        }

        AssembledSlice {
            items,
            placeholder_count,
            requests,
            events,
        }
    }
}
