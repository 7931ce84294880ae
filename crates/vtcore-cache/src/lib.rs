//! The chunk cache (C2): an address-range to chunk map with a bounding-area
//! eviction policy and an in-flight set for load-request deduplication.
//!
//! Keyed by chunk-start index rather than a general cache key, the same way
//! the render layer's partial-line cache is keyed by viewport-relative line
//! rather than a hash of content.

use ahash::AHashMap;
use vtcore_geometry::BoundingArea;
use vtcore_model::Chunk;

/// `chunk-unloaded` observability signal (§4.2 "Eviction emits a
/// `chunk-unloaded` observability event"). Kept as a plain return value here;
/// the event-bus crate wraps it into the richer `ObservabilityEvent` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub chunk_start: usize,
}

/// Map from chunk-start index to resident chunk, plus the in-flight set
/// (§3 "Chunk cache"). At any instant `resident ∩ in_flight = ∅`; callers
/// are expected to call [`ChunkCache::mark_in_flight`] before issuing a load
/// and [`ChunkCache::clear_in_flight`] when a completion (stale or not)
/// arrives for that start.
#[derive(Debug, Default)]
pub struct ChunkCache<V> {
    resident: AHashMap<usize, Chunk<V>>,
    in_flight: AHashMap<usize, u64>,
}

impl<V> ChunkCache<V> {
    pub fn new() -> Self {
        Self {
            resident: AHashMap::new(),
            in_flight: AHashMap::new(),
        }
    }

    pub fn get(&self, chunk_start: usize) -> Option<&Chunk<V>> {
        self.resident.get(&chunk_start)
    }

    pub fn contains(&self, chunk_start: usize) -> bool {
        self.resident.contains_key(&chunk_start)
    }

    pub fn contains_in_flight(&self, chunk_start: usize) -> bool {
        self.in_flight.contains_key(&chunk_start)
    }

    /// Overwrites any prior resident chunk with the same start; updates the
    /// load-request id recorded on the chunk (§4.2 "insert").
    pub fn insert(&mut self, chunk: Chunk<V>) {
        self.resident.insert(chunk.start, chunk);
    }

    pub fn mark_in_flight(&mut self, chunk_start: usize, request_id: u64) {
        self.in_flight.insert(chunk_start, request_id);
    }

    /// Returns the request id that was in flight for `chunk_start`, if any,
    /// regardless of whether the arriving completion turns out stale.
    pub fn clear_in_flight(&mut self, chunk_start: usize) -> Option<u64> {
        self.in_flight.remove(&chunk_start)
    }

    pub fn clear_all_in_flight(&mut self) {
        self.in_flight.clear();
    }

    /// Removes every resident chunk whose start lies outside
    /// `[bounding.first_chunk, bounding.chunk_end_exclusive)` (§4.2
    /// "evictOutside"), returning one [`Evicted`] per removed chunk in
    /// ascending start order for deterministic event ordering.
    pub fn evict_outside(&mut self, bounding: &BoundingArea) -> Vec<Evicted> {
        let mut doomed: Vec<usize> = self
            .resident
            .keys()
            .copied()
            .filter(|start| *start < bounding.first_chunk || *start >= bounding.chunk_end_exclusive)
            .collect();
        doomed.sort_unstable();
        for start in &doomed {
            self.resident.remove(start);
        }
        doomed.into_iter().map(|chunk_start| Evicted { chunk_start }).collect()
    }

    /// Drops every resident chunk and in-flight marker whose start is `>=
    /// new_total` (§4.4 "Total-items change": "invalidate any cached chunk
    /// whose start is >= newTotal").
    pub fn invalidate_beyond(&mut self, new_total: usize) -> Vec<Evicted> {
        let mut doomed: Vec<usize> = self
            .resident
            .keys()
            .copied()
            .filter(|start| *start >= new_total)
            .collect();
        doomed.sort_unstable();
        for start in &doomed {
            self.resident.remove(start);
            self.in_flight.remove(start);
        }
        doomed.into_iter().map(|chunk_start| Evicted { chunk_start }).collect()
    }

    pub fn resident_starts(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self.resident.keys().copied().collect();
        starts.sort_unstable();
        starts
    }

    pub fn len(&self) -> usize {
        self.resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    pub fn clear(&mut self) {
        self.resident.clear();
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtcore_model::Item;

    fn chunk(start: usize, len: usize) -> Chunk<u32> {
        let items = (0..len)
            .map(|i| Item::new(format!("id-{}", start + i), (start + i) as u32))
            .collect();
        Chunk::new(start, items, 0)
    }

    #[test]
    fn insert_overwrites_same_start() {
        let mut cache = ChunkCache::new();
        cache.insert(chunk(0, 10));
        cache.insert(chunk(0, 5));
        assert_eq!(cache.get(0).unwrap().len(), 5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_outside_removes_only_out_of_range_chunks() {
        let mut cache = ChunkCache::new();
        cache.insert(chunk(0, 10));
        cache.insert(chunk(10, 10));
        cache.insert(chunk(90, 10));
        let bounding = BoundingArea {
            start_item: 0,
            end_item: 19,
            first_chunk: 0,
            chunk_end_exclusive: 20,
        };
        let evicted = cache.evict_outside(&bounding);
        assert_eq!(evicted, vec![Evicted { chunk_start: 90 }]);
        assert_eq!(cache.resident_starts(), vec![0, 10]);
    }

    #[test]
    fn invalidate_beyond_drops_chunks_and_in_flight_past_new_total() {
        let mut cache = ChunkCache::new();
        cache.insert(chunk(0, 10));
        cache.insert(chunk(50, 10));
        cache.mark_in_flight(60, 7);
        cache.invalidate_beyond(50);
        assert_eq!(cache.resident_starts(), vec![0]);
        assert!(!cache.contains_in_flight(60));
    }

    proptest::proptest! {
        #[test]
        fn resident_never_overlaps_in_flight(
            inserts in proptest::collection::vec(0usize..20, 0..10),
            in_flights in proptest::collection::vec(0usize..20, 0..10),
        ) {
            let mut cache: ChunkCache<u32> = ChunkCache::new();
            for s in &inserts {
                cache.insert(chunk(*s * 10, 10));
            }
            for s in &in_flights {
                if !cache.contains(*s * 10) {
                    cache.mark_in_flight(*s * 10, 0);
                }
            }
            for s in cache.resident_starts() {
                prop_assert!(!cache.contains_in_flight(s));
            }
        }

        #[test]
        fn eviction_leaves_only_in_bounds_chunks(
            starts in proptest::collection::vec(0usize..30, 0..15),
            first_chunk in 0usize..15,
            span in 1usize..15,
        ) {
            let mut cache: ChunkCache<u32> = ChunkCache::new();
            for s in &starts {
                cache.insert(chunk(*s * 10, 10));
            }
            let bounding = BoundingArea {
                start_item: first_chunk * 10,
                end_item: (first_chunk + span) * 10,
                first_chunk: first_chunk * 10,
                chunk_end_exclusive: (first_chunk + span) * 10,
            };
            cache.evict_outside(&bounding);
            for s in cache.resident_starts() {
                prop_assert!(s >= bounding.first_chunk && s < bounding.chunk_end_exclusive);
            }
        }
    }
}
