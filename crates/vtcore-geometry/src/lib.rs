//! Pure viewport geometry: bounds, thresholds, and chunk-address arithmetic.
//!
//! Every function here is total and operates on plain integers. None of them
//! touch a cache, a data source, or an event bus — that keeps this crate
//! trivially property-testable (see `tests` below) and lets every other core
//! crate build on a small, fully-verified arithmetic base.

use thiserror::Error;

/// Construction-time failure for a [`ViewportConfig`]. All other navigation
/// inputs in this crate are clamped rather than rejected; this is the one
/// place a caller can hand in something structurally unusable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("viewport height must be >= 1")]
    ZeroHeight,
    #[error("chunk size must be >= 1")]
    ZeroChunkSize,
    #[error("top_threshold ({top_threshold}) must be < height ({height})")]
    TopThresholdOutOfRange { top_threshold: usize, height: usize },
    #[error("bottom_threshold ({bottom_threshold}) must be < height ({height})")]
    BottomThresholdOutOfRange {
        bottom_threshold: usize,
        height: usize,
    },
}

/// Read-only-after-construction viewport geometry parameters (§3 "Viewport
/// configuration"). `ConfigChanged` intents produce a new value of this type
/// rather than mutating one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    pub height: usize,
    pub top_threshold: usize,
    pub bottom_threshold: usize,
    pub chunk_size: usize,
    pub initial_index: usize,
    pub bounding_before: usize,
    pub bounding_after: usize,
}

impl ViewportConfig {
    pub fn new(
        height: usize,
        top_threshold: usize,
        bottom_threshold: usize,
        chunk_size: usize,
        initial_index: usize,
        bounding_before: usize,
        bounding_after: usize,
    ) -> Result<Self, GeometryError> {
        if height == 0 {
            return Err(GeometryError::ZeroHeight);
        }
        if chunk_size == 0 {
            return Err(GeometryError::ZeroChunkSize);
        }
        if top_threshold >= height {
            return Err(GeometryError::TopThresholdOutOfRange {
                top_threshold,
                height,
            });
        }
        if bottom_threshold >= height {
            return Err(GeometryError::BottomThresholdOutOfRange {
                bottom_threshold,
                height,
            });
        }
        Ok(Self {
            height,
            top_threshold,
            bottom_threshold,
            chunk_size,
            initial_index,
            bounding_before,
            bounding_after,
        })
    }
}

/// Mutable cursor/viewport state (§3 "Viewport state"). Every public operation
/// elsewhere in the engine must leave this in a configuration satisfying the
/// invariants documented on each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportState {
    /// `0 <= cursor_index < max(total_items, 1)`.
    pub cursor_index: usize,
    /// `cursor_index - viewport_start == cursor_within_viewport`.
    pub viewport_start: usize,
    pub cursor_within_viewport: usize,
    pub at_top_threshold: bool,
    pub at_bottom_threshold: bool,
    pub at_dataset_start: bool,
    pub at_dataset_end: bool,
}

impl ViewportState {
    /// Construct the cold-start state for `cfg.initial_index` against
    /// `total_items`, with flags and viewport position already settled.
    pub fn new(cfg: &ViewportConfig, total_items: usize) -> Self {
        let cursor_index = clamp_index(cfg.initial_index, total_items);
        let mut state = Self {
            cursor_index,
            viewport_start: 0,
            cursor_within_viewport: 0,
            at_top_threshold: false,
            at_bottom_threshold: false,
            at_dataset_start: true,
            at_dataset_end: true,
        };
        reposition_for_cursor(&mut state, cfg, total_items);
        update_viewport_flags(&mut state, cfg, total_items);
        state
    }
}

/// Clamp a navigation target into `[0, max(total_items, 1) - 1]`.
pub fn clamp_index(index: usize, total_items: usize) -> usize {
    if total_items == 0 {
        0
    } else {
        index.min(total_items - 1)
    }
}

/// Clamp a candidate viewport start so `[start, start + height)` stays inside
/// the dataset whenever possible (short datasets fall back to `0`).
pub fn clamp_viewport_start(start: usize, height: usize, total_items: usize) -> usize {
    if total_items == 0 {
        return 0;
    }
    let max_start = total_items.saturating_sub(height);
    start.min(max_start)
}

/// `floor(index / chunk_size) * chunk_size`.
pub fn chunk_start_for(index: usize, chunk_size: usize) -> usize {
    debug_assert!(chunk_size > 0, "chunk_size must be >= 1");
    (index / chunk_size) * chunk_size
}

/// The chunk-rounded working-set window around the current viewport (§3
/// "Bounding area").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingArea {
    pub start_item: usize,
    /// Inclusive.
    pub end_item: usize,
    pub first_chunk: usize,
    /// Exclusive.
    pub chunk_end_exclusive: usize,
}

impl BoundingArea {
    /// Iterate every chunk start covered by this bounding area, in ascending
    /// order, stepping by `chunk_size`.
    pub fn chunk_starts(&self, chunk_size: usize) -> impl Iterator<Item = usize> + use<> {
        let first = self.first_chunk;
        let end = self.chunk_end_exclusive;
        (0..).map(move |i| first + i * chunk_size).take_while(move |s| *s < end)
    }
}

pub fn compute_bounding_area(
    viewport: &ViewportState,
    cfg: &ViewportConfig,
    total_items: usize,
) -> BoundingArea {
    if total_items == 0 {
        return BoundingArea {
            start_item: 0,
            end_item: 0,
            first_chunk: 0,
            chunk_end_exclusive: 0,
        };
    }
    let viewport_end_inclusive = (viewport.viewport_start + cfg.height).saturating_sub(1);
    let last_index = total_items - 1;
    let start_item = viewport
        .viewport_start
        .saturating_sub(cfg.bounding_before)
        .min(last_index);
    let end_item = (viewport_end_inclusive + cfg.bounding_after).min(last_index);
    let first_chunk = chunk_start_for(start_item, cfg.chunk_size);
    let chunk_end_exclusive = chunk_start_for(end_item, cfg.chunk_size) + cfg.chunk_size;
    BoundingArea {
        start_item,
        end_item,
        first_chunk,
        chunk_end_exclusive,
    }
}

/// Refresh the four derived booleans plus `cursor_within_viewport` from the
/// integer fields. Called after every cursor or viewport-start mutation.
pub fn update_viewport_flags(viewport: &mut ViewportState, cfg: &ViewportConfig, total_items: usize) {
    viewport.cursor_within_viewport = viewport.cursor_index - viewport.viewport_start;
    viewport.at_top_threshold = cfg.top_threshold < cfg.height
        && viewport.cursor_within_viewport == cfg.top_threshold;
    viewport.at_bottom_threshold = cfg.bottom_threshold < cfg.height
        && viewport.cursor_within_viewport == cfg.height - cfg.bottom_threshold - 1;
    viewport.at_dataset_start = viewport.viewport_start == 0;
    viewport.at_dataset_end = viewport.viewport_start + cfg.height >= total_items;
}

/// Minimally reposition `viewport_start` so `cursor_index` stays visible,
/// then clamp into dataset bounds.
pub fn reposition_for_cursor(viewport: &mut ViewportState, cfg: &ViewportConfig, total_items: usize) {
    if viewport.cursor_index < viewport.viewport_start {
        viewport.viewport_start = viewport.cursor_index;
    } else if viewport.cursor_index >= viewport.viewport_start + cfg.height {
        viewport.viewport_start = viewport.cursor_index + 1 - cfg.height;
    }
    viewport.viewport_start = clamp_viewport_start(viewport.viewport_start, cfg.height, total_items);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(height: usize, chunk_size: usize, before: usize, after: usize) -> ViewportConfig {
        ViewportConfig::new(height, 1, 1, chunk_size, 0, before, after).unwrap()
    }

    #[test]
    fn rejects_zero_height() {
        assert_eq!(
            ViewportConfig::new(0, 0, 0, 10, 0, 0, 0),
            Err(GeometryError::ZeroHeight)
        );
    }

    #[test]
    fn rejects_thresholds_out_of_range() {
        assert!(ViewportConfig::new(5, 5, 0, 10, 0, 0, 0).is_err());
        assert!(ViewportConfig::new(5, 0, 5, 10, 0, 0, 0).is_err());
    }

    #[test]
    fn cold_start_scenario() {
        // height=5, chunkSize=10, bounding=4/4, totalItems=100
        let cfg = ViewportConfig::new(5, 1, 1, 10, 0, 4, 4).unwrap();
        let state = ViewportState::new(&cfg, 100);
        assert_eq!(state.cursor_index, 0);
        assert_eq!(state.viewport_start, 0);
        assert_eq!(state.cursor_within_viewport, 0);
        let bounding = compute_bounding_area(&state, &cfg, 100);
        assert_eq!(bounding.start_item, 0);
        assert_eq!(bounding.end_item, 8);
        assert_eq!(bounding.first_chunk, 0);
        assert_eq!(bounding.chunk_end_exclusive, 10);
        assert_eq!(bounding.chunk_starts(cfg.chunk_size).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn jump_to_end_scenario() {
        let cfg = ViewportConfig::new(5, 1, 1, 10, 0, 4, 4).unwrap();
        let mut state = ViewportState::new(&cfg, 100);
        state.cursor_index = 99;
        reposition_for_cursor(&mut state, &cfg, 100);
        update_viewport_flags(&mut state, &cfg, 100);
        assert_eq!(state.viewport_start, 95);
        assert_eq!(state.cursor_within_viewport, 4);
        assert!(state.at_dataset_end);
        let bounding = compute_bounding_area(&state, &cfg, 100);
        assert_eq!(bounding.start_item, 91);
        assert_eq!(bounding.end_item, 99);
        assert_eq!(
            bounding.chunk_starts(cfg.chunk_size).collect::<Vec<_>>(),
            vec![90]
        );
    }

    #[test]
    fn empty_dataset_geometry_is_degenerate_but_valid() {
        let c = cfg(5, 10, 4, 4);
        let state = ViewportState::new(&c, 0);
        assert_eq!(state.cursor_index, 0);
        assert_eq!(state.viewport_start, 0);
        let bounding = compute_bounding_area(&state, &c, 0);
        assert_eq!(bounding.chunk_starts(c.chunk_size).count(), 0);
    }

    #[test]
    fn height_exceeding_total_keeps_start_and_end_flags_true() {
        let c = cfg(50, 10, 0, 0);
        let state = ViewportState::new(&c, 5);
        assert_eq!(state.viewport_start, 0);
        assert!(state.at_dataset_start);
        assert!(state.at_dataset_end);
    }

    proptest::proptest! {
        #[test]
        fn viewport_invariants_hold(
            height in 1usize..50,
            top in 0usize..50,
            bottom in 0usize..50,
            chunk_size in 1usize..30,
            total_items in 0usize..500,
            cursor_seed in 0usize..600,
        ) {
            let top = top % height;
            let bottom = bottom % height;
            let cfg = ViewportConfig::new(height, top, bottom, chunk_size, 0, 3, 3).unwrap();
            let mut state = ViewportState::new(&cfg, total_items);
            state.cursor_index = clamp_index(cursor_seed, total_items);
            reposition_for_cursor(&mut state, &cfg, total_items);
            update_viewport_flags(&mut state, &cfg, total_items);

            prop_assert!(state.cursor_index < total_items.max(1));
            prop_assert!(state.viewport_start <= state.cursor_index);
            prop_assert!(state.cursor_index < state.viewport_start + cfg.height);
            prop_assert_eq!(state.cursor_within_viewport, state.cursor_index - state.viewport_start);
            if total_items > 0 {
                prop_assert!(state.viewport_start + cfg.height <= total_items.max(cfg.height));
            }

            let bounding = compute_bounding_area(&state, &cfg, total_items);
            for s in bounding.chunk_starts(cfg.chunk_size) {
                prop_assert_eq!(s % chunk_size, 0);
                prop_assert!(s >= bounding.first_chunk && s < bounding.chunk_end_exclusive);
            }
        }

        #[test]
        fn jump_to_is_idempotent(
            height in 1usize..30,
            chunk_size in 1usize..20,
            total_items in 1usize..400,
            target in 0usize..500,
        ) {
            let cfg = ViewportConfig::new(height, 0, 0, chunk_size, 0, 2, 2).unwrap();
            let mut state = ViewportState::new(&cfg, total_items);
            let apply = |state: &mut ViewportState| {
                state.cursor_index = clamp_index(target, total_items);
                reposition_for_cursor(state, &cfg, total_items);
                update_viewport_flags(state, &cfg, total_items);
            };
            apply(&mut state);
            let once = state;
            apply(&mut state);
            prop_assert_eq!(once, state);
        }
    }
}
