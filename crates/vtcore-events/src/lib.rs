//! Intent and event vocabulary for the engine (§6 "Intent stream" / "Event
//! stream") plus the async event-source registry that lets a host feed
//! background producers (file watchers, timers, LSP-style notifications)
//! into the same queue an engine drains.
//!
//! The registry here generalizes the same `AsyncEventSource` + registry
//! pattern used for input/tick plumbing elsewhere in this codebase: a
//! minimal `name + spawn` surface, one task per source, termination on
//! channel close.

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use vtcore_model::ItemId;
use vtcore_source::{LoadRequest, SelectionAck};

/// Bound on the intent/event channel. Matches the order of magnitude used
/// elsewhere in this codebase for a single-producer-class, single-consumer
/// bounded channel: enough slack to absorb a burst of navigation intents
/// between render ticks without unbounded growth.
pub const EVENT_CHANNEL_CAP: usize = 4096;

/// Inbound intents, forwarded to C4 (flat mode) or C5-then-C4 (tree mode)
/// (§4.4, §6 "Intent stream").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CursorUp,
    CursorDown,
    PageUp,
    PageDown,
    JumpToStart,
    JumpToEnd,
    JumpTo(usize),
    Refresh,
    ConfigChanged,

    ToggleSelectionCurrent,
    SelectAll,
    ClearSelection,
    SelectRange(usize, usize),

    SetFilters(Vec<(String, String)>),
    SetSort(Vec<String>),

    ToggleNodeAtCursor,
    ExpandAll,
    CollapseAll,
    SetCascading(bool),

    Tick,
}

/// Observability-only signals (§4.2, §4.3, §4.4): never authoritative for
/// rendering, only for logs/metrics/tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservabilityEvent {
    ChunkLoadingStarted { chunk_start: usize, request: LoadRequest },
    ChunkLoadingCompleted { chunk_start: usize, item_count: usize },
    ChunkUnloaded { chunk_start: usize },
    TotalItemsChanged { new_total: usize },
    /// §7 kind 4: a data-source contract violation (bad indices, overlong
    /// chunk, or a detected tree cycle). `detail` is a short, loggable
    /// description, not a structured error type, matching §7's "warning
    /// event emitted" language rather than a fatal-error path.
    ContractViolation { detail: String },
    /// §7 kind 3 / §5 "Cancellation": a completion was dropped because it no
    /// longer matches the coordinator's live in-flight request for that
    /// chunk (stale `total_items` snapshot, or superseded by a refresh).
    /// Distinct from `ChunkUnloaded` — nothing resident was evicted, a
    /// completion just never made it into the cache.
    StaleCompletionDiscarded { chunk_start: usize },
}

/// An entry in a visible slice: real data, or one of the two placeholder
/// kinds the coordinator synthesizes when a chunk is missing or short
/// (§4.3 rules 3-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleEntry<V> {
    Real(vtcore_model::Item<V>),
    LoadingPlaceholder { logical_index: usize },
    MissingPlaceholder { logical_index: usize },
}

impl<V> VisibleEntry<V> {
    pub fn id(&self) -> ItemId {
        match self {
            VisibleEntry::Real(item) => item.id.clone(),
            VisibleEntry::LoadingPlaceholder { logical_index } => {
                ItemId::new(format!("loading-{logical_index}"))
            }
            VisibleEntry::MissingPlaceholder { logical_index } => {
                ItemId::new(format!("missing-{logical_index}"))
            }
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, VisibleEntry::Real(_))
    }
}

/// Outbound event stream (§6 "Event stream"). `VisibleItemsChanged` is the
/// authoritative render input; everything else is observability or a
/// selection-store pass-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent<V> {
    VisibleItemsChanged {
        items: Vec<VisibleEntry<V>>,
        placeholder_count: usize,
    },
    Observability(ObservabilityEvent),
    SelectionResponse(SelectionAck),
}

/// Implemented by any async event producer the host wants merged into the
/// engine's single logical FIFO queue (§5 "Scheduling model"). Mirrors the
/// minimal `name + spawn` surface used for input/tick sources elsewhere:
/// implementors own their task lifecycle and stop on send failure.
#[async_trait]
pub trait AsyncEventSource<V>: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, tx: Sender<Intent>) -> JoinHandle<()>;
}

/// Registry of event sources a host spawns at startup. Kept minimal on
/// purpose: add/remove and supervision policy are host concerns layered on
/// top, not this crate's.
#[derive(Default)]
pub struct EventSourceRegistry<V> {
    sources: Vec<Box<dyn AsyncEventSource<V>>>,
}

impl<V> EventSourceRegistry<V> {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn register(&mut self, source: Box<dyn AsyncEventSource<V>>) {
        self.sources.push(source);
    }

    pub fn spawn_all(self, tx: Sender<Intent>) -> Vec<JoinHandle<()>> {
        self.sources
            .into_iter()
            .map(|source| {
                tracing::debug!(target: "vtcore::events", name = source.name(), "spawning event source");
                source.spawn(tx.clone())
            })
            .collect()
    }
}

/// Emits `Intent::Tick` on a fixed interval; useful for hosts that want a
/// render heartbeat independent of navigation input.
pub struct TickEventSource<V> {
    interval: std::time::Duration,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V> TickEventSource<V> {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<V: Send + 'static> AsyncEventSource<V> for TickEventSource<V> {
    fn name(&self) -> &'static str {
        "tick"
    }

    fn spawn(self: Box<Self>, tx: Sender<Intent>) -> JoinHandle<()> {
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if tx.send(Intent::Tick).await.is_err() {
                    break;
                }
            }
        })
    }
}
