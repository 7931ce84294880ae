//! Synthetic data sources proving the engine end-to-end: a flat row source
//! with a few million procedurally named rows, and a deep synthetic tree.
//! Both simulate real asynchronous latency so the demo actually exercises
//! the placeholder path instead of resolving every chunk synchronously.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use vtcore_model::{Item, ItemId};
use vtcore_source::{
    ChunkCompletion, DataSource, LoadRequest, NodeId, SelectionAck, SelectionOpTag,
    SelectionStore, TreeDataSource,
};

/// A small, deliberately-variable delay so different chunks don't all
/// resolve on the same tick; makes the loading-placeholder path visible in
/// the terminal instead of vanishing in a single frame.
async fn simulated_latency(start: usize) {
    let millis = 30 + (start % 7) * 15;
    tokio::time::sleep(Duration::from_millis(millis as u64)).await;
}

/// Procedurally named rows, `"row-000000000042"` style, so sorting and
/// chunk boundaries stay obviously readable at any of the million indices.
pub struct RowSource {
    total: usize,
    selected: StdMutex<HashSet<usize>>,
}

impl RowSource {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            selected: StdMutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl SelectionStore for RowSource {
    async fn set_selected(&self, index: usize, flag: bool) -> SelectionAck {
        if flag {
            self.selected.lock().expect("selection lock poisoned").insert(index);
        } else {
            self.selected.lock().expect("selection lock poisoned").remove(&index);
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

    async fn set_selected_by_id(&self, id: &ItemId, flag: bool) -> SelectionAck {
        let Ok(index) = id.as_str().trim_start_matches("row-").parse::<usize>() else {
            return SelectionAck {
                success: false,
                index: None,
                id: Some(id.clone()),
                selected: flag,
                op: SelectionOpTag::ToggleById,
                affected_ids: Vec::new(),
            };
        };
        let mut ack = self.set_selected(index, flag).await;
        ack.id = Some(id.clone());
        ack.op = SelectionOpTag::ToggleById;
        ack
    }

    async fn select_all(&self) -> SelectionAck {
        let mut guard = self.selected.lock().expect("selection lock poisoned");
        guard.clear();
        guard.extend(0..self.total);
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
        self.selected.lock().expect("selection lock poisoned").clear();
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
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let mut guard = self.selected.lock().expect("selection lock poisoned");
        for i in start..=end.min(self.total.saturating_sub(1)) {
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

    async fn select_many(&self, ids: Vec<ItemId>, flag: bool) -> SelectionAck {
        let mut guard = self.selected.lock().expect("selection lock poisoned");
        for id in &ids {
            if let Ok(index) = id.as_str().trim_start_matches("row-").parse::<usize>() {
                if flag {
                    guard.insert(index);
                } else {
                    guard.remove(&index);
                }
            }
        }
        SelectionAck::batch(flag, ids)
    }
}

#[async_trait]
impl DataSource<String> for RowSource {
    async fn total_items(&self) -> usize {
        self.total
    }

    async fn load_chunk(&self, request: LoadRequest) -> ChunkCompletion<String> {
        simulated_latency(request.start).await;
        let end = (request.start + request.count).min(self.total);
        let selected = self.selected.lock().expect("selection lock poisoned").clone();
        let items = (request.start..end)
            .map(|i| {
                Item::new(format!("row-{i:012}"), format!("row {i}")).with_selected(selected.contains(&i))
            })
            .collect();
        ChunkCompletion {
            request_id: request.request_id,
            start: request.start,
            items,
            total_items_snapshot: self.total,
        }
    }

    fn item_id(&self, value: &String) -> ItemId {
        ItemId::new(value.clone())
    }
}

/// A synthetic tree built as a flat arena (§9 "Arena/index over pointers"),
/// `branching` children per interior node down to `depth` levels, all
/// collapsed except the roots.
pub struct TreeSource {
    labels: HashMap<NodeId, String>,
    children: HashMap<NodeId, Vec<NodeId>>,
    roots: Vec<NodeId>,
    expanded: StdMutex<HashSet<NodeId>>,
    selected: StdMutex<HashSet<NodeId>>,
}

impl TreeSource {
    pub fn new(depth: usize, branching: usize) -> Self {
        let mut labels = HashMap::new();
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut roots = Vec::new();
        let mut next_id = 0u64;
        let mut fresh_id = || {
            let id = NodeId::new(format!("node-{next_id}"));
            next_id += 1;
            id
        };

        fn build(
            level: usize,
            depth: usize,
            branching: usize,
            parent_label: &str,
            labels: &mut HashMap<NodeId, String>,
            children: &mut HashMap<NodeId, Vec<NodeId>>,
            fresh_id: &mut impl FnMut() -> NodeId,
        ) -> NodeId {
            let id = fresh_id();
            labels.insert(id.clone(), parent_label.to_string());
            if level < depth {
                let mut kids = Vec::with_capacity(branching);
                for b in 0..branching {
                    let label = format!("{parent_label}.{b}");
                    kids.push(build(level + 1, depth, branching, &label, labels, children, fresh_id));
                }
                children.insert(id.clone(), kids);
            }
            id
        }

        for r in 0..branching {
            let label = format!("root-{r}");
            let id = build(1, depth, branching, &label, &mut labels, &mut children, &mut fresh_id);
            roots.push(id);
        }

        Self {
            labels,
            children,
            roots,
            expanded: StdMutex::new(HashSet::new()),
            selected: StdMutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl SelectionStore for TreeSource {
    async fn set_selected(&self, _index: usize, _flag: bool) -> SelectionAck {
        SelectionAck {
            success: false,
            index: Some(_index),
            id: None,
            selected: _flag,
            op: SelectionOpTag::Toggle,
            affected_ids: Vec::new(),
        }
    }

    async fn set_selected_by_id(&self, id: &ItemId, flag: bool) -> SelectionAck {
        if flag {
            self.selected.lock().expect("selection lock poisoned").insert(id.clone());
        } else {
            self.selected.lock().expect("selection lock poisoned").remove(id);
        }
        SelectionAck {
            success: true,
            index: None,
            id: Some(id.clone()),
            selected: flag,
            op: SelectionOpTag::ToggleById,
            affected_ids: Vec::new(),
        }
    }

    async fn select_all(&self) -> SelectionAck {
        let mut guard = self.selected.lock().expect("selection lock poisoned");
        guard.extend(self.labels.keys().cloned());
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
        self.selected.lock().expect("selection lock poisoned").clear();
        SelectionAck {
            success: true,
            index: None,
            id: None,
            selected: false,
            op: SelectionOpTag::Clear,
            affected_ids: Vec::new(),
        }
    }

    async fn select_range(&self, _start: usize, _end: usize) -> SelectionAck {
        SelectionAck {
            success: false,
            index: None,
            id: None,
            selected: false,
            op: SelectionOpTag::Range,
            affected_ids: Vec::new(),
        }
    }

    async fn select_many(&self, ids: Vec<ItemId>, flag: bool) -> SelectionAck {
        let mut guard = self.selected.lock().expect("selection lock poisoned");
        for id in &ids {
            if flag {
                guard.insert(id.clone());
            } else {
                guard.remove(id);
            }
        }
        SelectionAck::batch(flag, ids)
    }
}

#[async_trait]
impl TreeDataSource<String> for TreeSource {
    async fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    async fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.lock().expect("expanded lock poisoned").contains(id)
    }

    fn set_expanded(&self, id: &NodeId, expanded: bool) {
        let mut guard = self.expanded.lock().expect("expanded lock poisoned");
        if expanded {
            guard.insert(id.clone());
        } else {
            guard.remove(id);
        }
    }

    fn node_value(&self, id: &NodeId) -> Option<String> {
        let selected = self.selected.lock().expect("selection lock poisoned").contains(id);
        self.labels.get(id).map(|label| {
            if selected {
                format!("{label} [x]")
            } else {
                label.clone()
            }
        })
    }

    fn has_children(&self, id: &NodeId) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }
}
