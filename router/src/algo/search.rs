use priority_queue::PriorityQueue;
use sll_common::db::indices::RouteNodeId;
use std::cmp::{Ordering, Reverse};

/// Totally ordered search cost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cost(pub f64);

impl Eq for Cost {}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-node search scratch space, reused across connections. A node's
/// entries are only meaningful when its tag matches the current episode.
pub struct SearchWorkspace {
    queue: PriorityQueue<RouteNodeId, Reverse<Cost>>,
    prev: Vec<Option<RouteNodeId>>,
    partial_cost: Vec<f64>,
    lower_bound: Vec<f64>,
    visited_tag: Vec<u32>,
    current_tag: u32,
}

impl SearchWorkspace {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            queue: PriorityQueue::new(),
            prev: vec![None; num_nodes],
            partial_cost: vec![f64::INFINITY; num_nodes],
            lower_bound: vec![f64::INFINITY; num_nodes],
            visited_tag: vec![0; num_nodes],
            current_tag: 1,
        }
    }

    /// Starts a new episode without touching the per-node arrays.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.current_tag = self.current_tag.wrapping_add(1);
        if self.current_tag == 0 {
            self.visited_tag.fill(0);
            self.current_tag = 1;
        }
    }

    #[inline]
    pub fn is_touched(&self, node: RouteNodeId) -> bool {
        self.visited_tag[node.index()] == self.current_tag
    }

    pub fn partial_cost(&self, node: RouteNodeId) -> Option<f64> {
        self.is_touched(node).then(|| self.partial_cost[node.index()])
    }

    pub fn lower_bound(&self, node: RouteNodeId) -> Option<f64> {
        self.is_touched(node).then(|| self.lower_bound[node.index()])
    }

    /// Records a label for `node` and queues it, unless the node already has
    /// an equal or cheaper partial cost this episode.
    pub fn push(&mut self, node: RouteNodeId, prev: Option<RouteNodeId>, partial: f64, lower_bound: f64) -> bool {
        let i = node.index();
        if self.visited_tag[i] == self.current_tag && partial >= self.partial_cost[i] {
            return false;
        }
        self.visited_tag[i] = self.current_tag;
        self.prev[i] = prev;
        self.partial_cost[i] = partial;
        self.lower_bound[i] = lower_bound;
        self.queue.push_increase(node, Reverse(Cost(lower_bound)));
        true
    }

    pub fn pop(&mut self) -> Option<RouteNodeId> {
        self.queue.pop().map(|(node, _)| node)
    }

    /// Nodes from the seed to `target`, following predecessor links.
    pub fn path_to(&self, target: RouteNodeId) -> Vec<RouteNodeId> {
        let mut path = Vec::new();
        if !self.is_touched(target) {
            return path;
        }
        let mut current = Some(target);
        while let Some(node) = current {
            path.push(node);
            if path.len() > self.prev.len() {
                break;
            }
            current = self.prev[node.index()];
        }
        path.reverse();
        path
    }
}
