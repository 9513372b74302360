use sll_common::db::indices::{NetId, PinId, RouteNodeId};
use sll_common::db::rrg::ResourceGraph;
use std::collections::HashMap;

/// Congestion bookkeeping of one route node.
#[derive(Clone, Debug)]
pub struct RouteNodeData {
    pub pres_cost: f64,
    pub acc_cost: f64,
    /// Uses per connection source. Connections of one net share a source,
    /// so they never compete for a node.
    sources: HashMap<PinId, u32>,
    /// Net that fixed this OPIN.
    pub owner: Option<NetId>,
}

impl Default for RouteNodeData {
    fn default() -> Self {
        Self {
            pres_cost: 1.0,
            acc_cost: 1.0,
            sources: HashMap::new(),
            owner: None,
        }
    }
}

impl RouteNodeData {
    #[inline]
    pub fn occupation(&self) -> u32 {
        self.sources.len() as u32
    }

    #[inline]
    pub fn count_source_uses(&self, source: PinId) -> u32 {
        self.sources.get(&source).copied().unwrap_or(0)
    }

    pub fn add_source(&mut self, source: PinId) {
        *self.sources.entry(source).or_insert(0) += 1;
    }

    pub fn remove_source(&mut self, source: PinId) {
        if let Some(count) = self.sources.get_mut(&source) {
            *count -= 1;
            if *count == 0 {
                self.sources.remove(&source);
            }
        }
    }

    #[inline]
    pub fn overuse(&self, capacity: u32) -> u32 {
        self.occupation().saturating_sub(capacity)
    }

    /// Cost of adding one more source to this node right now.
    pub fn update_present_cost(&mut self, pres_fac: f64, capacity: u32) {
        let occ = self.occupation();
        self.pres_cost = if occ < capacity {
            1.0
        } else {
            1.0 + (occ - capacity + 1) as f64 * pres_fac
        };
    }
}

/// Per-node routing state, indexed like the resource graph.
pub struct RouteState {
    data: Vec<RouteNodeData>,
}

impl RouteState {
    pub fn new(rrg: &ResourceGraph) -> Self {
        Self {
            data: vec![RouteNodeData::default(); rrg.num_nodes()],
        }
    }

    #[inline]
    pub fn get(&self, id: RouteNodeId) -> &RouteNodeData {
        &self.data[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: RouteNodeId) -> &mut RouteNodeData {
        &mut self.data[id.index()]
    }

    pub fn over_used(&self, rrg: &ResourceGraph, id: RouteNodeId) -> bool {
        self.get(id).occupation() > rrg.node(id).capacity
    }

    /// Pins can never be shared by two sources, whatever their capacity.
    pub fn illegal(&self, rrg: &ResourceGraph, id: RouteNodeId) -> bool {
        if rrg.node(id).kind.is_pin() {
            self.get(id).occupation() > 1
        } else {
            self.over_used(rrg, id)
        }
    }

    pub fn overused_nodes(&self, rrg: &ResourceGraph) -> Vec<RouteNodeId> {
        rrg.nodes()
            .iter()
            .filter(|n| self.data[n.id.index()].occupation() > n.capacity)
            .map(|n| n.id)
            .collect()
    }

    /// End-of-trial cost update. Returns the number of overused nodes.
    pub fn update_costs(&mut self, rrg: &ResourceGraph, pres_fac: f64, acc_fac: f64) -> usize {
        let mut overused = 0;
        for node in rrg.nodes() {
            let d = &mut self.data[node.id.index()];
            // Nodes below capacity keep their present cost.
            let overuse = d.occupation() as i64 - node.capacity as i64;
            if overuse == 0 {
                d.pres_cost = 1.0 + pres_fac;
            } else if overuse > 0 {
                overused += 1;
                d.pres_cost = 1.0 + (overuse + 1) as f64 * pres_fac;
                d.acc_cost += overuse as f64 * acc_fac;
            }
        }
        overused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sll_common::db::indices::DieId;
    use sll_common::db::rrg::RouteNodeType;

    #[test]
    fn occupation_counts_distinct_sources() {
        let mut d = RouteNodeData::default();
        d.add_source(PinId(1));
        d.add_source(PinId(1));
        d.add_source(PinId(2));
        assert_eq!(d.occupation(), 2);
        assert_eq!(d.count_source_uses(PinId(1)), 2);

        d.remove_source(PinId(1));
        assert_eq!(d.occupation(), 2);
        d.remove_source(PinId(1));
        assert_eq!(d.occupation(), 1);
        assert_eq!(d.count_source_uses(PinId(1)), 0);
    }

    #[test]
    fn present_cost_grows_past_capacity() {
        let mut d = RouteNodeData::default();
        d.update_present_cost(0.5, 1);
        assert_eq!(d.pres_cost, 1.0);
        d.add_source(PinId(1));
        d.update_present_cost(0.5, 1);
        assert_eq!(d.pres_cost, 1.5);
        d.add_source(PinId(2));
        d.update_present_cost(0.5, 1);
        assert_eq!(d.pres_cost, 2.0);
    }

    #[test]
    fn pins_are_illegal_when_shared() {
        let mut rrg = ResourceGraph::new(1, 4);
        let ipin = rrg.add_node(RouteNodeType::Ipin, DieId(0), 0, 0, 0, 0, 2, 1.0, 0.0);
        let wire = rrg.add_node(RouteNodeType::ChanX, DieId(0), 0, 0, 0, 0, 2, 1.0, 0.0);
        let mut state = RouteState::new(&rrg);
        for id in [ipin, wire] {
            state.get_mut(id).add_source(PinId(1));
            state.get_mut(id).add_source(PinId(2));
        }
        assert!(!state.over_used(&rrg, ipin));
        assert!(state.illegal(&rrg, ipin));
        assert!(!state.illegal(&rrg, wire));
    }

    #[test]
    fn trial_update_accumulates_history() {
        let mut rrg = ResourceGraph::new(1, 4);
        let busy = rrg.add_node(RouteNodeType::ChanX, DieId(0), 0, 0, 0, 0, 1, 1.0, 0.0);
        let full = rrg.add_node(RouteNodeType::ChanX, DieId(0), 1, 1, 0, 0, 1, 1.0, 0.0);
        let idle = rrg.add_node(RouteNodeType::ChanX, DieId(0), 2, 2, 0, 0, 1, 1.0, 0.0);
        let mut state = RouteState::new(&rrg);
        state.get_mut(busy).add_source(PinId(1));
        state.get_mut(busy).add_source(PinId(2));
        state.get_mut(full).add_source(PinId(3));

        assert_eq!(state.update_costs(&rrg, 1.0, 1.0), 1);
        assert_eq!(state.get(busy).pres_cost, 3.0);
        assert_eq!(state.get(busy).acc_cost, 2.0);
        assert_eq!(state.get(full).pres_cost, 2.0);
        assert_eq!(state.get(full).acc_cost, 1.0);
        assert_eq!(state.get(idle).pres_cost, 1.0);
        assert_eq!(state.get(idle).acc_cost, 1.0);
        assert_eq!(state.overused_nodes(&rrg), vec![busy]);
    }

    #[test]
    fn empty_nodes_stay_cheaper_than_full_ones() {
        let mut rrg = ResourceGraph::new(1, 4);
        let empty = rrg.add_node(RouteNodeType::ChanX, DieId(0), 0, 0, 0, 0, 1, 1.0, 0.0);
        let full = rrg.add_node(RouteNodeType::ChanX, DieId(0), 1, 1, 0, 0, 1, 1.0, 0.0);
        let mut state = RouteState::new(&rrg);
        state.get_mut(full).add_source(PinId(1));

        state.update_costs(&rrg, 8.0, 1.0);
        assert_eq!(state.get(empty).pres_cost, 1.0);
        assert_eq!(state.get(full).pres_cost, 9.0);
        assert!(state.get(empty).pres_cost < state.get(full).pres_cost);
    }
}
