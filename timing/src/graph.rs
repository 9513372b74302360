use crate::error::{Result, TimingError};
use sll_common::db::indices::{BlockId, ClockDomainId, PinId, TimingEdgeId, TimingNodeId};
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Position {
    /// Clocked or constant output; paths start here.
    Root,
    Intermediate,
    /// Clocked input; paths end here.
    Leaf,
    /// Global block exit point of an inter-block connection.
    CSource,
    /// Global block entry point of an inter-block connection.
    CSink,
}

#[derive(Clone, Debug)]
pub struct TimingNode {
    pub id: TimingNodeId,
    pub pin: PinId,
    pub position: Position,
    pub clock_domain: ClockDomainId,
    /// Incoming edges.
    pub source_edges: Vec<TimingEdgeId>,
    /// Outgoing edges.
    pub sink_edges: Vec<TimingEdgeId>,
    pub arrival: Option<f64>,
    pub required: Option<f64>,
    pub has_clock_domain_as_source: Vec<bool>,
    pub has_clock_domain_as_sink: Vec<bool>,
}

#[derive(Clone, Debug)]
pub struct TimingEdge {
    pub id: TimingEdgeId,
    pub source: TimingNodeId,
    pub sink: TimingNodeId,
    pub logic_delay: f64,
    pub wire_delay: f64,
    pub criticality: f64,
    /// Cut by combinational loop removal; kept so ids stay stable.
    pub removed: bool,
}

impl TimingEdge {
    #[inline]
    pub fn total_delay(&self) -> f64 {
        self.logic_delay + self.wire_delay
    }

    #[inline]
    pub fn cost(&self) -> f64 {
        self.criticality * self.total_delay()
    }
}

/// Edges of one source node ending in the same global block. Only the worst
/// of them counts towards the timing cost.
#[derive(Clone, Debug)]
pub struct TimingNet {
    pub source: TimingNodeId,
    pub destination: BlockId,
    pub edges: Vec<TimingEdgeId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DomainPair {
    pub source: ClockDomainId,
    pub sink: ClockDomainId,
    pub max_delay: f64,
}

pub struct TimingGraph {
    pub(crate) nodes: Vec<TimingNode>,
    pub(crate) edges: Vec<TimingEdge>,
    pub(crate) nets: Vec<TimingNet>,
    pub(crate) pin_nodes: HashMap<PinId, TimingNodeId>,
    pub(crate) order: Vec<TimingNodeId>,
    pub(crate) roots: Vec<Vec<TimingNodeId>>,
    pub(crate) leaves: Vec<Vec<TimingNodeId>>,
    pub(crate) domain_pairs: Vec<DomainPair>,
    pub(crate) num_domains: usize,
    pub(crate) max_delay: f64,
}

impl TimingGraph {
    pub fn new(num_domains: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            nets: Vec::new(),
            pin_nodes: HashMap::new(),
            order: Vec::new(),
            roots: Vec::new(),
            leaves: Vec::new(),
            domain_pairs: Vec::new(),
            num_domains: num_domains.max(1),
            max_delay: 0.0,
        }
    }

    pub fn add_node(&mut self, pin: PinId, position: Position, clock_domain: ClockDomainId) -> TimingNodeId {
        let id = TimingNodeId::new(self.nodes.len());
        self.nodes.push(TimingNode {
            id,
            pin,
            position,
            clock_domain,
            source_edges: Vec::new(),
            sink_edges: Vec::new(),
            arrival: None,
            required: None,
            has_clock_domain_as_source: Vec::new(),
            has_clock_domain_as_sink: Vec::new(),
        });
        self.pin_nodes.insert(pin, id);
        id
    }

    pub fn add_edge(&mut self, source: TimingNodeId, sink: TimingNodeId, logic_delay: f64, wire_delay: f64) -> TimingEdgeId {
        let id = TimingEdgeId::new(self.edges.len());
        self.edges.push(TimingEdge {
            id,
            source,
            sink,
            logic_delay,
            wire_delay,
            criticality: 0.0,
            removed: false,
        });
        self.nodes[source.index()].sink_edges.push(id);
        self.nodes[sink.index()].source_edges.push(id);
        id
    }

    pub fn add_net(&mut self, source: TimingNodeId, destination: BlockId, edges: Vec<TimingEdgeId>) {
        self.nets.push(TimingNet {
            source,
            destination,
            edges,
        });
    }

    pub(crate) fn remove_edge(&mut self, edge: TimingEdgeId) {
        self.edges[edge.index()].removed = true;
    }

    #[inline]
    pub fn node(&self, id: TimingNodeId) -> &TimingNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn edge(&self, id: TimingEdgeId) -> &TimingEdge {
        &self.edges[id.index()]
    }

    pub fn nodes(&self) -> &[TimingNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TimingEdge] {
        &self.edges
    }

    pub fn nets(&self) -> &[TimingNet] {
        &self.nets
    }

    pub fn node_of_pin(&self, pin: PinId) -> Option<TimingNodeId> {
        self.pin_nodes.get(&pin).copied()
    }

    pub fn num_active_edges(&self) -> usize {
        self.edges.iter().filter(|e| !e.removed).count()
    }

    /// Outgoing edges that survived loop cutting.
    pub fn active_sink_edges(&self, node: TimingNodeId) -> impl Iterator<Item = &TimingEdge> + '_ {
        self.nodes[node.index()]
            .sink_edges
            .iter()
            .map(|&e| &self.edges[e.index()])
            .filter(|e| !e.removed)
    }

    pub fn active_source_edges(&self, node: TimingNodeId) -> impl Iterator<Item = &TimingEdge> + '_ {
        self.nodes[node.index()]
            .source_edges
            .iter()
            .map(|&e| &self.edges[e.index()])
            .filter(|e| !e.removed)
    }

    pub fn set_wire_delay(&mut self, edge: TimingEdgeId, delay: f64) {
        self.edges[edge.index()].wire_delay = delay;
    }

    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }

    pub fn domain_pairs(&self) -> &[DomainPair] {
        &self.domain_pairs
    }

    pub fn num_domains(&self) -> usize {
        self.num_domains
    }

    /// The timing edge a routed connection ending at `sink_pin` is bound to.
    ///
    /// `Ok(None)` when the pin has no C_SINK node or its only edge was cut by
    /// loop removal.
    pub fn edge_for_connection(&self, sink_pin: PinId) -> Result<Option<TimingEdgeId>> {
        let Some(node) = self.node_of_pin(sink_pin) else {
            return Ok(None);
        };
        let node = self.node(node);
        if node.position != Position::CSink {
            return Ok(None);
        }
        if node.source_edges.len() != 1 {
            return Err(TimingError::InconsistentConnectionEdge {
                pin: sink_pin,
                edges: node.source_edges.len(),
            });
        }
        let edge = node.source_edges[0];
        if self.edge(edge).removed {
            log::warn!(
                "Timing edge of connection into {:?} was cut while breaking a combinational loop",
                sink_pin
            );
            return Ok(None);
        }
        Ok(Some(edge))
    }

    /// Topological order, per-domain root/leaf lists and clock-domain
    /// reachability. Must run after loop cutting.
    pub fn prepare(&mut self) -> Result<()> {
        self.order = self.topological_order()?;
        self.index_roots_and_leaves();
        self.compute_clock_domain_reachability();
        self.find_domain_pairs();
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<TimingNodeId>> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.active_source_edges(n.id).count())
            .collect();
        let mut queue: VecDeque<TimingNodeId> = self
            .nodes
            .iter()
            .filter(|n| in_degree[n.id.index()] == 0)
            .map(|n| n.id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge in self.active_sink_edges(id) {
                let d = &mut in_degree[edge.sink.index()];
                *d -= 1;
                if *d == 0 {
                    queue.push_back(edge.sink);
                }
            }
        }
        if order.len() != self.nodes.len() {
            return Err(TimingError::CyclicGraph {
                remaining: self.nodes.len() - order.len(),
            });
        }
        Ok(order)
    }

    fn index_roots_and_leaves(&mut self) {
        let mut domains = self.num_domains;
        for node in &self.nodes {
            domains = domains.max(node.clock_domain.index() + 1);
        }
        self.num_domains = domains;
        self.roots = vec![Vec::new(); domains];
        self.leaves = vec![Vec::new(); domains];
        for node in &self.nodes {
            match node.position {
                Position::Root => self.roots[node.clock_domain.index()].push(node.id),
                Position::Leaf => self.leaves[node.clock_domain.index()].push(node.id),
                _ => {}
            }
        }
    }

    fn compute_clock_domain_reachability(&mut self) {
        let domains = self.num_domains;
        for node in self.nodes.iter_mut() {
            node.has_clock_domain_as_source = vec![false; domains];
            node.has_clock_domain_as_sink = vec![false; domains];
            match node.position {
                Position::Root => node.has_clock_domain_as_source[node.clock_domain.index()] = true,
                Position::Leaf => node.has_clock_domain_as_sink[node.clock_domain.index()] = true,
                _ => {}
            }
        }

        for i in 0..self.order.len() {
            let id = self.order[i];
            let preds: Vec<TimingNodeId> = self.active_source_edges(id).map(|e| e.source).collect();
            for pred in preds {
                for d in 0..domains {
                    if self.nodes[pred.index()].has_clock_domain_as_source[d] {
                        self.nodes[id.index()].has_clock_domain_as_source[d] = true;
                    }
                }
            }
        }

        for i in (0..self.order.len()).rev() {
            let id = self.order[i];
            let succs: Vec<TimingNodeId> = self.active_sink_edges(id).map(|e| e.sink).collect();
            for succ in succs {
                for d in 0..domains {
                    if self.nodes[succ.index()].has_clock_domain_as_sink[d] {
                        self.nodes[id.index()].has_clock_domain_as_sink[d] = true;
                    }
                }
            }
        }
    }

    fn find_domain_pairs(&mut self) {
        self.domain_pairs.clear();
        for source in 0..self.num_domains {
            for sink in 0..self.num_domains {
                let connected = self.roots[source]
                    .iter()
                    .any(|&r| self.nodes[r.index()].has_clock_domain_as_sink[sink]);
                if connected {
                    self.domain_pairs.push(DomainPair {
                        source: ClockDomainId::new(source),
                        sink: ClockDomainId::new(sink),
                        max_delay: 0.0,
                    });
                }
            }
        }
        log::debug!("{} clock domain pairs with timing paths", self.domain_pairs.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(i: usize) -> PinId {
        PinId::new(i)
    }

    #[test]
    fn reachability_is_memoized_per_domain() {
        let mut g = TimingGraph::new(3);
        let r1 = g.add_node(pin(0), Position::Root, ClockDomainId(1));
        let r2 = g.add_node(pin(1), Position::Root, ClockDomainId(2));
        let mid = g.add_node(pin(2), Position::Intermediate, ClockDomainId(0));
        let l1 = g.add_node(pin(3), Position::Leaf, ClockDomainId(1));
        let l2 = g.add_node(pin(4), Position::Leaf, ClockDomainId(2));
        g.add_edge(r1, mid, 1.0, 0.0);
        g.add_edge(r2, l2, 1.0, 0.0);
        g.add_edge(mid, l1, 1.0, 0.0);
        g.add_edge(mid, l2, 1.0, 0.0);
        g.prepare().unwrap();

        let m = g.node(mid);
        assert_eq!(m.has_clock_domain_as_source, vec![false, true, false]);
        assert_eq!(m.has_clock_domain_as_sink, vec![false, true, true]);

        let pairs: Vec<(u32, u32)> = g
            .domain_pairs()
            .iter()
            .map(|p| (p.source.0, p.sink.0))
            .collect();
        assert_eq!(pairs, vec![(1, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn prepare_rejects_remaining_cycles() {
        let mut g = TimingGraph::new(1);
        let a = g.add_node(pin(0), Position::Intermediate, ClockDomainId(0));
        let b = g.add_node(pin(1), Position::Intermediate, ClockDomainId(0));
        g.add_edge(a, b, 1.0, 0.0);
        g.add_edge(b, a, 1.0, 0.0);
        assert!(matches!(
            g.prepare(),
            Err(TimingError::CyclicGraph { remaining: 2 })
        ));
    }

    #[test]
    fn connection_edge_must_be_unique() {
        let mut g = TimingGraph::new(1);
        let a = g.add_node(pin(0), Position::CSource, ClockDomainId(0));
        let b = g.add_node(pin(1), Position::CSource, ClockDomainId(0));
        let s = g.add_node(pin(2), Position::CSink, ClockDomainId(0));
        let e = g.add_edge(a, s, 0.0, 1.0);
        assert_eq!(g.edge_for_connection(pin(2)).unwrap(), Some(e));
        assert_eq!(g.edge_for_connection(pin(7)).unwrap(), None);

        g.add_edge(b, s, 0.0, 1.0);
        assert!(matches!(
            g.edge_for_connection(pin(2)),
            Err(TimingError::InconsistentConnectionEdge { edges: 2, .. })
        ));
    }
}
