//! Timing graph construction from the placed pin graph.

use crate::error::Result;
use crate::graph::{Position, TimingGraph};
use sll_common::db::circuit::{BlockKind, Circuit, DelayModel, LeafTiming, NetKind, VIRTUAL_IO_DOMAIN};
use sll_common::db::indices::{BlockId, PinId, TimingEdgeId, TimingNodeId};
use sll_common::util::profiler::ScopedTimer;
use std::collections::HashMap;

/// Edge candidate collected while walking the fan-out of one start node.
struct PendingEdge {
    sink: TimingNodeId,
    logic: f64,
    wire: f64,
}

impl TimingGraph {
    /// Creates nodes and edges for `circuit`, removes combinational loops and
    /// prepares the graph for propagation.
    pub fn build(circuit: &Circuit, delays: &dyn DelayModel) -> Result<TimingGraph> {
        let _t = ScopedTimer::new("Timing Graph Build");
        let mut graph = TimingGraph::new(circuit.num_clock_domains());

        graph.add_leaf_nodes(circuit);
        graph.add_connection_nodes(circuit);
        graph.add_edges(circuit, delays);

        log::info!(
            "Timing graph: {} nodes, {} edges, {} timing nets",
            graph.nodes.len(),
            graph.edges.len(),
            graph.nets.len()
        );

        graph.cut_comb_loops();
        graph.prepare()?;
        Ok(graph)
    }

    fn add_leaf_nodes(&mut self, circuit: &Circuit) {
        for block in &circuit.blocks {
            let BlockKind::Leaf(timing) = block.kind else {
                continue;
            };
            for &pin in &block.outputs {
                if circuit.pin(pin).net_kind != NetKind::Signal {
                    continue;
                }
                if timing.starts_paths() {
                    self.add_node(pin, Position::Root, timing.domain());
                } else if timing == LeafTiming::Combinational && !circuit.pin(pin).sinks.is_empty() {
                    self.add_node(pin, Position::Intermediate, VIRTUAL_IO_DOMAIN);
                }
            }
            if timing.ends_paths() {
                for &pin in &block.inputs {
                    if circuit.pin(pin).net_kind == NetKind::Signal {
                        self.add_node(pin, Position::Leaf, timing.domain());
                    }
                }
            }
        }
    }

    /// C_SOURCE on global outputs driving other blocks, C_SINK on the pins
    /// they drive. Each inter-block connection thereby owns one edge.
    fn add_connection_nodes(&mut self, circuit: &Circuit) {
        for block in &circuit.blocks {
            if !matches!(block.kind, BlockKind::Global { .. }) {
                continue;
            }
            for &pin in &block.outputs {
                let p = circuit.pin(pin);
                if p.net_kind != NetKind::Signal || self.node_of_pin(pin).is_some() {
                    continue;
                }
                let sinks: Vec<PinId> = p
                    .sinks
                    .iter()
                    .copied()
                    .filter(|&s| circuit.is_inter_block(pin, s))
                    .collect();
                if sinks.is_empty() {
                    continue;
                }
                let Some(origin) = self.node_of_pin(circuit.ultimate_source(pin)) else {
                    continue;
                };
                let domain = self.node(origin).clock_domain;
                self.add_node(pin, Position::CSource, domain);
                for sink in sinks {
                    if self.node_of_pin(sink).is_none() {
                        self.add_node(sink, Position::CSink, domain);
                    }
                }
            }
        }
    }

    fn add_edges(&mut self, circuit: &Circuit, delays: &dyn DelayModel) {
        let starts: Vec<TimingNodeId> = self
            .nodes
            .iter()
            .filter(|n| n.position != Position::Leaf)
            .map(|n| n.id)
            .collect();

        let mut net_index: HashMap<(TimingNodeId, BlockId), usize> = HashMap::new();
        let mut stack: Vec<(PinId, f64, f64, usize)> = Vec::new();

        for start in starts {
            let start_pin = self.node(start).pin;
            let launch = match (self.node(start).position, circuit.leaf_timing(start_pin)) {
                (Position::Root, Some(timing)) => timing.clock_to_q(),
                _ => 0.0,
            };

            let mut pending: Vec<PendingEdge> = Vec::new();
            let mut seen: HashMap<TimingNodeId, usize> = HashMap::new();

            stack.clear();
            stack.push((start_pin, launch, 0.0, 0));
            while let Some((pin, logic, wire, depth)) = stack.pop() {
                if depth > circuit.num_pins() {
                    continue;
                }
                for &next in circuit.fanout(pin) {
                    if circuit.pin(next).net_kind != NetKind::Signal {
                        continue;
                    }
                    let (mut logic, mut wire) = (logic, wire);
                    if circuit.is_inter_block(pin, next) {
                        wire += delays.wire_delay_estimate(circuit, pin, next);
                    } else {
                        logic += delays.hop_delay(circuit, pin, next);
                    }

                    let Some(target) = self.node_of_pin(next) else {
                        stack.push((next, logic, wire, depth + 1));
                        continue;
                    };
                    if target == start {
                        continue;
                    }
                    if self.node(target).position == Position::Leaf {
                        if let Some(timing) = circuit.leaf_timing(next) {
                            logic += timing.setup();
                        }
                    }
                    match seen.get(&target) {
                        Some(&i) => {
                            let e = &mut pending[i];
                            if logic + wire > e.logic + e.wire {
                                e.logic = logic;
                                e.wire = wire;
                            }
                        }
                        None => {
                            seen.insert(target, pending.len());
                            pending.push(PendingEdge {
                                sink: target,
                                logic,
                                wire,
                            });
                        }
                    }
                }
            }

            for e in pending {
                let id = self.add_edge(start, e.sink, e.logic, e.wire);
                let sink_pin = self.node(e.sink).pin;
                let Some(destination) = circuit.global_block_of(circuit.pin(sink_pin).block) else {
                    continue;
                };
                self.group_edge(&mut net_index, start, destination, id);
            }
        }
    }

    fn group_edge(
        &mut self,
        net_index: &mut HashMap<(TimingNodeId, BlockId), usize>,
        source: TimingNodeId,
        destination: BlockId,
        edge: TimingEdgeId,
    ) {
        match net_index.get(&(source, destination)) {
            Some(&i) => self.nets[i].edges.push(edge),
            None => {
                net_index.insert((source, destination), self.nets.len());
                self.add_net(source, destination, vec![edge]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sll_common::db::circuit::{DelayTable, PinDirection};
    use sll_common::db::indices::{ClockDomainId, DieId};
    use sll_common::geom::coord::SiteCoord;

    struct TwoClbs {
        circuit: Circuit,
        ff_q: PinId,
        clb_o: PinId,
        clb_in: PinId,
        lut_in: PinId,
        ff_d: PinId,
    }

    /// FF -> CLB0.O -> CLB1.I -> LUT -> FF2.D, both FFs in domain "clk".
    fn two_clbs() -> TwoClbs {
        let mut c = Circuit::new(1);
        let clk = c.add_clock_domain("clk");
        let clocked = LeafTiming::Clocked {
            domain: clk,
            setup: 0.1,
            clock_to_q: 0.2,
        };

        let clb0 = c.add_block(
            "clb0".into(),
            None,
            BlockKind::Global {
                die: DieId(0),
                site: SiteCoord::new(0, 0),
            },
        );
        let ff = c.add_block("ff0".into(), Some(clb0), BlockKind::Leaf(clocked));
        let ff_q = c.add_pin(ff, "Q", 0, PinDirection::Output);
        let clb_o = c.add_pin(clb0, "O", 0, PinDirection::Output);
        c.connect(ff_q, clb_o);

        let clb1 = c.add_block(
            "clb1".into(),
            None,
            BlockKind::Global {
                die: DieId(0),
                site: SiteCoord::new(3, 1),
            },
        );
        let clb_in = c.add_pin(clb1, "I", 0, PinDirection::Input);
        let lut = c.add_block("lut1".into(), Some(clb1), BlockKind::Leaf(LeafTiming::Combinational));
        let lut_in = c.add_pin(lut, "in", 0, PinDirection::Input);
        let lut_out = c.add_pin(lut, "out", 0, PinDirection::Output);
        let ff2 = c.add_block("ff1".into(), Some(clb1), BlockKind::Leaf(clocked));
        let ff_d = c.add_pin(ff2, "D", 0, PinDirection::Input);
        c.connect(clb_o, clb_in);
        c.connect(clb_in, lut_in);
        c.connect(lut_out, ff_d);

        TwoClbs {
            circuit: c,
            ff_q,
            clb_o,
            clb_in,
            lut_in,
            ff_d,
        }
    }

    #[test]
    fn connection_gets_its_own_edge() {
        let t = two_clbs();
        let delays = DelayTable::new(0.5, 0.05, 0.1, 1.0);
        let g = TimingGraph::build(&t.circuit, &delays).unwrap();

        let q = g.node_of_pin(t.ff_q).unwrap();
        let cs = g.node_of_pin(t.clb_o).unwrap();
        let ck = g.node_of_pin(t.clb_in).unwrap();
        assert_eq!(g.node(q).position, Position::Root);
        assert_eq!(g.node(cs).position, Position::CSource);
        assert_eq!(g.node(ck).position, Position::CSink);
        assert_eq!(g.node(cs).clock_domain, ClockDomainId(1));
        assert!(g.node_of_pin(t.lut_in).is_none());

        let edge = g.edge_for_connection(t.clb_in).unwrap().unwrap();
        let e = g.edge(edge);
        assert_eq!(e.source, cs);
        assert_eq!(e.logic_delay, 0.0);
        // 3 + 1 tiles at 0.1 per tile
        assert!((e.wire_delay - 0.4).abs() < 1e-9);

        // clock-to-q plus the interconnect hop into the block output
        let launch = g.active_sink_edges(q).next().unwrap();
        assert!((launch.total_delay() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn leaf_edges_include_setup() {
        let t = two_clbs();
        let delays = DelayTable::new(0.5, 0.05, 0.1, 1.0);
        let g = TimingGraph::build(&t.circuit, &delays).unwrap();

        let ck = g.node_of_pin(t.clb_in).unwrap();
        let d = g.node_of_pin(t.ff_d).unwrap();

        // I -> lut.in, then the cell arc to the LUT output
        let into_lut = g.active_sink_edges(ck).next().unwrap();
        assert_eq!(g.node(into_lut.sink).position, Position::Intermediate);
        assert!((into_lut.total_delay() - 0.55).abs() < 1e-9);

        let to_ff = g.active_sink_edges(into_lut.sink).next().unwrap();
        assert_eq!(to_ff.sink, d);
        assert!((to_ff.total_delay() - (0.05 + 0.1)).abs() < 1e-9);
        assert_eq!(g.nets().len(), 4);
    }

    #[test]
    fn parallel_paths_merge_to_worst_delay() {
        let mut c = Circuit::new(1);
        let clb = c.add_block(
            "clb".into(),
            None,
            BlockKind::Global {
                die: DieId(0),
                site: SiteCoord::new(0, 0),
            },
        );
        let pad = c.add_block("pad".into(), Some(clb), BlockKind::Leaf(LeafTiming::InputPad));
        let out = c.add_pin(pad, "out", 0, PinDirection::Output);
        let lut = c.add_block("lut".into(), Some(clb), BlockKind::Leaf(LeafTiming::Combinational));
        let a = c.add_pin(lut, "in", 0, PinDirection::Input);
        let b = c.add_pin(lut, "in", 1, PinDirection::Input);
        let lo = c.add_pin(lut, "out", 0, PinDirection::Output);
        let opad = c.add_block("opad".into(), Some(clb), BlockKind::Leaf(LeafTiming::OutputPad));
        let oi = c.add_pin(opad, "in", 0, PinDirection::Input);
        c.connect(out, a);
        c.connect(out, b);
        c.connect(lo, oi);

        let mut delays = DelayTable::new(0.5, 0.05, 0.1, 1.0);
        delays.set_indexed_delay("in", 1, "out", 0, 0.9);
        let g = TimingGraph::build(&c, &delays).unwrap();

        let root = g.node_of_pin(out).unwrap();
        let edges: Vec<_> = g.active_sink_edges(root).collect();
        assert_eq!(edges.len(), 1);
        assert!((edges[0].total_delay() - (0.05 + 0.9)).abs() < 1e-9);
    }
}
