//! Nets and the point-to-point connections the router works on.

use crate::error::{Result, RouterError};
use crate::sll::{SllCrossing, SllNetTable};
use sll_common::db::circuit::{BlockKind, Circuit, NetKind};
use sll_common::db::indices::{ConnectionId, DieId, NetId, PinId, RouteNodeId, TimingEdgeId};
use sll_common::db::rrg::{ResourceGraph, RouteNode, RouteNodeType};
use sll_common::geom::coord::SiteCoord;
use sll_common::geom::rect::BoundingBox;
use sll_timing::TimingGraph;

#[derive(Clone, Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub net: NetId,
    pub source_pin: PinId,
    pub sink_pin: PinId,
    pub source_node: RouteNodeId,
    pub sink_node: RouteNodeId,
    pub timing_edge: Option<TimingEdgeId>,
    /// Half-perimeter of the source/sink (and SLL) rectangle; orders routing.
    pub bounding_box: i32,
    /// Source to sink once routed.
    pub route_nodes: Vec<RouteNodeId>,
    pub criticality: f64,
    pub sll: Option<SllCrossing>,
}

impl Connection {
    /// OPIN used by the current route.
    pub fn opin(&self, rrg: &ResourceGraph) -> Option<RouteNodeId> {
        self.route_nodes
            .iter()
            .copied()
            .find(|&n| rrg.node(n).kind == RouteNodeType::Opin)
    }

    pub fn is_cross_die(&self) -> bool {
        self.sll.is_some()
    }

    pub fn is_routed(&self) -> bool {
        !self.route_nodes.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Net {
    pub id: NetId,
    pub name: String,
    pub source_pin: PinId,
    pub connections: Vec<ConnectionId>,
    /// Routing region: every endpoint and SLL wire plus the margin.
    pub bbox: BoundingBox,
    pub x_geo: f64,
    pub y_geo: f64,
    pub hpwl: f64,
    pub fanout: usize,
    /// Locked OPIN; set once and never moved.
    pub fixed_opin: Option<RouteNodeId>,
}

#[derive(Default)]
pub struct RoutingNetlist {
    pub nets: Vec<Net>,
    pub connections: Vec<Connection>,
}

fn include_node(bbox: &mut BoundingBox, node: &RouteNode) {
    bbox.include_span(node.xlow, node.xhigh, node.ylow, node.yhigh);
}

impl RoutingNetlist {
    /// One net per placed output pin with signal sinks in other blocks, one
    /// connection per such sink.
    pub fn build(
        circuit: &Circuit,
        rrg: &ResourceGraph,
        sll_table: &SllNetTable,
        timing: Option<&TimingGraph>,
        margin: i32,
    ) -> Result<Self> {
        let mut netlist = RoutingNetlist::default();
        let mut untimed = 0;

        for block in &circuit.blocks {
            let BlockKind::Global { die, site } = block.kind else {
                continue;
            };
            for &pin in &block.outputs {
                let p = circuit.pin(pin);
                if p.net_kind != NetKind::Signal {
                    continue;
                }
                let sinks: Vec<PinId> = p
                    .sinks
                    .iter()
                    .copied()
                    .filter(|&s| {
                        circuit.is_inter_block(pin, s) && circuit.pin(s).net_kind == NetKind::Signal
                    })
                    .collect();
                if sinks.is_empty() {
                    continue;
                }

                let net_id = NetId::new(netlist.nets.len());
                let name = sll_table
                    .name_of_source(pin)
                    .map(str::to_string)
                    .unwrap_or_else(|| p.name.clone());
                let source_node = site_pin_node(circuit, rrg, pin, die, site)?;
                let source = rrg.node(source_node);

                let mut net_box = BoundingBox::empty();
                include_node(&mut net_box, source);
                let mut sum_x = source.center_x();
                let mut sum_y = source.center_y();
                let mut points = 1usize;
                let mut connections = Vec::with_capacity(sinks.len());

                for sink_pin in sinks {
                    let (sink_die, sink_site) = circuit
                        .placement_of(sink_pin)
                        .ok_or_else(|| RouterError::Unplaced(circuit.pin(sink_pin).name.clone()))?;
                    let sink_node = site_pin_node(circuit, rrg, sink_pin, sink_die, sink_site)?;
                    let sink = rrg.node(sink_node);

                    let mut con_box = BoundingBox::empty();
                    include_node(&mut con_box, source);
                    include_node(&mut con_box, sink);
                    sum_x += sink.center_x();
                    sum_y += sink.center_y();
                    points += 1;

                    let sll = if sink_die != die {
                        let crossing = sll_table.crossing(rrg, &name, die, sink_die)?;
                        let wire = rrg.node(crossing.wire_node);
                        include_node(&mut con_box, wire);
                        sum_x += wire.center_x();
                        sum_y += wire.center_y();
                        points += 1;
                        Some(crossing)
                    } else {
                        None
                    };
                    net_box.include_span(con_box.xmin, con_box.xmax, con_box.ymin, con_box.ymax);

                    let timing_edge = match timing {
                        Some(graph) => {
                            let edge = graph.edge_for_connection(sink_pin)?;
                            if edge.is_none() && graph.node_of_pin(sink_pin).is_none() {
                                log::warn!(
                                    "No timing node on {}, routing its connection without timing",
                                    circuit.pin(sink_pin).name
                                );
                            }
                            if edge.is_none() {
                                untimed += 1;
                            }
                            edge
                        }
                        None => None,
                    };

                    let id = ConnectionId::new(netlist.connections.len());
                    netlist.connections.push(Connection {
                        id,
                        net: net_id,
                        source_pin: pin,
                        sink_pin,
                        source_node,
                        sink_node,
                        timing_edge,
                        bounding_box: con_box.half_perimeter(),
                        route_nodes: Vec::new(),
                        criticality: 0.0,
                        sll,
                    });
                    connections.push(id);
                }

                let hpwl = ((net_box.xmax - net_box.xmin) + (net_box.ymax - net_box.ymin)).max(1);
                netlist.nets.push(Net {
                    id: net_id,
                    name,
                    source_pin: pin,
                    fanout: connections.len(),
                    connections,
                    bbox: net_box.expanded(margin),
                    x_geo: sum_x / points as f64,
                    y_geo: sum_y / points as f64,
                    hpwl: hpwl as f64,
                    fixed_opin: None,
                });
            }
        }

        let cross_die = netlist.connections.iter().filter(|c| c.is_cross_die()).count();
        log::info!(
            "Routing netlist: {} nets, {} connections ({} cross-die)",
            netlist.nets.len(),
            netlist.connections.len(),
            cross_die
        );
        if timing.is_some() && untimed > 0 {
            log::warn!("{} connections have no timing edge", untimed);
        }
        Ok(netlist)
    }

    #[inline]
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    #[inline]
    pub fn connection(&self, id: ConnectionId) -> &Connection {
        &self.connections[id.index()]
    }

    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }
}

fn site_pin_node(
    circuit: &Circuit,
    rrg: &ResourceGraph,
    pin: PinId,
    die: DieId,
    site: SiteCoord,
) -> Result<RouteNodeId> {
    let class = circuit.pin(pin).class;
    rrg.site_pin_node(die, site, class)
        .ok_or_else(|| RouterError::MissingRouteNode {
            pin: circuit.pin(pin).name.clone(),
            die,
            x: site.x,
            y: site.y,
            class,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sll_common::db::circuit::DelayTable;
    use sll_common::util::config::{DelayConfig, GeneratorConfig};
    use sll_common::util::generator::generate;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            dies: 2,
            die_width: 5,
            die_height: 4,
            channel_width: 3,
            inputs_per_block: 3,
            cross_die_fraction: 0.5,
            seed: 7,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn connections_bind_route_nodes_and_sll_wires() {
        let bench = generate(&config(), &DelayConfig::default()).unwrap();
        let table = SllNetTable::from_generated(&bench.nets);
        let netlist = RoutingNetlist::build(&bench.circuit, &bench.rrg, &table, None, 2).unwrap();

        let expected: usize = bench.nets.iter().map(|n| n.sinks.len()).sum();
        assert_eq!(netlist.num_connections(), expected);
        assert_eq!(netlist.num_nets(), bench.nets.len());

        for con in &netlist.connections {
            assert_eq!(bench.rrg.node(con.source_node).kind, RouteNodeType::Source);
            assert_eq!(bench.rrg.node(con.sink_node).kind, RouteNodeType::Sink);
            let net = netlist.net(con.net);
            assert!(net.hpwl >= 1.0);
            if let Some(sll) = con.sll {
                let wire = bench.rrg.node(sll.wire_node);
                assert_eq!(wire.kind, RouteNodeType::Sll);
                assert!(net.bbox.overlaps_span(wire.xlow, wire.xhigh, wire.ylow, wire.yhigh));
            }
        }
    }

    #[test]
    fn cross_die_nets_are_found() {
        let bench = generate(&config(), &DelayConfig::default()).unwrap();
        let crossing_nets = bench.nets.iter().filter(|n| n.crossing_x.is_some()).count();
        let table = SllNetTable::from_generated(&bench.nets);
        let netlist = RoutingNetlist::build(&bench.circuit, &bench.rrg, &table, None, 2).unwrap();
        let with_sll = netlist
            .nets
            .iter()
            .filter(|n| n.connections.iter().any(|&c| netlist.connection(c).is_cross_die()))
            .count();
        assert_eq!(with_sll, crossing_nets);
    }

    #[test]
    fn missing_table_entry_fails_cross_die_nets() {
        let bench = generate(&config(), &DelayConfig::default()).unwrap();
        if bench.nets.iter().all(|n| n.crossing_x.is_none()) {
            return;
        }
        let result = RoutingNetlist::build(&bench.circuit, &bench.rrg, &SllNetTable::new(), None, 2);
        assert!(matches!(result, Err(RouterError::SllCrossing { .. })));
    }

    #[test]
    fn timing_edges_attach_to_connections() {
        let bench = generate(&config(), &DelayConfig::default()).unwrap();
        let delays = DelayTable::from_config(&DelayConfig::default());
        let timing = TimingGraph::build(&bench.circuit, &delays).unwrap();
        let table = SllNetTable::from_generated(&bench.nets);
        let netlist =
            RoutingNetlist::build(&bench.circuit, &bench.rrg, &table, Some(&timing), 2).unwrap();
        let timed = netlist.connections.iter().filter(|c| c.timing_edge.is_some()).count();
        assert!(timed > 0);
        for con in netlist.connections.iter().filter(|c| c.timing_edge.is_some()) {
            let edge = timing.edge(con.timing_edge.unwrap());
            assert_eq!(timing.node(edge.sink).pin, con.sink_pin);
        }
    }
}
