//! Negotiated-congestion connection router.
//!
//! Every connection is routed on its own with a lower-bound guided search.
//! Connections of one net share route nodes for free, different nets pay a
//! present congestion cost that grows geometrically with each trial plus an
//! accumulated history cost on nodes that stayed overused.

use crate::algo::search::SearchWorkspace;
use crate::error::{Result, RouterError};
use crate::net::{Connection, Net, RoutingNetlist};
use crate::state::RouteState;
use sll_common::db::circuit::Circuit;
use sll_common::db::indices::{ConnectionId, NetId, RouteNodeId};
use sll_common::db::rrg::{ResourceGraph, RouteNode, RouteNodeType};
use sll_common::util::config::{RouterConfig, TimingConfig};
use sll_common::util::profiler::ScopedTimer;
use sll_timing::TimingGraph;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct RouteParams {
    pub alpha_wld: f64,
    pub alpha_td: f64,
    pub initial_pres_fac: f64,
    pub pres_fac_mult: f64,
    pub acc_fac: f64,
    pub reroute_criticality: f64,
    pub criticality_exponent: f64,
    pub max_criticality: f64,
    pub usage_multiplier: f64,
    pub max_trials: usize,
    pub fix_opins_from_trial: usize,
    pub opin_fix_min_fanout: usize,
    pub timing_driven: bool,
}

impl RouteParams {
    pub fn from_config(router: &RouterConfig, timing: &TimingConfig) -> Self {
        Self {
            alpha_wld: router.alpha_wld,
            alpha_td: router.alpha_td,
            initial_pres_fac: router.initial_pres_fac,
            pres_fac_mult: router.pres_fac_mult,
            acc_fac: router.acc_fac,
            reroute_criticality: router.reroute_criticality,
            criticality_exponent: timing.criticality_exponent,
            max_criticality: timing.max_criticality,
            usage_multiplier: router.usage_multiplier,
            max_trials: router.max_trials,
            fix_opins_from_trial: router.fix_opins_from_trial,
            opin_fix_min_fanout: router.opin_fix_min_fanout,
            timing_driven: router.timing_driven,
        }
    }

    fn timing_config(&self) -> TimingConfig {
        TimingConfig {
            criticality_exponent: self.criticality_exponent,
            max_criticality: self.max_criticality,
        }
    }
}

impl Default for RouteParams {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default(), &TimingConfig::default())
    }
}

#[derive(Clone, Debug)]
pub struct RoutingReport {
    pub elapsed_ms: u128,
    pub trials: usize,
    pub legal: bool,
    pub overused: Vec<RouteNodeId>,
    pub wirelength: i64,
    /// Worst delay after routing; zero without a timing graph.
    pub max_delay: f64,
    pub pres_fac_history: Vec<f64>,
    /// Connections rerouted in each trial.
    pub reroute_history: Vec<usize>,
}

pub struct ConnectionRouter<'a> {
    rrg: &'a ResourceGraph,
    netlist: RoutingNetlist,
    timing: Option<TimingGraph>,
    state: RouteState,
    search: SearchWorkspace,
    order: Vec<ConnectionId>,
    pres_fac: f64,
}

impl<'a> ConnectionRouter<'a> {
    pub fn new(rrg: &'a ResourceGraph, netlist: RoutingNetlist, timing: Option<TimingGraph>) -> Self {
        Self {
            rrg,
            netlist,
            timing,
            state: RouteState::new(rrg),
            search: SearchWorkspace::new(rrg.num_nodes()),
            order: Vec::new(),
            pres_fac: 0.0,
        }
    }

    pub fn route(&mut self, circuit: &mut Circuit, params: &RouteParams) -> Result<RoutingReport> {
        let timer = ScopedTimer::new("Connection Routing");
        log::info!(
            "Routing {} connections of {} nets",
            self.netlist.num_connections(),
            self.netlist.num_nets()
        );

        self.sort_connections();
        let timing_driven = params.timing_driven && self.timing.is_some();
        if timing_driven {
            self.update_timing(params, false);
        }

        self.pres_fac = params.initial_pres_fac;
        let mut history = Vec::new();
        let mut reroutes = Vec::new();
        let mut previous_overuse = false;
        let mut legal = false;
        let mut trials = 0;

        for trial in 1..=params.max_trials {
            trials = trial;
            history.push(self.pres_fac);

            let threshold = params.reroute_criticality * self.max_connection_criticality();
            let critical_reroutes = timing_driven && previous_overuse;
            let mut rerouted = 0;
            for i in 0..self.order.len() {
                let con = self.order[i];
                if trial == 1 || self.needs_reroute(con, critical_reroutes.then_some(threshold)) {
                    self.route_connection(con, params)?;
                    rerouted += 1;
                }
            }
            reroutes.push(rerouted);

            let mut fix_mismatch = false;
            if trial >= params.fix_opins_from_trial {
                fix_mismatch = self.fix_opins(params.opin_fix_min_fanout);
            }

            if trial > 1 && rerouted == 0 && !fix_mismatch {
                log::info!("Trial {}: no connection rerouted, routing is valid", trial);
                legal = true;
                break;
            }

            self.pres_fac *= params.pres_fac_mult;
            let overused = self.state.update_costs(self.rrg, self.pres_fac, params.acc_fac);
            previous_overuse = overused > 0;

            let max_delay = if timing_driven {
                self.update_timing(params, true)
            } else {
                0.0
            };
            log::info!(
                "Trial {}: rerouted {}, overused nodes {}, pres_fac {:.3}, max delay {:.3} ns",
                trial,
                rerouted,
                overused,
                self.pres_fac,
                max_delay
            );
        }

        let max_delay = if self.timing.is_some() {
            self.update_timing(params, true)
        } else {
            0.0
        };

        let overused = self.overused_nodes();
        if legal {
            circuit.set_connections_routed(true);
        } else {
            log::error!(
                "Routing failed after {} trials: {} overused nodes",
                trials,
                overused.len()
            );
            for &node in overused.iter().take(20) {
                let n = self.rrg.node(node);
                log::error!(
                    "  {:?} {:?} die {} ({}, {})..({}, {}) occupation {} capacity {}",
                    node,
                    n.kind,
                    n.die.0,
                    n.xlow,
                    n.ylow,
                    n.xhigh,
                    n.yhigh,
                    self.state.get(node).occupation(),
                    n.capacity
                );
            }
        }

        let report = RoutingReport {
            elapsed_ms: timer.elapsed_ms(),
            trials,
            legal,
            overused,
            wirelength: self.total_wirelength(),
            max_delay,
            pres_fac_history: history,
            reroute_history: reroutes,
        };
        log::info!(
            "Routing {} in {} trials: wirelength {}, max delay {:.3} ns",
            if report.legal { "succeeded" } else { "failed" },
            report.trials,
            report.wirelength,
            report.max_delay
        );
        Ok(report)
    }

    /// Larger nets first, then larger connections.
    fn sort_connections(&mut self) {
        let netlist = &self.netlist;
        let mut order: Vec<ConnectionId> = netlist.connections.iter().map(|c| c.id).collect();
        order.sort_by(|&a, &b| {
            let ca = netlist.connection(a);
            let cb = netlist.connection(b);
            netlist
                .net(cb.net)
                .fanout
                .cmp(&netlist.net(ca.net).fanout)
                .then(cb.bounding_box.cmp(&ca.bounding_box))
                .then(a.cmp(&b))
        });
        self.order = order;
    }

    fn max_connection_criticality(&self) -> f64 {
        self.netlist
            .connections
            .iter()
            .map(|c| c.criticality)
            .fold(0.0, f64::max)
    }

    fn needs_reroute(&self, con: ConnectionId, critical_threshold: Option<f64>) -> bool {
        let c = self.netlist.connection(con);
        if !c.is_routed() || self.connection_congested(con) {
            return true;
        }
        if let Some(fixed) = self.netlist.net(c.net).fixed_opin {
            if c.opin(self.rrg) != Some(fixed) {
                return true;
            }
        }
        matches!(critical_threshold, Some(t) if c.criticality > t)
    }

    /// Connections that would be rerouted in the next trial, ignoring the
    /// criticality rule. Empty after a valid trial.
    pub fn connections_to_reroute(&self) -> Vec<ConnectionId> {
        self.order
            .iter()
            .copied()
            .filter(|&c| self.needs_reroute(c, None))
            .collect()
    }

    fn route_connection(&mut self, con: ConnectionId, params: &RouteParams) -> Result<()> {
        self.ripup(con);
        let path = self.find_path(con, params)?;
        let source = self.netlist.connections[con.index()].source_pin;
        for &node in &path {
            let capacity = self.rrg.node(node).capacity;
            let d = self.state.get_mut(node);
            d.add_source(source);
            d.update_present_cost(self.pres_fac, capacity);
        }
        self.netlist.connections[con.index()].route_nodes = path;
        Ok(())
    }

    fn ripup(&mut self, con: ConnectionId) {
        let c = &mut self.netlist.connections[con.index()];
        for &node in &c.route_nodes {
            let capacity = self.rrg.node(node).capacity;
            let d = self.state.get_mut(node);
            d.remove_source(c.source_pin);
            d.update_present_cost(self.pres_fac, capacity);
        }
        c.route_nodes.clear();
    }

    fn find_path(&mut self, con: ConnectionId, params: &RouteParams) -> Result<Vec<RouteNodeId>> {
        let rrg = self.rrg;
        let c = &self.netlist.connections[con.index()];
        let net = &self.netlist.nets[c.net.index()];
        let target = rrg.node(c.sink_node);
        let crit = c.criticality;

        self.search.reset();
        self.search.push(c.source_node, None, 0.0, 0.0);

        while let Some(current) = self.search.pop() {
            if current == c.sink_node {
                return Ok(self.search.path_to(current));
            }
            let Some(partial) = self.search.partial_cost(current) else {
                continue;
            };

            for &child in &rrg.node(current).children {
                let node = rrg.node(child);
                if !self.admissible(node, c, net) {
                    continue;
                }
                let cost = self.node_cost(node, c, net, params);
                let new_partial = partial + (1.0 - crit) * cost + crit * node.delay;
                let bound = new_partial + self.expected_remaining(node, target, crit, params);
                self.search.push(child, Some(current), new_partial, bound);
            }
        }

        Err(RouterError::Unroutable {
            connection: con,
            source_node: c.source_node,
            sink_node: c.sink_node,
        })
    }

    fn admissible(&self, node: &RouteNode, con: &Connection, net: &Net) -> bool {
        match node.kind {
            RouteNodeType::ChanX | RouteNodeType::ChanY => {
                net.bbox.overlaps_span(node.xlow, node.xhigh, node.ylow, node.yhigh)
            }
            RouteNodeType::Sll => {
                con.sll.is_some_and(|s| s.wire_node == node.id)
                    && net.bbox.overlaps_span(node.xlow, node.xhigh, node.ylow, node.yhigh)
            }
            RouteNodeType::Opin => match net.fixed_opin {
                Some(fixed) => fixed == node.id,
                None => self.state.get(node.id).owner.is_none_or(|o| o == net.id),
            },
            RouteNodeType::Ipin => node.children.len() == 1 && node.children[0] == con.sink_node,
            RouteNodeType::Sink => true,
            RouteNodeType::Source => false,
        }
    }

    fn node_cost(&self, node: &RouteNode, con: &Connection, net: &Net, params: &RouteParams) -> f64 {
        let data = self.state.get(node.id);
        let uses = data.count_source_uses(con.source_pin);
        let pres = if uses > 0 {
            // Already paid for by this net.
            1.0 + data.overuse(node.capacity) as f64 * self.pres_fac
        } else {
            data.pres_cost
        };

        let bias = if node.kind.is_wire() {
            let distance = (node.center_x() - net.x_geo).abs() + (node.center_y() - net.y_geo).abs();
            0.5 * node.base_cost / net.fanout.max(1) as f64 * distance / net.hpwl
        } else {
            0.0
        };

        node.base_cost * data.acc_cost * pres / (1.0 + params.usage_multiplier * uses as f64) + bias
    }

    /// Remaining cost estimate from the wire count still needed along and
    /// across the node's direction. Not admissible.
    fn expected_remaining(&self, node: &RouteNode, target: &RouteNode, crit: f64, params: &RouteParams) -> f64 {
        if !node.kind.is_wire() {
            return 0.0;
        }
        let dx = (node.center_x() - target.center_x()).abs();
        let dy = (node.center_y() - target.center_y()).abs();
        let (same, ortho, same_kind, ortho_kind) = match node.kind {
            RouteNodeType::ChanX => (dx, dy, RouteNodeType::ChanX, RouteNodeType::ChanY),
            _ => (dy, dx, RouteNodeType::ChanY, RouteNodeType::ChanX),
        };
        let rrg = self.rrg;
        let n_same = (same / rrg.average_length(same_kind).max(1.0)).floor();
        let n_ortho = (ortho / rrg.average_length(ortho_kind).max(1.0)).floor();

        let expected_cost = n_same * rrg.average_cost(same_kind) + n_ortho * rrg.average_cost(ortho_kind);
        let expected_delay = n_same * rrg.average_delay(same_kind) + n_ortho * rrg.average_delay(ortho_kind);
        params.alpha_wld * (1.0 - crit) * expected_cost + params.alpha_td * crit * expected_delay
    }

    /// Locks the most used OPIN of every large enough net. Returns true when
    /// a newly locked net has a connection on another OPIN.
    fn fix_opins(&mut self, min_fanout: usize) -> bool {
        let mut mismatch = false;
        for n in 0..self.netlist.nets.len() {
            let net = &self.netlist.nets[n];
            if net.fixed_opin.is_some() || net.fanout < min_fanout {
                continue;
            }
            let mut counts: HashMap<RouteNodeId, usize> = HashMap::new();
            for &c in &net.connections {
                if let Some(opin) = self.netlist.connection(c).opin(self.rrg) {
                    *counts.entry(opin).or_insert(0) += 1;
                }
            }
            let Some((opin, _)) = counts
                .into_iter()
                .filter(|(o, _)| self.state.get(*o).owner.is_none_or(|owner| owner == net.id))
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            else {
                continue;
            };

            let differs = net
                .connections
                .iter()
                .any(|&c| self.netlist.connection(c).opin(self.rrg) != Some(opin));
            log::debug!(
                "Net {} fixed to OPIN {:?}{}",
                net.name,
                opin,
                if differs { " (reroute needed)" } else { "" }
            );
            mismatch |= differs;
            let id = net.id;
            self.netlist.nets[n].fixed_opin = Some(opin);
            self.state.get_mut(opin).owner = Some(id);
        }
        mismatch
    }

    /// Writes routed wire delays into the timing graph when `write_back` is
    /// set, recomputes criticalities and copies them onto the connections.
    fn update_timing(&mut self, params: &RouteParams, write_back: bool) -> f64 {
        let Some(timing) = self.timing.as_mut() else {
            return 0.0;
        };
        if write_back {
            for c in self.netlist.connections.iter().filter(|c| c.is_routed()) {
                if let Some(edge) = c.timing_edge {
                    let delay: f64 = c.route_nodes.iter().map(|&n| self.rrg.node(n).delay).sum();
                    timing.set_wire_delay(edge, delay);
                }
            }
        }
        let max_delay = timing.calculate_criticalities(&params.timing_config());
        let use_criticality = params.timing_driven;
        for c in self.netlist.connections.iter_mut() {
            c.criticality = match c.timing_edge {
                Some(edge) if use_criticality => timing.edge(edge).criticality,
                _ => 0.0,
            };
        }
        max_delay
    }

    pub fn connection_delay(&self, con: ConnectionId) -> f64 {
        self.netlist
            .connection(con)
            .route_nodes
            .iter()
            .map(|&n| self.rrg.node(n).delay)
            .sum()
    }

    pub fn connection_congested(&self, con: ConnectionId) -> bool {
        self.netlist
            .connection(con)
            .route_nodes
            .iter()
            .any(|&n| self.state.over_used(self.rrg, n))
    }

    pub fn connection_illegal(&self, con: ConnectionId) -> bool {
        self.netlist
            .connection(con)
            .route_nodes
            .iter()
            .any(|&n| self.state.illegal(self.rrg, n))
    }

    /// Tiles of distinct wires used by the net.
    pub fn net_wirelength(&self, net: NetId) -> i64 {
        let mut wires: HashSet<RouteNodeId> = HashSet::new();
        for &c in &self.netlist.net(net).connections {
            for &n in &self.netlist.connection(c).route_nodes {
                if self.rrg.node(n).kind.is_wire() {
                    wires.insert(n);
                }
            }
        }
        wires.iter().map(|&n| self.rrg.node(n).wire_length() as i64).sum()
    }

    pub fn total_wirelength(&self) -> i64 {
        self.netlist.nets.iter().map(|n| self.net_wirelength(n.id)).sum()
    }

    pub fn overused_nodes(&self) -> Vec<RouteNodeId> {
        self.state.overused_nodes(self.rrg)
    }

    pub fn rrg(&self) -> &ResourceGraph {
        self.rrg
    }

    pub fn netlist(&self) -> &RoutingNetlist {
        &self.netlist
    }

    pub fn state(&self) -> &RouteState {
        &self.state
    }

    pub fn timing(&self) -> Option<&TimingGraph> {
        self.timing.as_ref()
    }

    pub fn timing_mut(&mut self) -> Option<&mut TimingGraph> {
        self.timing.as_mut()
    }

    pub fn pres_fac(&self) -> f64 {
        self.pres_fac
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sll::SllNetTable;
    use sll_common::db::indices::{ClockDomainId, DieId, PinId};
    use sll_common::geom::rect::BoundingBox;
    use sll_common::util::config::{DelayConfig, GeneratorConfig};
    use sll_common::util::generator::generate;
    use sll_timing::Position;

    /// Hand-built graphs on one die.
    pub(crate) struct Fixture {
        pub rrg: ResourceGraph,
        pub netlist: RoutingNetlist,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                rrg: ResourceGraph::new(1, 8),
                netlist: RoutingNetlist::default(),
            }
        }

        pub fn node(&mut self, kind: RouteNodeType, x: i32, y: i32) -> RouteNodeId {
            let (cost, delay) = match kind {
                RouteNodeType::Source | RouteNodeType::Sink => (0.0, 0.0),
                _ => (1.0, 0.1),
            };
            self.rrg.add_node(kind, DieId(0), x, x, y, y, 1, cost, delay)
        }

        pub fn chain(&mut self, nodes: &[RouteNodeId]) {
            for pair in nodes.windows(2) {
                self.rrg.add_edge(pair[0], pair[1]);
            }
        }

        /// Adds a net from `source` to every sink node; pins are numbered from
        /// the net id so nets never share a source pin.
        pub fn net(&mut self, source: RouteNodeId, sinks: &[RouteNodeId]) -> NetId {
            let net_id = NetId::new(self.netlist.nets.len());
            let source_pin = PinId::new(net_id.index() * 100);
            let mut connections = Vec::new();
            for (i, &sink) in sinks.iter().enumerate() {
                let id = ConnectionId::new(self.netlist.connections.len());
                self.netlist.connections.push(Connection {
                    id,
                    net: net_id,
                    source_pin,
                    sink_pin: PinId::new(net_id.index() * 100 + i + 1),
                    source_node: source,
                    sink_node: sink,
                    timing_edge: None,
                    bounding_box: 2,
                    route_nodes: Vec::new(),
                    criticality: 0.0,
                    sll: None,
                });
                connections.push(id);
            }
            self.netlist.nets.push(Net {
                id: net_id,
                name: format!("net{}", net_id.index()),
                source_pin,
                fanout: connections.len(),
                connections,
                bbox: BoundingBox::new(-10, 10, -10, 10),
                x_geo: 1.0,
                y_geo: 1.0,
                hpwl: 4.0,
                fixed_opin: None,
            });
            net_id
        }
    }

    fn params() -> RouteParams {
        RouteParams {
            timing_driven: false,
            ..RouteParams::default()
        }
    }

    /// One net, two sinks, both reached through the same first wire.
    pub(crate) fn fanout_fixture() -> (Fixture, RouteNodeId) {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let src = f.node(Source, 0, 0);
        let opin = f.node(Opin, 0, 0);
        let w1 = f.node(ChanX, 1, 0);
        let w2 = f.node(ChanX, 2, 0);
        let ip1 = f.node(Ipin, 3, 0);
        let t1 = f.node(Sink, 3, 0);
        let w3 = f.node(ChanY, 1, 1);
        let ip2 = f.node(Ipin, 1, 2);
        let t2 = f.node(Sink, 1, 2);
        f.chain(&[src, opin, w1, w2, ip1, t1]);
        f.chain(&[w1, w3, ip2, t2]);
        f.rrg.finalize();
        f.net(src, &[t1, t2]);
        (f, w1)
    }

    #[test]
    fn fanout_shares_the_common_wire() {
        let (f, w1) = fanout_fixture();
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let mut circuit = Circuit::new(1);
        let report = router.route(&mut circuit, &params()).unwrap();

        assert!(report.legal);
        assert_eq!(report.trials, 2);
        assert!(circuit.connections_routed());
        for c in &router.netlist().connections {
            assert!(c.route_nodes.contains(&w1));
            assert_eq!(c.route_nodes.first(), Some(&c.source_node));
            assert_eq!(c.route_nodes.last(), Some(&c.sink_node));
        }
        assert_eq!(router.state().get(w1).occupation(), 1);
        assert_eq!(router.net_wirelength(NetId(0)), 3);
        assert_eq!(report.wirelength, 3);
        assert!(report.overused.is_empty());
    }

    /// Two nets want the same wire; only one of them has a detour.
    fn congestion_fixture() -> (Fixture, RouteNodeId, [RouteNodeId; 3]) {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let shared = f.node(ChanX, 1, 0);

        let src_a = f.node(Source, 0, 0);
        let opin_a = f.node(Opin, 0, 0);
        let ip_a = f.node(Ipin, 2, 0);
        let t_a = f.node(Sink, 2, 0);
        let d1 = f.node(ChanY, 0, 1);
        let d2 = f.node(ChanX, 1, 1);
        let d3 = f.node(ChanY, 2, 1);
        f.chain(&[src_a, opin_a, shared, ip_a, t_a]);
        f.chain(&[opin_a, d1, d2, d3, ip_a]);

        let src_b = f.node(Source, 0, 0);
        let opin_b = f.node(Opin, 0, 0);
        let ip_b = f.node(Ipin, 2, 0);
        let t_b = f.node(Sink, 2, 0);
        f.chain(&[src_b, opin_b, shared, ip_b, t_b]);

        f.rrg.finalize();
        f.net(src_a, &[t_a]);
        f.net(src_b, &[t_b]);
        (f, shared, [d1, d2, d3])
    }

    #[test]
    fn first_trial_overuses_the_shared_wire() {
        let (f, shared, _) = congestion_fixture();
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let p = RouteParams {
            max_trials: 1,
            ..params()
        };
        let report = router.route(&mut Circuit::new(1), &p).unwrap();

        assert!(!report.legal);
        assert_eq!(report.overused, vec![shared]);
        assert!(router.state().over_used(router.rrg(), shared));
        assert_eq!(router.state().get(shared).occupation(), 2);
    }

    #[test]
    fn congestion_is_negotiated_away() {
        let (f, shared, detour) = congestion_fixture();
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let mut circuit = Circuit::new(1);
        let report = router.route(&mut circuit, &params()).unwrap();

        assert!(report.legal);
        assert!(report.trials > 2);
        assert!(report.overused.is_empty());
        assert!(!router.state().over_used(router.rrg(), shared));
        assert_eq!(router.state().get(shared).occupation(), 1);
        let a = router.netlist().connection(ConnectionId(0));
        for d in detour {
            assert!(a.route_nodes.contains(&d));
        }
        let b = router.netlist().connection(ConnectionId(1));
        assert!(b.route_nodes.contains(&shared));
        assert!(router.connections_to_reroute().is_empty());
    }

    /// One sink behind a cheap slow wire and an expensive fast one.
    fn fast_or_cheap_fixture(criticality: f64) -> (Fixture, RouteNodeId, RouteNodeId) {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let src = f.node(Source, 0, 0);
        let opin = f.node(Opin, 0, 0);
        let cheap = f.rrg.add_node(ChanX, DieId(0), 1, 1, 0, 0, 1, 1.0, 1.0);
        let fast = f.rrg.add_node(ChanX, DieId(0), 1, 1, 0, 0, 1, 5.0, 0.01);
        let ip = f.node(Ipin, 2, 0);
        let t = f.node(Sink, 2, 0);
        f.chain(&[src, opin, cheap, ip, t]);
        f.chain(&[opin, fast, ip]);
        f.rrg.finalize();
        f.net(src, &[t]);
        f.netlist.connections[0].criticality = criticality;
        (f, cheap, fast)
    }

    #[test]
    fn critical_connections_trade_cost_for_delay() {
        for (criticality, takes_fast) in [(0.0, false), (0.95, true)] {
            let (f, cheap, fast) = fast_or_cheap_fixture(criticality);
            let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
            let report = router.route(&mut Circuit::new(1), &params()).unwrap();
            assert!(report.legal);

            let path = &router.netlist().connection(ConnectionId(0)).route_nodes;
            assert_eq!(path.contains(&fast), takes_fast);
            assert_eq!(path.contains(&cheap), !takes_fast);
        }
    }

    #[test]
    fn critical_connections_reroute_after_an_overused_trial() {
        use RouteNodeType::*;
        let (mut f, _, _) = congestion_fixture();
        let src = f.node(Source, 4, 4);
        let opin = f.node(Opin, 4, 4);
        let w = f.node(ChanX, 5, 4);
        let ip = f.node(Ipin, 6, 4);
        let t = f.node(Sink, 6, 4);
        f.chain(&[src, opin, w, ip, t]);
        f.rrg.finalize();
        let net = f.net(src, &[t]);

        let con = f.netlist.net(net).connections[0];
        let (source_pin, sink_pin) = {
            let c = f.netlist.connection(con);
            (c.source_pin, c.sink_pin)
        };
        let mut timing = TimingGraph::new(2);
        let d = ClockDomainId(1);
        let root = timing.add_node(source_pin, Position::Root, d);
        let leaf = timing.add_node(sink_pin, Position::Leaf, d);
        let edge = timing.add_edge(root, leaf, 1.0, 0.0);
        timing.prepare().unwrap();
        f.netlist.connections[con.index()].timing_edge = Some(edge);

        let p = RouteParams {
            timing_driven: true,
            ..RouteParams::default()
        };
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, Some(timing));
        let report = router.route(&mut Circuit::new(1), &p).unwrap();

        assert!(report.legal);
        assert!(router.netlist().connection(con).criticality > 0.9);
        // Trial 2 follows an overused trial: the congested connection and the
        // critical one are rerouted. Trial 3 follows a clean trial.
        assert_eq!(report.reroute_history, vec![3, 2, 0]);
        assert!(!router.connection_congested(con));
    }

    #[test]
    fn pres_fac_grows_geometrically() {
        let (f, _, _) = congestion_fixture();
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let p = params();
        let report = router.route(&mut Circuit::new(1), &p).unwrap();

        assert_eq!(report.pres_fac_history[0], p.initial_pres_fac);
        for pair in report.pres_fac_history.windows(2) {
            assert!((pair[1] - pair[0] * p.pres_fac_mult).abs() < 1e-9);
        }
        assert_eq!(report.pres_fac_history.len(), report.trials);
    }

    #[test]
    fn budget_exhaustion_is_reported_not_raised() {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let shared = f.node(ChanX, 1, 0);
        let mut sources = Vec::new();
        for _ in 0..2 {
            let src = f.node(Source, 0, 0);
            let opin = f.node(Opin, 0, 0);
            let ip = f.node(Ipin, 2, 0);
            let t = f.node(Sink, 2, 0);
            f.chain(&[src, opin, shared, ip, t]);
            sources.push((src, t));
        }
        f.rrg.finalize();
        for (src, t) in sources {
            f.net(src, &[t]);
        }

        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let mut circuit = Circuit::new(1);
        let p = RouteParams {
            max_trials: 5,
            ..params()
        };
        let report = router.route(&mut circuit, &p).unwrap();
        assert!(!report.legal);
        assert_eq!(report.trials, 5);
        assert_eq!(report.overused, vec![shared]);
        assert!(!circuit.connections_routed());
    }

    #[test]
    fn unreachable_sink_is_an_error() {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let src = f.node(Source, 0, 0);
        let opin = f.node(Opin, 0, 0);
        let t = f.node(Sink, 5, 5);
        f.chain(&[src, opin]);
        f.rrg.finalize();
        f.net(src, &[t]);

        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let result = router.route(&mut Circuit::new(1), &params());
        assert!(matches!(result, Err(RouterError::Unroutable { .. })));
    }

    #[test]
    fn wires_outside_the_box_are_not_explored() {
        let (mut f, _) = fanout_fixture();
        f.netlist.nets[0].bbox = BoundingBox::new(0, 3, 0, 0);
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        // The second sink needs the CHANY wire at y = 1.
        let result = router.route(&mut Circuit::new(1), &params());
        assert!(matches!(result, Err(RouterError::Unroutable { connection, .. }) if connection == ConnectionId(1)));
    }

    #[test]
    fn opins_are_fixed_to_the_most_used_one() {
        use RouteNodeType::*;
        let mut f = Fixture::new();
        let src = f.node(Source, 0, 0);
        let opin1 = f.node(Opin, 0, 0);
        let opin2 = f.node(Opin, 0, 0);
        let w1 = f.node(ChanX, 1, 0);
        let ip1 = f.node(Ipin, 2, 0);
        let t1 = f.node(Sink, 2, 0);
        let w2 = f.node(ChanY, 0, 1);
        let ip2 = f.node(Ipin, 0, 2);
        let t2 = f.node(Sink, 0, 2);
        let w3 = f.node(ChanX, 1, 1);
        let w4 = f.node(ChanY, 1, 2);
        f.chain(&[src, opin1, w1, ip1, t1]);
        f.chain(&[src, opin2, w2, ip2, t2]);
        f.chain(&[opin1, w3, w4, ip2]);
        f.rrg.finalize();
        let net = f.net(src, &[t1, t2]);

        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let p = RouteParams {
            fix_opins_from_trial: 1,
            opin_fix_min_fanout: 2,
            ..params()
        };
        let report = router.route(&mut Circuit::new(1), &p).unwrap();

        assert!(report.legal);
        assert_eq!(report.trials, 3);
        assert_eq!(router.netlist().net(net).fixed_opin, Some(opin1));
        assert_eq!(router.state().get(opin1).owner, Some(net));
        for c in &router.netlist().connections {
            assert_eq!(c.opin(router.rrg()), Some(opin1));
        }
        assert!(router.connections_to_reroute().is_empty());
    }

    #[test]
    fn generated_benchmark_routes_legally() {
        let config = GeneratorConfig {
            dies: 2,
            die_width: 6,
            die_height: 5,
            channel_width: 4,
            inputs_per_block: 3,
            utilization: 0.5,
            max_fanout: 3,
            cross_die_fraction: 0.3,
            seed: 3,
            ..GeneratorConfig::default()
        };
        let delays = DelayConfig::default();
        let mut bench = generate(&config, &delays).unwrap();
        let table = SllNetTable::from_generated(&bench.nets);
        let delay_table = sll_common::db::circuit::DelayTable::from_config(&delays);
        let timing = TimingGraph::build(&bench.circuit, &delay_table).unwrap();
        let netlist = RoutingNetlist::build(&bench.circuit, &bench.rrg, &table, Some(&timing), 3).unwrap();

        let mut router = ConnectionRouter::new(&bench.rrg, netlist, Some(timing));
        let report = router.route(&mut bench.circuit, &RouteParams::default()).unwrap();

        assert!(report.legal);
        assert!(bench.circuit.connections_routed());
        assert!(router.overused_nodes().is_empty());
        assert!(report.max_delay > 0.0);
        for c in &router.netlist().connections {
            if let Some(sll) = c.sll {
                assert!(c.route_nodes.contains(&sll.wire_node));
            }
        }
        assert!(crate::check::run(&router).is_ok());
    }
}
