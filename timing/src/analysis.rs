//! Arrival/required propagation per clock domain pair and the criticality
//! the router reads from each connection edge.

use crate::graph::{Position, TimingGraph};
use sll_common::db::circuit::Circuit;
use sll_common::db::indices::{ClockDomainId, TimingNodeId};
use sll_common::util::config::TimingConfig;
use std::fmt::Write;

/// Maps the slack of an edge onto `[0, max_criticality]`. Zero slack on the
/// worst path of the pair gives `max_criticality`.
pub fn criticality_from_slack(slack: f64, max_delay: f64, exponent: f64, max_criticality: f64) -> f64 {
    if max_delay <= 0.0 {
        return 0.0;
    }
    let raw = (1.0 - slack / max_delay).clamp(0.0, 1.0);
    max_criticality * raw.powf(exponent)
}

#[derive(Clone, Debug)]
pub struct TimingSummary {
    pub nodes: usize,
    pub edges: usize,
    pub removed_edges: usize,
    pub nets: usize,
    pub max_delay: f64,
    pub geomean_period: f64,
    pub total_cost: f64,
    pub pairs: Vec<(ClockDomainId, ClockDomainId, f64)>,
}

impl TimingSummary {
    pub fn log_report(&self, circuit: &Circuit) {
        log::info!(
            "Timing: {} nodes, {} edges ({} cut), {} nets",
            self.nodes,
            self.edges,
            self.removed_edges,
            self.nets
        );
        for &(source, sink, delay) in &self.pairs {
            log::info!(
                "  {:>12} -> {:<12} {:8.3} ns",
                circuit.clock_domain_name(source),
                circuit.clock_domain_name(sink),
                delay
            );
        }
        log::info!(
            "Max delay {:.3} ns, geomean period {:.3} ns, timing cost {:.3}",
            self.max_delay,
            self.geomean_period,
            self.total_cost
        );
    }
}

impl TimingGraph {
    /// First criticality pass before routing.
    pub fn initialize_timing(&mut self, config: &TimingConfig) -> f64 {
        let max_delay = self.calculate_criticalities(config);
        log::info!(
            "Initial timing: max delay {:.3} ns over {} domain pairs",
            max_delay,
            self.domain_pairs.len()
        );
        max_delay
    }

    /// Recomputes every edge criticality from the current delays and returns
    /// the worst delay over all domain pairs.
    pub fn calculate_criticalities(&mut self, config: &TimingConfig) -> f64 {
        for edge in self.edges.iter_mut() {
            edge.criticality = 0.0;
        }

        let mut global_max = 0.0f64;
        for p in 0..self.domain_pairs.len() {
            let pair = self.domain_pairs[p];
            let pair_max = self.propagate_pair(pair.source, pair.sink);
            self.domain_pairs[p].max_delay = pair_max;
            if pair_max <= 0.0 {
                continue;
            }
            global_max = global_max.max(pair_max);

            for edge in self.edges.iter_mut().filter(|e| !e.removed) {
                let arrival = self.nodes[edge.source.index()].arrival;
                let required = self.nodes[edge.sink.index()].required;
                let (Some(arrival), Some(required)) = (arrival, required) else {
                    continue;
                };
                let slack = required - arrival - edge.total_delay();
                let crit = criticality_from_slack(
                    slack,
                    pair_max,
                    config.criticality_exponent,
                    config.max_criticality,
                );
                if crit > edge.criticality {
                    edge.criticality = crit;
                }
            }
        }

        self.max_delay = global_max;
        global_max
    }

    /// Arrival and required times for paths from `source` domain roots to
    /// `sink` domain leaves. Nodes off those paths stay `None`. Returns the
    /// pair's max delay.
    fn propagate_pair(&mut self, source: ClockDomainId, sink: ClockDomainId) -> f64 {
        for node in self.nodes.iter_mut() {
            node.arrival = None;
            node.required = None;
        }
        let (s, t) = (source.index(), sink.index());

        for &root in &self.roots[s] {
            let node = &mut self.nodes[root.index()];
            if node.has_clock_domain_as_sink[t] {
                node.arrival = Some(0.0);
            }
        }

        for i in 0..self.order.len() {
            let id = self.order[i];
            let Some(arrival) = self.nodes[id.index()].arrival else {
                continue;
            };
            let fanout: Vec<(TimingNodeId, f64)> = self
                .active_sink_edges(id)
                .map(|e| (e.sink, e.total_delay()))
                .collect();
            for (sink_id, delay) in fanout {
                let next = &mut self.nodes[sink_id.index()];
                if !next.has_clock_domain_as_sink[t] {
                    continue;
                }
                let candidate = arrival + delay;
                if next.arrival.is_none_or(|a| candidate > a) {
                    next.arrival = Some(candidate);
                }
            }
        }

        let pair_max = self.leaves[t]
            .iter()
            .filter_map(|l| self.nodes[l.index()].arrival)
            .fold(0.0f64, f64::max);

        for &leaf in &self.leaves[t] {
            let node = &mut self.nodes[leaf.index()];
            if node.arrival.is_some() {
                node.required = Some(pair_max);
            }
        }

        for i in (0..self.order.len()).rev() {
            let id = self.order[i];
            if self.nodes[id.index()].arrival.is_none() {
                continue;
            }
            let mut required: Option<f64> = self.nodes[id.index()].required;
            for &e in &self.nodes[id.index()].sink_edges {
                let edge = &self.edges[e.index()];
                if edge.removed {
                    continue;
                }
                if let Some(r) = self.nodes[edge.sink.index()].required {
                    let candidate = r - edge.total_delay();
                    if required.is_none_or(|cur| candidate < cur) {
                        required = Some(candidate);
                    }
                }
            }
            self.nodes[id.index()].required = required;
        }

        pair_max
    }

    /// Sum over timing nets of their most expensive edge.
    pub fn calculate_total_cost(&self) -> f64 {
        self.nets
            .iter()
            .map(|net| {
                net.edges
                    .iter()
                    .map(|&e| self.edge(e))
                    .filter(|e| !e.removed)
                    .map(|e| e.cost())
                    .fold(0.0f64, f64::max)
            })
            .sum()
    }

    pub fn geomean_period(&self) -> f64 {
        let periods: Vec<f64> = self
            .domain_pairs
            .iter()
            .map(|p| p.max_delay)
            .filter(|&d| d > 0.0)
            .collect();
        if periods.is_empty() {
            return 0.0;
        }
        let log_sum: f64 = periods.iter().map(|d| d.ln()).sum();
        (log_sum / periods.len() as f64).exp()
    }

    pub fn summary(&self) -> TimingSummary {
        TimingSummary {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            removed_edges: self.edges.iter().filter(|e| e.removed).count(),
            nets: self.nets.len(),
            max_delay: self.max_delay,
            geomean_period: self.geomean_period(),
            total_cost: self.calculate_total_cost(),
            pairs: self
                .domain_pairs
                .iter()
                .filter(|p| p.max_delay > 0.0)
                .map(|p| (p.source, p.sink, p.max_delay))
                .collect(),
        }
    }

    /// Pin-by-pin trace of the worst path with cumulative arrival times.
    /// Re-propagates the worst domain pair, so node arrival/required values
    /// afterwards belong to that pair.
    pub fn critical_path_string(&mut self, circuit: &Circuit) -> String {
        let Some(worst) = self
            .domain_pairs
            .iter()
            .copied()
            .filter(|p| p.max_delay > 0.0)
            .max_by(|a, b| a.max_delay.total_cmp(&b.max_delay))
        else {
            return "No timing paths".to_string();
        };

        let max_delay = self.propagate_pair(worst.source, worst.sink);
        let Some(end) = self.leaves[worst.sink.index()]
            .iter()
            .copied()
            .filter(|l| self.nodes[l.index()].arrival.is_some())
            .max_by(|a, b| {
                let aa = self.nodes[a.index()].arrival.unwrap_or(0.0);
                let bb = self.nodes[b.index()].arrival.unwrap_or(0.0);
                aa.total_cmp(&bb)
            })
        else {
            return "No timing paths".to_string();
        };

        let mut path: Vec<TimingNodeId> = vec![end];
        let mut current = end;
        while self.nodes[current.index()].position != Position::Root {
            let best = self
                .active_source_edges(current)
                .filter_map(|e| {
                    self.nodes[e.source.index()]
                        .arrival
                        .map(|a| (e.source, a + e.total_delay()))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1));
            match best {
                Some((prev, _)) if !path.contains(&prev) => {
                    path.push(prev);
                    current = prev;
                }
                _ => break,
            }
        }
        path.reverse();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Critical path {} -> {}: {:.3} ns",
            circuit.clock_domain_name(worst.source),
            circuit.clock_domain_name(worst.sink),
            max_delay
        );
        for id in path {
            let node = &self.nodes[id.index()];
            let _ = writeln!(
                out,
                "  {:8.3}  {:<24} {:?}",
                node.arrival.unwrap_or(0.0),
                circuit.pin(node.pin).name,
                node.position
            );
        }
        out
    }
}
