//! Deterministic synthetic multi-die benchmark: an island-style resource
//! graph per die, SLL wires at every column of every die boundary, and a
//! random placed LUT/FF netlist on top of it.

use crate::db::circuit::{BlockKind, Circuit, LeafTiming, NetKind, PinDirection};
use crate::db::indices::{BlockId, ClockDomainId, DieId, PinId, RouteNodeId};
use crate::db::rrg::{InterposerSite, ResourceGraph, RouteNodeType};
use crate::geom::coord::SiteCoord;
use crate::util::config::{DelayConfig, GeneratorConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

const PIN_DELAY: f64 = 0.02;
const OPIN_BASE_COST: f64 = 1.0;
const IPIN_BASE_COST: f64 = 0.95;
const WIRE_BASE_COST: f64 = 1.0;
const SLL_BASE_COST: f64 = 2.0;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
}

/// One multi-fanout net of the generated design, keyed by name.
#[derive(Clone, Debug)]
pub struct GeneratedNet {
    pub name: String,
    pub source: PinId,
    pub sinks: Vec<(BlockId, PinId)>,
    /// Interposer column, set only for nets with a sink on another die.
    pub crossing_x: Option<u32>,
}

pub struct Benchmark {
    pub circuit: Circuit,
    pub rrg: ResourceGraph,
    pub nets: Vec<GeneratedNet>,
}

struct DieWires {
    /// CHANY tracks of the top row, indexed `x * channel_width + track`.
    top: Vec<RouteNodeId>,
    bottom: Vec<RouteNodeId>,
}

struct ClbPins {
    block: BlockId,
    die: usize,
    site: SiteCoord,
    inputs: Vec<PinId>,
    output: PinId,
}

pub fn generate(config: &GeneratorConfig, delays: &DelayConfig) -> Result<Benchmark, GeneratorError> {
    if config.dies == 0 || config.die_width == 0 || config.die_height == 0 {
        return Err(GeneratorError::InvalidConfig(
            "dies, die_width and die_height must be non-zero".to_string(),
        ));
    }
    if config.channel_width == 0 || config.inputs_per_block == 0 {
        return Err(GeneratorError::InvalidConfig(
            "channel_width and inputs_per_block must be non-zero".to_string(),
        ));
    }

    log::info!(
        "Generating benchmark: {} dies of {}x{} tiles, channel width {}",
        config.dies,
        config.die_width,
        config.die_height,
        config.channel_width
    );

    let rrg = build_resource_graph(config, delays);
    let (circuit, nets) = build_circuit(config, delays);

    log::info!(
        "Generated {} route nodes, {} blocks, {} pins, {} nets",
        rrg.num_nodes(),
        circuit.num_blocks(),
        circuit.num_pins(),
        nets.len()
    );

    Ok(Benchmark { circuit, rrg, nets })
}

fn build_resource_graph(config: &GeneratorConfig, delays: &DelayConfig) -> ResourceGraph {
    // Dies are independent until the interposer is stitched in.
    let parts: Vec<(ResourceGraph, DieWires)> = (0..config.dies)
        .into_par_iter()
        .map(|die| build_die_graph(die, config, delays))
        .collect();

    let mut rrg = ResourceGraph::new(config.dies, config.die_height);
    let mut wires = Vec::with_capacity(parts.len());
    for (part, die_wires) in parts {
        let offset = rrg.num_nodes() as u32;
        rrg.append(part);
        let shift = |ids: Vec<RouteNodeId>| -> Vec<RouteNodeId> {
            ids.into_iter().map(|id| RouteNodeId(id.0 + offset)).collect()
        };
        wires.push(DieWires {
            top: shift(die_wires.top),
            bottom: shift(die_wires.bottom),
        });
    }

    let cw = config.channel_width as usize;
    let h = config.die_height as i32;
    for lower in 0..config.dies.saturating_sub(1) {
        let y_top = lower as i32 * h + h - 1;
        for x in 0..config.die_width {
            let up = rrg.add_node(
                RouteNodeType::Sll,
                DieId::new(lower),
                x as i32,
                x as i32,
                y_top,
                y_top + 1,
                1,
                SLL_BASE_COST,
                delays.sll_delay,
            );
            let down = rrg.add_node(
                RouteNodeType::Sll,
                DieId::new(lower),
                x as i32,
                x as i32,
                y_top,
                y_top + 1,
                1,
                SLL_BASE_COST,
                delays.sll_delay,
            );
            for t in 0..cw {
                let below = wires[lower].top[x as usize * cw + t];
                let above = wires[lower + 1].bottom[x as usize * cw + t];
                rrg.add_edge(below, up);
                rrg.add_edge(up, above);
                rrg.add_edge(above, down);
                rrg.add_edge(down, below);
            }
            rrg.register_interposer(x, DieId::new(lower), InterposerSite { up, down });
        }
    }

    rrg.finalize();
    rrg
}

fn build_die_graph(die: usize, config: &GeneratorConfig, delays: &DelayConfig) -> (ResourceGraph, DieWires) {
    let w = config.die_width as i32;
    let h = config.die_height as i32;
    let cw = config.channel_width as usize;
    let inputs = config.inputs_per_block as usize;
    let die_id = DieId::new(die);
    let y0 = die as i32 * h;

    let mut g = ResourceGraph::new(config.dies, config.die_height);
    let tile = |x: i32, y: i32| (y * w + x) as usize;

    let mut chanx = vec![Vec::with_capacity(cw); (w * h) as usize];
    let mut chany = vec![Vec::with_capacity(cw); (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let gy = y0 + y;
            for _ in 0..cw {
                chanx[tile(x, y)].push(g.add_node(
                    RouteNodeType::ChanX,
                    die_id,
                    x,
                    x,
                    gy,
                    gy,
                    1,
                    WIRE_BASE_COST,
                    delays.wire_delay_per_tile,
                ));
                chany[tile(x, y)].push(g.add_node(
                    RouteNodeType::ChanY,
                    die_id,
                    x,
                    x,
                    gy,
                    gy,
                    1,
                    WIRE_BASE_COST,
                    delays.wire_delay_per_tile,
                ));
            }
        }
    }

    // Disjoint switch boxes: track t only meets track t.
    for y in 0..h {
        for x in 0..w {
            for t in 0..cw {
                let cx = chanx[tile(x, y)][t];
                let cy = chany[tile(x, y)][t];
                g.add_edge(cx, cy);
                g.add_edge(cy, cx);
                if x > 0 {
                    g.add_edge(cx, chanx[tile(x - 1, y)][t]);
                }
                if x + 1 < w {
                    g.add_edge(cx, chanx[tile(x + 1, y)][t]);
                }
                if y > 0 {
                    g.add_edge(cy, chany[tile(x, y - 1)][t]);
                }
                if y + 1 < h {
                    g.add_edge(cy, chany[tile(x, y + 1)][t]);
                }
            }
        }
    }

    for y in 0..h {
        for x in 0..w {
            let gy = y0 + y;
            let site = SiteCoord::new(x as u32, gy as u32);
            let wires: Vec<RouteNodeId> = chanx[tile(x, y)]
                .iter()
                .chain(chany[tile(x, y)].iter())
                .copied()
                .collect();

            for class in 0..inputs {
                let sink = g.add_node(RouteNodeType::Sink, die_id, x, x, gy, gy, 1, 0.0, 0.0);
                let ipin = g.add_node(
                    RouteNodeType::Ipin,
                    die_id,
                    x,
                    x,
                    gy,
                    gy,
                    1,
                    IPIN_BASE_COST,
                    PIN_DELAY,
                );
                g.add_edge(ipin, sink);
                for &wire in &wires {
                    g.add_edge(wire, ipin);
                }
                g.register_site_pin(die_id, site, class as u32, sink);
            }

            let source = g.add_node(RouteNodeType::Source, die_id, x, x, gy, gy, 1, 1.0, 0.0);
            let opin = g.add_node(
                RouteNodeType::Opin,
                die_id,
                x,
                x,
                gy,
                gy,
                1,
                OPIN_BASE_COST,
                PIN_DELAY,
            );
            g.add_edge(source, opin);
            for &wire in &wires {
                g.add_edge(opin, wire);
            }
            g.register_site_pin(die_id, site, inputs as u32, source);
        }
    }

    let mut top = Vec::with_capacity(w as usize * cw);
    let mut bottom = Vec::with_capacity(w as usize * cw);
    for x in 0..w {
        top.extend_from_slice(&chany[tile(x, h - 1)]);
        bottom.extend_from_slice(&chany[tile(x, 0)]);
    }
    (g, DieWires { top, bottom })
}

fn build_circuit(config: &GeneratorConfig, delays: &DelayConfig) -> (Circuit, Vec<GeneratedNet>) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut circuit = Circuit::new(config.dies);
    let domains: Vec<ClockDomainId> = (0..config.clock_domains.max(1))
        .map(|i| circuit.add_clock_domain(&format!("clk{}", i)))
        .collect();

    let mut clbs: Vec<ClbPins> = Vec::new();
    for die in 0..config.dies {
        let mut sites: Vec<SiteCoord> = (0..config.die_height)
            .flat_map(|y| {
                (0..config.die_width).map(move |x| {
                    SiteCoord::new(x, die as u32 * config.die_height + y)
                })
            })
            .collect();
        sites.shuffle(&mut rng);
        let used = ((sites.len() as f64) * config.utilization.clamp(0.05, 1.0)).ceil() as usize;
        sites.truncate(used.max(2).min(sites.len()));
        sites.sort();
        for site in sites {
            let registered = rng.gen_bool(config.registered_fraction.clamp(0.0, 1.0));
            let domain = domains[rng.gen_range(0..domains.len())];
            clbs.push(add_clb(&mut circuit, config, delays, die, site, registered, domain));
        }
    }

    let nets = connect_nets(&mut circuit, config, &clbs, &mut rng);
    (circuit, nets)
}

fn add_clb(
    circuit: &mut Circuit,
    config: &GeneratorConfig,
    delays: &DelayConfig,
    die: usize,
    site: SiteCoord,
    registered: bool,
    domain: ClockDomainId,
) -> ClbPins {
    let name = format!("clb_{}_{}", site.x, site.y);
    let block = circuit.add_block(
        name.clone(),
        None,
        BlockKind::Global {
            die: DieId::new(die),
            site,
        },
    );
    let inputs: Vec<PinId> = (0..config.inputs_per_block)
        .map(|i| circuit.add_pin(block, "I", i, PinDirection::Input))
        .collect();
    let output = circuit.add_pin(block, "O", 0, PinDirection::Output);
    let clk = circuit.add_pin(block, "clk", 0, PinDirection::Input);
    circuit.set_net_kind(clk, NetKind::Clock);

    let lut = circuit.add_block(
        format!("{}/lut", name),
        Some(block),
        BlockKind::Leaf(LeafTiming::Combinational),
    );
    for (i, &clb_in) in inputs.iter().enumerate() {
        let lut_in = circuit.add_pin(lut, "in", i as u32, PinDirection::Input);
        circuit.connect(clb_in, lut_in);
    }
    let lut_out = circuit.add_pin(lut, "out", 0, PinDirection::Output);

    if registered {
        let ff = circuit.add_block(
            format!("{}/ff", name),
            Some(block),
            BlockKind::Leaf(LeafTiming::Clocked {
                domain,
                setup: delays.setup,
                clock_to_q: delays.clock_to_q,
            }),
        );
        let d = circuit.add_pin(ff, "D", 0, PinDirection::Input);
        let q = circuit.add_pin(ff, "Q", 0, PinDirection::Output);
        let ff_clk = circuit.add_pin(ff, "clk", 0, PinDirection::Input);
        circuit.set_net_kind(ff_clk, NetKind::Clock);
        circuit.connect(clk, ff_clk);
        circuit.connect(lut_out, d);
        circuit.connect(q, output);
    } else {
        circuit.connect(lut_out, output);
    }

    ClbPins {
        block,
        die,
        site,
        inputs,
        output,
    }
}

fn connect_nets(
    circuit: &mut Circuit,
    config: &GeneratorConfig,
    clbs: &[ClbPins],
    rng: &mut StdRng,
) -> Vec<GeneratedNet> {
    let mut free_inputs: Vec<Vec<PinId>> = clbs.iter().map(|c| c.inputs.clone()).collect();
    let mut by_die: Vec<Vec<usize>> = vec![Vec::new(); config.dies];
    for (i, clb) in clbs.iter().enumerate() {
        by_die[clb.die].push(i);
    }
    // (column, lower die, upward) already promised to a net.
    let mut used_crossings: HashSet<(u32, usize, bool)> = HashSet::new();
    let mut nets = Vec::new();

    let mut order: Vec<usize> = (0..clbs.len()).collect();
    order.shuffle(rng);

    for &src_idx in &order {
        let src = &clbs[src_idx];
        let fanout = rng.gen_range(1..=config.max_fanout.max(1));

        let mut target_die = src.die;
        let mut crossing_x = None;
        if config.dies > 1 && rng.gen_bool(config.cross_die_fraction.clamp(0.0, 1.0)) {
            let other = if src.die + 1 < config.dies && (src.die == 0 || rng.gen_bool(0.5)) {
                src.die + 1
            } else {
                src.die - 1
            };
            let upward = other > src.die;
            let lower = src.die.min(other);
            // Closest free interposer column to the driver.
            let mut columns: Vec<u32> = (0..config.die_width).collect();
            columns.sort_by_key(|&x| x.abs_diff(src.site.x));
            if let Some(&x) = columns
                .iter()
                .find(|&&x| !used_crossings.contains(&(x, lower, upward)))
            {
                used_crossings.insert((x, lower, upward));
                target_die = other;
                crossing_x = Some(x);
            }
        }

        let mut sinks = Vec::new();
        let candidates = &by_die[target_die];
        for _ in 0..fanout {
            let picks: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| i != src_idx && !free_inputs[i].is_empty())
                .filter(|&i| !sinks.iter().any(|&(b, _)| b == clbs[i].block))
                .collect();
            let Some(&dst_idx) = picks.choose(rng) else {
                break;
            };
            let slot = rng.gen_range(0..free_inputs[dst_idx].len());
            let pin = free_inputs[dst_idx].swap_remove(slot);
            circuit.connect(src.output, pin);
            sinks.push((clbs[dst_idx].block, pin));
        }

        if sinks.is_empty() {
            continue;
        }
        nets.push(GeneratedNet {
            name: format!("n{}", nets.len()),
            source: src.output,
            sinks,
            crossing_x,
        });
    }
    nets
}
