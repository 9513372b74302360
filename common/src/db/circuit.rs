use crate::db::indices::*;
use crate::geom::coord::SiteCoord;
use crate::util::config::DelayConfig;
use std::collections::HashMap;

/// Clock domain shared by pads and constant generators.
pub const VIRTUAL_IO_DOMAIN: ClockDomainId = ClockDomainId(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetKind {
    Signal,
    Clock,
    /// Reset/enable style nets distributed on dedicated resources, never timed.
    Global,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LeafTiming {
    Combinational,
    Clocked {
        domain: ClockDomainId,
        setup: f64,
        clock_to_q: f64,
    },
    ConstantGenerator,
    InputPad,
    OutputPad,
}

impl LeafTiming {
    /// Outputs of this primitive start timing paths.
    pub fn starts_paths(&self) -> bool {
        matches!(
            self,
            LeafTiming::Clocked { .. } | LeafTiming::ConstantGenerator | LeafTiming::InputPad
        )
    }

    /// Inputs of this primitive end timing paths.
    pub fn ends_paths(&self) -> bool {
        matches!(self, LeafTiming::Clocked { .. } | LeafTiming::OutputPad)
    }

    pub fn domain(&self) -> ClockDomainId {
        match self {
            LeafTiming::Clocked { domain, .. } => *domain,
            _ => VIRTUAL_IO_DOMAIN,
        }
    }

    pub fn setup(&self) -> f64 {
        match self {
            LeafTiming::Clocked { setup, .. } => *setup,
            _ => 0.0,
        }
    }

    pub fn clock_to_q(&self) -> f64 {
        match self {
            LeafTiming::Clocked { clock_to_q, .. } => *clock_to_q,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    /// Placed tile-level block; its pins are the ones the router connects.
    Global { die: DieId, site: SiteCoord },
    Local,
    Leaf(LeafTiming),
}

#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub parent: Option<BlockId>,
    pub kind: BlockKind,
    pub inputs: Vec<PinId>,
    pub outputs: Vec<PinId>,
}

#[derive(Clone, Debug)]
pub struct Pin {
    pub name: String,
    pub block: BlockId,
    pub port: String,
    pub index: u32,
    /// Site pin class, used to find the pin's SOURCE/SINK route node.
    pub class: u32,
    pub direction: PinDirection,
    pub net_kind: NetKind,
    pub driver: Option<PinId>,
    pub sinks: Vec<PinId>,
}

/// Placed, packed netlist as handed over by the placer.
pub struct Circuit {
    pub blocks: Vec<Block>,
    pub pins: Vec<Pin>,
    pub clock_domains: Vec<String>,
    pub num_dies: usize,
    connections_routed: bool,
}

impl Circuit {
    pub fn new(num_dies: usize) -> Self {
        Self {
            blocks: Vec::new(),
            pins: Vec::new(),
            clock_domains: vec!["virtual_io".to_string()],
            num_dies,
            connections_routed: false,
        }
    }

    pub fn add_clock_domain(&mut self, name: &str) -> ClockDomainId {
        if let Some(pos) = self.clock_domains.iter().position(|d| d == name) {
            return ClockDomainId::new(pos);
        }
        self.clock_domains.push(name.to_string());
        ClockDomainId::new(self.clock_domains.len() - 1)
    }

    pub fn clock_domain_name(&self, domain: ClockDomainId) -> &str {
        self.clock_domains
            .get(domain.index())
            .map(|s| s.as_str())
            .unwrap_or("?")
    }

    pub fn num_clock_domains(&self) -> usize {
        self.clock_domains.len()
    }

    pub fn add_block(&mut self, name: String, parent: Option<BlockId>, kind: BlockKind) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block {
            name,
            parent,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        id
    }

    /// Adds a pin; its class is its position among the block's pins.
    pub fn add_pin(&mut self, block: BlockId, port: &str, index: u32, direction: PinDirection) -> PinId {
        let id = PinId::new(self.pins.len());
        let b = &mut self.blocks[block.index()];
        let class = (b.inputs.len() + b.outputs.len()) as u32;
        match direction {
            PinDirection::Input => b.inputs.push(id),
            PinDirection::Output => b.outputs.push(id),
        }
        self.pins.push(Pin {
            name: format!("{}.{}[{}]", b.name, port, index),
            block,
            port: port.to_string(),
            index,
            class,
            direction,
            net_kind: NetKind::Signal,
            driver: None,
            sinks: Vec::new(),
        });
        id
    }

    pub fn set_net_kind(&mut self, pin: PinId, kind: NetKind) {
        self.pins[pin.index()].net_kind = kind;
    }

    pub fn connect(&mut self, from: PinId, to: PinId) {
        self.pins[from.index()].sinks.push(to);
        self.pins[to.index()].driver = Some(from);
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.index()]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_pins(&self) -> usize {
        self.pins.len()
    }

    pub fn leaf_timing(&self, pin: PinId) -> Option<LeafTiming> {
        match self.block(self.pin(pin).block).kind {
            BlockKind::Leaf(timing) => Some(timing),
            _ => None,
        }
    }

    pub fn is_global_pin(&self, pin: PinId) -> bool {
        matches!(self.block(self.pin(pin).block).kind, BlockKind::Global { .. })
    }

    pub fn global_block_of(&self, block: BlockId) -> Option<BlockId> {
        let mut current = Some(block);
        let mut steps = 0;
        while let Some(id) = current {
            let b = self.block(id);
            if matches!(b.kind, BlockKind::Global { .. }) {
                return Some(id);
            }
            current = b.parent;
            steps += 1;
            if steps > self.blocks.len() {
                break;
            }
        }
        None
    }

    pub fn placement_of(&self, pin: PinId) -> Option<(DieId, SiteCoord)> {
        let global = self.global_block_of(self.pin(pin).block)?;
        match self.block(global).kind {
            BlockKind::Global { die, site } => Some((die, site)),
            _ => None,
        }
    }

    /// True when the hop `from -> to` is a net between two global blocks.
    pub fn is_inter_block(&self, from: PinId, to: PinId) -> bool {
        self.is_global_pin(from)
            && self.is_global_pin(to)
            && self.pin(from).block != self.pin(to).block
    }

    /// Successors in the pin graph. An input of a combinational primitive
    /// continues at that primitive's outputs.
    pub fn fanout(&self, pin: PinId) -> &[PinId] {
        let p = self.pin(pin);
        let block = self.block(p.block);
        if p.direction == PinDirection::Input
            && matches!(block.kind, BlockKind::Leaf(LeafTiming::Combinational))
        {
            return &block.outputs;
        }
        &p.sinks
    }

    /// Follows drivers back to the pin that originates the signal.
    pub fn ultimate_source(&self, pin: PinId) -> PinId {
        let mut current = pin;
        for _ in 0..self.pins.len() {
            match self.pin(current).driver {
                Some(driver) => current = driver,
                None => break,
            }
        }
        current
    }

    pub fn set_connections_routed(&mut self, routed: bool) {
        self.connections_routed = routed;
    }

    pub fn connections_routed(&self) -> bool {
        self.connections_routed
    }
}

pub trait DelayModel {
    /// Delay of one intra-block hop of the pin graph.
    fn hop_delay(&self, circuit: &Circuit, from: PinId, to: PinId) -> f64;

    /// Placement-based estimate for an inter-block wire.
    fn wire_delay_estimate(&self, circuit: &Circuit, from: PinId, to: PinId) -> f64;
}

#[derive(Clone, Debug)]
pub struct DelayTable {
    pub cell_delay: f64,
    pub interconnect_delay: f64,
    pub wire_delay_per_tile: f64,
    pub sll_delay: f64,
    indexed: HashMap<(String, u32, String, u32), f64>,
    ports: HashMap<(String, String), f64>,
}

impl DelayTable {
    pub fn new(cell_delay: f64, interconnect_delay: f64, wire_delay_per_tile: f64, sll_delay: f64) -> Self {
        Self {
            cell_delay,
            interconnect_delay,
            wire_delay_per_tile,
            sll_delay,
            indexed: HashMap::new(),
            ports: HashMap::new(),
        }
    }

    pub fn from_config(config: &DelayConfig) -> Self {
        Self::new(
            config.cell_delay,
            config.interconnect_delay,
            config.wire_delay_per_tile,
            config.sll_delay,
        )
    }

    pub fn set_port_delay(&mut self, source_port: &str, sink_port: &str, delay: f64) {
        self.ports
            .insert((source_port.to_string(), sink_port.to_string()), delay);
    }

    pub fn set_indexed_delay(
        &mut self,
        source_port: &str,
        source_index: u32,
        sink_port: &str,
        sink_index: u32,
        delay: f64,
    ) {
        self.indexed.insert(
            (
                source_port.to_string(),
                source_index,
                sink_port.to_string(),
                sink_index,
            ),
            delay,
        );
    }

    pub fn lookup(&self, source_port: &str, source_index: u32, sink_port: &str, sink_index: u32) -> Option<f64> {
        self.indexed
            .get(&(
                source_port.to_string(),
                source_index,
                sink_port.to_string(),
                sink_index,
            ))
            .or_else(|| {
                self.ports
                    .get(&(source_port.to_string(), sink_port.to_string()))
            })
            .copied()
    }
}

impl DelayModel for DelayTable {
    fn hop_delay(&self, circuit: &Circuit, from: PinId, to: PinId) -> f64 {
        let f = circuit.pin(from);
        let t = circuit.pin(to);
        if let Some(d) = self.lookup(&f.port, f.index, &t.port, t.index) {
            return d;
        }
        // Input to output of the same primitive is a cell arc.
        if f.block == t.block && f.direction == PinDirection::Input {
            self.cell_delay
        } else {
            self.interconnect_delay
        }
    }

    fn wire_delay_estimate(&self, circuit: &Circuit, from: PinId, to: PinId) -> f64 {
        match (circuit.placement_of(from), circuit.placement_of(to)) {
            (Some((die_a, site_a)), Some((die_b, site_b))) => {
                let tiles = site_a.manhattan(site_b) as f64;
                let crossings = die_a.0.abs_diff(die_b.0) as f64;
                tiles * self.wire_delay_per_tile + crossings * self.sll_delay
            }
            _ => 0.0,
        }
    }
}
