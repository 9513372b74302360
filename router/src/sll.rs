//! Super long lines: the interposer wires a cross-die connection is bound to.

use crate::error::{Result, RouterError};
use sll_common::db::indices::{BlockId, DieId, PinId, RouteNodeId};
use sll_common::db::rrg::ResourceGraph;
use sll_common::util::generator::GeneratedNet;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossingDirection {
    Up,
    Down,
}

/// The SLL wire a cross-die connection must use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SllCrossing {
    pub wire_node: RouteNodeId,
    pub x: u32,
    pub direction: CrossingDirection,
}

#[derive(Clone, Debug)]
pub struct SllNet {
    pub source: PinId,
    pub sinks: Vec<(BlockId, PinId)>,
    /// Interposer column reserved for this net.
    pub crossing_x: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct SllNetTable {
    nets: HashMap<String, SllNet>,
    by_source: HashMap<PinId, String>,
}

impl SllNetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_generated(nets: &[GeneratedNet]) -> Self {
        let mut table = Self::new();
        for net in nets {
            table.insert(
                net.name.clone(),
                SllNet {
                    source: net.source,
                    sinks: net.sinks.clone(),
                    crossing_x: net.crossing_x,
                },
            );
        }
        table
    }

    pub fn insert(&mut self, name: String, net: SllNet) {
        self.by_source.insert(net.source, name.clone());
        self.nets.insert(name, net);
    }

    pub fn get(&self, name: &str) -> Option<&SllNet> {
        self.nets.get(name)
    }

    pub fn name_of_source(&self, source: PinId) -> Option<&str> {
        self.by_source.get(&source).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// Resolves the SLL wire for a connection of `net` from `source_die` to
    /// `sink_die`. Only adjacent dies can be crossed.
    pub fn crossing(
        &self,
        rrg: &ResourceGraph,
        net: &str,
        source_die: DieId,
        sink_die: DieId,
    ) -> Result<SllCrossing> {
        let fail = |reason: String| RouterError::SllCrossing {
            net: net.to_string(),
            reason,
        };

        if source_die.0.abs_diff(sink_die.0) != 1 {
            return Err(fail(format!(
                "dies {} and {} are not adjacent",
                source_die.0, sink_die.0
            )));
        }
        let entry = self
            .get(net)
            .ok_or_else(|| fail("no SLL table entry".to_string()))?;
        let x = entry
            .crossing_x
            .ok_or_else(|| fail("no crossing column assigned".to_string()))?;

        let lower = DieId(source_die.0.min(sink_die.0));
        let site = rrg
            .interposer_site(x, lower)
            .ok_or_else(|| fail(format!("no interposer at column {} above die {}", x, lower.0)))?;

        let (wire_node, direction) = if sink_die.0 > source_die.0 {
            (site.up, CrossingDirection::Up)
        } else {
            (site.down, CrossingDirection::Down)
        };
        Ok(SllCrossing {
            wire_node,
            x,
            direction,
        })
    }
}
