use crate::db::indices::{DieId, RouteNodeId};
use crate::geom::coord::SiteCoord;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteNodeType {
    Source,
    Sink,
    Opin,
    Ipin,
    ChanX,
    ChanY,
    /// Interposer wire between two vertically stacked dies.
    Sll,
}

impl RouteNodeType {
    pub const ALL: [RouteNodeType; 7] = [
        RouteNodeType::Source,
        RouteNodeType::Sink,
        RouteNodeType::Opin,
        RouteNodeType::Ipin,
        RouteNodeType::ChanX,
        RouteNodeType::ChanY,
        RouteNodeType::Sll,
    ];

    #[inline]
    pub fn is_wire(&self) -> bool {
        matches!(
            self,
            RouteNodeType::ChanX | RouteNodeType::ChanY | RouteNodeType::Sll
        )
    }

    #[inline]
    pub fn is_pin(&self) -> bool {
        matches!(self, RouteNodeType::Opin | RouteNodeType::Ipin)
    }

    #[inline]
    fn slot(&self) -> usize {
        *self as usize
    }
}

#[derive(Clone, Debug)]
pub struct RouteNode {
    pub id: RouteNodeId,
    pub kind: RouteNodeType,
    pub die: DieId,
    pub xlow: i32,
    pub xhigh: i32,
    pub ylow: i32,
    pub yhigh: i32,
    pub capacity: u32,
    pub base_cost: f64,
    pub delay: f64,
    pub children: Vec<RouteNodeId>,
}

impl RouteNode {
    #[inline]
    pub fn center_x(&self) -> f64 {
        (self.xlow + self.xhigh) as f64 / 2.0
    }

    #[inline]
    pub fn center_y(&self) -> f64 {
        (self.ylow + self.yhigh) as f64 / 2.0
    }

    /// Number of tiles a wire spans; zero for pins, sources and sinks.
    pub fn wire_length(&self) -> i32 {
        if !self.kind.is_wire() {
            return 0;
        }
        (self.xhigh - self.xlow) + (self.yhigh - self.ylow) + 1
    }
}

/// Upward and downward interposer wires at one column of a die boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterposerSite {
    pub up: RouteNodeId,
    pub down: RouteNodeId,
}

#[derive(Clone, Copy, Debug, Default)]
struct TypeAverages {
    cost: f64,
    delay: f64,
    length: f64,
}

/// Capacity-annotated routing resource graph spanning every die.
pub struct ResourceGraph {
    nodes: Vec<RouteNode>,
    site_pins: HashMap<(DieId, SiteCoord, u32), RouteNodeId>,
    interposers: HashMap<(u32, DieId), InterposerSite>,
    averages: [TypeAverages; 7],
    num_dies: usize,
    die_height: u32,
}

impl ResourceGraph {
    pub fn new(num_dies: usize, die_height: u32) -> Self {
        Self {
            nodes: Vec::new(),
            site_pins: HashMap::new(),
            interposers: HashMap::new(),
            averages: [TypeAverages::default(); 7],
            num_dies,
            die_height,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_node(
        &mut self,
        kind: RouteNodeType,
        die: DieId,
        xlow: i32,
        xhigh: i32,
        ylow: i32,
        yhigh: i32,
        capacity: u32,
        base_cost: f64,
        delay: f64,
    ) -> RouteNodeId {
        let id = RouteNodeId::new(self.nodes.len());
        self.nodes.push(RouteNode {
            id,
            kind,
            die,
            xlow,
            xhigh,
            ylow,
            yhigh,
            capacity,
            base_cost,
            delay,
            children: Vec::new(),
        });
        id
    }

    pub fn add_edge(&mut self, from: RouteNodeId, to: RouteNodeId) {
        let children = &mut self.nodes[from.index()].children;
        if !children.contains(&to) {
            children.push(to);
        }
    }

    #[inline]
    pub fn node(&self, id: RouteNodeId) -> &RouteNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[RouteNode] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_dies(&self) -> usize {
        self.num_dies
    }

    pub fn die_height(&self) -> u32 {
        self.die_height
    }

    /// Registers the SOURCE (output class) or SINK (input class) of a site pin.
    pub fn register_site_pin(&mut self, die: DieId, site: SiteCoord, class: u32, node: RouteNodeId) {
        self.site_pins.insert((die, site, class), node);
    }

    pub fn site_pin_node(&self, die: DieId, site: SiteCoord, class: u32) -> Option<RouteNodeId> {
        self.site_pins.get(&(die, site, class)).copied()
    }

    pub fn register_interposer(&mut self, x: u32, lower_die: DieId, site: InterposerSite) {
        self.interposers.insert((x, lower_die), site);
    }

    /// SLL wires at column `x` of the boundary above `lower_die`.
    pub fn interposer_site(&self, x: u32, lower_die: DieId) -> Option<InterposerSite> {
        self.interposers.get(&(x, lower_die)).copied()
    }

    /// Moves every node of `other` into this graph; ids of `other` shift by
    /// the current node count.
    pub fn append(&mut self, other: ResourceGraph) {
        let offset = self.nodes.len() as u32;
        let shift = |id: RouteNodeId| RouteNodeId(id.0 + offset);
        for mut node in other.nodes {
            node.id = shift(node.id);
            for child in node.children.iter_mut() {
                *child = shift(*child);
            }
            self.nodes.push(node);
        }
        for (key, node) in other.site_pins {
            self.site_pins.insert(key, shift(node));
        }
        for (key, site) in other.interposers {
            self.interposers.insert(
                key,
                InterposerSite {
                    up: shift(site.up),
                    down: shift(site.down),
                },
            );
        }
    }

    /// Computes the per-type average cost, delay and length tables used by
    /// the router's lower-bound estimate.
    pub fn finalize(&mut self) {
        let mut sums = [(0.0f64, 0.0f64, 0.0f64, 0usize); 7];
        for node in &self.nodes {
            let s = &mut sums[node.kind.slot()];
            s.0 += node.base_cost;
            s.1 += node.delay;
            s.2 += node.wire_length().max(1) as f64;
            s.3 += 1;
        }
        for kind in RouteNodeType::ALL {
            let (cost, delay, length, count) = sums[kind.slot()];
            self.averages[kind.slot()] = if count == 0 {
                TypeAverages {
                    cost: 1.0,
                    delay: 0.0,
                    length: 1.0,
                }
            } else {
                let n = count as f64;
                TypeAverages {
                    cost: cost / n,
                    delay: delay / n,
                    length: length / n,
                }
            };
        }
        log::debug!(
            "Resource graph: {} nodes, avg CHANX cost {:.3} delay {:.3} len {:.2}",
            self.nodes.len(),
            self.average_cost(RouteNodeType::ChanX),
            self.average_delay(RouteNodeType::ChanX),
            self.average_length(RouteNodeType::ChanX)
        );
    }

    pub fn average_cost(&self, kind: RouteNodeType) -> f64 {
        self.averages[kind.slot()].cost
    }

    pub fn average_delay(&self, kind: RouteNodeType) -> f64 {
        self.averages[kind.slot()].delay
    }

    pub fn average_length(&self, kind: RouteNodeType) -> f64 {
        self.averages[kind.slot()].length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_shifts_children_and_lookups() {
        let mut a = ResourceGraph::new(2, 4);
        a.add_node(RouteNodeType::ChanX, DieId(0), 0, 0, 0, 0, 1, 1.0, 0.1);

        let mut b = ResourceGraph::new(2, 4);
        let src = b.add_node(RouteNodeType::Source, DieId(1), 0, 0, 4, 4, 1, 1.0, 0.0);
        let opin = b.add_node(RouteNodeType::Opin, DieId(1), 0, 0, 4, 4, 1, 1.0, 0.0);
        b.add_edge(src, opin);
        b.register_site_pin(DieId(1), SiteCoord::new(0, 4), 2, src);

        a.append(b);
        assert_eq!(a.num_nodes(), 3);
        let moved = a.site_pin_node(DieId(1), SiteCoord::new(0, 4), 2).unwrap();
        assert_eq!(moved, RouteNodeId(1));
        assert_eq!(a.node(moved).children, vec![RouteNodeId(2)]);
    }

    #[test]
    fn averages_per_type() {
        let mut g = ResourceGraph::new(1, 4);
        g.add_node(RouteNodeType::ChanX, DieId(0), 0, 1, 0, 0, 1, 1.0, 0.2);
        g.add_node(RouteNodeType::ChanX, DieId(0), 0, 3, 0, 0, 1, 3.0, 0.4);
        g.finalize();
        assert!((g.average_cost(RouteNodeType::ChanX) - 2.0).abs() < 1e-9);
        assert!((g.average_delay(RouteNodeType::ChanX) - 0.3).abs() < 1e-9);
        assert!((g.average_length(RouteNodeType::ChanX) - 3.0).abs() < 1e-9);
        assert_eq!(g.average_cost(RouteNodeType::ChanY), 1.0);
    }
}
