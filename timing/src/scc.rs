//! Combinational loop removal with Tarjan's strongly connected components.
//!
//! The traversal keeps its own call stack instead of recursing, but visits
//! nodes in index order and successors in edge order, so the components and
//! their pop order match the recursive formulation.

use crate::graph::TimingGraph;
use sll_common::db::indices::{TimingEdgeId, TimingNodeId};

/// Nodes of one component in the order they were popped off the Tarjan stack.
#[derive(Clone, Debug)]
pub struct Scc {
    pub nodes: Vec<TimingNodeId>,
}

impl Scc {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edge from the last-popped node (the component root) to the node popped
    /// just before it. Breaks the cycle somewhere; not a minimal cut.
    pub fn cut_edge(&self, graph: &TimingGraph) -> Option<TimingEdgeId> {
        if self.nodes.len() < 2 {
            return None;
        }
        let last = self.nodes[self.nodes.len() - 1];
        let second_last = self.nodes[self.nodes.len() - 2];
        graph
            .active_sink_edges(last)
            .find(|e| e.sink == second_last)
            .or_else(|| {
                graph
                    .active_sink_edges(last)
                    .find(|e| self.nodes.contains(&e.sink))
            })
            .map(|e| e.id)
    }
}

pub fn strongly_connected_components(graph: &TimingGraph) -> Vec<Scc> {
    let n = graph.nodes.len();
    let mut index: Vec<Option<u32>> = vec![None; n];
    let mut lowlink: Vec<u32> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0u32;
    let mut components = Vec::new();

    // (node, position in its sink edge list)
    let mut call: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if index[start].is_some() {
            continue;
        }
        index[start] = Some(counter);
        lowlink[start] = counter;
        counter += 1;
        stack.push(start);
        on_stack[start] = true;
        call.push((start, 0));

        while let Some(&(v, pos)) = call.last() {
            let edges = &graph.nodes[v].sink_edges;
            if pos < edges.len() {
                if let Some(frame) = call.last_mut() {
                    frame.1 += 1;
                }
                let edge = &graph.edges[edges[pos].index()];
                if edge.removed {
                    continue;
                }
                let w = edge.sink.index();
                match index[w] {
                    None => {
                        index[w] = Some(counter);
                        lowlink[w] = counter;
                        counter += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        call.push((w, 0));
                    }
                    Some(w_index) if on_stack[w] => {
                        lowlink[v] = lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            call.pop();
            if let Some(&(parent, _)) = call.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if Some(lowlink[v]) == index[v] {
                let mut nodes = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    nodes.push(TimingNodeId::new(w));
                    if w == v {
                        break;
                    }
                }
                components.push(Scc { nodes });
            }
        }
    }
    components
}

impl TimingGraph {
    /// Removes one edge per non-trivial component, repeating until the graph
    /// is acyclic. Self loops are dropped as well. Returns the number of
    /// edges cut.
    pub fn cut_comb_loops(&mut self) -> usize {
        let mut cut = 0;

        let self_loops: Vec<TimingEdgeId> = self
            .edges
            .iter()
            .filter(|e| !e.removed && e.source == e.sink)
            .map(|e| e.id)
            .collect();
        for edge in self_loops {
            self.remove_edge(edge);
            cut += 1;
        }

        let mut pass = 0;
        loop {
            pass += 1;
            let components = strongly_connected_components(self);
            let mut cut_this_pass = 0;
            for scc in components.iter().filter(|c| c.len() > 1) {
                if let Some(edge) = scc.cut_edge(self) {
                    log::debug!(
                        "Cutting loop of {} timing nodes at {:?}",
                        scc.len(),
                        self.edge(edge)
                    );
                    self.remove_edge(edge);
                    cut_this_pass += 1;
                }
            }
            if cut_this_pass == 0 {
                break;
            }
            cut += cut_this_pass;
            log::debug!("Loop cutting pass {}: {} edges removed", pass, cut_this_pass);
        }

        if cut > 0 {
            log::info!("Removed {} timing edges to break combinational loops", cut);
        }
        cut
    }
}
