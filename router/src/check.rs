//! Post-route verification: connectivity, capacity, pin sharing and OPIN
//! locking, each checked in parallel over the routed design.

use crate::connection_router::ConnectionRouter;
use rayon::prelude::*;
use sll_common::db::rrg::RouteNodeType;
use std::collections::HashSet;

pub fn run(router: &ConnectionRouter) -> Result<(), String> {
    log::info!("Starting Routing Verification...");

    let ((paths, capacity), (sharing, opins)) = rayon::join(
        || rayon::join(|| check_paths(router), || check_capacity(router)),
        || rayon::join(|| check_pin_sharing(router), || check_fixed_opins(router)),
    );

    let mut msgs = Vec::new();
    for (result, pass) in [
        (paths, "All connections are connected source to sink."),
        (capacity, "No route node exceeds its capacity."),
        (sharing, "No pin is shared by two nets."),
        (opins, "Every fixed net leaves through its OPIN."),
    ] {
        match result {
            Ok(()) => log::info!("\x1b[32mPASS\x1b[0m: {}", pass),
            Err(e) => {
                log::error!("\x1b[31mFAIL\x1b[0m: {}", e);
                msgs.push(e);
            }
        }
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: VALID ROUTING");
        Ok(())
    } else {
        log::error!("\x1b[31mFAILURE\x1b[0m: INVALID ROUTING ({} Errors)", msgs.len());
        Err(msgs.join("; "))
    }
}

/// Each stored path starts at the source, ends at the sink and follows
/// graph edges.
fn check_paths(router: &ConnectionRouter) -> Result<(), String> {
    let rrg = router.rrg();
    let broken = router
        .netlist()
        .connections
        .par_iter()
        .filter(|c| {
            let nodes = &c.route_nodes;
            nodes.first() != Some(&c.source_node)
                || nodes.last() != Some(&c.sink_node)
                || nodes
                    .windows(2)
                    .any(|w| !rrg.node(w[0]).children.contains(&w[1]))
        })
        .count();
    if broken == 0 {
        Ok(())
    } else {
        Err(format!("{} connections have a broken path", broken))
    }
}

fn check_capacity(router: &ConnectionRouter) -> Result<(), String> {
    let rrg = router.rrg();
    let overused = rrg
        .nodes()
        .par_iter()
        .filter(|n| router.state().get(n.id).occupation() > n.capacity)
        .count();
    if overused == 0 {
        Ok(())
    } else {
        Err(format!("{} route nodes are overused", overused))
    }
}

fn check_pin_sharing(router: &ConnectionRouter) -> Result<(), String> {
    let rrg = router.rrg();
    let shared = rrg
        .nodes()
        .par_iter()
        .filter(|n| n.kind.is_pin() && router.state().illegal(rrg, n.id))
        .count();
    if shared == 0 {
        Ok(())
    } else {
        Err(format!("{} pins are used by more than one net", shared))
    }
}

fn check_fixed_opins(router: &ConnectionRouter) -> Result<(), String> {
    let rrg = router.rrg();
    let netlist = router.netlist();
    let bad = netlist
        .nets
        .par_iter()
        .filter(|net| {
            let Some(fixed) = net.fixed_opin else {
                return false;
            };
            let used: HashSet<_> = net
                .connections
                .iter()
                .flat_map(|&c| netlist.connection(c).route_nodes.iter().copied())
                .filter(|&n| rrg.node(n).kind == RouteNodeType::Opin)
                .collect();
            used.len() != 1 || !used.contains(&fixed)
        })
        .count();
    if bad == 0 {
        Ok(())
    } else {
        Err(format!("{} nets use an OPIN other than their fixed one", bad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_router::tests::fanout_fixture;
    use crate::connection_router::{ConnectionRouter, RouteParams};
    use sll_common::db::circuit::Circuit;

    #[test]
    fn routed_fanout_passes() {
        let (f, _) = fanout_fixture();
        let mut router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let params = RouteParams {
            timing_driven: false,
            ..RouteParams::default()
        };
        router.route(&mut Circuit::new(1), &params).unwrap();
        assert!(run(&router).is_ok());
    }

    #[test]
    fn unrouted_connections_fail() {
        let (f, _) = fanout_fixture();
        let router = ConnectionRouter::new(&f.rrg, f.netlist, None);
        let err = run(&router).unwrap_err();
        assert!(err.contains("2 connections have a broken path"));
    }
}
