pub mod algo;
pub mod check;
pub mod connection_router;
pub mod error;
pub mod net;
pub mod sll;
pub mod state;

pub use connection_router::{ConnectionRouter, RouteParams, RoutingReport};
pub use error::{Result, RouterError};
pub use net::{Connection, Net, RoutingNetlist};
pub use sll::{SllCrossing, SllNet, SllNetTable};

use sll_common::db::circuit::Circuit;
use sll_common::db::rrg::ResourceGraph;
use sll_common::util::config::Config;
use sll_timing::TimingGraph;

/// Builds the routing netlist and runs the router over it.
pub fn route<'a>(
    circuit: &mut Circuit,
    rrg: &'a ResourceGraph,
    sll_table: &SllNetTable,
    timing: Option<TimingGraph>,
    config: &Config,
) -> Result<(ConnectionRouter<'a>, RoutingReport)> {
    let netlist = RoutingNetlist::build(circuit, rrg, sll_table, timing.as_ref(), config.router.bb_margin)?;
    let params = RouteParams::from_config(&config.router, &config.timing);

    let mut router = ConnectionRouter::new(rrg, netlist, timing);
    let report = router.route(circuit, &params)?;
    Ok((router, report))
}
