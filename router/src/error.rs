use sll_common::db::indices::{ConnectionId, DieId, RouteNodeId};
use sll_timing::TimingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// The search exhausted every admissible node without reaching the sink.
    #[error("connection {connection:?} is unroutable from {source_node:?} to {sink_node:?}")]
    Unroutable {
        connection: ConnectionId,
        source_node: RouteNodeId,
        sink_node: RouteNodeId,
    },

    #[error("net '{net}' cannot cross dies: {reason}")]
    SllCrossing { net: String, reason: String },

    #[error("pin {pin} at {die:?} ({x}, {y}) class {class} has no route node")]
    MissingRouteNode {
        pin: String,
        die: DieId,
        x: u32,
        y: u32,
        class: u32,
    },

    #[error("pin {0} does not belong to a placed block")]
    Unplaced(String),

    #[error(transparent)]
    Timing(#[from] TimingError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
