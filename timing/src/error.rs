use sll_common::db::indices::PinId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimingError {
    /// A routed connection must map onto exactly one timing edge.
    #[error("connection sink {pin:?} has {edges} incoming timing edges, expected 1")]
    InconsistentConnectionEdge { pin: PinId, edges: usize },

    #[error("timing graph still has {remaining} nodes on cycles after loop cutting")]
    CyclicGraph { remaining: usize },
}

pub type Result<T> = std::result::Result<T, TimingError>;
