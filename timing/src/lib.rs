//! Static timing graph for the multi-die router: construction from the
//! placed circuit, combinational loop cutting and clock-domain aware
//! criticality analysis.

pub mod analysis;
pub mod build;
pub mod error;
pub mod graph;
pub mod scc;

pub use analysis::{TimingSummary, criticality_from_slack};
pub use error::{Result, TimingError};
pub use graph::{DomainPair, Position, TimingEdge, TimingGraph, TimingNet, TimingNode};
