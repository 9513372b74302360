pub mod circuit;
pub mod indices;
pub mod rrg;
