//! Plugin domain types: declarations, per-pass plans, outcomes.

pub mod declaration;
pub mod plan;

pub use declaration::*;
pub use plan::*;
