//! Hierarchical state machines (statig).

pub mod bridge_sm;
