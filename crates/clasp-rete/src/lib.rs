//! Incremental pattern matching for the Clasp fact runtime.
//!
//! Patterns are compiled against deftemplates, kept up to date in alpha
//! memories as facts come and go, and combined by a left-deep join network.
//! [`Environment`] bundles a fact store, the matcher and an interning table
//! behind one lock.

#![deny(warnings)]

pub mod alpha_memory;
pub mod beta_network;
pub mod engine;
pub mod logging;
pub mod nodes;
pub mod pattern;
pub mod rete_network;

pub use alpha_memory::{AlphaIndex, AlphaKey, AlphaMemory, AlphaMemoryStats};
pub use beta_network::JoinNode;
pub use engine::{Environment, EnvironmentStats, FactChange, Snapshot};
pub use logging::{LogFormat, LoggingConfig, init_tracing};
pub use nodes::*;
pub use pattern::{Bindings, Constraint, Pattern, PatternBuilder, SlotKey};
pub use rete_network::{NetworkStats, ReteNetwork};
