#![deny(warnings)]
#![allow(missing_docs)]
//! Core value model for the Clasp production-rule runtime.
//!
//! This crate provides typed value cells, the interning table that
//! deduplicates symbols, strings and numbers, fixed-length multifields,
//! deftemplates, and the fact store that owns asserted facts. Pattern
//! matching over the store lives in `clasp-rete`.

/// Engine configuration loaded from code, YAML or the environment
pub mod config;
/// Error types shared by every runtime operation
pub mod error;
/// Asserted facts and counted fact references
pub mod fact;
/// Template registry and fact storage
pub mod fact_store;
/// Kind-checked extraction from values
pub mod hash_node;
/// Fixed-length, copy-on-write value sequences
pub mod multifield;
/// Interning table for scalar values
pub mod symbol_table;
/// Deftemplates and slot constraints
pub mod template;
/// Runtime values and the typed value cell
pub mod value;

pub use clasp_types::{FactId, TemplateId, TypeSet, ValueKind};
pub use config::EngineConfig;
pub use error::{ClaspError, ClaspResult};
pub use fact::{Fact, FactRef};
pub use fact_store::{Assertion, FactStore, FactStoreStats, FactValues};
pub use multifield::Multifield;
pub use symbol_table::{
    FloatRef, HashNode, IntegerRef, Interned, SymbolRef, SymbolTable, SymbolTableStats,
};
pub use template::{Cardinality, Deftemplate, NumericRange, SlotDefault, SlotDefinition, TemplateBuilder};
pub use value::{ExternalAddress, Value, ValueCell};
