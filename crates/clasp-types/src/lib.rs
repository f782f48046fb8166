//! Clasp Types
//!
//! This crate defines the small, dependency-light tags shared across the Clasp
//! workspace (currently `clasp-core` and `clasp-rete`): the seven value kinds,
//! slot type constraints and the identifier aliases for facts and templates.
//! Keeping them here lets the value model and the matcher agree on kind codes
//! without depending on each other.

#![deny(warnings)]
#![deny(missing_docs)]

mod types;
pub use types::{FactId, TemplateId, TypeSet, ValueKind};
