//! Clasp Prelude
//!
//! This crate re-exports the most frequently used public items from the Clasp
//! crates (`clasp-core` and `clasp-rete`). Applications embedding the runtime
//! can depend on `clasp-prelude` to avoid long import lists and to stay
//! insulated from internal module reshuffles.
//!
//! ```rust
//! use clasp_prelude::*;
//!
//! let env = Environment::new();
//! env.assert_ordered("point", vec![env.integer(1), env.integer(2)]).unwrap();
//!
//! let origin_x = PatternBuilder::new("point").field(Constraint::variable("x")).field(Constraint::Wildcard);
//! let tokens = env.query(&origin_x).unwrap();
//! assert_eq!(to_integer(tokens[0].bindings.get("x").unwrap()).unwrap(), 1);
//! ```

#![deny(missing_docs)]

// Values and interning ------------------------------------------------------------------------

pub use clasp_core::{
    ExternalAddress, Multifield, SymbolTable, TypeSet, Value, ValueCell, ValueKind,
    hash_node::{to_double, to_external_address, to_integer, to_pointer, to_string},
};

// Templates and facts -------------------------------------------------------------------------

pub use clasp_core::{
    ClaspError, ClaspResult, Deftemplate, EngineConfig, FactId, FactRef, SlotDefinition,
    TemplateBuilder,
};

// Matching and the environment ----------------------------------------------------------------

pub use clasp_rete::{
    Constraint, Environment, FactChange, LoggingConfig, MatchEvent, MatchSource, PatternBuilder,
    PatternId, Token, init_tracing,
};
