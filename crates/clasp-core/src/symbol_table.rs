//! Interning table for symbols, strings, integers and floats
//!
//! Every scalar that enters the runtime is deduplicated into a canonical
//! [`HashNode`]. Handles ([`Interned`]) compare and hash by node identity, so
//! two handles of the same kind are equal exactly when they point at the same
//! node, and the table guarantees that equal raw values always resolve to the
//! same live node.
//!
//! ## Ownership
//!
//! ```text
//! ValueCell ──Arc──▶ HashNode ◀──Weak── SymbolTable map entry
//! ```
//!
//! The reference count of a node is the strong count of its `Arc`: cells and
//! fact slots own handles, the table only keeps weak entries. A node is freed
//! as soon as its last handle drops; the dead map entry is swept by
//! [`SymbolTable::purge`], which runs automatically every
//! `symbol_purge_threshold` interning calls.

use crate::config::EngineConfig;
use crate::error::{ClaspError, ClaspResult};
use crate::multifield::Multifield;
use crate::value::Value;
use ahash::RandomState;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Canonical record for one interned scalar
#[derive(Debug)]
pub struct HashNode<T> {
    value: T,
}

impl<T> HashNode<T> {
    /// The raw value held by this node
    pub fn value(&self) -> &T {
        &self.value
    }
}

/// Shared handle to a hash node, compared by identity
pub struct Interned<T>(Arc<HashNode<T>>);

/// Handle to an interned symbol or string
pub type SymbolRef = Interned<Box<str>>;
/// Handle to an interned integer
pub type IntegerRef = Interned<i64>;
/// Handle to an interned float
pub type FloatRef = Interned<f64>;

impl<T> Interned<T> {
    /// The raw value held by the node
    pub fn value(&self) -> &T {
        &self.0.value
    }

    /// Number of live handles to the node
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Identity pointer of the node
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }
}

impl SymbolRef {
    /// The interned text
    pub fn as_str(&self) -> &str {
        self.value()
    }
}

impl<T> Clone for Interned<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Interned<T> {}

impl<T> Hash for Interned<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interned({:?})", self.value())
    }
}

type NodeMap<K, T> = DashMap<K, Weak<HashNode<T>>, RandomState>;

/// Entry counts of the interning table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SymbolTableStats {
    pub symbols: usize,
    pub strings: usize,
    pub integers: usize,
    pub floats: usize,
    /// Entries whose node has already been freed and awaits a purge
    pub dead_entries: usize,
}

impl SymbolTableStats {
    /// Live nodes across all four maps
    pub fn live_nodes(&self) -> usize {
        self.symbols + self.strings + self.integers + self.floats
    }
}

/// Deduplicating store of scalar hash nodes, safe for concurrent use
pub struct SymbolTable {
    symbols: NodeMap<Box<str>, Box<str>>,
    strings: NodeMap<Box<str>, Box<str>>,
    integers: NodeMap<i64, i64>,
    floats: NodeMap<u64, f64>,
    purge_threshold: usize,
    since_purge: AtomicUsize,
}

impl SymbolTable {
    /// Create an empty table with the default purge threshold
    pub fn new() -> Self {
        Self::with_purge_threshold(EngineConfig::default().symbol_purge_threshold)
    }

    /// Create an empty table from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_purge_threshold(config.symbol_purge_threshold)
    }

    /// Create an empty table that sweeps dead entries every `threshold` calls
    pub fn with_purge_threshold(threshold: usize) -> Self {
        Self {
            symbols: DashMap::with_hasher(RandomState::new()),
            strings: DashMap::with_hasher(RandomState::new()),
            integers: DashMap::with_hasher(RandomState::new()),
            floats: DashMap::with_hasher(RandomState::new()),
            purge_threshold: threshold.max(1),
            since_purge: AtomicUsize::new(0),
        }
    }

    /// Intern a symbol
    pub fn intern_symbol(&self, text: &str) -> SymbolRef {
        let node = intern_lexeme(&self.symbols, text);
        self.note_intern();
        node
    }

    /// Intern a string. Strings and symbols with equal text are distinct nodes.
    pub fn intern_string(&self, text: &str) -> SymbolRef {
        let node = intern_lexeme(&self.strings, text);
        self.note_intern();
        node
    }

    /// Intern an integer
    pub fn intern_integer(&self, value: i64) -> IntegerRef {
        let node = intern_in(&self.integers, value, || value);
        self.note_intern();
        node
    }

    /// Intern a float, keyed by its bit pattern (so `0.0` and `-0.0` differ)
    pub fn intern_float(&self, value: f64) -> FloatRef {
        let node = intern_in(&self.floats, value.to_bits(), || value);
        self.note_intern();
        node
    }

    /// The `nil` symbol
    pub fn nil(&self) -> SymbolRef {
        self.intern_symbol("nil")
    }

    /// The `TRUE` or `FALSE` symbol
    pub fn boolean(&self, value: bool) -> SymbolRef {
        self.intern_symbol(if value { "TRUE" } else { "FALSE" })
    }

    /// Symbol value
    pub fn symbol(&self, text: &str) -> Value {
        Value::Symbol(self.intern_symbol(text))
    }

    /// String value
    pub fn string(&self, text: &str) -> Value {
        Value::String(self.intern_string(text))
    }

    /// Integer value
    pub fn integer(&self, value: i64) -> Value {
        Value::Integer(self.intern_integer(value))
    }

    /// Float value
    pub fn float(&self, value: f64) -> Value {
        Value::Float(self.intern_float(value))
    }

    /// Convert a host JSON value into a runtime value
    ///
    /// Strings become STRING, booleans the `TRUE`/`FALSE` symbols, null the
    /// `nil` symbol, and arrays flattened multifields. Objects have no
    /// counterpart and are rejected.
    pub fn value_from_json(&self, json: &serde_json::Value) -> ClaspResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Symbol(self.nil())),
            serde_json::Value::Bool(b) => Ok(Value::Symbol(self.boolean(*b))),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(self.integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(self.float(f))
                } else {
                    Err(ClaspError::kind_mismatch("INTEGER or FLOAT", n))
                }
            }
            serde_json::Value::String(s) => Ok(self.string(s)),
            serde_json::Value::Array(items) => {
                let values =
                    items.iter().map(|item| self.value_from_json(item)).collect::<ClaspResult<Vec<_>>>()?;
                Ok(Value::Multifield(Multifield::from_values(values)))
            }
            serde_json::Value::Object(_) => {
                Err(ClaspError::kind_mismatch("single-field or multifield value", "object"))
            }
        }
    }

    /// Remove map entries whose node has been freed, returning how many went
    pub fn purge(&self) -> usize {
        let removed = sweep(&self.symbols)
            + sweep(&self.strings)
            + sweep(&self.integers)
            + sweep(&self.floats);
        if removed > 0 {
            debug!(removed, "Purged dead symbol table entries");
        }
        removed
    }

    /// Count live and dead entries
    pub fn stats(&self) -> SymbolTableStats {
        let (symbols, dead_symbols) = census(&self.symbols);
        let (strings, dead_strings) = census(&self.strings);
        let (integers, dead_integers) = census(&self.integers);
        let (floats, dead_floats) = census(&self.floats);
        SymbolTableStats {
            symbols,
            strings,
            integers,
            floats,
            dead_entries: dead_symbols + dead_strings + dead_integers + dead_floats,
        }
    }

    fn note_intern(&self) {
        let calls = self.since_purge.fetch_add(1, Ordering::Relaxed) + 1;
        if calls >= self.purge_threshold {
            self.since_purge.store(0, Ordering::Relaxed);
            self.purge();
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("stats", &self.stats())
            .field("purge_threshold", &self.purge_threshold)
            .finish()
    }
}

fn intern_lexeme(map: &NodeMap<Box<str>, Box<str>>, text: &str) -> SymbolRef {
    // Fast path: shared read lock only
    if let Some(node) = map.get(text).and_then(|entry| entry.upgrade()) {
        return Interned(node);
    }
    intern_in(map, Box::from(text), || Box::from(text))
}

fn intern_in<K, T>(map: &NodeMap<K, T>, key: K, make: impl FnOnce() -> T) -> Interned<T>
where
    K: Eq + Hash,
{
    let mut entry = map.entry(key).or_insert_with(Weak::new);
    if let Some(node) = entry.upgrade() {
        return Interned(node);
    }
    let node = Arc::new(HashNode { value: make() });
    *entry = Arc::downgrade(&node);
    Interned(node)
}

fn sweep<K: Eq + Hash, T>(map: &NodeMap<K, T>) -> usize {
    let mut removed = 0;
    map.retain(|_, node| {
        let live = node.strong_count() > 0;
        if !live {
            removed += 1;
        }
        live
    });
    removed
}

fn census<K: Eq + Hash, T>(map: &NodeMap<K, T>) -> (usize, usize) {
    map.iter().fold((0, 0), |(live, dead), entry| {
        if entry.value().strong_count() > 0 { (live + 1, dead) } else { (live, dead + 1) }
    })
}
