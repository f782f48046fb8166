//! Runtime values and the typed value cell
//!
//! [`Value`] is the tagged payload: one variant per [`ValueKind`], each owning
//! a counted handle to its underlying object. [`ValueCell`] is the mutable
//! slot that multifields are made of: a kind tag, an optional payload and,
//! for multifields, the inclusive zero-based range of the payload it views.

use crate::error::{ClaspError, ClaspResult};
use crate::fact::FactRef;
use crate::multifield::Multifield;
use crate::symbol_table::{FloatRef, IntegerRef, SymbolRef};
use clasp_types::ValueKind;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque host object, compared by identity
#[derive(Clone)]
pub struct ExternalAddress(Arc<dyn Any + Send + Sync>);

impl ExternalAddress {
    /// Wrap a host object
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Wrap an already shared host object without copying it
    pub fn from_arc(object: Arc<dyn Any + Send + Sync>) -> Self {
        Self(object)
    }

    /// Borrow the host object as `T`, if that is its type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).downcast_ref::<T>()
    }

    /// Identity pointer of the host object
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }

    /// Number of live handles to the host object
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for ExternalAddress {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.as_ptr(), other.as_ptr())
    }
}

impl Eq for ExternalAddress {}

impl Hash for ExternalAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state);
    }
}

impl fmt::Debug for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Pointer-{:p}>", self.as_ptr())
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A runtime value. Scalars are interned, so equality is node identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Float(FloatRef),
    Integer(IntegerRef),
    Symbol(SymbolRef),
    String(SymbolRef),
    Multifield(Multifield),
    ExternalAddress(ExternalAddress),
    FactAddress(FactRef),
}

impl Value {
    /// Kind tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Integer(_) => ValueKind::Integer,
            Value::Symbol(_) => ValueKind::Symbol,
            Value::String(_) => ValueKind::String,
            Value::Multifield(_) => ValueKind::Multifield,
            Value::ExternalAddress(_) => ValueKind::ExternalAddress,
            Value::FactAddress(_) => ValueKind::FactAddress,
        }
    }

    /// Text of a symbol or string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) | Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i.value()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f.value()),
            _ => None,
        }
    }

    /// Integer or float widened to `f64`, for range checks
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f.value()),
            Value::Integer(i) => Some(*i.value() as f64),
            _ => None,
        }
    }

    pub fn as_multifield(&self) -> Option<&Multifield> {
        match self {
            Value::Multifield(mf) => Some(mf),
            _ => None,
        }
    }

    pub fn as_external_address(&self) -> Option<&ExternalAddress> {
        match self {
            Value::ExternalAddress(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_fact(&self) -> Option<&FactRef> {
        match self {
            Value::FactAddress(fact) => Some(fact),
            _ => None,
        }
    }

    /// Whether this is the symbol `name`
    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Value::Symbol(s) if s.as_str() == name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(n) => write!(f, "{:?}", n.value()),
            Value::Integer(n) => write!(f, "{}", n.value()),
            Value::Symbol(s) => f.write_str(s.as_str()),
            Value::String(s) => {
                f.write_str("\"")?;
                for c in s.as_str().chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Value::Multifield(mf) => write!(f, "{mf}"),
            Value::ExternalAddress(address) => write!(f, "{address}"),
            Value::FactAddress(fact) => write!(f, "{fact}"),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Float(n) => serde_json::Number::from_f64(*n.value())
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Integer(n) => serde_json::Value::from(*n.value()),
            Value::Symbol(s) => match s.as_str() {
                "TRUE" => serde_json::Value::Bool(true),
                "FALSE" => serde_json::Value::Bool(false),
                "nil" => serde_json::Value::Null,
                other => serde_json::Value::String(other.to_string()),
            },
            Value::String(s) => serde_json::Value::String(s.as_str().to_string()),
            Value::Multifield(mf) => serde_json::Value::Array(
                mf.cells()
                    .iter()
                    .map(|cell| cell.get_value().map_or(serde_json::Value::Null, Into::into))
                    .collect(),
            ),
            Value::ExternalAddress(address) => serde_json::Value::String(address.to_string()),
            Value::FactAddress(fact) => serde_json::Value::from(fact.id()),
        }
    }
}

/// Mutable typed slot holding at most one value
///
/// The kind always agrees with the payload once one is set. For multifield
/// payloads `begin..=end` selects the visible fields; a fresh or empty
/// multifield reads `0, -1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueCell {
    kind: ValueKind,
    value: Option<Value>,
    begin: i64,
    end: i64,
}

impl Default for ValueCell {
    fn default() -> Self {
        Self::new(ValueKind::Symbol)
    }
}

impl From<Value> for ValueCell {
    fn from(value: Value) -> Self {
        let mut cell = Self::new(value.kind());
        cell.set_value(value);
        cell
    }
}

impl ValueCell {
    /// Empty cell of the given kind
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, value: None, begin: 0, end: -1 }
    }

    pub fn get_type(&self) -> ValueKind {
        self.kind
    }

    /// Set the kind tag, returning the previous one
    ///
    /// Changing the kind drops the payload, since it no longer matches.
    pub fn set_type(&mut self, kind: ValueKind) -> ValueKind {
        let previous = self.kind;
        if kind != previous {
            self.kind = kind;
            self.clear_payload();
        }
        previous
    }

    /// Set the kind tag from a raw type code
    pub fn set_type_code(&mut self, code: i32) -> ClaspResult<ValueKind> {
        let kind = ValueKind::from_code(code).ok_or(ClaspError::InvalidKind { code })?;
        Ok(self.set_type(kind))
    }

    pub fn get_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Store a payload, returning the previous one
    ///
    /// The kind follows the payload. A multifield payload is viewed whole.
    pub fn set_value(&mut self, value: Value) -> Option<Value> {
        self.kind = value.kind();
        (self.begin, self.end) = match &value {
            Value::Multifield(mf) => (0, mf.len() as i64 - 1),
            _ => (0, -1),
        };
        self.value.replace(value)
    }

    /// Remove and return the payload, keeping the kind
    pub fn take_value(&mut self) -> Option<Value> {
        let value = self.value.take();
        self.clear_payload();
        value
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn get_begin(&self) -> ClaspResult<i64> {
        self.multifield()?;
        Ok(self.begin)
    }

    pub fn get_end(&self) -> ClaspResult<i64> {
        self.multifield()?;
        Ok(self.end)
    }

    /// Move the start of the visible range, returning the previous start
    pub fn set_begin(&mut self, begin: i64) -> ClaspResult<i64> {
        let previous = self.get_begin()?;
        self.set_range(begin, self.end)?;
        Ok(previous)
    }

    /// Move the end of the visible range, returning the previous end
    pub fn set_end(&mut self, end: i64) -> ClaspResult<i64> {
        let previous = self.get_end()?;
        self.set_range(self.begin, end)?;
        Ok(previous)
    }

    /// Set both bounds at once
    ///
    /// Both must lie within the payload and `begin <= end`; the empty range
    /// `0, -1` is only valid through [`ValueCell::set_value`].
    pub fn set_range(&mut self, begin: i64, end: i64) -> ClaspResult<()> {
        let length = self.multifield()?.map_or(0, Multifield::len) as i64;
        if begin < 0 || end < 0 {
            return Err(ClaspError::invalid_range(begin, end, "bounds must not be negative"));
        }
        if begin > end {
            return Err(ClaspError::invalid_range(begin, end, "begin is past end"));
        }
        if end >= length {
            return Err(ClaspError::invalid_range(
                begin,
                end,
                format!("end is past the last field (length {length})"),
            ));
        }
        self.begin = begin;
        self.end = end;
        Ok(())
    }

    /// Number of fields in the visible range; zero for non-multifield cells
    pub fn get_length(&self) -> i64 {
        match self.value {
            Some(Value::Multifield(_)) => self.end - self.begin + 1,
            _ => 0,
        }
    }

    /// Cells of the visible range
    pub fn range_cells(&self) -> ClaspResult<&[ValueCell]> {
        let Some(mf) = self.multifield()? else {
            return Ok(&[]);
        };
        if self.end < self.begin {
            return Ok(&[]);
        }
        Ok(&mf.cells()[self.begin as usize..=self.end as usize])
    }

    /// Copy of the visible range as a standalone multifield
    pub fn to_multifield(&self) -> ClaspResult<Multifield> {
        Ok(self
            .range_cells()?
            .iter()
            .filter_map(ValueCell::get_value)
            .cloned()
            .collect())
    }

    fn multifield(&self) -> ClaspResult<Option<&Multifield>> {
        if self.kind != ValueKind::Multifield {
            return Err(ClaspError::kind_mismatch(ValueKind::Multifield.name(), self.kind));
        }
        Ok(self.value.as_ref().and_then(Value::as_multifield))
    }

    fn clear_payload(&mut self) {
        self.value = None;
        self.begin = 0;
        self.end = -1;
    }
}
