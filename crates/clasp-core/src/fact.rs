//! Asserted facts and counted fact references

use crate::error::{ClaspError, ClaspResult};
use crate::multifield::Multifield;
use crate::template::Deftemplate;
use crate::value::Value;
use chrono::{DateTime, Utc};
use clasp_types::FactId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// An immutable fact: a template instance with one value per slot
///
/// Implied facts store their ordered fields as a single multifield in
/// `slots[0]`.
#[derive(Debug)]
pub struct Fact {
    id: FactId,
    template: Arc<Deftemplate>,
    slots: Vec<Value>,
    asserted_at: DateTime<Utc>,
}

impl Fact {
    pub(crate) fn new(id: FactId, template: Arc<Deftemplate>, slots: Vec<Value>) -> Self {
        Self { id, template, slots, asserted_at: Utc::now() }
    }

    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn template(&self) -> &Arc<Deftemplate> {
        &self.template
    }

    pub fn is_implied(&self) -> bool {
        self.template.is_implied()
    }

    pub fn asserted_at(&self) -> DateTime<Utc> {
        self.asserted_at
    }

    /// Slot values in template order
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    /// Value of a named slot
    ///
    /// Implied facts have no named slots, so this always fails for them.
    pub fn slot(&self, name: &str) -> ClaspResult<&Value> {
        if self.is_implied() {
            return Err(ClaspError::unknown_slot(self.template.name(), name));
        }
        self.template
            .slot_index(name)
            .and_then(|index| self.slots.get(index))
            .ok_or_else(|| ClaspError::unknown_slot(self.template.name(), name))
    }

    /// Ordered fields of an implied fact
    pub fn ordered_fields(&self) -> Option<&Multifield> {
        if self.is_implied() { self.slots.first().and_then(Value::as_multifield) } else { None }
    }

    /// `(name, value)` pairs of a named-slot fact
    pub fn named_slots(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.template.slot_names().zip(self.slots.iter())
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.template.name())?;
        if let Some(fields) = self.ordered_fields() {
            for field in fields.iter() {
                write!(f, " {field}")?;
            }
            return f.write_str(")");
        }
        for (name, value) in self.named_slots() {
            match value {
                Value::Multifield(mf) => {
                    write!(f, " ({name}")?;
                    for field in mf.iter() {
                        write!(f, " {field}")?;
                    }
                    f.write_str(")")?;
                }
                single => write!(f, " ({name} {single})")?,
            }
        }
        f.write_str(")")
    }
}

/// Counted handle to an asserted fact
///
/// Equality and hashing use the fact id. A handle keeps the fact readable
/// after it is retracted from the store.
#[derive(Clone)]
pub struct FactRef(Arc<Fact>);

impl FactRef {
    pub(crate) fn new(fact: Fact) -> Self {
        Self(Arc::new(fact))
    }

    /// Number of live handles, the store's own included while asserted
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }
}

impl Deref for FactRef {
    type Target = Fact;

    fn deref(&self) -> &Fact {
        &self.0
    }
}

impl PartialEq for FactRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for FactRef {}

impl Hash for FactRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for FactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Fact-{}>", self.0.id)
    }
}

impl fmt::Display for FactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
