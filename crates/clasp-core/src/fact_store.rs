//! Template registry and fact storage
//!
//! The [`FactStore`] owns every registered [`Deftemplate`] and every live
//! [`Fact`]. It is single-threaded; the environment wraps it in a lock.
//!
//! # Identity
//! - Fact ids start at 1 and increase by one per new fact
//! - Ids are never reused, not after retraction and not after [`FactStore::clear`]
//! - With duplication disabled, asserting a fact equal to a live one returns
//!   the existing id and stores nothing
//!
//! # Validation
//! Every slot value is checked against its slot's type, allowed-values, range
//! and cardinality constraints before the store changes. A failed assertion or
//! modification leaves the store exactly as it was.
//!
//! # Usage Example
//! ```rust
//! use clasp_core::{FactStore, SlotDefinition, SymbolTable, TemplateBuilder, ValueKind};
//! use std::sync::Arc;
//!
//! let symbols = Arc::new(SymbolTable::new());
//! let mut store = FactStore::new(Arc::clone(&symbols), false);
//! let person = store
//!     .define_template(
//!         TemplateBuilder::new("person")
//!             .slot(SlotDefinition::single("name").types(ValueKind::String))
//!             .slot(SlotDefinition::single("age").types(ValueKind::Integer)),
//!     )
//!     .unwrap();
//!
//! let fact = store
//!     .assert(&person, vec![("name", symbols.string("Ada")), ("age", symbols.integer(36))])
//!     .unwrap();
//! assert_eq!(fact.fact_id(), 1);
//! assert_eq!(store.get_slot(1, "age").unwrap(), symbols.integer(36));
//! ```

use crate::error::{ClaspError, ClaspResult};
use crate::fact::{Fact, FactRef};
use crate::multifield::Multifield;
use crate::symbol_table::SymbolTable;
use crate::template::{Deftemplate, TemplateBuilder};
use crate::value::Value;
use clasp_types::{FactId, TemplateId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Values supplied for a new fact
#[derive(Debug, Clone)]
pub enum FactValues {
    /// `(slot, value)` pairs for a named-slot template; omitted slots take their default
    Slots(Vec<(String, Value)>),
    /// Ordered fields for an implied template
    Ordered(Multifield),
}

impl From<Vec<(String, Value)>> for FactValues {
    fn from(slots: Vec<(String, Value)>) -> Self {
        FactValues::Slots(slots)
    }
}

impl From<Vec<(&str, Value)>> for FactValues {
    fn from(slots: Vec<(&str, Value)>) -> Self {
        FactValues::Slots(slots.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
    }
}

impl From<Multifield> for FactValues {
    fn from(fields: Multifield) -> Self {
        FactValues::Ordered(fields)
    }
}

impl From<Vec<Value>> for FactValues {
    fn from(fields: Vec<Value>) -> Self {
        FactValues::Ordered(Multifield::from_values(fields))
    }
}

/// Outcome of an assertion
#[derive(Debug, Clone)]
pub enum Assertion {
    /// A new fact was stored
    Created(FactRef),
    /// An equal fact is already live; nothing was stored
    Duplicate(FactId),
}

impl Assertion {
    /// Id of the new fact, or of the live duplicate
    pub fn fact_id(&self) -> FactId {
        match self {
            Assertion::Created(fact) => fact.id(),
            Assertion::Duplicate(id) => *id,
        }
    }

    /// The new fact, if one was stored
    pub fn created(&self) -> Option<&FactRef> {
        match self {
            Assertion::Created(fact) => Some(fact),
            Assertion::Duplicate(_) => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Assertion::Duplicate(_))
    }
}

/// Counters kept by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactStoreStats {
    pub facts: usize,
    pub templates: usize,
    pub asserted: u64,
    pub retracted: u64,
    pub duplicates_suppressed: u64,
    pub next_fact_id: FactId,
}

type FactKey = (TemplateId, Vec<Value>);

/// Registry of templates and live facts
pub struct FactStore {
    symbols: Arc<SymbolTable>,
    templates: BTreeMap<TemplateId, Arc<Deftemplate>>,
    template_names: HashMap<String, TemplateId>,
    next_template_id: TemplateId,
    facts: BTreeMap<FactId, FactRef>,
    template_fact_counts: HashMap<TemplateId, usize>,
    live_keys: HashMap<FactKey, FactId>,
    next_fact_id: FactId,
    fact_duplication: bool,
    asserted: u64,
    retracted: u64,
    duplicates_suppressed: u64,
}

impl FactStore {
    /// Create an empty store interning through `symbols`
    pub fn new(symbols: Arc<SymbolTable>, fact_duplication: bool) -> Self {
        Self {
            symbols,
            templates: BTreeMap::new(),
            template_names: HashMap::new(),
            next_template_id: 1,
            facts: BTreeMap::new(),
            template_fact_counts: HashMap::new(),
            live_keys: HashMap::new(),
            next_fact_id: 1,
            fact_duplication,
            asserted: 0,
            retracted: 0,
            duplicates_suppressed: 0,
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Register a named-slot template
    #[instrument(skip(self, builder), fields(template = %builder.name()))]
    pub fn define_template(&mut self, builder: TemplateBuilder) -> ClaspResult<Arc<Deftemplate>> {
        if self.template_names.contains_key(builder.name()) {
            return Err(ClaspError::DuplicateTemplate { name: builder.name().to_string() });
        }
        let template = Arc::new(builder.build(self.next_template_id, &self.symbols)?);
        self.register(Arc::clone(&template));
        debug!(template_id = template.id(), slots = template.slots().len(), "Template defined");
        Ok(template)
    }

    /// Implied template for `name`, created on first use
    pub fn implied_template(&mut self, name: &str) -> ClaspResult<Arc<Deftemplate>> {
        if let Some(existing) = self.lookup(name) {
            if existing.is_implied() {
                return Ok(existing);
            }
            return Err(ClaspError::invalid_template(name, "already defined with named slots"));
        }
        let template = Arc::new(Deftemplate::implied(self.next_template_id, name)?);
        self.register(Arc::clone(&template));
        debug!(template = name, template_id = template.id(), "Implied template created");
        Ok(template)
    }

    pub fn find_template(&self, name: &str) -> ClaspResult<Arc<Deftemplate>> {
        self.lookup(name).ok_or_else(|| ClaspError::UnknownTemplate { name: name.to_string() })
    }

    pub fn is_implied(&self, name: &str) -> ClaspResult<bool> {
        Ok(self.find_template(name)?.is_implied())
    }

    /// Registered templates in definition order
    pub fn templates(&self) -> impl Iterator<Item = &Arc<Deftemplate>> {
        self.templates.values()
    }

    /// Remove a template that no live fact uses
    pub fn undefine_template(&mut self, name: &str) -> ClaspResult<Arc<Deftemplate>> {
        let template = self.find_template(name)?;
        let facts = self.template_fact_count(template.id());
        if facts > 0 {
            return Err(ClaspError::TemplateInUse { name: name.to_string(), facts, patterns: 0 });
        }
        self.templates.remove(&template.id());
        self.template_names.remove(name);
        debug!(template = name, "Template undefined");
        Ok(template)
    }

    /// Number of live facts of a template
    pub fn template_fact_count(&self, template: TemplateId) -> usize {
        self.template_fact_counts.get(&template).copied().unwrap_or(0)
    }

    /// Assert a fact of `template`
    ///
    /// Named-slot templates take [`FactValues::Slots`]; slots left out get
    /// their default, and a slot without one is an error. Implied templates
    /// take [`FactValues::Ordered`] with every field set.
    #[instrument(skip(self, template, values), fields(template = %template.name()))]
    pub fn assert(
        &mut self,
        template: &Arc<Deftemplate>,
        values: impl Into<FactValues>,
    ) -> ClaspResult<Assertion> {
        let template = self.registered(template)?;
        let slots = self.prepare_slots(&template, values.into())?;
        Ok(self.insert_prepared(template, slots))
    }

    /// Remove a live fact, returning it
    #[instrument(skip(self))]
    pub fn retract(&mut self, fact_id: FactId) -> ClaspResult<FactRef> {
        let fact = self.facts.remove(&fact_id).ok_or(ClaspError::UnknownFact { fact_id })?;
        if !self.fact_duplication {
            self.live_keys.remove(&(fact.template().id(), fact.slots().to_vec()));
        }
        let template_id = fact.template().id();
        if let Some(count) = self.template_fact_counts.get_mut(&template_id) {
            *count -= 1;
            if *count == 0 {
                self.template_fact_counts.remove(&template_id);
            }
        }
        self.retracted += 1;
        debug!(fact_id, "Fact retracted");
        Ok(fact)
    }

    /// Replace slot values of a named-slot fact
    ///
    /// The old fact is retracted and a new one asserted with a fresh id. The
    /// updates are validated first; on error nothing changes. Returns the
    /// retracted fact and the outcome of the new assertion.
    #[instrument(skip(self, updates))]
    pub fn modify(
        &mut self,
        fact_id: FactId,
        updates: Vec<(String, Value)>,
    ) -> ClaspResult<(FactRef, Assertion)> {
        let old = self.get_fact(fact_id)?;
        let template = Arc::clone(old.template());
        if template.is_implied() {
            let slot = updates.first().map_or("", |(name, _)| name.as_str());
            return Err(ClaspError::unknown_slot(template.name(), slot));
        }

        let mut values: Vec<(String, Value)> = old
            .named_slots()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let mut updated = vec![false; values.len()];
        for (slot, value) in updates {
            let index = template
                .slot_index(&slot)
                .ok_or_else(|| ClaspError::unknown_slot(template.name(), &slot))?;
            if std::mem::replace(&mut updated[index], true) {
                return Err(ClaspError::slot_value(template.name(), &slot, "assigned more than once"));
            }
            values[index].1 = value;
        }
        let slots = self.prepare_slots(&template, FactValues::Slots(values))?;

        self.retract(fact_id)?;
        let assertion = self.insert_prepared(template, slots);
        debug!(old_id = fact_id, new_id = assertion.fact_id(), "Fact modified");
        Ok((old, assertion))
    }

    /// Value of a named slot of a live fact
    pub fn get_slot(&self, fact_id: FactId, slot: &str) -> ClaspResult<Value> {
        let fact = self.facts.get(&fact_id).ok_or(ClaspError::UnknownFact { fact_id })?;
        fact.slot(slot).cloned()
    }

    pub fn get_fact(&self, fact_id: FactId) -> ClaspResult<FactRef> {
        self.facts.get(&fact_id).cloned().ok_or(ClaspError::UnknownFact { fact_id })
    }

    pub fn contains(&self, fact_id: FactId) -> bool {
        self.facts.contains_key(&fact_id)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Live fact ids in ascending order
    pub fn fact_ids(&self) -> Vec<FactId> {
        self.facts.keys().copied().collect()
    }

    /// Live facts in ascending id order
    pub fn facts(&self) -> impl Iterator<Item = &FactRef> {
        self.facts.values()
    }

    /// Retract every fact, returning them in id order. Templates stay defined
    /// and the id counter keeps counting.
    pub fn clear(&mut self) -> Vec<FactRef> {
        let facts: Vec<FactRef> = std::mem::take(&mut self.facts).into_values().collect();
        self.live_keys.clear();
        self.template_fact_counts.clear();
        self.retracted += facts.len() as u64;
        debug!(cleared = facts.len(), "Fact store cleared");
        facts
    }

    pub fn stats(&self) -> FactStoreStats {
        FactStoreStats {
            facts: self.facts.len(),
            templates: self.templates.len(),
            asserted: self.asserted,
            retracted: self.retracted,
            duplicates_suppressed: self.duplicates_suppressed,
            next_fact_id: self.next_fact_id,
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<Deftemplate>> {
        self.template_names.get(name).and_then(|id| self.templates.get(id)).cloned()
    }

    fn register(&mut self, template: Arc<Deftemplate>) {
        self.next_template_id += 1;
        self.template_names.insert(template.name().to_string(), template.id());
        self.templates.insert(template.id(), template);
    }

    fn registered(&self, template: &Arc<Deftemplate>) -> ClaspResult<Arc<Deftemplate>> {
        self.templates
            .get(&template.id())
            .filter(|current| Arc::ptr_eq(current, template))
            .cloned()
            .ok_or_else(|| ClaspError::UnknownTemplate { name: template.name().to_string() })
    }

    fn prepare_slots(&self, template: &Deftemplate, values: FactValues) -> ClaspResult<Vec<Value>> {
        let name = template.name();
        match (template.is_implied(), values) {
            (true, FactValues::Ordered(fields)) => {
                if let Some(position) = fields.cells().iter().position(|cell| !cell.is_set()) {
                    return Err(ClaspError::invalid_template(
                        name,
                        format!("ordered field {} is unset", position + 1),
                    ));
                }
                Ok(vec![Value::Multifield(fields)])
            }
            (true, FactValues::Slots(slots)) => match slots.first() {
                Some((slot, _)) => Err(ClaspError::unknown_slot(name, slot)),
                None => Ok(vec![Value::Multifield(Multifield::empty())]),
            },
            (false, FactValues::Ordered(_)) => {
                Err(ClaspError::invalid_template(name, "named-slot template given ordered fields"))
            }
            (false, FactValues::Slots(given)) => {
                let mut assigned: Vec<Option<Value>> = vec![None; template.slots().len()];
                for (slot, value) in given {
                    let index =
                        template.slot_index(&slot).ok_or_else(|| ClaspError::unknown_slot(name, &slot))?;
                    if assigned[index].replace(value).is_some() {
                        return Err(ClaspError::slot_value(name, &slot, "assigned more than once"));
                    }
                }
                template
                    .slots()
                    .iter()
                    .zip(assigned)
                    .map(|(definition, value)| {
                        let value = match value {
                            Some(value) => value,
                            None => definition.derive_default(&self.symbols).ok_or_else(|| {
                                ClaspError::slot_value(name, definition.name(), "a value is required")
                            })?,
                        };
                        definition.validate(name, &value)?;
                        Ok(value)
                    })
                    .collect()
            }
        }
    }

    fn insert_prepared(&mut self, template: Arc<Deftemplate>, slots: Vec<Value>) -> Assertion {
        let key = if self.fact_duplication {
            None
        } else {
            let key = (template.id(), slots.clone());
            if let Some(&existing) = self.live_keys.get(&key) {
                self.duplicates_suppressed += 1;
                debug!(fact_id = existing, "Duplicate fact not asserted");
                return Assertion::Duplicate(existing);
            }
            Some(key)
        };

        let fact_id = self.next_fact_id;
        self.next_fact_id += 1;
        if let Some(key) = key {
            self.live_keys.insert(key, fact_id);
        }
        *self.template_fact_counts.entry(template.id()).or_default() += 1;

        let fact = FactRef::new(Fact::new(fact_id, template, slots));
        self.facts.insert(fact_id, fact.clone());
        self.asserted += 1;
        debug!(fact_id, "Fact asserted");
        Assertion::Created(fact)
    }
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore").field("stats", &self.stats()).finish()
    }
}
