//! Single-fact patterns and variable bindings
//!
//! A [`Pattern`] tests facts of one template. Named-slot templates are
//! constrained by slot name; implied templates by zero-based field position,
//! and an implied pattern only matches facts with exactly as many fields as it
//! has constraints.

use clasp_core::{ClaspError, ClaspResult, Deftemplate, Fact, Value};
use clasp_types::TemplateId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Test applied to one slot or field
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// The value must equal this one
    Literal(Value),
    /// Bind the value; repeated names must bind equal values
    Variable(Arc<str>),
    /// Any value
    Wildcard,
}

impl Constraint {
    pub fn variable(name: &str) -> Self {
        Constraint::Variable(Arc::from(name.trim_start_matches('?')))
    }
}

impl From<Value> for Constraint {
    fn from(value: Value) -> Self {
        Constraint::Literal(value)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Literal(value) => write!(f, "{value}"),
            Constraint::Variable(name) => write!(f, "?{name}"),
            Constraint::Wildcard => f.write_str("?"),
        }
    }
}

/// Location of a tested value within a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    /// Named slot, by definition index
    Slot(usize),
    /// Ordered field of an implied fact, zero-based
    Field(usize),
}

impl SlotKey {
    /// Value of a fact at this location
    pub fn value_in<'a>(&self, fact: &'a Fact) -> Option<&'a Value> {
        match *self {
            SlotKey::Slot(index) if !fact.is_implied() => fact.slots().get(index),
            SlotKey::Field(index) => fact.ordered_fields().and_then(|fields| fields.get(index)),
            SlotKey::Slot(_) => None,
        }
    }

    /// Every location of a fact with its value
    pub fn locations(fact: &Fact) -> Vec<(SlotKey, &Value)> {
        match fact.ordered_fields() {
            Some(fields) => fields.iter().enumerate().map(|(i, v)| (SlotKey::Field(i), v)).collect(),
            None => fact.slots().iter().enumerate().map(|(i, v)| (SlotKey::Slot(i), v)).collect(),
        }
    }
}

/// Variable bindings of a match, ordered by variable name
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bindings(BTreeMap<Arc<str>, Value>);

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Bind `name` to `value`; false if it is already bound to something else
    pub fn bind(&mut self, name: &Arc<str>, value: &Value) -> bool {
        match self.0.get(name) {
            Some(existing) => existing == value,
            None => {
                self.0.insert(Arc::clone(name), value.clone());
                true
            }
        }
    }

    /// Union of two binding sets, or `None` if a shared variable disagrees
    pub fn merge(&self, other: &Bindings) -> Option<Bindings> {
        let mut merged = self.clone();
        for (name, value) in &other.0 {
            if !merged.bind(name, value) {
                return None;
            }
        }
        Some(merged)
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (position, (name, value)) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "?{name} = {value}")?;
        }
        f.write_str("}")
    }
}

/// Unresolved pattern, named by template
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    template: String,
    slots: Vec<(String, Constraint)>,
    fields: Vec<Constraint>,
}

impl PatternBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), slots: Vec::new(), fields: Vec::new() }
    }

    /// Constrain a named slot
    pub fn slot(mut self, name: impl Into<String>, constraint: impl Into<Constraint>) -> Self {
        self.slots.push((name.into(), constraint.into()));
        self
    }

    /// Constrain the next ordered field
    pub fn field(mut self, constraint: impl Into<Constraint>) -> Self {
        self.fields.push(constraint.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Resolve slot names against `template`
    pub fn compile(&self, template: &Arc<Deftemplate>) -> ClaspResult<Pattern> {
        if template.name() != self.template {
            return Err(ClaspError::invalid_pattern(format!(
                "pattern for '{}' compiled against template '{}'",
                self.template,
                template.name()
            )));
        }

        if template.is_implied() {
            if let Some((slot, _)) = self.slots.first() {
                return Err(ClaspError::unknown_slot(template.name(), slot));
            }
            let tests = self
                .fields
                .iter()
                .enumerate()
                .map(|(position, constraint)| (SlotKey::Field(position), constraint.clone()))
                .collect();
            return Ok(Pattern {
                template: Arc::clone(template),
                tests,
                length: Some(self.fields.len()),
            });
        }

        if !self.fields.is_empty() {
            return Err(ClaspError::invalid_pattern(format!(
                "template '{}' has named slots, not ordered fields",
                template.name()
            )));
        }
        let mut tests: Vec<(SlotKey, Constraint)> = Vec::with_capacity(self.slots.len());
        for (slot, constraint) in &self.slots {
            let index = template
                .slot_index(slot)
                .ok_or_else(|| ClaspError::unknown_slot(template.name(), slot))?;
            if tests.iter().any(|(key, _)| *key == SlotKey::Slot(index)) {
                return Err(ClaspError::invalid_pattern(format!(
                    "slot '{slot}' constrained more than once"
                )));
            }
            tests.push((SlotKey::Slot(index), constraint.clone()));
        }
        tests.sort_by_key(|(key, _)| *key);
        Ok(Pattern { template: Arc::clone(template), tests, length: None })
    }
}

/// Compiled pattern bound to a template
#[derive(Debug, Clone)]
pub struct Pattern {
    template: Arc<Deftemplate>,
    tests: Vec<(SlotKey, Constraint)>,
    length: Option<usize>,
}

impl Pattern {
    pub fn template(&self) -> &Arc<Deftemplate> {
        &self.template
    }

    pub fn template_id(&self) -> TemplateId {
        self.template.id()
    }

    pub fn tests(&self) -> &[(SlotKey, Constraint)] {
        &self.tests
    }

    /// Literal tests, the part of a pattern the index can answer
    pub fn literals(&self) -> impl Iterator<Item = (SlotKey, &Value)> {
        self.tests.iter().filter_map(|(key, constraint)| match constraint {
            Constraint::Literal(value) => Some((*key, value)),
            _ => None,
        })
    }

    pub fn literal_count(&self) -> usize {
        self.literals().count()
    }

    /// Exact field count required of implied facts
    pub fn required_length(&self) -> Option<usize> {
        self.length
    }

    /// Test one fact, returning its bindings on success
    pub fn matches(&self, fact: &Fact) -> Option<Bindings> {
        if !Arc::ptr_eq(fact.template(), &self.template) {
            return None;
        }
        if let Some(length) = self.length {
            if fact.ordered_fields().map_or(0, |fields| fields.len()) != length {
                return None;
            }
        }

        let mut bindings = Bindings::default();
        for (key, constraint) in &self.tests {
            let value = key.value_in(fact)?;
            match constraint {
                Constraint::Literal(expected) if expected != value => return None,
                Constraint::Variable(name) if !bindings.bind(name, value) => return None,
                _ => {}
            }
        }
        Some(bindings)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.template.name())?;
        for (key, constraint) in &self.tests {
            match key {
                SlotKey::Field(_) => write!(f, " {constraint}")?,
                SlotKey::Slot(index) => {
                    let name = self.template.slots().get(*index).map_or("?", |slot| slot.name());
                    write!(f, " ({name} {constraint})")?;
                }
            }
        }
        f.write_str(")")
    }
}
