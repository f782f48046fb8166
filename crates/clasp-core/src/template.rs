//! Deftemplates and slot definitions
//!
//! A template is either a named-slot template built from [`SlotDefinition`]s,
//! or an implied template created on first use of an ordered fact. Implied
//! templates have exactly one anonymous multifield slot and no named slots.

use crate::error::{ClaspError, ClaspResult};
use crate::multifield::Multifield;
use crate::symbol_table::SymbolTable;
use crate::value::Value;
use clasp_types::{TemplateId, TypeSet, ValueKind};
use std::fmt;

/// How a slot obtains its value when an assertion leaves it out
#[derive(Debug, Clone, PartialEq)]
pub enum SlotDefault {
    /// Derived from the slot's constraints
    Derive,
    /// A fixed value
    Static(Value),
    /// No default, the slot must be given
    Required,
}

/// Inclusive numeric bounds; `None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, x: f64) -> bool {
        self.min.is_none_or(|min| x >= min) && self.max.is_none_or(|max| x <= max)
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "{min}")?,
            None => f.write_str("-oo")?,
        }
        f.write_str(" ")?;
        match self.max {
            Some(max) => write!(f, "{max}"),
            None => f.write_str("+oo"),
        }
    }
}

/// Bounds on the number of fields in a multislot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: usize,
    pub max: Option<usize>,
}

impl Cardinality {
    pub fn contains(&self, length: usize) -> bool {
        length >= self.min && self.max.is_none_or(|max| length <= max)
    }
}

/// One named slot of a deftemplate
#[derive(Debug, Clone)]
pub struct SlotDefinition {
    name: String,
    multifield: bool,
    types: TypeSet,
    allowed_values: Vec<Value>,
    range: Option<NumericRange>,
    cardinality: Option<Cardinality>,
    default: SlotDefault,
}

impl SlotDefinition {
    /// Single-field slot accepting any kind
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multifield: false,
            types: TypeSet::ANY,
            allowed_values: Vec::new(),
            range: None,
            cardinality: None,
            default: SlotDefault::Derive,
        }
    }

    /// Multifield slot accepting any single-field kind per field
    pub fn multi(name: impl Into<String>) -> Self {
        Self { multifield: true, ..Self::single(name) }
    }

    /// Restrict field kinds
    pub fn types(mut self, types: impl Into<TypeSet>) -> Self {
        self.types = types.into();
        self
    }

    /// Restrict fields to an enumerated set. The values must be interned in
    /// the environment the template is defined in.
    pub fn allowed_values(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed_values = values.into_iter().collect();
        self
    }

    /// Restrict numeric fields to `min..=max`
    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.range = Some(NumericRange { min, max });
        self
    }

    /// Restrict the field count of a multislot
    pub fn cardinality(mut self, min: usize, max: Option<usize>) -> Self {
        self.cardinality = Some(Cardinality { min, max });
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = SlotDefault::Static(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.default = SlotDefault::Required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multifield(&self) -> bool {
        self.multifield
    }

    /// Kinds a single field of this slot may take
    pub fn field_types(&self) -> TypeSet {
        self.types.iter().filter(|kind| *kind != ValueKind::Multifield).collect()
    }

    pub fn allowed(&self) -> &[Value] {
        &self.allowed_values
    }

    pub fn value_range(&self) -> Option<NumericRange> {
        self.range
    }

    pub fn field_count(&self) -> Option<Cardinality> {
        self.cardinality
    }

    pub fn slot_default(&self) -> &SlotDefault {
        &self.default
    }

    /// Check a value against every constraint of this slot
    pub fn validate(&self, template: &str, value: &Value) -> ClaspResult<()> {
        let field_types = self.field_types();
        if !self.multifield {
            return self.validate_field(template, value, field_types);
        }

        let Value::Multifield(mf) = value else {
            return Err(ClaspError::SlotType {
                template: template.to_string(),
                slot: self.name.clone(),
                expected: TypeSet::of(ValueKind::Multifield),
                actual: value.kind(),
            });
        };
        if let Some(cardinality) = self.cardinality {
            if !cardinality.contains(mf.len()) {
                return Err(ClaspError::slot_value(
                    template,
                    &self.name,
                    format!("{} field(s) outside cardinality {}..{:?}", mf.len(), cardinality.min, cardinality.max),
                ));
            }
        }
        for (position, cell) in mf.cells().iter().enumerate() {
            let Some(field) = cell.get_value() else {
                return Err(ClaspError::slot_value(
                    template,
                    &self.name,
                    format!("field {} is unset", position + 1),
                ));
            };
            self.validate_field(template, field, field_types)?;
        }
        Ok(())
    }

    fn validate_field(&self, template: &str, value: &Value, types: TypeSet) -> ClaspResult<()> {
        if !types.contains(value.kind()) {
            return Err(ClaspError::SlotType {
                template: template.to_string(),
                slot: self.name.clone(),
                expected: types,
                actual: value.kind(),
            });
        }
        if !self.allowed_values.is_empty() && !self.allowed_values.contains(value) {
            return Err(ClaspError::slot_value(
                template,
                &self.name,
                format!("{value} is not an allowed value"),
            ));
        }
        if let (Some(range), Some(x)) = (self.range, value.as_number()) {
            if !range.contains(x) {
                return Err(ClaspError::slot_value(
                    template,
                    &self.name,
                    format!("{value} is outside range {range}"),
                ));
            }
        }
        Ok(())
    }

    /// Value used when an assertion leaves this slot out
    ///
    /// `None` when the slot is required, or when nothing can be derived
    /// because the slot only accepts addresses.
    pub fn derive_default(&self, symbols: &SymbolTable) -> Option<Value> {
        match &self.default {
            SlotDefault::Static(value) => Some(value.clone()),
            SlotDefault::Required => None,
            SlotDefault::Derive if self.multifield => {
                let count = self.cardinality.map_or(0, |c| c.min);
                let fields = (0..count).map(|_| self.derived_field(symbols)).collect::<Option<Vec<_>>>()?;
                Some(Value::Multifield(Multifield::from_values(fields)))
            }
            SlotDefault::Derive => self.derived_field(symbols),
        }
    }

    fn derived_field(&self, symbols: &SymbolTable) -> Option<Value> {
        if let Some(first) = self.allowed_values.first() {
            return Some(first.clone());
        }
        let types = self.field_types();
        let min = self.range.and_then(|r| r.min);
        if types.contains(ValueKind::Symbol) {
            Some(symbols.symbol("nil"))
        } else if types.contains(ValueKind::String) {
            Some(symbols.string(""))
        } else if types.contains(ValueKind::Integer) {
            Some(symbols.integer(min.map_or(0, |m| m.ceil() as i64)))
        } else if types.contains(ValueKind::Float) {
            Some(symbols.float(min.unwrap_or(0.0)))
        } else {
            None
        }
    }

    fn check_definition(&self, template: &str, symbols: &SymbolTable) -> ClaspResult<()> {
        if self.name.is_empty() || !is_valid_name(&self.name) {
            return Err(ClaspError::invalid_template(template, format!("invalid slot name '{}'", self.name)));
        }
        if self.field_types().is_empty() {
            return Err(ClaspError::invalid_template(
                template,
                format!("slot '{}' allows no single-field kind", self.name),
            ));
        }
        if let Some(cardinality) = self.cardinality {
            if !self.multifield {
                return Err(ClaspError::invalid_template(
                    template,
                    format!("cardinality on single-field slot '{}'", self.name),
                ));
            }
            if cardinality.max.is_some_and(|max| max < cardinality.min) {
                return Err(ClaspError::invalid_template(
                    template,
                    format!("slot '{}' has cardinality max below min", self.name),
                ));
            }
        }
        if let Some(NumericRange { min: Some(min), max: Some(max) }) = self.range {
            if max < min {
                return Err(ClaspError::invalid_template(
                    template,
                    format!("slot '{}' has range max below min", self.name),
                ));
            }
        }
        match &self.default {
            SlotDefault::Static(value) => self.validate(template, value)?,
            SlotDefault::Derive => {
                if let Some(value) = self.derive_default(symbols) {
                    self.validate(template, &value).map_err(|err| {
                        ClaspError::invalid_template(
                            template,
                            format!("slot '{}' derives default {value} that fails its constraints: {err}", self.name),
                        )
                    })?;
                }
            }
            SlotDefault::Required => {}
        }
        Ok(())
    }
}

impl fmt::Display for SlotDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.multifield { "multislot" } else { "slot" };
        write!(f, "({keyword} {}", self.name)?;
        let types = self.field_types();
        let unconstrained = SlotDefinition::single("").field_types();
        if types != unconstrained {
            let names: Vec<&str> = types.iter().map(ValueKind::name).collect();
            write!(f, " (type {})", names.join(" "))?;
        }
        if !self.allowed_values.is_empty() {
            let values: Vec<String> = self.allowed_values.iter().map(ToString::to_string).collect();
            write!(f, " (allowed-values {})", values.join(" "))?;
        }
        if let Some(range) = self.range {
            write!(f, " (range {range})")?;
        }
        if let Some(cardinality) = self.cardinality {
            match cardinality.max {
                Some(max) => write!(f, " (cardinality {} {max})", cardinality.min)?,
                None => write!(f, " (cardinality {} +oo)", cardinality.min)?,
            }
        }
        match &self.default {
            SlotDefault::Derive => {}
            SlotDefault::Static(Value::Multifield(mf)) => {
                let fields: Vec<String> = mf.iter().map(ToString::to_string).collect();
                write!(f, " (default {})", fields.join(" "))?;
            }
            SlotDefault::Static(value) => write!(f, " (default {value})")?,
            SlotDefault::Required => f.write_str(" (default ?NONE)")?,
        }
        f.write_str(")")
    }
}

/// A registered fact schema
#[derive(Debug)]
pub struct Deftemplate {
    id: TemplateId,
    name: String,
    slots: Vec<SlotDefinition>,
    implied: bool,
}

impl Deftemplate {
    pub(crate) fn implied(id: TemplateId, name: &str) -> ClaspResult<Self> {
        check_template_name(name)?;
        Ok(Self { id, name: name.to_string(), slots: Vec::new(), implied: true })
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this template was created for ordered facts
    pub fn is_implied(&self) -> bool {
        self.implied
    }

    /// Named slots, in definition order; empty for implied templates
    pub fn slots(&self) -> &[SlotDefinition] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDefinition> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(SlotDefinition::name)
    }
}

impl fmt::Display for Deftemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(deftemplate {}", self.name)?;
        if self.implied {
            f.write_str(" (multislot implied)")?;
        }
        for slot in &self.slots {
            write!(f, "\n   {slot}")?;
        }
        f.write_str(")")
    }
}

/// Builder for named-slot templates
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    name: String,
    slots: Vec<SlotDefinition>,
}

impl TemplateBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), slots: Vec::new() }
    }

    pub fn slot(mut self, slot: SlotDefinition) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(self, id: TemplateId, symbols: &SymbolTable) -> ClaspResult<Deftemplate> {
        check_template_name(&self.name)?;
        for (position, slot) in self.slots.iter().enumerate() {
            if self.slots[..position].iter().any(|earlier| earlier.name == slot.name) {
                return Err(ClaspError::invalid_template(
                    &self.name,
                    format!("slot '{}' defined more than once", slot.name),
                ));
            }
            slot.check_definition(&self.name, symbols)?;
        }
        Ok(Deftemplate { id, name: self.name, slots: self.slots, implied: false })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.chars().any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '&' | '|' | '~' | '<'))
}

fn check_template_name(name: &str) -> ClaspResult<()> {
    if name.is_empty() || !is_valid_name(name) {
        return Err(ClaspError::invalid_template(name, "not a valid symbol"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(table: &SymbolTable) -> TemplateBuilder {
        TemplateBuilder::new("person")
            .slot(SlotDefinition::single("name").types(ValueKind::String).required())
            .slot(SlotDefinition::single("age").types(ValueKind::Integer).range(Some(0.0), Some(150.0)))
            .slot(
                SlotDefinition::single("sex")
                    .types(ValueKind::Symbol)
                    .allowed_values([table.symbol("male"), table.symbol("female")]),
            )
            .slot(SlotDefinition::multi("tags").types(ValueKind::Symbol).cardinality(0, Some(3)))
    }

    #[test]
    fn test_build_template() {
        let table = SymbolTable::new();
        let template = person(&table).build(1, &table).unwrap();

        assert_eq!(template.name(), "person");
        assert!(!template.is_implied());
        assert_eq!(template.slot_names().collect::<Vec<_>>(), vec!["name", "age", "sex", "tags"]);
        assert_eq!(template.slot_index("sex"), Some(2));
        assert!(template.slot("tags").unwrap().is_multifield());
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let table = SymbolTable::new();
        let err = TemplateBuilder::new("t")
            .slot(SlotDefinition::single("a"))
            .slot(SlotDefinition::multi("a"))
            .build(1, &table)
            .unwrap_err();
        assert!(matches!(err, ClaspError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_bad_names_rejected() {
        let table = SymbolTable::new();
        assert!(TemplateBuilder::new("").build(1, &table).is_err());
        assert!(TemplateBuilder::new("two words").build(1, &table).is_err());
        assert!(TemplateBuilder::new("t").slot(SlotDefinition::single("(x)")).build(1, &table).is_err());
        assert!(Deftemplate::implied(1, "has space").is_err());
    }

    #[test]
    fn test_cardinality_requires_multislot() {
        let table = SymbolTable::new();
        let err = TemplateBuilder::new("t")
            .slot(SlotDefinition::single("a").cardinality(1, None))
            .build(1, &table)
            .unwrap_err();
        assert!(matches!(err, ClaspError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_static_default_must_satisfy_constraints() {
        let table = SymbolTable::new();
        let err = TemplateBuilder::new("t")
            .slot(SlotDefinition::single("a").types(ValueKind::Integer).default_value(table.symbol("x")))
            .build(1, &table)
            .unwrap_err();
        assert!(matches!(err, ClaspError::SlotType { .. }));
    }

    #[test]
    fn test_validate_slot_constraints() {
        let table = SymbolTable::new();
        let template = person(&table).build(1, &table).unwrap();
        let age = template.slot("age").unwrap();
        let sex = template.slot("sex").unwrap();
        let tags = template.slot("tags").unwrap();

        assert!(age.validate("person", &table.integer(30)).is_ok());
        assert!(matches!(age.validate("person", &table.float(30.0)), Err(ClaspError::SlotType { .. })));
        assert!(matches!(age.validate("person", &table.integer(200)), Err(ClaspError::SlotValue { .. })));

        assert!(sex.validate("person", &table.symbol("female")).is_ok());
        assert!(matches!(sex.validate("person", &table.symbol("other")), Err(ClaspError::SlotValue { .. })));

        let three: Multifield = ["a", "b", "c"].into_iter().map(|s| table.symbol(s)).collect();
        let four: Multifield = ["a", "b", "c", "d"].into_iter().map(|s| table.symbol(s)).collect();
        assert!(tags.validate("person", &Value::Multifield(three)).is_ok());
        assert!(matches!(
            tags.validate("person", &Value::Multifield(four)),
            Err(ClaspError::SlotValue { .. })
        ));
        assert!(matches!(tags.validate("person", &table.symbol("a")), Err(ClaspError::SlotType { .. })));
    }

    #[test]
    fn test_single_slot_rejects_multifield() {
        let table = SymbolTable::new();
        let slot = SlotDefinition::single("x");
        let err = slot.validate("t", &Value::Multifield(Multifield::empty())).unwrap_err();
        assert!(matches!(err, ClaspError::SlotType { actual: ValueKind::Multifield, .. }));
        assert!(slot.validate("t", &table.integer(1)).is_ok());
    }

    #[test]
    fn test_derived_defaults() {
        let table = SymbolTable::new();
        let template = person(&table).build(1, &table).unwrap();

        assert_eq!(template.slot("name").unwrap().derive_default(&table), None);
        assert_eq!(template.slot("age").unwrap().derive_default(&table), Some(table.integer(0)));
        assert_eq!(template.slot("sex").unwrap().derive_default(&table), Some(table.symbol("male")));
        assert_eq!(
            template.slot("tags").unwrap().derive_default(&table),
            Some(Value::Multifield(Multifield::empty()))
        );
        assert_eq!(SlotDefinition::single("any").derive_default(&table), Some(table.symbol("nil")));
        assert_eq!(
            SlotDefinition::single("f").types(ValueKind::Float).range(Some(1.5), None).derive_default(&table),
            Some(table.float(1.5))
        );
    }

    #[test]
    fn test_derived_default_checked_at_definition() {
        let table = SymbolTable::new();
        let err = TemplateBuilder::new("t")
            .slot(SlotDefinition::single("n").types(ValueKind::Integer).range(Some(0.5), Some(0.75)))
            .build(1, &table)
            .unwrap_err();
        assert!(matches!(err, ClaspError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("slot 'n' derives default 1"));

        let fine = TemplateBuilder::new("t")
            .slot(SlotDefinition::single("n").types(ValueKind::Integer).range(Some(0.5), Some(1.5)))
            .build(1, &table)
            .unwrap();
        assert_eq!(fine.slot("n").unwrap().derive_default(&table), Some(table.integer(1)));
    }

    #[test]
    fn test_address_only_slot_derives_nothing() {
        let table = SymbolTable::new();
        let template = TemplateBuilder::new("link")
            .slot(SlotDefinition::single("target").types(ValueKind::FactAddress))
            .build(1, &table)
            .unwrap();
        assert_eq!(template.slot("target").unwrap().derive_default(&table), None);
    }

    #[test]
    fn test_pretty_print() {
        let table = SymbolTable::new();
        let template = person(&table).build(1, &table).unwrap();
        let text = template.to_string();

        assert!(text.starts_with("(deftemplate person"));
        assert!(text.contains("(slot name (type STRING) (default ?NONE))"));
        assert!(text.contains("(slot sex (type SYMBOL) (allowed-values male female))"));
        assert!(text.contains("(multislot tags (type SYMBOL) (cardinality 0 3))"));
        assert_eq!(Deftemplate::implied(2, "point").unwrap().to_string(), "(deftemplate point (multislot implied))");
    }
}
