//! Alpha memories and the fact value index
//!
//! ```text
//! assert ──▶ AlphaIndex (template, slot, value) ─▶ RoaringTreemap of fact ids
//!        └─▶ discrimination ─▶ AlphaMemory per pattern ─▶ JoinNode
//! ```
//!
//! - **AlphaKey**: one `(template, slot, value)` triple of a fact
//! - **AlphaIndex**: bitmap per key plus one per template, answering literal
//!   queries by intersecting the smallest bitmaps first
//! - **AlphaMemory**: the facts, with bindings, matching one registered pattern

use crate::nodes::{PatternId, Token};
use crate::pattern::{Bindings, Pattern, SlotKey};
use ahash::RandomState;
use clasp_core::{Fact, Value};
use clasp_types::{FactId, TemplateId};
use roaring::RoaringTreemap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One indexed `(template, slot, value)` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlphaKey {
    pub template: TemplateId,
    pub slot: SlotKey,
    pub value: Value,
}

impl AlphaKey {
    pub fn new(template: TemplateId, slot: SlotKey, value: &Value) -> Self {
        Self { template, slot, value: value.clone() }
    }

    /// Every key a fact is indexed under
    pub fn of_fact(fact: &Fact) -> Vec<AlphaKey> {
        let template = fact.template().id();
        SlotKey::locations(fact)
            .into_iter()
            .map(|(slot, value)| AlphaKey::new(template, slot, value))
            .collect()
    }
}

/// Bitmap index of live facts by slot value
#[derive(Debug, Default)]
pub struct AlphaIndex {
    by_value: HashMap<AlphaKey, RoaringTreemap, RandomState>,
    by_template: HashMap<TemplateId, RoaringTreemap, RandomState>,
}

impl AlphaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fact: &Fact) {
        for key in AlphaKey::of_fact(fact) {
            self.by_value.entry(key).or_default().insert(fact.id());
        }
        self.by_template.entry(fact.template().id()).or_default().insert(fact.id());
    }

    pub fn remove(&mut self, fact: &Fact) {
        for key in AlphaKey::of_fact(fact) {
            if let Some(ids) = self.by_value.get_mut(&key) {
                ids.remove(fact.id());
                if ids.is_empty() {
                    self.by_value.remove(&key);
                }
            }
        }
        let template = fact.template().id();
        if let Some(ids) = self.by_template.get_mut(&template) {
            ids.remove(fact.id());
            if ids.is_empty() {
                self.by_template.remove(&template);
            }
        }
    }

    /// Facts of `pattern`'s template that pass all of its literal tests
    pub fn candidates(&self, pattern: &Pattern) -> RoaringTreemap {
        let template = pattern.template_id();
        let mut bitmaps = Vec::new();
        for (slot, value) in pattern.literals() {
            match self.by_value.get(&AlphaKey::new(template, slot, value)) {
                Some(ids) => bitmaps.push(ids),
                None => return RoaringTreemap::new(),
            }
        }
        if bitmaps.is_empty() {
            return self.by_template.get(&template).cloned().unwrap_or_default();
        }

        bitmaps.sort_by_key(|ids| ids.len());
        let mut result = bitmaps[0].clone();
        for ids in &bitmaps[1..] {
            if result.is_empty() {
                break;
            }
            result &= *ids;
        }
        result
    }

    pub fn template_facts(&self, template: TemplateId) -> u64 {
        self.by_template.get(&template).map_or(0, RoaringTreemap::len)
    }

    /// Number of distinct `(template, slot, value)` keys
    pub fn key_count(&self) -> usize {
        self.by_value.len()
    }

    pub fn clear(&mut self) {
        self.by_value.clear();
        self.by_template.clear();
    }
}

/// Counters for one alpha memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlphaMemoryStats {
    /// Facts tested against the pattern
    pub activations: u64,
    /// Facts that matched
    pub insertions: u64,
    /// Matches withdrawn by retraction
    pub removals: u64,
}

impl AlphaMemoryStats {
    /// Share of tested facts that matched
    pub fn hit_rate(&self) -> f64 {
        if self.activations == 0 {
            0.0
        } else {
            self.insertions as f64 / self.activations as f64 * 100.0
        }
    }
}

impl fmt::Display for AlphaMemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activations: {}, insertions: {}, removals: {}, hit rate: {:.1}%",
            self.activations,
            self.insertions,
            self.removals,
            self.hit_rate()
        )
    }
}

/// Facts matching one registered pattern
#[derive(Debug)]
pub struct AlphaMemory {
    pattern_id: PatternId,
    pattern: Pattern,
    matches: BTreeMap<FactId, Bindings>,
    stats: AlphaMemoryStats,
}

impl AlphaMemory {
    pub fn new(pattern_id: PatternId, pattern: Pattern) -> Self {
        Self { pattern_id, pattern, matches: BTreeMap::new(), stats: AlphaMemoryStats::default() }
    }

    pub fn pattern_id(&self) -> PatternId {
        self.pattern_id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn contains(&self, fact_id: FactId) -> bool {
        self.matches.contains_key(&fact_id)
    }

    pub fn bindings(&self, fact_id: FactId) -> Option<&Bindings> {
        self.matches.get(&fact_id)
    }

    /// Matching facts in id order
    pub fn entries(&self) -> impl Iterator<Item = (FactId, &Bindings)> {
        self.matches.iter().map(|(id, bindings)| (*id, bindings))
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.entries().map(|(id, bindings)| Token::new(id, bindings.clone())).collect()
    }

    pub fn stats(&self) -> AlphaMemoryStats {
        self.stats
    }

    /// Test a fact and remember it on a match
    pub fn activate(&mut self, fact: &Fact) -> Option<Token> {
        self.stats.activations += 1;
        let bindings = self.pattern.matches(fact)?;
        self.stats.insertions += 1;
        self.matches.insert(fact.id(), bindings.clone());
        Some(Token::new(fact.id(), bindings))
    }

    /// Forget a fact, returning its token if it was held
    pub fn deactivate(&mut self, fact_id: FactId) -> Option<Token> {
        let bindings = self.matches.remove(&fact_id)?;
        self.stats.removals += 1;
        Some(Token::new(fact_id, bindings))
    }
}
