//! Incremental matcher over the fact store
//!
//! The network keeps, for every registered pattern, an alpha memory that is
//! updated on each assert and retract instead of being recomputed:
//!
//! - on assert, a discrimination map keyed by `(template, slot, value)` counts
//!   how many literal tests of each pattern the fact passes; only patterns
//!   whose count reaches their literal total, plus the literal-free patterns
//!   of the template, are tested
//! - on retract, a reverse map names exactly the memories holding the fact
//!
//! Joins are fed from the memories the fact entered or left.

use crate::alpha_memory::{AlphaIndex, AlphaKey, AlphaMemory, AlphaMemoryStats};
use crate::beta_network::JoinNode;
use crate::nodes::{JoinId, MatchEvent, MatchSource, PatternId, Token};
use crate::pattern::Pattern;
use ahash::RandomState;
use clasp_core::{ClaspError, ClaspResult, Fact, FactStore};
use clasp_types::{FactId, TemplateId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, instrument};

/// Sizes of the matcher structures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub patterns: usize,
    pub joins: usize,
    pub index_keys: usize,
    pub discrimination_keys: usize,
    pub alpha_matches: usize,
    pub join_tokens: usize,
    pub partial_tokens: usize,
}

/// Registered patterns and joins with their incrementally maintained memories
#[derive(Debug, Default)]
pub struct ReteNetwork {
    index: AlphaIndex,
    memories: BTreeMap<PatternId, AlphaMemory>,
    discrimination: HashMap<AlphaKey, Vec<PatternId>, RandomState>,
    unconstrained: HashMap<TemplateId, Vec<PatternId>, RandomState>,
    fact_patterns: HashMap<FactId, Vec<PatternId>, RandomState>,
    joins: BTreeMap<JoinId, JoinNode>,
    next_pattern_id: PatternId,
    next_join_id: JoinId,
}

impl ReteNetwork {
    pub fn new() -> Self {
        Self { next_pattern_id: 1, next_join_id: 1, ..Self::default() }
    }

    /// Index a newly asserted fact and propagate it
    #[instrument(skip(self, fact), fields(fact_id = fact.id()))]
    pub fn assert_fact(&mut self, fact: &Fact) -> Vec<MatchEvent> {
        self.index.insert(fact);

        let mut hits: HashMap<PatternId, usize> = HashMap::new();
        for key in AlphaKey::of_fact(fact) {
            if let Some(patterns) = self.discrimination.get(&key) {
                for pattern_id in patterns {
                    *hits.entry(*pattern_id).or_default() += 1;
                }
            }
        }
        let mut candidates: BTreeSet<PatternId> = hits
            .into_iter()
            .filter(|(pattern_id, count)| {
                self.memories.get(pattern_id).is_some_and(|m| m.pattern().literal_count() == *count)
            })
            .map(|(pattern_id, _)| pattern_id)
            .collect();
        if let Some(open) = self.unconstrained.get(&fact.template().id()) {
            candidates.extend(open.iter().copied());
        }

        let mut events = Vec::new();
        let mut matched = Vec::new();
        for pattern_id in candidates {
            let Some(memory) = self.memories.get_mut(&pattern_id) else {
                continue;
            };
            if let Some(token) = memory.activate(fact) {
                matched.push(pattern_id);
                events.push(MatchEvent::Added { source: MatchSource::Pattern(pattern_id), token });
            }
        }
        if matched.is_empty() {
            return events;
        }

        for join in self.joins.values_mut() {
            if !matched.iter().any(|pattern_id| join.uses_pattern(*pattern_id)) {
                continue;
            }
            let source = MatchSource::Join(join.join_id());
            for token in join.activate(fact.id(), &matched, &self.memories) {
                events.push(MatchEvent::Added { source, token });
            }
        }
        self.fact_patterns.insert(fact.id(), matched);
        debug!(events = events.len(), "Fact propagated");
        events
    }

    /// Withdraw a retracted fact from every memory holding it
    #[instrument(skip(self, fact), fields(fact_id = fact.id()))]
    pub fn retract_fact(&mut self, fact: &Fact) -> Vec<MatchEvent> {
        self.index.remove(fact);

        let mut events = Vec::new();
        let Some(patterns) = self.fact_patterns.remove(&fact.id()) else {
            return events;
        };
        for pattern_id in &patterns {
            if let Some(token) = self.memories.get_mut(pattern_id).and_then(|m| m.deactivate(fact.id())) {
                events.push(MatchEvent::Removed { source: MatchSource::Pattern(*pattern_id), token });
            }
        }
        for join in self.joins.values_mut() {
            if !patterns.iter().any(|pattern_id| join.uses_pattern(*pattern_id)) {
                continue;
            }
            let source = MatchSource::Join(join.join_id());
            for token in join.retract(fact.id()) {
                events.push(MatchEvent::Removed { source, token });
            }
        }
        debug!(events = events.len(), "Fact withdrawn");
        events
    }

    /// Matches of a pattern computed from the index, without registering it
    pub fn query(&self, pattern: &Pattern, store: &FactStore) -> Vec<Token> {
        self.index
            .candidates(pattern)
            .iter()
            .filter_map(|fact_id| {
                let fact = store.get_fact(fact_id).ok()?;
                pattern.matches(&fact).map(|bindings| Token::new(fact_id, bindings))
            })
            .collect()
    }

    /// Register a pattern, filling its memory from the facts already stored
    #[instrument(skip(self, pattern, store), fields(template = %pattern.template().name()))]
    pub fn add_pattern(&mut self, pattern: Pattern, store: &FactStore) -> PatternId {
        let pattern_id = self.next_pattern_id;
        self.next_pattern_id += 1;

        let template = pattern.template_id();
        let keys: Vec<AlphaKey> =
            pattern.literals().map(|(slot, value)| AlphaKey::new(template, slot, value)).collect();
        if keys.is_empty() {
            self.unconstrained.entry(template).or_default().push(pattern_id);
        }
        for key in keys {
            self.discrimination.entry(key).or_default().push(pattern_id);
        }

        let mut memory = AlphaMemory::new(pattern_id, pattern);
        let candidates = self.index.candidates(memory.pattern());
        for fact_id in candidates.iter() {
            let Ok(fact) = store.get_fact(fact_id) else {
                continue;
            };
            if memory.activate(&fact).is_some() {
                self.fact_patterns.entry(fact_id).or_default().push(pattern_id);
            }
        }
        debug!(pattern_id, matches = memory.len(), "Pattern registered");
        self.memories.insert(pattern_id, memory);
        pattern_id
    }

    /// Unregister a pattern that no join uses
    pub fn remove_pattern(&mut self, pattern_id: PatternId) -> ClaspResult<()> {
        if let Some(join) = self.joins.values().find(|join| join.uses_pattern(pattern_id)) {
            return Err(ClaspError::invalid_pattern(format!(
                "pattern {pattern_id} is used by join {}",
                join.join_id()
            )));
        }
        let memory = self
            .memories
            .remove(&pattern_id)
            .ok_or(ClaspError::UnknownPattern { pattern_id })?;

        let template = memory.pattern().template_id();
        for (slot, value) in memory.pattern().literals() {
            let key = AlphaKey::new(template, slot, value);
            if let Some(patterns) = self.discrimination.get_mut(&key) {
                patterns.retain(|id| *id != pattern_id);
                if patterns.is_empty() {
                    self.discrimination.remove(&key);
                }
            }
        }
        if let Some(patterns) = self.unconstrained.get_mut(&template) {
            patterns.retain(|id| *id != pattern_id);
            if patterns.is_empty() {
                self.unconstrained.remove(&template);
            }
        }
        for (fact_id, _) in memory.entries() {
            if let Some(patterns) = self.fact_patterns.get_mut(&fact_id) {
                patterns.retain(|id| *id != pattern_id);
                if patterns.is_empty() {
                    self.fact_patterns.remove(&fact_id);
                }
            }
        }
        debug!(pattern_id, "Pattern removed");
        Ok(())
    }

    /// Register a left-deep join over registered patterns
    pub fn add_join(&mut self, patterns: &[PatternId]) -> ClaspResult<JoinId> {
        if patterns.is_empty() {
            return Err(ClaspError::invalid_pattern("a join needs at least one pattern"));
        }
        if let Some(&pattern_id) = patterns.iter().find(|id| !self.memories.contains_key(*id)) {
            return Err(ClaspError::UnknownPattern { pattern_id });
        }
        let join_id = self.next_join_id;
        self.next_join_id += 1;
        let join = JoinNode::new(join_id, patterns.to_vec(), &self.memories);
        debug!(join_id, patterns = patterns.len(), matches = join.tokens().len(), "Join registered");
        self.joins.insert(join_id, join);
        Ok(join_id)
    }

    pub fn remove_join(&mut self, join_id: JoinId) -> ClaspResult<()> {
        self.joins
            .remove(&join_id)
            .map(|_| ())
            .ok_or(ClaspError::UnknownJoin { join_id })
    }

    pub fn pattern(&self, pattern_id: PatternId) -> ClaspResult<&Pattern> {
        self.memory(pattern_id).map(AlphaMemory::pattern)
    }

    /// Current matches of a registered pattern, in fact id order
    pub fn pattern_matches(&self, pattern_id: PatternId) -> ClaspResult<Vec<Token>> {
        self.memory(pattern_id).map(AlphaMemory::tokens)
    }

    pub fn pattern_stats(&self, pattern_id: PatternId) -> ClaspResult<AlphaMemoryStats> {
        self.memory(pattern_id).map(AlphaMemory::stats)
    }

    /// Current complete matches of a join
    pub fn join_tokens(&self, join_id: JoinId) -> ClaspResult<Vec<Token>> {
        self.joins
            .get(&join_id)
            .map(|join| join.tokens().to_vec())
            .ok_or(ClaspError::UnknownJoin { join_id })
    }

    /// Registered patterns over a template
    pub fn patterns_for_template(&self, template: TemplateId) -> usize {
        self.memories.values().filter(|m| m.pattern().template_id() == template).count()
    }

    /// Patterns currently holding a fact
    pub fn patterns_of_fact(&self, fact_id: FactId) -> &[PatternId] {
        self.fact_patterns.get(&fact_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            patterns: self.memories.len(),
            joins: self.joins.len(),
            index_keys: self.index.key_count(),
            discrimination_keys: self.discrimination.len(),
            alpha_matches: self.memories.values().map(AlphaMemory::len).sum(),
            join_tokens: self.joins.values().map(|join| join.tokens().len()).sum(),
            partial_tokens: self.joins.values().map(JoinNode::partial_count).sum(),
        }
    }

    fn memory(&self, pattern_id: PatternId) -> ClaspResult<&AlphaMemory> {
        self.memories.get(&pattern_id).ok_or(ClaspError::UnknownPattern { pattern_id })
    }
}
