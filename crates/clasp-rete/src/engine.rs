//! The environment: one fact store, one matcher, one interning table
//!
//! Mutations take the write lock and update the store and every matcher
//! structure inside the same critical section, so concurrent readers never
//! see a fact that is stored but not yet indexed, or the reverse. Match
//! events are returned to the caller and sent to every subscriber while the
//! lock is held, which keeps subscriber streams in mutation order.

use crate::nodes::{JoinId, MatchEvent, PatternId, Token};
use crate::pattern::PatternBuilder;
use crate::rete_network::{NetworkStats, ReteNetwork};
use clasp_core::{
    Assertion, ClaspError, ClaspResult, Deftemplate, EngineConfig, FactRef, FactStore,
    FactStoreStats, FactValues, SymbolTable, SymbolTableStats, TemplateBuilder, Value,
};
use clasp_types::FactId;
use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Outcome of one fact mutation
#[derive(Debug, Clone)]
pub struct FactChange {
    /// Id of the fact asserted, retracted, or found to be a duplicate
    pub fact_id: FactId,
    /// True when an equal fact was already live and nothing was asserted
    pub duplicate: bool,
    /// Match changes caused by the mutation, in order
    pub events: Vec<MatchEvent>,
}

/// Combined counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnvironmentStats {
    pub facts: FactStoreStats,
    pub network: NetworkStats,
    pub symbols: SymbolTableStats,
}

struct EnvState {
    store: FactStore,
    network: ReteNetwork,
}

/// Thread-safe facade over the fact store and the matcher
pub struct Environment {
    config: EngineConfig,
    symbols: Arc<SymbolTable>,
    state: RwLock<EnvState>,
    subscribers: Mutex<Vec<Sender<MatchEvent>>>,
}

impl Environment {
    /// Create an environment with default configuration
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Create an environment after validating `config`
    pub fn with_config(config: EngineConfig) -> ClaspResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an environment configured from `CLASP_*` variables
    pub fn from_environment() -> ClaspResult<Self> {
        Self::with_config(EngineConfig::from_environment()?)
    }

    fn build(config: EngineConfig) -> Self {
        let symbols = Arc::new(SymbolTable::from_config(&config));
        let store = FactStore::new(Arc::clone(&symbols), config.fact_duplication);
        info!(
            fact_duplication = config.fact_duplication,
            symbol_purge_threshold = config.symbol_purge_threshold,
            "Creating environment"
        );
        Self {
            config,
            symbols,
            state: RwLock::new(EnvState { store, network: ReteNetwork::new() }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The interning table all values of this environment must come from
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn symbol(&self, text: &str) -> Value {
        self.symbols.symbol(text)
    }

    pub fn string(&self, text: &str) -> Value {
        self.symbols.string(text)
    }

    pub fn integer(&self, value: i64) -> Value {
        self.symbols.integer(value)
    }

    pub fn float(&self, value: f64) -> Value {
        self.symbols.float(value)
    }

    pub fn value_from_json(&self, json: &serde_json::Value) -> ClaspResult<Value> {
        self.symbols.value_from_json(json)
    }

    // Templates -----------------------------------------------------------------------------

    pub fn define_template(&self, builder: TemplateBuilder) -> ClaspResult<Arc<Deftemplate>> {
        self.write().store.define_template(builder)
    }

    pub fn find_template(&self, name: &str) -> ClaspResult<Arc<Deftemplate>> {
        self.read().store.find_template(name)
    }

    pub fn templates(&self) -> Vec<Arc<Deftemplate>> {
        self.read().store.templates().cloned().collect()
    }

    pub fn is_implied(&self, template: &str) -> ClaspResult<bool> {
        self.read().store.is_implied(template)
    }

    /// Remove a template no fact or pattern refers to
    #[instrument(skip(self))]
    pub fn undefine_template(&self, name: &str) -> ClaspResult<Arc<Deftemplate>> {
        let mut state = self.write();
        let template = state.store.find_template(name)?;
        let facts = state.store.template_fact_count(template.id());
        let patterns = state.network.patterns_for_template(template.id());
        if facts > 0 || patterns > 0 {
            return Err(ClaspError::TemplateInUse { name: name.to_string(), facts, patterns });
        }
        state.store.undefine_template(name)
    }

    // Facts ---------------------------------------------------------------------------------

    /// Assert a fact of a registered template
    #[instrument(skip(self, template, values), fields(template = %template.name()))]
    pub fn assert(
        &self,
        template: &Arc<Deftemplate>,
        values: impl Into<FactValues>,
    ) -> ClaspResult<FactChange> {
        let mut state = self.write();
        self.assert_locked(&mut state, template, values)
    }

    /// Assert a named-slot fact by template name
    pub fn assert_fact(&self, template: &str, slots: Vec<(&str, Value)>) -> ClaspResult<FactChange> {
        let mut state = self.write();
        let template = state.store.find_template(template)?;
        self.assert_locked(&mut state, &template, slots)
    }

    /// Assert an ordered fact, creating the implied template on first use
    ///
    /// The template is resolved and the fact stored under one write lock, so
    /// a concurrent `undefine_template` cannot slip in between.
    pub fn assert_ordered(&self, template: &str, fields: Vec<Value>) -> ClaspResult<FactChange> {
        let mut state = self.write();
        let template = state.store.implied_template(template)?;
        self.assert_locked(&mut state, &template, fields)
    }

    /// Retract a live fact
    #[instrument(skip(self))]
    pub fn retract(&self, fact_id: FactId) -> ClaspResult<FactChange> {
        let mut state = self.write();
        let fact = state.store.retract(fact_id)?;
        let events = state.network.retract_fact(&fact);
        self.publish(&events);
        Ok(FactChange { fact_id, duplicate: false, events })
    }

    /// Replace slot values; the fact is retracted and reasserted with a new id
    #[instrument(skip(self, updates))]
    pub fn modify(&self, fact_id: FactId, updates: Vec<(&str, Value)>) -> ClaspResult<FactChange> {
        let updates = updates.into_iter().map(|(slot, value)| (slot.to_string(), value)).collect();
        let mut state = self.write();
        let (old, assertion) = state.store.modify(fact_id, updates)?;
        let removed = state.network.retract_fact(&old);
        Ok(self.propagate_assertion(&mut state, assertion, removed))
    }

    pub fn get_slot(&self, fact_id: FactId, slot: &str) -> ClaspResult<Value> {
        self.read().store.get_slot(fact_id, slot)
    }

    pub fn get_fact(&self, fact_id: FactId) -> ClaspResult<FactRef> {
        self.read().store.get_fact(fact_id)
    }

    /// Live fact ids in ascending order
    pub fn fact_ids(&self) -> Vec<FactId> {
        self.snapshot().fact_ids()
    }

    pub fn facts(&self) -> Vec<FactRef> {
        self.read().store.facts().cloned().collect()
    }

    pub fn contains(&self, fact_id: FactId) -> bool {
        self.read().store.contains(fact_id)
    }

    pub fn fact_count(&self) -> usize {
        self.read().store.len()
    }

    /// Retract every fact; templates and patterns stay registered
    #[instrument(skip(self))]
    pub fn clear(&self) -> Vec<MatchEvent> {
        let mut state = self.write();
        let facts = state.store.clear();
        let mut events = Vec::new();
        for fact in &facts {
            events.extend(state.network.retract_fact(fact));
        }
        self.publish(&events);
        info!(facts = facts.len(), "Environment cleared");
        events
    }

    // Matching ------------------------------------------------------------------------------

    /// Register a pattern; its memory is filled from the facts already asserted
    #[instrument(skip(self, builder), fields(template = %builder.template()))]
    pub fn add_pattern(&self, builder: &PatternBuilder) -> ClaspResult<PatternId> {
        let mut state = self.write();
        let template = state.store.find_template(builder.template())?;
        let pattern = builder.compile(&template)?;
        let EnvState { store, network } = &mut *state;
        Ok(network.add_pattern(pattern, store))
    }

    pub fn remove_pattern(&self, pattern_id: PatternId) -> ClaspResult<()> {
        self.write().network.remove_pattern(pattern_id)
    }

    /// Evaluate a pattern once against the current facts
    pub fn query(&self, builder: &PatternBuilder) -> ClaspResult<Vec<Token>> {
        self.snapshot().query(builder)
    }

    pub fn pattern_matches(&self, pattern_id: PatternId) -> ClaspResult<Vec<Token>> {
        self.snapshot().pattern_matches(pattern_id)
    }

    /// Register a join over registered patterns, in order
    pub fn add_join(&self, patterns: &[PatternId]) -> ClaspResult<JoinId> {
        self.write().network.add_join(patterns)
    }

    pub fn remove_join(&self, join_id: JoinId) -> ClaspResult<()> {
        self.write().network.remove_join(join_id)
    }

    pub fn join_tokens(&self, join_id: JoinId) -> ClaspResult<Vec<Token>> {
        self.read().network.join_tokens(join_id)
    }

    /// Receive every match event from now on
    pub fn subscribe(&self) -> Receiver<MatchEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(sender);
        receiver
    }

    /// Consistent read-only view; writers wait until it is dropped
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot { state: self.read() }
    }

    pub fn stats(&self) -> EnvironmentStats {
        let state = self.read();
        EnvironmentStats {
            facts: state.store.stats(),
            network: state.network.stats(),
            symbols: self.symbols.stats(),
        }
    }

    fn assert_locked(
        &self,
        state: &mut EnvState,
        template: &Arc<Deftemplate>,
        values: impl Into<FactValues>,
    ) -> ClaspResult<FactChange> {
        let assertion = state.store.assert(template, values).inspect_err(|err| {
            debug!(category = err.category(), error = %err, "Assertion rejected");
        })?;
        Ok(self.propagate_assertion(state, assertion, Vec::new()))
    }

    fn propagate_assertion(
        &self,
        state: &mut EnvState,
        assertion: Assertion,
        mut events: Vec<MatchEvent>,
    ) -> FactChange {
        let change = match assertion {
            Assertion::Created(fact) => {
                events.extend(state.network.assert_fact(&fact));
                FactChange { fact_id: fact.id(), duplicate: false, events }
            }
            Assertion::Duplicate(fact_id) => FactChange { fact_id, duplicate: true, events },
        };
        self.publish(&change.events);
        change
    }

    fn publish(&self, events: &[MatchEvent]) {
        if events.is_empty() {
            return;
        }
        if self.config.trace_matches {
            for event in events {
                debug!(%event, "Match event");
            }
        }
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|sender| events.iter().all(|event| sender.send(event.clone()).is_ok()));
        if subscribers.len() < before {
            warn!(dropped = before - subscribers.len(), "Dropped disconnected match subscribers");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EnvState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EnvState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Facts and matches as of one point in time
///
/// Every call on a snapshot reads under the same lock, so counts and tokens
/// taken from it agree with each other.
pub struct Snapshot<'a> {
    state: RwLockReadGuard<'a, EnvState>,
}

impl Snapshot<'_> {
    /// Live fact ids in ascending order
    pub fn fact_ids(&self) -> Vec<FactId> {
        self.state.store.fact_ids()
    }

    pub fn contains(&self, fact_id: FactId) -> bool {
        self.state.store.contains(fact_id)
    }

    pub fn fact_count(&self) -> usize {
        self.state.store.len()
    }

    /// Live facts of one template
    pub fn template_fact_count(&self, template: &str) -> ClaspResult<usize> {
        let template = self.state.store.find_template(template)?;
        Ok(self.state.store.template_fact_count(template.id()))
    }

    pub fn pattern_matches(&self, pattern_id: PatternId) -> ClaspResult<Vec<Token>> {
        self.state.network.pattern_matches(pattern_id)
    }

    pub fn query(&self, builder: &PatternBuilder) -> ClaspResult<Vec<Token>> {
        let template = self.state.store.find_template(builder.template())?;
        let pattern = builder.compile(&template)?;
        Ok(self.state.network.query(&pattern, &self.state.store))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").field("config", &self.config).field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Constraint;
    use clasp_core::SlotDefinition;
    use clasp_types::ValueKind;

    #[test]
    fn test_environment_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Environment>();
    }

    #[test]
    fn test_assert_returns_pattern_events() {
        let env = Environment::new();
        env.assert_ordered("t", vec![]).unwrap();
        let pattern = env.add_pattern(&PatternBuilder::new("t").field(Constraint::variable("x"))).unwrap();

        let change = env.assert_ordered("t", vec![env.symbol("a")]).unwrap();
        assert!(!change.duplicate);
        assert_eq!(change.events.len(), 1);
        assert!(change.events[0].is_added());
        assert_eq!(env.pattern_matches(pattern).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_assert_reports_existing_id() {
        let env = Environment::new();
        let first = env.assert_ordered("t", vec![env.integer(1)]).unwrap();
        let second = env.assert_ordered("t", vec![env.integer(1)]).unwrap();
        assert!(second.duplicate);
        assert_eq!(second.fact_id, first.fact_id);
        assert!(second.events.is_empty());
        assert_eq!(env.fact_count(), 1);
    }

    #[test]
    fn test_modify_emits_removal_then_addition() {
        let env = Environment::new();
        env.define_template(
            TemplateBuilder::new("counter").slot(SlotDefinition::single("n").types(ValueKind::Integer)),
        )
        .unwrap();
        env.add_pattern(&PatternBuilder::new("counter").slot("n", Constraint::variable("n"))).unwrap();
        let id = env.assert_fact("counter", vec![("n", env.integer(1))]).unwrap().fact_id;

        let change = env.modify(id, vec![("n", env.integer(2))]).unwrap();
        assert_ne!(change.fact_id, id);
        assert_eq!(change.events.len(), 2);
        assert!(!change.events[0].is_added());
        assert_eq!(change.events[0].token().fact_id(), id);
        assert!(change.events[1].is_added());
        assert_eq!(change.events[1].token().bindings.get("n"), Some(&env.integer(2)));
    }

    #[test]
    fn test_undefine_template_guarded_by_patterns() {
        let env = Environment::new();
        env.define_template(TemplateBuilder::new("a").slot(SlotDefinition::single("x"))).unwrap();
        let pattern = env.add_pattern(&PatternBuilder::new("a")).unwrap();

        assert!(matches!(
            env.undefine_template("a"),
            Err(ClaspError::TemplateInUse { facts: 0, patterns: 1, .. })
        ));
        env.remove_pattern(pattern).unwrap();
        env.undefine_template("a").unwrap();
        assert!(env.templates().is_empty());
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let env = Environment::new();
        env.assert_ordered("t", vec![]).unwrap();
        env.add_pattern(&PatternBuilder::new("t").field(Constraint::Wildcard)).unwrap();
        let events = env.subscribe();

        let id = env.assert_ordered("t", vec![env.integer(1)]).unwrap().fact_id;
        env.retract(id).unwrap();

        let received: Vec<MatchEvent> = events.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received[0].is_added());
        assert!(!received[1].is_added());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let env = Environment::new();
        env.assert_ordered("t", vec![]).unwrap();
        env.add_pattern(&PatternBuilder::new("t").field(Constraint::Wildcard)).unwrap();
        drop(env.subscribe());

        env.assert_ordered("t", vec![env.integer(1)]).unwrap();
        assert!(env.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_keeps_counting_ids() {
        let env = Environment::new();
        env.assert_ordered("t", vec![env.integer(1)]).unwrap();
        env.assert_ordered("t", vec![env.integer(2)]).unwrap();

        env.clear();
        assert!(env.fact_ids().is_empty());
        assert_eq!(env.assert_ordered("t", vec![env.integer(1)]).unwrap().fact_id, 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig { symbol_purge_threshold: 0, ..EngineConfig::default() };
        assert!(matches!(Environment::with_config(config), Err(ClaspError::Configuration { .. })));
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let env = Environment::new();
        env.assert_ordered("t", vec![env.integer(1)]).unwrap();
        env.add_pattern(&PatternBuilder::new("t").field(Constraint::variable("n"))).unwrap();

        let json = serde_json::to_value(env.stats()).unwrap();
        assert_eq!(json["facts"]["facts"], 1);
        assert_eq!(json["network"]["patterns"], 1);
        assert_eq!(json["network"]["alpha_matches"], 1);
    }
}
