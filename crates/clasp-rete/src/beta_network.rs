//! Left-deep join network over alpha memories
//!
//! A [`JoinNode`] combines the memories of its patterns in order. Level `k`
//! holds the partial tokens matching patterns `0..=k` with consistent
//! bindings; the last level holds complete matches. Activations only extend
//! the partial tokens that involve the new fact, so work is proportional to
//! the change rather than to the size of the memories.

use crate::alpha_memory::AlphaMemory;
use crate::nodes::{JoinId, PatternId, Token};
use clasp_types::FactId;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug)]
pub struct JoinNode {
    join_id: JoinId,
    patterns: Vec<PatternId>,
    levels: Vec<Vec<Token>>,
}

impl JoinNode {
    /// Build a join and fill it from the current memories
    pub fn new(
        join_id: JoinId,
        patterns: Vec<PatternId>,
        memories: &BTreeMap<PatternId, AlphaMemory>,
    ) -> Self {
        let mut levels: Vec<Vec<Token>> = Vec::with_capacity(patterns.len());
        for (position, pattern_id) in patterns.iter().enumerate() {
            let Some(memory) = memories.get(pattern_id) else {
                levels.push(Vec::new());
                continue;
            };
            let level = if position == 0 {
                memory.tokens()
            } else {
                extend(&levels[position - 1], memory, |_| true)
            };
            levels.push(level);
        }
        Self { join_id, patterns, levels }
    }

    pub fn join_id(&self) -> JoinId {
        self.join_id
    }

    pub fn patterns(&self) -> &[PatternId] {
        &self.patterns
    }

    pub fn uses_pattern(&self, pattern_id: PatternId) -> bool {
        self.patterns.contains(&pattern_id)
    }

    /// Complete matches
    pub fn tokens(&self) -> &[Token] {
        self.levels.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Partial tokens held across all levels
    pub fn partial_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Propagate a fact that has just entered the memories of `matched`
    ///
    /// Positions are processed in order. While extending from one position,
    /// the new fact is skipped at later positions it also matches, because
    /// those positions produce their own tokens when they are processed.
    /// Returns the new complete matches.
    pub fn activate(
        &mut self,
        fact_id: FactId,
        matched: &[PatternId],
        memories: &BTreeMap<PatternId, AlphaMemory>,
    ) -> Vec<Token> {
        let last = self.patterns.len() - 1;
        let mut completed = Vec::new();

        for position in 0..self.patterns.len() {
            if !matched.contains(&self.patterns[position]) {
                continue;
            }
            let Some(bindings) = memories.get(&self.patterns[position]).and_then(|m| m.bindings(fact_id))
            else {
                continue;
            };

            let mut frontier: Vec<Token> = if position == 0 {
                vec![Token::new(fact_id, bindings.clone())]
            } else {
                self.levels[position - 1]
                    .iter()
                    .filter_map(|left| left.join(fact_id, bindings))
                    .collect()
            };
            self.levels[position].extend(frontier.iter().cloned());

            for next in position + 1..=last {
                if frontier.is_empty() {
                    break;
                }
                let Some(memory) = memories.get(&self.patterns[next]) else {
                    frontier.clear();
                    break;
                };
                let skip_new = matched.contains(&self.patterns[next]);
                frontier = extend(&frontier, memory, |id| !(skip_new && id == fact_id));
                self.levels[next].extend(frontier.iter().cloned());
            }

            completed.extend(frontier);
        }

        if !completed.is_empty() {
            trace!(join_id = self.join_id, fact_id, added = completed.len(), "Join activated");
        }
        completed
    }

    /// Drop every partial token holding the fact; returns the complete ones dropped
    pub fn retract(&mut self, fact_id: FactId) -> Vec<Token> {
        let last = self.levels.len().saturating_sub(1);
        let mut removed = Vec::new();
        for (position, level) in self.levels.iter_mut().enumerate() {
            if position == last {
                let (gone, kept): (Vec<Token>, Vec<Token>) =
                    level.drain(..).partition(|token| token.contains(fact_id));
                *level = kept;
                removed = gone;
            } else {
                level.retain(|token| !token.contains(fact_id));
            }
        }
        removed
    }
}

fn extend(left: &[Token], memory: &AlphaMemory, accept: impl Fn(FactId) -> bool) -> Vec<Token> {
    let mut joined = Vec::new();
    for token in left {
        for (fact_id, bindings) in memory.entries() {
            if !accept(fact_id) {
                continue;
            }
            if let Some(extended) = token.join(fact_id, bindings) {
                joined.push(extended);
            }
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Constraint, PatternBuilder};
    use clasp_core::{FactRef, FactStore, SymbolTable};
    use std::sync::Arc;

    struct Fixture {
        symbols: Arc<SymbolTable>,
        store: FactStore,
        memories: BTreeMap<PatternId, AlphaMemory>,
    }

    impl Fixture {
        fn new() -> Self {
            let symbols = Arc::new(SymbolTable::new());
            let store = FactStore::new(Arc::clone(&symbols), true);
            Self { symbols, store, memories: BTreeMap::new() }
        }

        fn pattern(&mut self, id: PatternId, template: &str, fields: &[&str]) {
            let t = self.store.implied_template(template).unwrap();
            let builder = fields.iter().fold(PatternBuilder::new(template), |b, f| match *f {
                "_" => b.field(Constraint::Wildcard),
                name => b.field(Constraint::variable(name)),
            });
            self.memories.insert(id, AlphaMemory::new(id, builder.compile(&t).unwrap()));
        }

        fn assert(&mut self, template: &str, values: &[&str]) -> (FactRef, Vec<PatternId>) {
            let t = self.store.implied_template(template).unwrap();
            let values = values.iter().map(|v| self.symbols.symbol(v)).collect::<Vec<_>>();
            let fact = self.store.assert(&t, values).unwrap().created().cloned().unwrap();
            let matched = self
                .memories
                .values_mut()
                .filter_map(|m| m.activate(&fact).map(|_| m.pattern_id()))
                .collect();
            (fact, matched)
        }
    }

    #[test]
    fn test_join_respects_shared_variables() {
        let mut fx = Fixture::new();
        fx.pattern(1, "parent", &["p", "c"]);
        fx.pattern(2, "parent", &["c", "g"]);
        let mut join = JoinNode::new(10, vec![1, 2], &fx.memories);

        let (a, matched) = fx.assert("parent", &["ann", "bob"]);
        assert!(join.activate(a.id(), &matched, &fx.memories).is_empty());

        let (b, matched) = fx.assert("parent", &["bob", "cid"]);
        let added = join.activate(b.id(), &matched, &fx.memories);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].fact_ids, vec![a.id(), b.id()]);
        assert_eq!(added[0].bindings.get("g"), Some(&fx.symbols.symbol("cid")));
        assert_eq!(join.tokens().len(), 1);
    }

    #[test]
    fn test_same_pattern_twice_produces_each_pair_once() {
        let mut fx = Fixture::new();
        fx.pattern(1, "item", &["_"]);
        let mut join = JoinNode::new(10, vec![1, 1], &fx.memories);

        let (a, matched) = fx.assert("item", &["a"]);
        let first = join.activate(a.id(), &matched, &fx.memories);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].fact_ids, vec![a.id(), a.id()]);

        let (b, matched) = fx.assert("item", &["b"]);
        let second = join.activate(b.id(), &matched, &fx.memories);
        let mut pairs: Vec<Vec<FactId>> = second.into_iter().map(|t| t.fact_ids).collect();
        pairs.sort();
        assert_eq!(pairs, vec![vec![a.id(), b.id()], vec![b.id(), a.id()], vec![b.id(), b.id()]]);
        assert_eq!(join.tokens().len(), 4);
    }

    #[test]
    fn test_construction_matches_incremental_result() {
        let mut fx = Fixture::new();
        fx.pattern(1, "edge", &["a", "b"]);
        fx.pattern(2, "edge", &["b", "c"]);
        let mut incremental = JoinNode::new(10, vec![1, 2], &fx.memories);

        for (from, to) in [("x", "y"), ("y", "z"), ("z", "x"), ("y", "w")] {
            let (fact, matched) = fx.assert("edge", &[from, to]);
            incremental.activate(fact.id(), &matched, &fx.memories);
        }
        let rebuilt = JoinNode::new(11, vec![1, 2], &fx.memories);

        let mut left: Vec<_> = incremental.tokens().to_vec().into_iter().map(|t| t.fact_ids).collect();
        let mut right: Vec<_> = rebuilt.tokens().to_vec().into_iter().map(|t| t.fact_ids).collect();
        left.sort();
        right.sort();
        assert_eq!(left, right);
        assert_eq!(left.len(), 4);
    }

    #[test]
    fn test_retract_removes_partials() {
        let mut fx = Fixture::new();
        fx.pattern(1, "parent", &["p", "c"]);
        fx.pattern(2, "parent", &["c", "g"]);
        let mut join = JoinNode::new(10, vec![1, 2], &fx.memories);

        let (a, matched) = fx.assert("parent", &["ann", "bob"]);
        join.activate(a.id(), &matched, &fx.memories);
        let (b, matched) = fx.assert("parent", &["bob", "cid"]);
        join.activate(b.id(), &matched, &fx.memories);

        let removed = join.retract(a.id());
        assert_eq!(removed.len(), 1);
        assert!(join.tokens().is_empty());
        assert!(join.retract(a.id()).is_empty());
    }
}
