use clasp_core::{SlotDefinition, TemplateBuilder};
use clasp_rete::{Constraint, Environment, MatchEvent, MatchSource, PatternBuilder, Token};
use proptest::prelude::*;

fn pair_environment() -> Environment {
    let env = Environment::new();
    env.define_template(
        TemplateBuilder::new("T").slot(SlotDefinition::single("x")).slot(SlotDefinition::single("y")),
    )
    .unwrap();
    env
}

fn fact_sets(tokens: &[Token]) -> Vec<Vec<u64>> {
    let mut ids: Vec<Vec<u64>> = tokens.iter().map(|t| t.fact_ids.clone()).collect();
    ids.sort();
    ids
}

#[test]
fn test_literal_slot_selects_matching_facts() {
    let env = pair_environment();
    let a1 = env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.integer(1))]).unwrap().fact_id;
    env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.integer(2))]).unwrap();
    let b1 = env.assert_fact("T", vec![("x", env.symbol("b")), ("y", env.integer(1))]).unwrap().fact_id;

    let pattern = PatternBuilder::new("T").slot("x", Constraint::variable("?x")).slot("y", env.integer(1));
    let tokens = env.query(&pattern).unwrap();

    assert_eq!(fact_sets(&tokens), vec![vec![a1], vec![b1]]);
    let bound: Vec<_> = tokens.iter().map(|t| t.bindings.get("x").cloned()).collect();
    assert_eq!(bound, vec![Some(env.symbol("a")), Some(env.symbol("b"))]);
}

#[test]
fn test_repeated_variable_requires_equal_slots() {
    let env = pair_environment();
    let aa = env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.symbol("a"))]).unwrap().fact_id;
    env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.symbol("b"))]).unwrap();

    let pattern = PatternBuilder::new("T")
        .slot("x", Constraint::variable("x"))
        .slot("y", Constraint::variable("x"));
    let pattern_id = env.add_pattern(&pattern).unwrap();

    assert_eq!(fact_sets(&env.query(&pattern).unwrap()), vec![vec![aa]]);
    assert_eq!(fact_sets(&env.pattern_matches(pattern_id).unwrap()), vec![vec![aa]]);
}

#[test]
fn test_registered_pattern_tracks_assert_and_retract() {
    let env = pair_environment();
    let pattern_id = env
        .add_pattern(&PatternBuilder::new("T").slot("x", Constraint::variable("x")).slot("y", env.integer(1)))
        .unwrap();

    let hit = env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.integer(1))]).unwrap();
    let miss = env.assert_fact("T", vec![("x", env.symbol("a")), ("y", env.integer(2))]).unwrap();
    assert_eq!(hit.events.len(), 1);
    assert!(miss.events.is_empty());

    let removed = env.retract(hit.fact_id).unwrap();
    assert!(matches!(
        removed.events.as_slice(),
        [MatchEvent::Removed { source: MatchSource::Pattern(id), .. }] if *id == pattern_id
    ));
    assert!(env.pattern_matches(pattern_id).unwrap().is_empty());
}

#[test]
fn test_ordered_patterns_match_by_position() {
    let env = Environment::new();
    for (who, age) in [("ann", 30), ("bob", 41), ("cid", 30)] {
        env.assert_ordered("person", vec![env.symbol(who), env.integer(age)]).unwrap();
    }
    env.assert_ordered("person", vec![env.symbol("dee")]).unwrap();

    let thirty = PatternBuilder::new("person").field(Constraint::variable("who")).field(env.integer(30));
    let names: Vec<_> = env
        .query(&thirty)
        .unwrap()
        .into_iter()
        .filter_map(|t| t.bindings.get("who").and_then(|v| v.as_str().map(str::to_string)))
        .collect();
    assert_eq!(names, vec!["ann", "cid"]);

    let single = PatternBuilder::new("person").field(Constraint::Wildcard);
    assert_eq!(env.query(&single).unwrap().len(), 1);
}

#[test]
fn test_join_links_grandparents() {
    let env = Environment::new();
    env.assert_ordered("parent", vec![env.symbol("ann"), env.symbol("bob")]).unwrap();

    let upper = env
        .add_pattern(&PatternBuilder::new("parent").field(Constraint::variable("g")).field(Constraint::variable("p")))
        .unwrap();
    let lower = env
        .add_pattern(&PatternBuilder::new("parent").field(Constraint::variable("p")).field(Constraint::variable("c")))
        .unwrap();
    let join = env.add_join(&[upper, lower]).unwrap();
    assert!(env.join_tokens(join).unwrap().is_empty());

    let change = env.assert_ordered("parent", vec![env.symbol("bob"), env.symbol("cid")]).unwrap();
    let joined: Vec<&Token> = change
        .events
        .iter()
        .filter(|e| e.source() == MatchSource::Join(join))
        .map(MatchEvent::token)
        .collect();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].bindings.get("g"), Some(&env.symbol("ann")));
    assert_eq!(joined[0].bindings.get("c"), Some(&env.symbol("cid")));

    let first = joined[0].fact_id();
    let retracted = env.retract(first).unwrap();
    assert!(retracted.events.iter().any(|e| e.source() == MatchSource::Join(join) && !e.is_added()));
    assert!(env.join_tokens(join).unwrap().is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Assert(u8, u8),
    Retract(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4, 0u8..4).prop_map(|(a, b)| Op::Assert(a, b)),
        1 => (0usize..16).prop_map(Op::Retract),
    ]
}

proptest! {
    #[test]
    fn test_incremental_state_equals_fresh_evaluation(ops in proptest::collection::vec(op(), 1..40)) {
        let env = Environment::new();
        env.assert_ordered("edge", vec![env.integer(0), env.integer(0)]).unwrap();

        let from = PatternBuilder::new("edge").field(Constraint::variable("a")).field(Constraint::variable("b"));
        let to = PatternBuilder::new("edge").field(Constraint::variable("b")).field(Constraint::variable("c"));
        let loops = PatternBuilder::new("edge").field(Constraint::variable("a")).field(env.integer(1));
        let from_id = env.add_pattern(&from).unwrap();
        let to_id = env.add_pattern(&to).unwrap();
        let loops_id = env.add_pattern(&loops).unwrap();
        let join = env.add_join(&[from_id, to_id]).unwrap();

        for op in ops {
            match op {
                Op::Assert(a, b) => {
                    env.assert_ordered("edge", vec![env.integer(a.into()), env.integer(b.into())]).unwrap();
                }
                Op::Retract(n) => {
                    let ids = env.fact_ids();
                    if !ids.is_empty() {
                        env.retract(ids[n % ids.len()]).unwrap();
                    }
                }
            }
        }

        prop_assert_eq!(fact_sets(&env.pattern_matches(from_id).unwrap()), fact_sets(&env.query(&from).unwrap()));
        prop_assert_eq!(fact_sets(&env.pattern_matches(loops_id).unwrap()), fact_sets(&env.query(&loops).unwrap()));

        let rebuilt = env.add_join(&[from_id, to_id]).unwrap();
        prop_assert_eq!(fact_sets(&env.join_tokens(join).unwrap()), fact_sets(&env.join_tokens(rebuilt).unwrap()));
    }
}
