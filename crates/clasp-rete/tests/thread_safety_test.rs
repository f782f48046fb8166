use clasp_rete::{Constraint, Environment, PatternBuilder};
use std::sync::Arc;
use std::thread;

#[test]
fn test_readers_run_alongside_a_writer() {
    let env = Arc::new(Environment::new());
    env.assert_ordered("reading", vec![env.symbol("sensor-0"), env.integer(0)]).unwrap();
    let pattern = PatternBuilder::new("reading").field(Constraint::variable("s")).field(Constraint::variable("v"));
    let pattern_id = env.add_pattern(&pattern).unwrap();

    let writer = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for i in 1..=200 {
                let id = env
                    .assert_ordered("reading", vec![env.symbol(&format!("sensor-{}", i % 8)), env.integer(i)])
                    .unwrap()
                    .fact_id;
                if i % 4 == 0 {
                    env.retract(id).unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let env = Arc::clone(&env);
            let pattern = pattern.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let snapshot = env.snapshot();
                    let live = snapshot.template_fact_count("reading").unwrap();
                    let matches = snapshot.pattern_matches(pattern_id).unwrap();
                    let queried = snapshot.query(&pattern).unwrap();

                    assert_eq!(matches.len(), live);
                    assert_eq!(queried.len(), live);
                    assert_eq!(snapshot.fact_count(), live);
                    for token in matches.iter().chain(&queried) {
                        assert!(snapshot.contains(token.fact_id()), "token for dead fact {}", token.fact_id());
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(env.fact_count(), 151);
    assert_eq!(env.pattern_matches(pattern_id).unwrap().len(), 151);
    assert_eq!(env.query(&pattern).unwrap().len(), 151);

    let ids = env.fact_ids();
    assert_eq!(ids.len(), 151);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_ordered_assert_races_template_removal() {
    let env = Arc::new(Environment::new());

    let asserter = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for i in 0..300 {
                let id = env.assert_ordered("p", vec![env.integer(i)]).unwrap().fact_id;
                env.retract(id).unwrap();
            }
        })
    };
    let remover = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for _ in 0..300 {
                let _ = env.undefine_template("p");
            }
        })
    };

    asserter.join().unwrap();
    remover.join().unwrap();
    assert_eq!(env.fact_count(), 0);
}

#[test]
fn test_concurrent_interning_shares_nodes() {
    let env = Arc::new(Environment::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let env = Arc::clone(&env);
            thread::spawn(move || (0..100).map(|i| env.symbol(&format!("s{i}"))).collect::<Vec<_>>())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for values in &results[1..] {
        assert_eq!(values, &results[0]);
    }
    assert_eq!(env.stats().symbols.symbols, 100);
}
