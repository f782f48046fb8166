use clasp_core::{Multifield, SymbolTable, Value, ValueKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_equal_symbols_intern_to_one_node(text in "[a-zA-Z0-9_-]{0,24}") {
        let table = SymbolTable::new();
        let first = table.intern_symbol(&text);
        let second = table.intern_symbol(&text);
        prop_assert_eq!(first.as_ptr(), second.as_ptr());
        prop_assert_eq!(first.ref_count(), 2);
    }

    #[test]
    fn test_equal_numbers_intern_to_one_node(i in any::<i64>(), f in any::<f64>()) {
        let table = SymbolTable::new();
        prop_assert_eq!(table.integer(i), table.integer(i));
        prop_assert_eq!(table.float(f), table.float(f));
    }

    #[test]
    fn test_distinct_integers_never_share_a_node(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let table = SymbolTable::new();
        prop_assert_ne!(table.integer(a), table.integer(b));
    }

    #[test]
    fn test_symbol_and_string_stay_distinct(text in "[a-z]{1,12}") {
        let table = SymbolTable::new();
        let symbol = table.symbol(&text);
        let string = table.string(&text);
        prop_assert_ne!(&symbol, &string);
        prop_assert_eq!(symbol.as_str(), string.as_str());
    }

    #[test]
    fn test_multifield_length_is_fixed(
        length in 0usize..32,
        writes in proptest::collection::vec((0i64..40, any::<i64>()), 0..64),
    ) {
        let table = SymbolTable::new();
        let mut mf = Multifield::with_length(length);
        for (index, value) in writes {
            let result = mf.set_value(index, table.integer(value));
            prop_assert_eq!(result.is_ok(), index >= 1 && index <= length as i64);
            prop_assert_eq!(mf.len(), length);
        }
    }

    #[test]
    fn test_set_then_get_round_trips(values in proptest::collection::vec(any::<i64>(), 1..16)) {
        let table = SymbolTable::new();
        let mut mf = Multifield::with_length(values.len());
        for (position, value) in values.iter().enumerate() {
            mf.set_value(position as i64 + 1, table.integer(*value)).unwrap();
        }
        for (position, value) in values.iter().enumerate() {
            let index = position as i64 + 1;
            prop_assert_eq!(mf.get_type(index).unwrap(), ValueKind::Integer);
            prop_assert_eq!(mf.get_value(index).unwrap().and_then(Value::as_integer), Some(*value));
        }
        prop_assert!(mf.is_complete());
    }
}

#[test]
fn test_purge_after_threshold_reclaims_dead_entries() {
    let table = SymbolTable::with_purge_threshold(8);
    for i in 0..7 {
        drop(table.intern_string(&format!("temp-{i}")));
    }
    assert_eq!(table.stats().dead_entries, 7);

    let _live = table.intern_string("kept");
    let stats = table.stats();
    assert_eq!(stats.dead_entries, 0);
    assert_eq!(stats.strings, 1);
}
