// Model-based property tests.
//
// Each map is driven through the shared `KeyValueMap` trait by a random
// sequence of inserts, removes and lookups, mirrored into a
// `std::collections::HashMap`. After every step the map must agree with the
// model on the operation's result and on `len()`; at the end every model
// entry must be retrievable.
//
// Keys are drawn from a small range so updates, removes of present keys and
// re-inserts after removal all occur often.
use std::collections::HashMap;

use cuckoo_map::ChainedMap;
use cuckoo_map::CuckooConfig;
use cuckoo_map::CuckooMap;
use cuckoo_map::DisplacementBound;
use cuckoo_map::KeyValueMap;
use cuckoo_map::LinearProbingMap;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
}

fn op(key_space: u16) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..key_space, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..key_space).prop_map(Op::Remove),
        2 => (0..key_space).prop_map(Op::Get),
    ]
}

fn check_against_model<M: KeyValueMap<u16, u32>>(
    map: &mut M,
    ops: &[Op],
) -> Result<(), TestCaseError> {
    let mut model: HashMap<u16, u32> = HashMap::new();

    for op in ops {
        match *op {
            Op::Insert(k, v) => {
                let previous = map.insert(k, v);
                prop_assert_eq!(previous, Ok(model.insert(k, v)));
            }
            Op::Remove(k) => {
                prop_assert_eq!(map.remove(k), model.remove(&k));
            }
            Op::Get(k) => {
                prop_assert_eq!(map.get(k), model.get(&k).copied());
            }
        }
        prop_assert_eq!(map.len(), model.len());
        prop_assert_eq!(map.is_empty(), model.is_empty());
    }

    for (&k, &v) in &model {
        prop_assert_eq!(map.get(k), Some(v));
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_cuckoo_matches_model(
        seed in any::<u64>(),
        capacity in 0usize..64,
        ops in proptest::collection::vec(op(512), 1..600),
    ) {
        let config = CuckooConfig::default()
            .with_seed(seed)
            .with_initial_capacity(capacity);
        let mut map = CuckooMap::with_config(config).unwrap();
        check_against_model(&mut map, &ops)?;
        prop_assert!(map.load_factor() <= map.config().max_load_factor());
    }

    #[test]
    fn prop_cuckoo_logarithmic_bound_matches_model(
        seed in any::<u64>(),
        factor in 3usize..6,
        ops in proptest::collection::vec(op(2048), 1..1500),
    ) {
        let config = CuckooConfig::default()
            .with_seed(seed)
            .with_displacement_bound(DisplacementBound::Logarithmic { factor });
        let mut map = CuckooMap::with_config(config).unwrap();
        check_against_model(&mut map, &ops)?;
    }

    #[test]
    fn prop_chained_matches_model(
        capacity in 0usize..64,
        ops in proptest::collection::vec(op(512), 1..600),
    ) {
        let mut map = ChainedMap::try_with_capacity(capacity).unwrap();
        check_against_model(&mut map, &ops)?;
    }

    #[test]
    fn prop_linear_probing_matches_model(
        capacity in 0usize..64,
        ops in proptest::collection::vec(op(512), 1..600),
    ) {
        let mut map = LinearProbingMap::try_with_capacity(capacity).unwrap();
        check_against_model(&mut map, &ops)?;
        prop_assert!(
            (map.len() + map.tombstones()) as f64 <= 0.75 * map.capacity() as f64
        );
    }
}
