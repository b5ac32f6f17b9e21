// IdentityWeakMap property tests.
//
// Property 1: entry presence matches outstanding key owners.
//  - Model: per-key Vec of external `Tracked` owners plus the value last
//    stored under that allocation (None once removed or reclaimed).
//  - Invariant: len() == number of keys with a modelled value;
//               get(owner) == modelled value for every live key.
//  - Operations: insert, get, clone owner, drop one owner, remove,
//    drop all owners.
//
// Property 2: cascading reclamation through values.
//  - Model: nodes whose values hold owners of higher-numbered nodes (DAG),
//    plus a set of roots that keep an external owner.
//  - Invariant: after dropping the non-root owners, the surviving entries are
//    exactly the nodes reachable from the roots.
use proptest::prelude::*;
use weak_identity_map::{IdentityWeakMap, Tracked};

// Property 1: liveness equals outstanding owners per key.
proptest! {
    #[test]
    fn prop_weak_identity_map_liveness(keys in 1usize..=5, ops in proptest::collection::vec((0u8..=5u8, 0usize..100usize, any::<i32>()), 1..120)) {
        let mut m: IdentityWeakMap<usize, i32> = IdentityWeakMap::new();
        let mut owners: Vec<Vec<Tracked<usize>>> = vec![Vec::new(); keys];
        let mut model: Vec<Option<i32>> = vec![None; keys];

        for (op, raw_k, v) in ops {
            let k = raw_k % keys;
            match op {
                // Insert; allocates a fresh key when no owner exists.
                0 => {
                    if owners[k].is_empty() {
                        owners[k].push(Tracked::new(k));
                    }
                    let prev = m.insert(&owners[k][0], v);
                    prop_assert_eq!(prev, model[k]);
                    model[k] = Some(v);
                }
                // Get through any owner.
                1 => {
                    if let Some(o) = owners[k].last() {
                        prop_assert_eq!(m.get(o).copied(), model[k]);
                    }
                }
                // Clone one owner.
                2 => {
                    if let Some(o) = owners[k].last() {
                        let c = o.clone();
                        owners[k].push(c);
                    }
                }
                // Drop one owner; the last one takes the entry with it.
                3 => {
                    if owners[k].pop().is_some() && owners[k].is_empty() {
                        model[k] = None;
                    }
                }
                // Explicit remove.
                4 => {
                    if let Some(o) = owners[k].last() {
                        prop_assert_eq!(m.remove(o), model[k].take());
                    }
                }
                // Drop every owner.
                5 => {
                    owners[k].clear();
                    model[k] = None;
                }
                _ => unreachable!(),
            }

            let expected_len = model.iter().filter(|v| v.is_some()).count();
            prop_assert_eq!(m.len(), expected_len);
            if let Some(o) = owners[k].first() {
                prop_assert_eq!(m.contains_key(o), model[k].is_some());
            }
        }

        drop(owners);
        prop_assert!(m.is_empty());
    }
}

fn closure(n: usize, roots: &[bool], adj: &[Vec<usize>]) -> Vec<bool> {
    let mut alive = roots.to_vec();
    // Edges only point forward, so one pass in index order suffices.
    for i in 0..n {
        if alive[i] {
            for &j in &adj[i] {
                alive[j] = true;
            }
        }
    }
    alive
}

// Property 2: cascading reclamation follows reachability.
proptest! {
    #[test]
    fn prop_cascading_reclamation(edges in proptest::collection::vec((0usize..8, 0usize..8), 0..24), roots in proptest::collection::vec(any::<bool>(), 8)) {
        let n = 8;
        let mut m: IdentityWeakMap<usize, Vec<Tracked<usize>>> = IdentityWeakMap::new();
        let keys: Vec<Tracked<usize>> = (0..n).map(Tracked::new).collect();
        for k in &keys {
            m.insert(k, Vec::new());
        }

        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (a, b) in edges {
            if a == b {
                continue;
            }
            let (i, j) = (a.min(b), a.max(b));
            m.get_mut(&keys[i]).unwrap().push(keys[j].clone());
            adj[i].push(j);
        }

        let held: Vec<Option<Tracked<usize>>> = keys
            .into_iter()
            .zip(&roots)
            .map(|(k, &root)| if root { Some(k) } else { None })
            .collect();

        let alive = closure(n, &roots, &adj);
        prop_assert_eq!(m.len(), alive.iter().filter(|&&a| a).count());
        for h in held.iter().flatten() {
            prop_assert!(m.contains_key(h));
        }
        let mut surviving: Vec<usize> = m.keys().iter().map(|k| **k).collect();
        surviving.sort();
        let expected: Vec<usize> = (0..n).filter(|&t| alive[t]).collect();
        prop_assert_eq!(surviving, expected);

        drop(held);
        prop_assert!(m.is_empty());
    }
}
