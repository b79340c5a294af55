mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

use std::error::Error;

use keymap_store::types::test_types::Tag;
use keymap_store::{Key256, KeyMap};

fn key(w0: u64, w1: u64, w2: u64, w3: u64) -> Key256 {
    Key256::from_words(w0, w1, w2, w3)
}

#[test]
fn split_a_range_of_keys() -> Result<(), Box<dyn Error>> {
    common::init();
    let m = KeyMap::from_list(
        (0u64..128).map(|i| (key(i, 0, 0, 0), i as u32)),
    );
    let (lo, exact, hi) = m.split_lookup(&key(64, 0, 0, 0));
    lo.check_valid()?;
    hi.check_valid()?;

    assert_eq!(lo.len(), 64);
    assert_eq!(
        lo.keys().map(|k| k.to_words()[0]).collect::<Vec<_>>(),
        (0..64).collect::<Vec<_>>()
    );
    assert_eq!(exact.as_deref(), Some(&64));
    assert_eq!(hi.len(), 63);
    assert!(hi.keys().all(|k| k.to_words()[0] > 64));
    Ok(())
}

#[test]
fn split_reassembles_to_the_original() -> Result<(), Box<dyn Error>> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..40 {
        let m = KeyMap::from_list((0..60).map(|_| {
            (
                key(rng.random_range(0..3), 0, 0, rng.random_range(0..64)),
                rng.random::<u32>(),
            )
        }));
        let probe = key(rng.random_range(0..3), 0, 0, rng.random_range(0..64));
        let (lo, exact, hi) = m.split_lookup(&probe);
        lo.check_valid()?;
        hi.check_valid()?;

        assert!(lo.keys().all(|k| *k < probe));
        assert!(hi.keys().all(|k| *k > probe));
        assert_eq!(exact.as_deref(), m.get(&probe));

        let mut reassembled = lo.union(&hi);
        if let Some(v) = exact {
            reassembled = reassembled.insert_shared(probe, v);
        }
        assert_eq!(reassembled, m);
    }
    Ok(())
}

#[test]
fn split_on_absent_and_out_of_range_keys() -> Result<(), Box<dyn Error>> {
    let m = KeyMap::from_list(
        [1u64, 5, 9].map(|i| (key(0, 0, 0, i), i as u32)),
    );

    let (lo, exact, hi) = m.split_lookup(&key(0, 0, 0, 4));
    assert_eq!(lo.len(), 1);
    assert_eq!(exact, None);
    assert_eq!(hi.len(), 2);
    lo.check_valid()?;
    hi.check_valid()?;

    let (lo, exact, hi) = m.split_lookup(&key(0, 0, 0, 0));
    assert!(lo.is_empty());
    assert_eq!(exact, None);
    assert_eq!(hi.len(), 3);

    let (lo, exact, hi) = m.split_lookup(&key(1, 0, 0, 0));
    assert_eq!(lo.len(), 3);
    assert_eq!(exact, None);
    assert!(hi.is_empty());
    Ok(())
}

#[test]
fn folds_visit_keys_in_order() {
    let m = KeyMap::from_list(
        (0u64..200).map(|i| (key(i % 4, 0, i % 9, i), i as u32)),
    );

    let asc = m.fold_asc(Vec::new(), |mut acc, k, _| {
        acc.push(*k);
        acc
    });
    assert_eq!(asc.len(), 200);
    assert!(asc.windows(2).all(|w| w[0] < w[1]));

    let desc = m.fold_desc(Vec::new(), |mut acc, k, _| {
        acc.push(*k);
        acc
    });
    let mut reversed = desc.clone();
    reversed.reverse();
    assert_eq!(asc, reversed);

    // The iterator agrees with the ascending fold.
    let iterated: Vec<_> = m.iter().map(|(k, _)| *k).collect();
    assert_eq!(iterated, asc);
}

#[test]
fn min_and_max_views() -> Result<(), Box<dyn Error>> {
    common::init();
    let m = KeyMap::from_list(
        [7u64, 3, 11, 5].map(|i| (key(0, 0, 0, i), i as u32)),
    );

    assert_eq!(m.lookup_min().map(|(k, v)| (k.to_words()[3], *v)), Some((3, 3)));
    assert_eq!(
        m.lookup_max().map(|(k, v)| (k.to_words()[3], *v)),
        Some((11, 11))
    );

    let ((k, v), rest) = m.min_view().unwrap();
    assert_eq!((k, *v), (key(0, 0, 0, 3), 3));
    rest.check_valid()?;
    assert_eq!(rest.len(), 3);
    assert_eq!(rest.get(&k), None);

    let ((k, v), rest) = m.max_view().unwrap();
    assert_eq!((k, *v), (key(0, 0, 0, 11), 11));
    rest.check_valid()?;
    assert_eq!(rest.len(), 3);

    // Draining by min view yields the ascending entry list.
    let mut drained = Vec::new();
    let mut cur = m.clone();
    while let Some(((k, _), rest)) = cur.min_view() {
        rest.check_valid()?;
        drained.push(k);
        cur = rest;
    }
    assert_eq!(drained.len(), 4);
    assert!(drained.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn lub_finds_the_least_upper_bound() {
    let m = KeyMap::from_list(
        [2u64, 4, 8].map(|i| (key(0, 0, 0, i), i as u32)),
    );

    // Exact hit: the entry itself plus everything above it.
    let ((k, v), rest) = m.lub(&key(0, 0, 0, 4)).unwrap();
    assert_eq!((k.to_words()[3], *v), (4, 4));
    assert_eq!(rest.len(), 1);

    // Between keys: the next one up.
    let ((k, _), rest) = m.lub(&key(0, 0, 0, 5)).unwrap();
    assert_eq!(k.to_words()[3], 8);
    assert!(rest.is_empty());

    // Above the maximum there is nothing.
    assert!(m.lub(&key(0, 0, 0, 9)).is_none());
}

#[test]
fn map_and_traverse_preserve_keys() -> Result<(), Box<dyn Error>> {
    let m = KeyMap::from_list(
        (0u64..40).map(|i| (key(0, 0, 0, i), i as u32)),
    );

    let doubled = m.map_with_key(|_, v| v * 2);
    doubled.check_valid()?;
    assert_eq!(doubled.len(), 40);
    for (k, v) in m.iter() {
        assert_eq!(doubled.get(k), Some(&(v * 2)));
    }

    let odd_out: Result<KeyMap<u32>, String> = m.traverse_with_key(|k, v| {
        if v % 2 == 0 {
            Ok(*v)
        } else {
            Err(format!("odd value at {}", k))
        }
    });
    assert!(odd_out.is_err());

    let all_ok: Result<KeyMap<u32>, String> =
        m.traverse_with_key(|_, v| Ok(v + 1));
    let all_ok = all_ok.unwrap();
    all_ok.check_valid()?;
    assert_eq!(all_ok.get(&key(0, 0, 0, 7)), Some(&8));
    Ok(())
}

#[test]
fn serde_round_trip() -> Result<(), Box<dyn Error>> {
    let m = KeyMap::from_list(
        (0u64..25).map(|i| (key(i, i * i, 0, i), Tag(i as u32))),
    );
    let encoded = serde_json::to_string(&m)?;
    let decoded: KeyMap<Tag> = serde_json::from_str(&encoded)?;
    decoded.check_valid()?;
    assert_eq!(decoded, m);
    Ok(())
}

#[test]
fn stats_describe_the_shape() {
    let empty: KeyMap<u32> = KeyMap::new();
    let stats = empty.stats();
    assert_eq!(stats.leaf_count, 0);
    assert_eq!(stats.interior_count(), 0);

    let m = KeyMap::from_list(
        (0u64..64).map(|seg| (key(seg << 54, 0, 0, 0), seg as u32)),
    );
    let stats = m.stats();
    assert_eq!(stats.leaf_count, 64);
    // One single-slot node over one full node.
    assert_eq!(stats.child_histogram[0], 1);
    assert_eq!(stats.child_histogram[63], 1);
    assert_eq!(stats.interior_count(), 2);
    assert_eq!(stats.nodes_per_depth[0].count, 1);
    assert_eq!(stats.nodes_per_depth[1].count, 1);
    assert_eq!(stats.nodes_per_depth[2].count, 64);
}

#[test]
fn ordering_of_maps_matches_entry_lists() {
    let a = KeyMap::from_list(vec![(key(0, 0, 0, 1), 1u32)]);
    let b = KeyMap::from_list(vec![(key(0, 0, 0, 1), 1u32)]);
    assert_eq!(a, b);
    assert!(!a.same_version(&b));
    assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);

    let c = b.insert(key(0, 0, 0, 2), 2);
    assert_ne!(a, c);
    // A map that is a strict prefix of another orders below it.
    assert!(a < c);

    // The first differing entry decides, exactly as for the entry lists.
    let low = KeyMap::from_list(vec![
        (key(0, 0, 0, 1), 1u32),
        (key(0, 0, 0, 9), 9),
    ]);
    let high = KeyMap::from_list(vec![
        (key(0, 0, 0, 2), 0u32),
    ]);
    assert!(low < high);
    assert!(
        low.to_list().into_iter().map(|(k, v)| (k, *v)).collect::<Vec<_>>()
            < high.to_list().into_iter().map(|(k, v)| (k, *v)).collect::<Vec<_>>()
    );

    // Same keys, ordered by value.
    let small = KeyMap::from_list(vec![(key(0, 0, 0, 1), 1u32)]);
    let large = KeyMap::from_list(vec![(key(0, 0, 0, 1), 2u32)]);
    assert!(small < large);
    assert_eq!(small.partial_cmp(&large), Some(std::cmp::Ordering::Less));
}
