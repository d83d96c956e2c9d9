use std::collections::BTreeMap;

use permap::{RadixTree, Region};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_pairs(seed: u64, n: usize) -> BTreeMap<Vec<u8>, u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = BTreeMap::new();
    while pairs.len() < n {
        let len = rng.gen_range(1..32);
        let key: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let value = rng.gen();
        pairs.entry(key).or_insert(value);
    }
    pairs
}

#[test]
fn random_round_trip_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");
    let pairs = random_pairs(42, 500);

    {
        let mut region = Region::create(&path, 64 * 1024).unwrap();
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        for (key, value) in &pairs {
            let (_, inserted) = tree.try_emplace(key, *value).unwrap();
            assert!(inserted);
        }
        drop(tree);
        tx.commit().unwrap();
    }

    let region = Region::open(&path).unwrap();
    let reader = region.reader::<u64>().unwrap();
    assert_eq!(reader.len().unwrap(), pairs.len() as u64);

    for (key, value) in &pairs {
        assert_eq!(reader.get(key).unwrap(), Some(*value));
    }

    // Iteration order must match the reference map exactly.
    let mut cursor = reader.cursor_first().unwrap();
    let mut iterated = Vec::new();
    while cursor.valid() {
        iterated.push((
            cursor.key(&region).unwrap().to_vec(),
            cursor.value(&region).unwrap(),
        ));
        if !cursor.advance(&region).unwrap() {
            break;
        }
    }
    let expected: Vec<(Vec<u8>, u64)> =
        pairs.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(iterated, expected);
}

#[test]
fn mutations_accumulate_over_many_transactions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");
    let pairs = random_pairs(7, 200);

    {
        let mut region = Region::create(&path, 64 * 1024).unwrap();
        // One transaction per entry, reopening the tree handle each time.
        for (key, value) in &pairs {
            let mut tx = region.begin().unwrap();
            let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
            tree.try_emplace(key, *value).unwrap();
            drop(tree);
            tx.commit().unwrap();
        }
    }

    let region = Region::open(&path).unwrap();
    let reader = region.reader::<u64>().unwrap();
    assert_eq!(reader.len().unwrap(), pairs.len() as u64);
    for (key, value) in &pairs {
        assert_eq!(reader.get(key).unwrap(), Some(*value));
    }
}

#[test]
fn updated_values_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");

    {
        let mut region = Region::create(&path, 64 * 1024).unwrap();
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        tree.try_emplace(b"counter", 1).unwrap();
        drop(tree);
        tx.commit().unwrap();

        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        assert!(tree.update(b"counter", &99).unwrap());
        drop(tree);
        tx.commit().unwrap();
    }

    let region = Region::open(&path).unwrap();
    assert_eq!(region.reader::<u64>().unwrap().get(b"counter").unwrap(), Some(99));
}

#[test]
fn value_size_guard_rejects_wrong_type_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");

    {
        let mut region = Region::create(&path, 64 * 1024).unwrap();
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        tree.try_emplace(b"k", 1).unwrap();
        drop(tree);
        tx.commit().unwrap();
    }

    let mut region = Region::open(&path).unwrap();
    assert!(region.reader::<u32>().is_err());
    assert!(region.reader::<u64>().is_ok());

    let mut tx = region.begin().unwrap();
    assert!(RadixTree::<_, u32>::new(&mut tx).is_err());
    drop(tx);
    let mut tx = region.begin().unwrap();
    assert!(RadixTree::<_, u64>::new(&mut tx).is_ok());
    drop(tx);
}

#[test]
fn region_grows_under_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");

    let mut region = Region::create(&path, 4096).unwrap();
    let initial = region.len();

    let mut tx = region.begin().unwrap();
    let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
    for i in 0..500u64 {
        tree.try_emplace(format!("grow-key-{i:05}").as_bytes(), i).unwrap();
    }
    drop(tree);
    tx.commit().unwrap();

    assert!(region.len() > initial);
    let reader = region.reader::<u64>().unwrap();
    assert_eq!(reader.len().unwrap(), 500);
    assert_eq!(reader.get(b"grow-key-00499").unwrap(), Some(499));
}
