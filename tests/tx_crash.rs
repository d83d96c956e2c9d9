use permap::{RadixTree, Region};
use tempfile::tempdir;

fn seed_region(path: &std::path::Path) -> Region {
    let mut region = Region::create(path, 64 * 1024).unwrap();
    let mut tx = region.begin().unwrap();
    let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
    for (k, v) in [(b"alpha".as_slice(), 1u64), (b"beta", 2), (b"gamma", 3)] {
        tree.try_emplace(k, v).unwrap();
    }
    drop(tree);
    tx.commit().unwrap();
    region
}

fn assert_seed_state(region: &Region) {
    let reader = region.reader::<u64>().unwrap();
    assert_eq!(reader.len().unwrap(), 3);
    assert_eq!(reader.get(b"alpha").unwrap(), Some(1));
    assert_eq!(reader.get(b"beta").unwrap(), Some(2));
    assert_eq!(reader.get(b"gamma").unwrap(), Some(3));
    assert_eq!(reader.get(b"delta").unwrap(), None);
}

#[test]
fn explicit_abort_restores_find_results() {
    let dir = tempdir().unwrap();
    let mut region = seed_region(&dir.path().join("t.region"));

    let mut tx = region.begin().unwrap();
    let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
    tree.try_emplace(b"delta", 4).unwrap();
    tree.erase(b"alpha").unwrap();
    tree.update(b"beta", &99).unwrap();
    drop(tree);
    tx.abort().unwrap();

    assert_seed_state(&region);
}

#[test]
fn dropped_transaction_restores_find_results() {
    let dir = tempdir().unwrap();
    let mut region = seed_region(&dir.path().join("t.region"));

    {
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        tree.try_emplace(b"delta", 4).unwrap();
        tree.erase(b"gamma").unwrap();
        // Dropped without commit: every early-return path in caller code
        // gets this behavior.
    }

    assert_seed_state(&region);
}

#[test]
fn crash_mid_transaction_recovers_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");
    let mut region = seed_region(&path);

    // Simulate a hard crash: mutate inside a transaction, then leak the
    // transaction so neither commit nor rollback runs, and drop the region
    // with the undo log still on disk.
    {
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        tree.try_emplace(b"delta", 4).unwrap();
        tree.erase(b"alpha").unwrap();
        tree.try_emplace(b"epsilon", 5).unwrap();
        drop(tree);
        std::mem::forget(tx);
    }
    drop(region);

    let undo = path.with_file_name("t.region.undo");
    assert!(undo.exists());
    assert!(std::fs::metadata(&undo).unwrap().len() > 0);

    // Reopen replays the undo log; the interrupted transaction vanishes.
    let region = Region::open(&path).unwrap();
    assert!(!undo.exists());
    assert_seed_state(&region);
}

#[test]
fn crash_before_any_write_is_harmless() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");
    let mut region = seed_region(&path);

    {
        let tx = region.begin().unwrap();
        std::mem::forget(tx);
    }
    drop(region);

    let region = Region::open(&path).unwrap();
    assert_seed_state(&region);
}

#[test]
fn recovered_region_accepts_new_transactions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.region");
    let mut region = seed_region(&path);

    {
        let mut tx = region.begin().unwrap();
        let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
        tree.erase(b"beta").unwrap();
        drop(tree);
        std::mem::forget(tx);
    }
    drop(region);

    let mut region = Region::open(&path).unwrap();
    assert_seed_state(&region);

    let mut tx = region.begin().unwrap();
    let mut tree = RadixTree::<_, u64>::new(&mut tx).unwrap();
    tree.try_emplace(b"delta", 4).unwrap();
    drop(tree);
    tx.commit().unwrap();

    let reader = region.reader::<u64>().unwrap();
    assert_eq!(reader.len().unwrap(), 4);
    assert_eq!(reader.get(b"delta").unwrap(), Some(4));
}
