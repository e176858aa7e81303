//! End-to-end scenarios exercising the structural mutations through
//! the public API: cell splits, push-downs on full cells, push-ups and
//! merges on deletion, and the operation counters tied to them.

use cbtree::CbTree;

// ─── Ordering scenarios ──────────────────────────────────────────────────────

#[test]
fn signed_keys_iterate_in_numeric_order() {
    let mut tree: CbTree<i32> = CbTree::new();
    for v in [-3, 7, 0, -128, 127, 1] {
        assert!(tree.insert(v).is_ok());
    }
    let ascending: Vec<i32> = tree.iter().copied().collect();
    assert_eq!(ascending, [-128, -3, 0, 1, 7, 127]);
    let descending: Vec<i32> = tree.iter().rev().copied().collect();
    assert_eq!(descending, [127, 7, 1, 0, -3, -128]);
}

#[test]
fn string_prefixes_iterate_lexicographically() {
    let mut tree: CbTree<String> = CbTree::new();
    for s in ["abc", "abc1", "abcd", "ab"] {
        assert!(tree.insert(s.to_string()).is_ok());
    }
    let sorted: Vec<&str> = tree.iter().map(String::as_str).collect();
    assert_eq!(sorted, ["ab", "abc", "abc1", "abcd"]);
    assert_eq!(tree.get("abc1").map(String::as_str), Some("abc1"));
    assert_eq!(tree.get("abc2"), None);
    assert_eq!(tree.get("a"), None);
}

// ─── Structural mutation scenarios ───────────────────────────────────────────

#[test]
fn filling_the_root_cell_then_splitting_it() {
    let mut tree: CbTree<u32> = CbTree::new();

    // Nine objects need eight nodes, which is exactly one full cell.
    for i in 0..9 {
        tree.insert(i * 7).unwrap();
    }
    assert_eq!(tree.stats().cells, 1);
    assert_eq!(tree.stats().splits, 0);

    // The tenth does not fit; the cell must split in two.
    tree.insert(63).unwrap();
    assert_eq!(tree.stats().splits, 1);
    assert_eq!(tree.stats().cells, 2);

    for i in 0..10 {
        assert_eq!(tree.get(&(i * 7)), Some(&(i * 7)));
    }
    let keys: Vec<u32> = tree.iter().copied().collect();
    let expected: Vec<u32> = (0..10).map(|i| i * 7).collect();
    assert_eq!(keys, expected);
}

#[test]
fn deleting_back_down_to_one_cell() {
    let mut tree: CbTree<u32> = CbTree::new();
    for i in 0..10 {
        tree.insert(i * 7).unwrap();
    }
    assert_eq!(tree.stats().cells, 2);

    for key in [0, 7, 14, 21] {
        assert_eq!(tree.remove(&key), Some(key));
    }
    let stats = tree.stats();
    assert_eq!(stats.cells, 1, "six objects fit in a single cell again");
    assert!(stats.pushups + stats.merges + stats.mergedowns >= 1);

    let keys: Vec<u32> = tree.iter().copied().collect();
    assert_eq!(keys, [28, 35, 42, 49, 56, 63]);
    for key in &keys {
        assert!(tree.contains(key));
    }
}

#[test]
fn duplicate_keys_are_rejected() {
    let mut tree: CbTree<u64> = CbTree::new();
    assert!(tree.insert(0xdead_beef).is_ok());
    let rejected = tree.insert(0xdead_beef).unwrap_err();
    assert_eq!(rejected.into_inner(), 0xdead_beef);
    assert_eq!(tree.len(), 1);
}

// ─── Boundary behaviors ──────────────────────────────────────────────────────

#[test]
fn empty_tree() {
    let mut tree: CbTree<u32> = CbTree::new();
    assert!(tree.is_empty());
    assert_eq!(tree.get(&0), None);
    assert_eq!(tree.first(), None);
    assert_eq!(tree.last(), None);
    assert_eq!(tree.remove(&0), None);
    assert_eq!(tree.iter().count(), 0);
    tree.clear();
    assert!(tree.is_empty());
}

#[test]
fn singleton_tree() {
    let mut tree: CbTree<u32> = CbTree::new();
    tree.insert(5).unwrap();
    assert_eq!(tree.first(), tree.last());
    let (obj, mut cur) = tree.first_with_cursor().unwrap();
    assert_eq!(*obj, 5);
    assert_eq!(tree.next(&mut cur), None);
    assert_eq!(tree.prev(&mut cur), None);
    assert_eq!(tree.iter().count(), 1);
}

#[test]
fn key_bit_limit_collapses_longer_keys() {
    // With a 16-bit comparison limit, keys are indexed by their first
    // two bytes only.
    let mut tree: CbTree<String> = CbTree::with_key_bits(16);
    assert!(tree.insert("ab-first".to_string()).is_ok());
    assert!(tree.insert("ab-second".to_string()).is_err());
    assert!(tree.insert("ac-other".to_string()).is_ok());
    assert_eq!(tree.get("ab").map(String::as_str), Some("ab-first"));
}

#[test]
fn key_bit_limit_is_ignored_for_integer_keys() {
    // Integer keys always compare over their full width; two values
    // sharing their top 16 bits stay distinct.
    let mut tree: CbTree<u32> = CbTree::with_key_bits(16);
    assert!(tree.insert(0x1234_0000).is_ok());
    assert!(tree.insert(0x1234_ffff).is_ok());
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.get(&0x1234_0000), Some(&0x1234_0000));
    assert_eq!(tree.get(&0x1234_ffff), Some(&0x1234_ffff));
}

// ─── Large sequential workload ───────────────────────────────────────────────

#[test]
fn large_sequential_insert_remove_reinsert() {
    const N: u32 = 100_000;

    let mut tree: CbTree<u32> = CbTree::new();
    for i in 0..N {
        assert!(tree.insert(i * 7).is_ok());
    }
    assert_eq!(tree.len(), N as usize);

    for i in (0..N).step_by(2) {
        assert_eq!(tree.remove(&(i * 7)), Some(i * 7));
    }
    assert_eq!(tree.len(), N as usize / 2);

    for i in (0..N).step_by(2) {
        assert!(tree.insert(i * 7).is_ok());
    }
    assert_eq!(tree.len(), N as usize);

    // Iteration covers every key, strictly ascending.
    let mut expected = 0;
    for &key in &tree {
        assert_eq!(key, expected * 7);
        expected += 1;
    }
    assert_eq!(expected, N);

    // Every split created exactly one cell, every push-up and merge
    // retired exactly one.
    let stats = tree.stats();
    assert!(stats.splits > 0);
    assert_eq!(stats.cells, 1 + stats.splits - stats.pushups - stats.merges - stats.mergedowns);

    // The teardown census sees one entry per live cell.
    let cells = stats.cells;
    tree.clear();
    let census: u64 = tree.stats().popdist.iter().sum();
    assert_eq!(census, cells);
}
