use core::fmt;
use core::iter::FusedIterator;

use crate::keybits::{KeyBits, Keyed, KBITS_MAX};
use crate::raw::RawCbTree;
use crate::stats::Stats;

pub use crate::raw::Cursor;

/// An ordered index over bit-string keys, built as a clustered crit-bit
/// tree.
///
/// `CbTree` maps keys to owned objects the way a radix trie does: the
/// tree itself never stores a key, only the bit positions at which
/// sibling subtrees first diverge. Each object carries its own key and
/// exposes it through [`Keyed`]; self-keyed implementations exist for
/// the integer types, `String`, and `Vec<u8>`. Internal nodes are
/// packed eight to a 64-byte cell, so the structure walks about one
/// cache line per eight branching decisions.
///
/// Keys are compared over at most [`KBITS_MAX`] bits. Two objects whose
/// keys agree on every compared bit are the same key as far as the
/// index is concerned, and the second [`insert`](CbTree::insert) is
/// rejected.
///
/// It is a logic error to change an object's key while it is in the
/// tree (through interior mutability, for example). The tree will not
/// exhibit undefined behavior, but lookups and iteration over it may
/// return wrong results or panic.
///
/// # Examples
///
/// ```
/// use cbtree::CbTree;
///
/// let mut labels = CbTree::new();
/// labels.insert(String::from("abc")).unwrap();
/// labels.insert(String::from("ab")).unwrap();
/// labels.insert(String::from("abcd")).unwrap();
///
/// // Point lookups are by key value.
/// assert!(labels.contains("ab"));
/// assert!(!labels.contains("a"));
///
/// // Iteration is in key order.
/// let sorted: Vec<&str> = labels.iter().map(String::as_str).collect();
/// assert_eq!(sorted, ["ab", "abc", "abcd"]);
/// ```
///
/// Signed keys order naturally:
///
/// ```
/// use cbtree::CbTree;
///
/// let mut tree = CbTree::new();
/// for v in [-3i32, 7, 0, -128, 127, 1] {
///     tree.insert(v).unwrap();
/// }
/// let sorted: Vec<i32> = tree.iter().copied().collect();
/// assert_eq!(sorted, [-128, -3, 0, 1, 7, 127]);
/// ```
#[derive(Clone)]
pub struct CbTree<T: Keyed> {
    raw: RawCbTree<T>,
}

/// Error returned by [`CbTree::insert`] when the key is already
/// indexed. Carries the rejected object back to the caller.
#[derive(Debug)]
pub struct DuplicateKey<T>(pub T);

impl<T> DuplicateKey<T> {
    /// Takes the rejected object back out.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for DuplicateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with an equal key is already indexed")
    }
}

impl<T: Keyed> CbTree<T> {
    /// Creates an empty tree comparing keys over the key type's natural
    /// bit length, capped at [`KBITS_MAX`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_key_bits(0)
    }

    /// Creates an empty tree comparing keys over at most `key_bits`
    /// bits. Zero means best effort: the key type's natural length,
    /// capped at [`KBITS_MAX`]. Useful to index variable-length keys by
    /// a fixed-length prefix.
    ///
    /// `key_bits` is ignored for fixed-width integer keys, which always
    /// compare over their full width.
    #[must_use]
    pub fn with_key_bits(key_bits: u32) -> Self {
        let cap = <T::Key as KeyBits>::MAX_BITS.min(KBITS_MAX);
        let nbits = if key_bits == 0 || <T::Key as KeyBits>::FIXED {
            cap
        } else {
            key_bits.min(cap)
        };
        CbTree {
            raw: RawCbTree::new(nbits),
        }
    }

    /// Number of objects in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the index holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Adds an object to the index, by value of its key.
    ///
    /// # Errors
    ///
    /// Fails when an object with an equal key is already indexed; the
    /// rejected object rides back in the error.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbtree::CbTree;
    ///
    /// let mut tree = CbTree::new();
    /// assert!(tree.insert(7u32).is_ok());
    /// assert!(tree.insert(7u32).is_err());
    /// assert_eq!(tree.len(), 1);
    /// ```
    pub fn insert(&mut self, obj: T) -> Result<(), DuplicateKey<T>> {
        self.raw.insert(obj).map_err(DuplicateKey)
    }

    /// Removes the object whose key equals `key` and returns it, or
    /// `None` if no such key is indexed.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbtree::CbTree;
    ///
    /// let mut tree = CbTree::new();
    /// tree.insert(7u32).unwrap();
    /// assert_eq!(tree.remove(&7), Some(7));
    /// assert_eq!(tree.remove(&7), None);
    /// ```
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        self.raw.remove(key)
    }

    /// Returns the object whose key equals `key`, if any.
    #[must_use]
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.raw.locate(key).map(|(obj, _)| self.raw.object(obj))
    }

    /// Returns true if an object with this key is indexed.
    #[must_use]
    pub fn contains(&self, key: &T::Key) -> bool {
        self.raw.locate(key).is_some()
    }

    /// Like [`get`](CbTree::get), but also returns a [`Cursor`] at the
    /// object's position for iteration from there.
    #[must_use]
    pub fn locate(&self, key: &T::Key) -> Option<(&T, Cursor)> {
        self.raw.locate(key).map(|(obj, cur)| (self.raw.object(obj), cur))
    }

    /// The object with the lowest key, or `None` if the tree is empty.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.raw.extreme(0).map(|(obj, _)| self.raw.object(obj))
    }

    /// The object with the highest key, or `None` if the tree is empty.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.raw.extreme(1).map(|(obj, _)| self.raw.object(obj))
    }

    /// The lowest-keyed object together with a cursor at its position.
    #[must_use]
    pub fn first_with_cursor(&self) -> Option<(&T, Cursor)> {
        self.raw.extreme(0).map(|(obj, cur)| (self.raw.object(obj), cur))
    }

    /// The highest-keyed object together with a cursor at its position.
    #[must_use]
    pub fn last_with_cursor(&self) -> Option<(&T, Cursor)> {
        self.raw.extreme(1).map(|(obj, cur)| (self.raw.object(obj), cur))
    }

    /// Advances the cursor to the next higher key and returns that
    /// object, or `None` if the cursor is at the highest one.
    ///
    /// The cursor must come from this tree and be no older than its
    /// last mutation.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbtree::CbTree;
    ///
    /// let mut tree = CbTree::new();
    /// for key in [2u32, 4, 6] {
    ///     tree.insert(key).unwrap();
    /// }
    /// let (lowest, mut cur) = tree.first_with_cursor().unwrap();
    /// assert_eq!(*lowest, 2);
    /// assert_eq!(tree.next(&mut cur), Some(&4));
    /// assert_eq!(tree.next(&mut cur), Some(&6));
    /// assert_eq!(tree.next(&mut cur), None);
    /// assert_eq!(tree.prev(&mut cur), Some(&4));
    /// ```
    pub fn next(&self, cur: &mut Cursor) -> Option<&T> {
        self.raw.step(cur, 1).map(|obj| self.raw.object(obj))
    }

    /// Moves the cursor to the next lower key and returns that object,
    /// or `None` if the cursor is at the lowest one.
    pub fn prev(&self, cur: &mut Cursor) -> Option<&T> {
        self.raw.step(cur, 0).map(|obj| self.raw.object(obj))
    }

    /// Iterates the objects in ascending key order. The iterator is
    /// double-ended and exact-size.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            raw: &self.raw,
            front: None,
            back: None,
            remaining: self.raw.len(),
        }
    }

    /// Drops every object and frees every cell, recording the cell
    /// occupancy histogram into [`stats`](CbTree::stats). Counters
    /// other than the histogram keep accumulating across clears.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Structural operation counters for this tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbtree::CbTree;
    ///
    /// let mut tree = CbTree::new();
    /// for key in 0..64u32 {
    ///     tree.insert(key).unwrap();
    /// }
    /// let stats = tree.stats();
    /// // Cells come from splits and go away in push-ups and merges.
    /// assert_eq!(stats.cells, 1 + stats.splits - stats.pushups - stats.merges - stats.mergedowns);
    /// ```
    #[must_use]
    pub fn stats(&self) -> &Stats {
        self.raw.stats()
    }
}

impl<T: Keyed> Default for CbTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + fmt::Debug> fmt::Debug for CbTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Keyed + PartialEq> PartialEq for CbTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Keyed + Eq> Eq for CbTree<T> {}

/// Objects with already-indexed keys are dropped; the first occurrence
/// of a key wins.
impl<T: Keyed> FromIterator<T> for CbTree<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tree = CbTree::new();
        tree.extend(iter);
        tree
    }
}

/// Objects with already-indexed keys are dropped; the first occurrence
/// of a key wins.
impl<T: Keyed> Extend<T> for CbTree<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for obj in iter {
            let _ = self.insert(obj);
        }
    }
}

impl<'a, T: Keyed> IntoIterator for &'a CbTree<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Ordered iterator over the objects of a [`CbTree`], created by
/// [`CbTree::iter`]. Walks the tree with a pair of cursors, one per
/// end.
pub struct Iter<'a, T: Keyed> {
    raw: &'a RawCbTree<T>,
    front: Option<Cursor>,
    back: Option<Cursor>,
    remaining: usize,
}

impl<'a, T: Keyed> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let obj = match self.front {
            None => {
                let (obj, cur) = self.raw.extreme(0)?;
                self.front = Some(cur);
                obj
            }
            Some(ref mut cur) => self.raw.step(cur, 1)?,
        };
        Some(self.raw.object(obj))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T: Keyed> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let obj = match self.back {
            None => {
                let (obj, cur) = self.raw.extreme(1)?;
                self.back = Some(cur);
                obj
            }
            Some(ref mut cur) => self.raw.step(cur, 0)?,
        };
        Some(self.raw.object(obj))
    }
}

impl<T: Keyed> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<T: Keyed> FusedIterator for Iter<'_, T> {}

impl<T: Keyed> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            raw: self.raw,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<T: Keyed> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use alloc::string::String;
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    /// Insert/remove/lookup against a `BTreeSet` model, asserting every
    /// structural invariant after each mutation.
    #[derive(Clone, Debug)]
    enum Op {
        Insert(u32),
        Remove(u32),
        Get(u32),
        Extremes,
        IterAll,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            8 => (0u32..512).prop_map(Op::Insert),
            6 => (0u32..512).prop_map(Op::Remove),
            2 => (0u32..512).prop_map(Op::Get),
            1 => Just(Op::Extremes),
            1 => Just(Op::IterAll),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn matches_btreeset_model(ops in prop::collection::vec(op_strategy(), 1..400)) {
            let mut tree: CbTree<u32> = CbTree::new();
            let mut model: BTreeSet<u32> = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Insert(k) => {
                        prop_assert_eq!(tree.insert(k).is_ok(), model.insert(k));
                        tree.raw.check_invariants();
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(tree.remove(&k), model.take(&k));
                        tree.raw.check_invariants();
                    }
                    Op::Get(k) => {
                        prop_assert_eq!(tree.get(&k), model.get(&k));
                    }
                    Op::Extremes => {
                        prop_assert_eq!(tree.first(), model.first());
                        prop_assert_eq!(tree.last(), model.last());
                    }
                    Op::IterAll => {
                        prop_assert!(tree.iter().eq(model.iter()));
                        prop_assert!(tree.iter().rev().eq(model.iter().rev()));
                    }
                }
                prop_assert_eq!(tree.len(), model.len());
            }
        }

        #[test]
        fn string_keys_match_model(keys in prop::collection::vec("[a-z]{0,8}", 1..64)) {
            let mut tree: CbTree<String> = CbTree::new();
            let mut model: BTreeSet<String> = BTreeSet::new();

            for key in &keys {
                prop_assert_eq!(tree.insert(key.clone()).is_ok(), model.insert(key.clone()));
                tree.raw.check_invariants();
            }
            prop_assert!(tree.iter().eq(model.iter()));
            for key in &keys {
                prop_assert_eq!(tree.get(key.as_str()), model.get(key));
            }
        }

        #[test]
        fn cursor_walk_is_reversible(keys in prop::collection::btree_set(any::<u32>(), 2..64)) {
            let tree: CbTree<u32> = keys.iter().copied().collect();

            let (first, mut cur) = tree.first_with_cursor().unwrap();
            let mut forward = alloc::vec![*first];
            while let Some(obj) = tree.next(&mut cur) {
                forward.push(*obj);
            }
            prop_assert!(forward.iter().eq(keys.iter()));

            // The cursor sits at the maximum; walking back visits
            // everything again in reverse.
            let mut backward = alloc::vec![*forward.last().unwrap()];
            while let Some(obj) = tree.prev(&mut cur) {
                backward.push(*obj);
            }
            backward.reverse();
            prop_assert_eq!(backward, forward);
        }

        #[test]
        fn insertion_order_is_irrelevant(mut keys in prop::collection::vec(any::<u32>(), 2..64)) {
            let forward: CbTree<u32> = keys.iter().copied().collect();
            keys.reverse();
            let backward: CbTree<u32> = keys.iter().copied().collect();
            prop_assert_eq!(forward, backward);
        }
    }

    #[test]
    fn empty_tree_behaviors() {
        let mut tree: CbTree<u32> = CbTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.get(&1), None);
        assert_eq!(tree.remove(&1), None);
        assert_eq!(tree.first(), None);
        assert_eq!(tree.last(), None);
        assert_eq!(tree.iter().next(), None);
        tree.raw.check_invariants();
        tree.clear();
        tree.raw.check_invariants();
    }

    #[test]
    fn singleton_tree_behaviors() {
        let mut tree: CbTree<u32> = CbTree::new();
        tree.insert(42).unwrap();
        tree.raw.check_invariants();
        assert_eq!(tree.first(), tree.last());
        let (_, mut cur) = tree.first_with_cursor().unwrap();
        assert_eq!(tree.next(&mut cur), None);
        assert_eq!(tree.prev(&mut cur), None);
        assert_eq!(tree.remove(&42), Some(42));
        tree.raw.check_invariants();
        assert!(tree.is_empty());
    }

    #[test]
    fn structural_counters_stay_coherent() {
        let mut tree: CbTree<u32> = CbTree::new();
        for i in 0..1024u32 {
            tree.insert(i.rotate_left(7)).unwrap();
            tree.raw.check_invariants();
        }
        let stats = *tree.stats();
        assert!(stats.splits > 0);
        assert_eq!(stats.cells, 1 + stats.splits - stats.pushups - stats.merges - stats.mergedowns);

        for i in 0..1024u32 {
            assert_eq!(tree.remove(&i.rotate_left(7)), Some(i.rotate_left(7)));
            tree.raw.check_invariants();
        }
        let stats = *tree.stats();
        assert_eq!(stats.cells, 0);
        assert_eq!(stats.cells, 1 + stats.splits - stats.pushups - stats.merges - stats.mergedowns);
    }

    #[test]
    fn popdist_is_recorded_at_teardown() {
        let mut tree: CbTree<u32> = CbTree::new();
        for i in 0..500u32 {
            tree.insert(i * 3).unwrap();
        }
        let cells = tree.stats().cells;
        tree.clear();
        let stats = tree.stats();
        let census: u64 = stats.popdist.iter().sum();
        assert_eq!(census, cells);
        // 500 objects were indexed by 499 nodes when the census ran.
        let nodes: u64 = stats.popdist.iter().enumerate().map(|(i, n)| (i as u64 + 1) * n).sum();
        assert_eq!(nodes, 499);
        assert!(tree.is_empty());
        assert_eq!(tree.get(&3), None);
    }

    #[test]
    fn keyed_objects_are_found_by_key() {
        struct Entry {
            name: String,
            id: u64,
        }
        impl Keyed for Entry {
            type Key = str;
            fn key(&self) -> &str {
                &self.name
            }
        }

        let mut tree = CbTree::new();
        tree.insert(Entry { name: String::from("alpha"), id: 1 }).ok();
        tree.insert(Entry { name: String::from("beta"), id: 2 }).ok();
        assert_eq!(tree.get("beta").map(|e| e.id), Some(2));
        assert_eq!(tree.get("gamma").map(|e| e.id), None);
        assert_eq!(tree.remove("alpha").map(|e| e.id), Some(1));
        assert_eq!(tree.len(), 1);
    }

    /// Ten stride-7 keys split into a root cell of five nodes over a
    /// sub-cell of four. Removing a key that lives in the root cell
    /// brings the combined population to eight, which the root can only
    /// reclaim by folding the sub-cell into itself.
    #[cfg(feature = "merge-down")]
    #[test]
    fn merge_down_folds_a_subcell_into_the_root() {
        let mut tree: CbTree<u32> = CbTree::new();
        for i in 0..10u32 {
            tree.insert(i * 7).unwrap();
        }
        assert_eq!(tree.stats().cells, 2);

        tree.remove(&63).unwrap();
        tree.raw.check_invariants();
        let stats = tree.stats();
        assert_eq!(stats.mergedowns, 1);
        assert_eq!(stats.cells, 1);
        assert!(tree.iter().copied().eq((0..9).map(|i| i * 7)));
    }
}
