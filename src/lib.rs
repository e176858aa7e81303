//! Clustered crit-bit tree collections for Rust.
//!
//! This crate provides [`CbTree`], an ordered index over bit-string
//! keys with the lookup discipline of a radix trie and the memory
//! density of an in-memory B-tree:
//!
//! - **Keys are never stored.** Internal nodes record only the bit
//!   position at which two subtrees first diverge; lookups confirm a
//!   candidate with one full key comparison.
//! - **Nodes are clustered.** Up to eight 3-byte crit-bit nodes and
//!   their nine outgoing edges are packed into a 64-byte cell, one
//!   cache line, so a descent touches one line per eight branching
//!   decisions.
//! - **Keys are pluggable.** The tree sees a key only through the
//!   [`KeyBits`] trait (get a bit, find the first differing bit).
//!   Implementations are provided for `u32`/`u64`/`i32`/`i64`, `str`,
//!   byte slices, and fixed byte arrays; anything else can implement
//!   the trait.
//!
//! # Example
//!
//! ```
//! use cbtree::CbTree;
//!
//! let mut index = CbTree::new();
//! index.insert(42u32).unwrap();
//! index.insert(7).unwrap();
//! index.insert(1000).unwrap();
//!
//! assert_eq!(index.get(&7), Some(&7));
//! assert_eq!(index.len(), 3);
//!
//! // Ordered iteration, both ways.
//! let ascending: Vec<u32> = index.iter().copied().collect();
//! assert_eq!(ascending, [7, 42, 1000]);
//! let descending: Vec<u32> = index.iter().rev().copied().collect();
//! assert_eq!(descending, [1000, 42, 7]);
//! ```
//!
//! Objects that carry their key implement [`Keyed`] to name it:
//!
//! ```
//! use cbtree::{CbTree, Keyed};
//!
//! struct User {
//!     name: String,
//!     uid: u32,
//! }
//!
//! impl Keyed for User {
//!     type Key = str;
//!     fn key(&self) -> &str {
//!         &self.name
//!     }
//! }
//!
//! let mut users = CbTree::new();
//! users.insert(User { name: "root".into(), uid: 0 }).ok();
//! users.insert(User { name: "daemon".into(), uid: 1 }).ok();
//! assert_eq!(users.get("root").map(|u| u.uid), Some(0));
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard
//!   library dependency
//! - **Ordered cursors** - Constant-state iteration from any position
//!   via [`CbTree::next`] / [`CbTree::prev`]
//! - **Observability** - Per-tree counters for the structural
//!   mutations, see [`Stats`]
//!
//! # Implementation
//!
//! The index is a tree of fixed-size cells. Each cell embeds a small
//! binary crit-bit subtree plus the cell's outgoing edges, which lead
//! either to owned objects or to child cells. Insertion into a full
//! cell first tries to push an edge node down into a neighboring cell
//! and splits the cell along an internal pivot otherwise; deletion
//! dissolves one-edge cells into their parent slot and folds cells
//! together when their combined population fits.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod keybits;
mod raw;
mod stats;

pub mod cbtree;

pub use cbtree::{CbTree, Cursor, DuplicateKey, Iter};
pub use keybits::{KeyBits, Keyed, KBITS_MAX};
pub use stats::Stats;

/// Crit-bit nodes per cell. Also the length of the occupancy histogram
/// in [`Stats`].
pub const NODES_PER_CELL: usize = 8;
