//! Structural operation counters.

use crate::NODES_PER_CELL;

/// Per-tree counters for the structural mutations, readable through
/// [`CbTree::stats`](crate::CbTree::stats).
///
/// `cells` tracks live cells; every split grows it by one and every
/// push-up or merge shrinks it by one. `popdist[n]` counts cells that
/// held `n + 1` nodes when they were torn down, and is only filled in
/// by [`CbTree::clear`](crate::CbTree::clear), where the cells are
/// walked anyway.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct Stats {
    /// Cells currently in use.
    pub cells: u64,
    /// Nodes relocated from a full cell into a sub-cell.
    pub pushdowns: u64,
    /// Full cells partitioned in two.
    pub splits: u64,
    /// One-edge cells dissolved into their parent slot.
    pub pushups: u64,
    /// Cells folded into their parent.
    pub merges: u64,
    /// Sub-cells folded into the deletion cell. Stays 0 unless the
    /// `merge-down` feature is enabled.
    pub mergedowns: u64,
    /// Cell occupancy histogram, recorded at teardown.
    pub popdist: [u64; NODES_PER_CELL],
}
