use smallvec::SmallVec;

use super::arena::Arena;
use super::cell::{Cell, Child, CBIT_MAX};
use super::handle::Handle;
use crate::keybits::{KeyBits, Keyed};
use crate::stats::Stats;
use crate::NODES_PER_CELL;

/// Position of one outgoing edge that currently leads to an object:
/// the cell, the node inside it, and which side of the node.
///
/// A cursor names a position inside the tree it came from and stays
/// meaningful until that tree is mutated. Using a stale cursor can
/// return the wrong neighbor or panic; it cannot corrupt the tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    pub(crate) cell: Handle,
    pub(crate) nid: u8,
    pub(crate) cid: u8,
}

/// Where a new node will be wired in: the cell, the last on-path node
/// whose cbit stays below the new one (`None` when the new node takes
/// the cell root), the side that was followed out of it, and the edge
/// it displaces.
struct InsertPoint {
    cell: Handle,
    upper: Option<usize>,
    cid: usize,
    lower: Child,
}

/// The clustered crit-bit engine backing `CbTree`.
///
/// Cells and objects live in two arenas; cells reference both through
/// their tagged pointer slots, and every non-root cell carries its
/// parent's handle. The object count always equals the node count
/// plus one.
#[derive(Clone)]
pub(crate) struct RawCbTree<T: Keyed> {
    cells: Arena<Cell>,
    objects: Arena<T>,
    root: Option<Handle>,
    n_objects: usize,
    key_nbits: u32,
    stats: Stats,
}

impl<T: Keyed> RawCbTree<T> {
    pub(crate) const fn new(key_nbits: u32) -> Self {
        Self {
            cells: Arena::new(),
            objects: Arena::new(),
            root: None,
            n_objects: 0,
            key_nbits,
            stats: Stats {
                cells: 0,
                pushdowns: 0,
                splits: 0,
                pushups: 0,
                merges: 0,
                mergedowns: 0,
                popdist: [0; NODES_PER_CELL],
            },
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.n_objects
    }

    pub(crate) const fn stats(&self) -> &Stats {
        &self.stats
    }

    #[inline]
    pub(crate) fn object(&self, handle: Handle) -> &T {
        self.objects.get(handle)
    }

    /// Key-guided descent from the root. The result is a by-structure
    /// match only; callers confirm by value with `first_diff` before
    /// trusting it.
    pub(crate) fn lookup(&self, key: &T::Key) -> Option<(Handle, Cursor)> {
        let root = self.root?;
        let mut cur = Cursor { cell: root, nid: 0, cid: 0 };
        if self.n_objects == 1 {
            return Some((self.cells.get(root).ptr(0), cur));
        }
        let mut cell_h = root;
        loop {
            cur.cell = cell_h;
            let cell = self.cells.get(cell_h);
            let mut child = Child::node(0);
            while child.is_node() {
                let nid = child.node_index();
                let node = cell.node(nid);
                cur.nid = nid as u8;
                cur.cid = key.bit(u32::from(node.cbit));
                child = node.child[cur.cid as usize];
            }
            if child.is_uobj() {
                return Some((cell.ptr(child.index()), cur));
            }
            cell_h = cell.ptr(child.index());
        }
    }

    /// Point lookup, confirmed by value.
    pub(crate) fn locate(&self, key: &T::Key) -> Option<(Handle, Cursor)> {
        let (found, cur) = self.lookup(key)?;
        match key.first_diff(self.objects.get(found).key(), self.key_nbits) {
            None => Some((found, cur)),
            Some(_) => None,
        }
    }

    /// Follows `child[dir]` at every node, across cell boundaries,
    /// until an object edge is reached. Requires at least two objects.
    fn rush_down(&self, cur: &mut Cursor, dir: u8) -> Handle {
        cur.cid = dir;
        let mut cell_h = cur.cell;
        let mut child = Child::node(cur.nid as usize);
        loop {
            cur.cell = cell_h;
            let cell = self.cells.get(cell_h);
            while child.is_node() {
                let nid = child.node_index();
                cur.nid = nid as u8;
                child = cell.node(nid).child[dir as usize];
            }
            if child.is_uobj() {
                return cell.ptr(child.index());
            }
            cell_h = cell.ptr(child.index());
            child = Child::node(0);
        }
    }

    /// Lowest-ordered object for `dir == 0`, highest for `dir == 1`.
    pub(crate) fn extreme(&self, dir: u8) -> Option<(Handle, Cursor)> {
        let root = self.root?;
        let mut cur = Cursor { cell: root, nid: 0, cid: 0 };
        if self.n_objects == 1 {
            return Some((self.cells.get(root).ptr(0), cur));
        }
        let obj = self.rush_down(&mut cur, dir);
        Some((obj, cur))
    }

    /// Moves the cursor to its neighbor in direction `dir` (1 = next
    /// higher key, 0 = next lower) and returns that object, or `None`
    /// at the corresponding extreme.
    pub(crate) fn step(&self, cur: &mut Cursor, dir: u8) -> Option<Handle> {
        if self.n_objects < 2 {
            return None;
        }
        // The easy case: the node's other side already points the
        // right way.
        if cur.cid != dir {
            return Some(self.descend(cur, dir));
        }
        // Otherwise climb cell by cell, re-descending inside each one
        // among nodes below the current cbit, for the deepest ancestor
        // whose key bit disagrees with the travel direction. Its other
        // subtree holds the neighbor.
        let cell = self.cells.get(cur.cell);
        let cur_cbit = cell.node(cur.nid as usize).cbit;
        let edge = cell.node(cur.nid as usize).child[cur.cid as usize];
        let key = self.objects.get(cell.ptr(edge.index())).key();
        let mut climb = Some(cur.cell);
        while let Some(cell_h) = climb {
            let cell = self.cells.get(cell_h);
            let mut pivot = None;
            let mut child = Child::node(0);
            while child.is_node() {
                let node = cell.node(child.node_index());
                if node.cbit >= cur_cbit {
                    break;
                }
                let bit = key.bit(u32::from(node.cbit));
                if bit != dir {
                    pivot = Some(child.node_index());
                }
                child = node.child[bit as usize];
            }
            if let Some(nid) = pivot {
                cur.cell = cell_h;
                cur.nid = nid as u8;
                return Some(self.descend(cur, dir));
            }
            climb = cell.parent();
        }
        None
    }

    /// From the cursor's node, takes one step on side `dir` and rushes
    /// to the `1 - dir` extreme of whatever subtree is there.
    fn descend(&self, cur: &mut Cursor, dir: u8) -> Handle {
        let lower = self.cells.get(cur.cell).node(cur.nid as usize).child[dir as usize];
        if lower.is_uobj() {
            cur.cid = dir;
            return self.cells.get(cur.cell).ptr(lower.index());
        }
        if lower.is_cell() {
            cur.cell = self.cells.get(cur.cell).ptr(lower.index());
            cur.nid = 0;
        } else {
            cur.nid = lower.node_index() as u8;
        }
        self.rush_down(cur, 1 - dir)
    }

    /// Adds `obj` to the index. Fails, handing the object back, when a
    /// key of equal value is already present.
    pub(crate) fn insert(&mut self, obj: T) -> Result<(), T> {
        let Some(root) = self.root else {
            // First object: it sits alone in pointer slot 0 of a fresh
            // root cell, with the node's other edge vacant until a
            // second key supplies a crit-bit.
            let obj_h = self.objects.alloc(obj);
            let mut cell = Cell::new();
            cell.node_mut(0).child[0] = Child::uobj(0);
            cell.node_mut(0).child[1] = Child::VACANT;
            cell.set_ptr(0, obj_h);
            self.root = Some(self.cells.alloc(cell));
            self.stats.cells += 1;
            self.n_objects = 1;
            return Ok(());
        };

        let (witness, cur) = self.lookup(obj.key()).expect("non-empty tree always yields a witness");
        let Some(cbit) = obj.key().first_diff(self.objects.get(witness).key(), self.key_nbits) else {
            return Err(obj);
        };
        let bit = obj.key().bit(cbit);
        debug_assert!(cbit <= CBIT_MAX);
        let cbit = cbit as u8;

        if self.n_objects == 1 {
            let obj_h = self.objects.alloc(obj);
            let cell = self.cells.get_mut(root);
            cell.set_ptr(1, obj_h);
            let node = cell.node_mut(0);
            node.cbit = cbit;
            node.child[bit as usize] = Child::uobj(1);
            node.child[1 - bit as usize] = Child::uobj(0);
            self.n_objects = 2;
            return Ok(());
        }

        // When the new crit-bit lies below the terminal node's, the
        // edge under the search cursor is the displaced one. Otherwise
        // the walk restarts from the root: the node must land where the
        // path's ascending cbit order first exceeds it, which can be
        // an arbitrary ancestor cell.
        let terminal = *self.cells.get(cur.cell).node(cur.nid as usize);
        let mut point = if cbit > terminal.cbit {
            InsertPoint {
                cell: cur.cell,
                upper: Some(cur.nid as usize),
                cid: cur.cid as usize,
                lower: terminal.child[cur.cid as usize],
            }
        } else {
            self.locate_insert_point(root, obj.key(), cbit)
        };

        // A full target cell sheds an edge node into a sub-cell when it
        // can, and splits otherwise. Either can move the insertion
        // point, but never above this cell, so the re-walk starts here.
        while self.cells.get(point.cell).count() == NODES_PER_CELL {
            let full = point.cell;
            if !self.push_down(full) {
                self.split(full);
            }
            point = self.locate_insert_point(full, obj.key(), cbit);
        }

        let obj_h = self.objects.alloc(obj);
        let cell = self.cells.get_mut(point.cell);
        let mut new_node = cell.alloc_node();
        let new_ptr = cell.alloc_ptr(obj_h);
        cell.inc_count(1);
        let mut lower = point.lower;
        if point.upper.is_none() {
            // The new node displaces the cell root: the old root moves
            // to the fresh slot and the new node is built in slot 0.
            let old_root = *cell.node(0);
            *cell.node_mut(new_node) = old_root;
            lower = Child::node(new_node);
            new_node = 0;
        }
        cell.node_mut(new_node).cbit = cbit;
        cell.node_mut(new_node).child[bit as usize] = Child::uobj(new_ptr);
        cell.node_mut(new_node).child[1 - bit as usize] = lower;
        if let Some(upper) = point.upper {
            cell.node_mut(upper).child[point.cid] = Child::node(new_node);
        }
        self.n_objects += 1;
        Ok(())
    }

    /// Walks from `start` for the unique position where the path's
    /// cbit sequence first exceeds `cbit` on this key's path.
    fn locate_insert_point(&self, start: Handle, key: &T::Key, cbit: u8) -> InsertPoint {
        let mut cell_h = start;
        'cell: loop {
            let cell = self.cells.get(cell_h);
            let mut upper = None;
            let mut cid = 0;
            let mut lower = Child::node(0);
            loop {
                if lower.is_cell() {
                    cell_h = cell.ptr(lower.index());
                    continue 'cell;
                }
                if lower.is_uobj() {
                    return InsertPoint { cell: cell_h, upper, cid, lower };
                }
                let node = cell.node(lower.node_index());
                if node.cbit > cbit {
                    return InsertPoint { cell: cell_h, upper, cid, lower };
                }
                upper = Some(lower.node_index());
                cid = key.bit(u32::from(node.cbit)) as usize;
                lower = node.child[cid];
            }
        }
    }

    /// Tries to relocate an edge node out of the full `cell_h` into the
    /// sub-cell it points at. The moved node becomes the sub-cell's new
    /// root, which keeps cbit order: its cbit was below the old root's.
    fn push_down(&mut self, cell_h: Handle) -> bool {
        for n in 1..NODES_PER_CELL {
            for c in 0..2 {
                let node = *self.cells.get(cell_h).node(n);
                let edge = node.child[c];
                let sibling = node.child[1 - c];
                // Edge node: one child is a sub-cell, the other leaves
                // this cell's subtree. One node slot and one pointer
                // slot in the sub-cell is all the move costs.
                if !edge.is_cell() || sibling.is_node() {
                    continue;
                }
                let sub_h = self.cells.get(cell_h).ptr(edge.index());
                if self.cells.get(sub_h).count() == NODES_PER_CELL {
                    continue;
                }
                let sibling_target = self.cells.get(cell_h).ptr(sibling.index());

                let sub = self.cells.get_mut(sub_h);
                let relocated = sub.alloc_node();
                let old_root = *sub.node(0);
                *sub.node_mut(relocated) = old_root;
                let new_ptr = sub.alloc_ptr(sibling_target);
                sub.inc_count(1);
                let root = sub.node_mut(0);
                root.cbit = node.cbit;
                root.child[c] = Child::node(relocated);
                root.child[1 - c] = sibling.retarget(new_ptr);
                if sibling.is_cell() {
                    self.cells.get_mut(sibling_target).set_parent(Some(sub_h));
                }

                let (pn, pc) = self.cells.get(cell_h).node_parent(n);
                let cell = self.cells.get_mut(cell_h);
                cell.node_mut(pn).child[pc] = edge;
                cell.free_node(n);
                cell.free_ptr(sibling.index());
                cell.dec_count(1);
                self.stats.pushdowns += 1;
                return true;
            }
        }
        false
    }

    /// Splits the full `cell_h` along an internal pivot. The pivot's
    /// subtree moves into a fresh sub-cell, slot numbers preserved,
    /// and the pivot's old position becomes a CELL edge. The new cell
    /// is allocated before anything is wired.
    fn split(&mut self, cell_h: Handle) {
        let new_h = self.cells.alloc(Cell::new());
        let (pivot, bitmap) = self.cells.get(cell_h).find_split();

        let mut moved = 0;
        for nid in 0..NODES_PER_CELL {
            if bitmap & (0x8000 >> nid) == 0 {
                continue;
            }
            let node = *self.cells.get(cell_h).node(nid);
            *self.cells.get_mut(new_h).node_mut(nid) = node;
            for c in 0..2 {
                let child = node.child[c];
                if child.is_node() {
                    continue;
                }
                let pid = child.index();
                let target = self.cells.get(cell_h).ptr(pid);
                if child.is_cell() {
                    self.cells.get_mut(target).set_parent(Some(new_h));
                }
                self.cells.get_mut(new_h).set_ptr(pid, target);
                self.cells.get_mut(cell_h).free_ptr(pid);
            }
            self.cells.get_mut(cell_h).free_node(nid);
            moved += 1;
        }

        // Fix the old cell: the pivot's position becomes a CELL edge.
        let anchor_pid = self.cells.get_mut(cell_h).alloc_ptr(new_h);
        let (an, ac) = self.cells.get(cell_h).node_parent(pivot);
        let cell = self.cells.get_mut(cell_h);
        cell.node_mut(an).child[ac] = Child::cell(anchor_pid);
        cell.dec_count(moved);

        // Fix the new cell: the pivot becomes its root in slot 0.
        let new_cell = self.cells.get_mut(new_h);
        let pivot_node = *new_cell.node(pivot);
        *new_cell.node_mut(0) = pivot_node;
        new_cell.free_node(pivot);
        new_cell.set_parent(Some(cell_h));
        new_cell.set_count(moved);

        self.stats.splits += 1;
        self.stats.cells += 1;
    }

    /// Removes the object whose key equals `key` by value.
    pub(crate) fn remove(&mut self, key: &T::Key) -> Option<T> {
        let (obj_h, loc) = self.locate(key)?;
        let cell_h = loc.cell;
        let nid = loc.nid as usize;
        let cid = loc.cid as usize;
        let parent_h = self.cells.get(cell_h).parent();
        let edge = self.cells.get(cell_h).node(nid).child[cid];
        debug_assert!(edge.is_uobj());
        self.cells.get_mut(cell_h).free_ptr(edge.index());

        if nid == 0 {
            let sibling = self.cells.get(cell_h).node(0).child[1 - cid];
            if sibling == Child::VACANT {
                // Removing the last object uproots the tree.
                self.cells.free(cell_h);
                self.root = None;
                self.stats.cells -= 1;
                self.stats.pushups += 1;
                self.n_objects = 0;
                return Some(self.objects.take(obj_h));
            }
            if sibling.is_node() {
                // Collapse: the sibling node's contents take over the
                // root slot.
                let moved = *self.cells.get(cell_h).node(sibling.node_index());
                let cell = self.cells.get_mut(cell_h);
                *cell.node_mut(0) = moved;
                cell.free_node(sibling.node_index());
                cell.dec_count(1);
            } else if sibling.is_uobj() && parent_h.is_none() {
                // Two objects left in the root cell: back to the
                // singleton shape.
                let survivor = self.cells.get(cell_h).ptr(sibling.index());
                let cell = self.cells.get_mut(cell_h);
                cell.free_ptr(sibling.index());
                cell.set_ptr(0, survivor);
                cell.node_mut(0).child[0] = Child::uobj(0);
                cell.node_mut(0).child[1] = Child::VACANT;
                self.n_objects -= 1;
                return Some(self.objects.take(obj_h));
            } else {
                // One surviving edge: the cell dissolves.
                let target = self.cells.get(cell_h).ptr(sibling.index());
                match parent_h {
                    None => {
                        // The root cell held a single node over a
                        // sub-cell; the sub-cell takes over as root.
                        self.root = Some(target);
                        self.cells.get_mut(target).set_parent(None);
                    }
                    Some(parent) => {
                        // Push up: the surviving edge moves into the
                        // parent slot that referenced this cell, tag
                        // preserved.
                        let (an, ac) = self.cells.get(parent).anchor_of(cell_h);
                        let pid = self.cells.get(parent).node(an).child[ac].index();
                        let pcell = self.cells.get_mut(parent);
                        pcell.set_ptr(pid, target);
                        pcell.node_mut(an).child[ac] = sibling.retarget(pid);
                        if sibling.is_cell() {
                            self.cells.get_mut(target).set_parent(Some(parent));
                        }
                    }
                }
                self.cells.free(cell_h);
                self.stats.cells -= 1;
                self.stats.pushups += 1;
                self.n_objects -= 1;
                return Some(self.objects.take(obj_h));
            }
        } else {
            // Detach below the cell root: the in-cell parent adopts
            // the sibling edge directly.
            let sibling = self.cells.get(cell_h).node(nid).child[1 - cid];
            let (pn, pc) = self.cells.get(cell_h).node_parent(nid);
            let cell = self.cells.get_mut(cell_h);
            cell.node_mut(pn).child[pc] = sibling;
            cell.free_node(nid);
            cell.dec_count(1);
        }

        self.try_merge(cell_h, parent_h);
        self.n_objects -= 1;
        Some(self.objects.take(obj_h))
    }

    /// Folds this cell into its parent when their combined population
    /// fits in one cell. With the `merge-down` feature, also tries to
    /// fold one of its sub-cells into it.
    fn try_merge(&mut self, cell_h: Handle, parent_h: Option<Handle>) {
        if let Some(parent) = parent_h {
            if self.cells.get(cell_h).count() + self.cells.get(parent).count() <= NODES_PER_CELL {
                let (an, ac) = self.cells.get(parent).anchor_of(cell_h);
                self.merge(cell_h, parent, an, ac);
                self.stats.merges += 1;
                self.stats.cells -= 1;
                return;
            }
        }
        #[cfg(feature = "merge-down")]
        for n in 0..NODES_PER_CELL {
            if self.cells.get(cell_h).node_is_vacant(n) {
                continue;
            }
            for c in 0..2 {
                let child = self.cells.get(cell_h).node(n).child[c];
                if !child.is_cell() {
                    continue;
                }
                let sub = self.cells.get(cell_h).ptr(child.index());
                if self.cells.get(cell_h).count() + self.cells.get(sub).count() <= NODES_PER_CELL {
                    self.merge(sub, cell_h, n, c);
                    self.stats.mergedowns += 1;
                    self.stats.cells -= 1;
                    return;
                }
            }
        }
    }

    /// Folds the whole subtree of `cell_h` into `parent_h`, whose node
    /// `an`/side `ac` anchors it. Iterative post-order over an explicit
    /// work list; node slots are reallocated, pointer targets move,
    /// grandchild cells are re-parented.
    fn merge(&mut self, cell_h: Handle, parent_h: Handle, an: usize, ac: usize) {
        let anchor_edge = self.cells.get(parent_h).node(an).child[ac];
        debug_assert!(anchor_edge.is_cell());
        self.cells.get_mut(parent_h).free_ptr(anchor_edge.index());
        let cell = self.cells.take(cell_h);

        // Expand the absorbed subtree into a work list of child bytes,
        // nodes before their descendants.
        let mut wstack: SmallVec<[Child; NODES_PER_CELL]> = SmallVec::new();
        let mut entries: SmallVec<[Child; NODES_PER_CELL * 2 - 1]> = SmallVec::new();
        wstack.push(Child::node(0));
        while let Some(child) = wstack.pop() {
            entries.push(child);
            if child.is_node() {
                for c in 0..2 {
                    wstack.push(cell.node(child.node_index()).child[c]);
                }
            }
        }

        // Rebuild bottom-up, rewriting each entry to its encoding in
        // the parent as it is copied. A node's rewritten children are
        // the nearest unconsumed entries after it, right side first;
        // the vacant marker flags consumed ones.
        for i in (0..entries.len()).rev() {
            let entry = entries[i];
            if entry.is_node() {
                let cbit = cell.node(entry.node_index()).cbit;
                let parent = self.cells.get_mut(parent_h);
                let new_node = parent.alloc_node();
                parent.inc_count(1);
                parent.node_mut(new_node).cbit = cbit;
                let mut j = i + 1;
                for c in [1, 0] {
                    while entries[j] == Child::VACANT {
                        j += 1;
                    }
                    self.cells.get_mut(parent_h).node_mut(new_node).child[c] = entries[j];
                    entries[j] = Child::VACANT;
                }
                entries[i] = Child::node(new_node);
            } else {
                let target = cell.ptr(entry.index());
                let new_ptr = self.cells.get_mut(parent_h).alloc_ptr(target);
                if entry.is_cell() {
                    self.cells.get_mut(target).set_parent(Some(parent_h));
                }
                entries[i] = entry.retarget(new_ptr);
            }
        }
        self.cells.get_mut(parent_h).node_mut(an).child[ac] = entries[0];
    }

    /// Frees every cell in post-order, driven by `delist_subcell` and
    /// the per-cell parent links, recording the occupancy histogram
    /// along the way. All owned objects are dropped.
    pub(crate) fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            let mut cur = root;
            loop {
                if let Some(sub) = self.cells.get_mut(cur).delist_subcell() {
                    cur = sub;
                    continue;
                }
                let cell = self.cells.get(cur);
                let parent = cell.parent();
                self.stats.popdist[cell.count() - 1] += 1;
                self.cells.free(cur);
                self.stats.cells -= 1;
                match parent {
                    Some(parent) => cur = parent,
                    None => break,
                }
            }
        }
        self.objects.clear();
        self.n_objects = 0;
    }

    /// Walks the whole tree and asserts every structural invariant:
    /// strictly ascending cbits along paths, per-cell count and
    /// reachability coherence, pointer-slot usage matching leaf edges,
    /// parent backlinks, and the object/node count relation.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        use alloc::vec::Vec;

        use super::cell::PTRS_PER_CELL;

        let Some(root) = self.root else {
            assert_eq!(self.n_objects, 0, "empty tree must hold no objects");
            assert_eq!(self.stats.cells, 0);
            return;
        };
        assert!(self.cells.get(root).parent().is_none(), "root cell must have no parent");
        if self.n_objects == 1 {
            let cell = self.cells.get(root);
            assert_eq!(cell.count(), 1);
            assert!(cell.node(0).child[0].is_uobj());
            assert_eq!(cell.node(0).child[1], Child::VACANT);
            assert_eq!(self.stats.cells, 1);
            return;
        }

        let mut cell_total = 0u64;
        let mut node_total = 0;
        let mut obj_total = 0;
        let mut stack: Vec<(Handle, Option<u8>)> = Vec::new();
        stack.push((root, None));
        while let Some((cell_h, floor)) = stack.pop() {
            cell_total += 1;
            let cell = self.cells.get(cell_h);
            let mut reached = [false; NODES_PER_CELL];
            let mut used = [false; PTRS_PER_CELL];
            let mut walk: Vec<(usize, Option<u8>)> = Vec::new();
            walk.push((0, floor));
            let mut count = 0;
            while let Some((nid, floor)) = walk.pop() {
                assert!(!self.cells.get(cell_h).node_is_vacant(nid), "edge to vacant node slot");
                assert!(!reached[nid], "node slot {nid} reached twice");
                reached[nid] = true;
                count += 1;
                let node = cell.node(nid);
                if let Some(floor) = floor {
                    assert!(node.cbit > floor, "cbit must strictly ascend along paths");
                }
                for c in 0..2 {
                    let child = node.child[c];
                    if child.is_node() {
                        walk.push((child.node_index(), Some(node.cbit)));
                    } else if child.is_uobj() {
                        assert!(!used[child.index()], "pointer slot referenced twice");
                        used[child.index()] = true;
                        obj_total += 1;
                    } else if child.is_cell() {
                        assert!(!used[child.index()], "pointer slot referenced twice");
                        used[child.index()] = true;
                        let sub = cell.ptr(child.index());
                        assert_eq!(self.cells.get(sub).parent(), Some(cell_h), "bad parent backlink");
                        stack.push((sub, Some(node.cbit)));
                    } else {
                        panic!("vacant child edge in a tree of two or more objects");
                    }
                }
            }
            assert_eq!(count, cell.count(), "packed count disagrees with occupancy");
            assert!((1..=NODES_PER_CELL).contains(&count));
            node_total += count;
            for nid in 0..NODES_PER_CELL {
                assert_eq!(reached[nid], !cell.node_is_vacant(nid), "occupancy/reachability mismatch at slot {nid}");
            }
            for pid in 0..PTRS_PER_CELL {
                if !used[pid] {
                    assert!(cell.ptr_is_free(pid), "unused pointer slot {pid} is not free");
                }
            }
        }
        assert_eq!(node_total + 1, self.n_objects, "object count must be node count + 1");
        assert_eq!(obj_total, self.n_objects);
        assert_eq!(cell_total, self.stats.cells, "cells counter disagrees with the walk");
    }
}
