use alloc::vec::Vec;

use super::handle::Handle;

/// Slot arena with stable handles and a free list.
///
/// Cells and user objects both live in arenas; a `Handle` stays valid
/// until the slot it names is released with `take` or `free`.
#[derive(Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<Handle>,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of live elements.
    pub(crate) const fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.free.len())
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `element`, reusing the lowest-recently-freed slot if any.
    pub(crate) fn alloc(&mut self, element: T) -> Handle {
        match self.free.pop() {
            Some(handle) => {
                self.slots[handle.to_index()] = Some(element);
                handle
            }
            None => {
                assert!(
                    self.slots.len() <= Handle::MAX,
                    "`Arena::alloc()` - arena is at maximum capacity ({})",
                    Handle::MAX
                );
                self.slots.push(Some(element));
                Handle::from_index(self.slots.len() - 1)
            }
        }
    }

    #[inline]
    pub(crate) fn get(&self, handle: Handle) -> &T {
        self.slots[handle.to_index()].as_ref().expect("`Arena::get()` - `handle` is vacant!")
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: Handle) -> &mut T {
        self.slots[handle.to_index()].as_mut().expect("`Arena::get_mut()` - `handle` is vacant!")
    }

    /// Removes and returns the element, releasing its slot for reuse.
    pub(crate) fn take(&mut self, handle: Handle) -> T {
        let element = self.slots[handle.to_index()].take().expect("`Arena::take()` - `handle` is vacant!");
        self.free.push(handle);
        element
    }

    /// Drops the element and releases its slot.
    pub(crate) fn free(&mut self, handle: Handle) {
        drop(self.take(handle));
    }

    /// Drops every element and invalidates all outstanding handles.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
