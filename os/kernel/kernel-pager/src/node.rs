//! Raw access to the entries of one table.
//!
//! The MMU sets accessed and dirty bits behind our back, so every entry is
//! read and written with volatile operations and never held by reference.

use crate::MemType;
use crate::entry::PageEntry;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// The entries of one page table, as seen through a [`TableWindow`](crate::TableWindow).
#[derive(Copy, Clone)]
pub struct PageTableNode<'w, E> {
    base: NonNull<E>,
    len: usize,
    _window: PhantomData<&'w E>,
}

/// One entry of a [`PageTableNode`].
#[derive(Copy, Clone)]
pub struct EntrySlot<'w, E> {
    ptr: NonNull<E>,
    _window: PhantomData<&'w E>,
}

impl<'w, E: PageEntry> PageTableNode<'w, E> {
    /// # Safety
    /// `base` must be valid for volatile reads and writes of `len` entries
    /// for `'w`.
    #[inline]
    pub(crate) const unsafe fn from_raw(base: NonNull<E>, len: usize) -> Self {
        Self {
            base,
            len,
            _window: PhantomData,
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// The entry at `slot`.
    ///
    /// # Panics
    /// If `slot` is out of range.
    #[inline]
    #[must_use]
    pub fn entry(&self, slot: usize) -> EntrySlot<'w, E> {
        assert!(slot < self.len, "slot {slot} out of range");
        // SAFETY: in bounds of the table.
        let ptr = unsafe { self.base.add(slot) };
        EntrySlot {
            ptr,
            _window: PhantomData,
        }
    }

    /// Snapshot of all entries.
    pub fn iter(&self) -> impl Iterator<Item = E> + 'w {
        let node = *self;
        (0..node.len).map(move |slot| node.entry(slot).get())
    }

    /// `true` if every entry is clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(|entry| entry.is_clear())
    }

    /// Clear every entry.
    pub fn clear(&self) {
        for slot in 0..self.len {
            self.entry(slot).clear();
        }
    }

    /// Slots holding anything but a clear entry.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + 'w {
        let node = *self;
        (0..node.len).filter(move |&slot| !node.entry(slot).is_clear())
    }
}

impl<E: PageEntry> EntrySlot<'_, E> {
    #[inline]
    #[must_use]
    pub fn get(&self) -> E {
        // SAFETY: the node vouched for the pointer.
        unsafe { self.ptr.read_volatile() }
    }

    #[inline]
    pub fn set(&self, entry: E) {
        // SAFETY: the node vouched for the pointer.
        unsafe { self.ptr.write_volatile(entry) }
    }

    #[inline]
    pub fn clear(&self) {
        self.set(E::CLEAR);
    }

    #[inline]
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.get().is_clear()
    }

    #[inline]
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.get().is_present()
    }

    #[inline]
    #[must_use]
    pub fn physical_address(&self) -> PhysicalAddress {
        self.get().physical_address()
    }

    /// Write a leaf mapping `phys`.
    #[inline]
    pub fn set_leaf<S: PageSize>(&self, phys: PhysicalPage<S>, ty: MemType) {
        self.set(E::leaf(phys, ty));
    }

    /// Point this entry at the table in `table`.
    #[inline]
    pub fn set_table(&self, table: PhysicalPage<Size4K>, ty: MemType) {
        self.set(E::table(table, ty));
    }
}

impl<E: PageEntry> fmt::Debug for PageTableNode<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for slot in self.occupied() {
            map.entry(&slot, &self.entry(slot).get());
        }
        map.finish()
    }
}

impl<E: PageEntry> fmt::Debug for EntrySlot<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}
