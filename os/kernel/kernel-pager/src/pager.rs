//! # Mapper
//!
//! [`Pager`] installs and removes translations in the hierarchy reachable
//! through its [`TableWindow`].
//!
//! ## Map
//!
//! 1. Resolve the page size to its leaf level ([`MapSize`]).
//! 2. Split the virtual address into leaf table and slot.
//! 3. Create missing tables, root first, so no table is ever orphaned.
//! 4. Write the leaf and flush the virtual address.
//!
//! ## Unmap
//!
//! 1. Clear the leaf and flush the virtual address.
//! 2. Walk up while the table just touched is empty, destroying it.
//!
//! ```rust,no_run
//! use kernel_pager::*;
//!
//! fn map_page<A: FrameAlloc>(alloc: &mut A) -> Result<(), MapError> {
//!     // SAFETY: the loaded root carries the native self-map.
//!     let window = unsafe { SelfMapped::current() };
//!     let mut pager = Pager::<NativeGeometry, _, _>::new(&window, Invlpg);
//!     let frame = alloc.alloc_4k().ok_or(MapError::OutOfMemory { level: 0 })?;
//!     pager.map::<Size4K, _>(alloc, frame, VirtualAddress::new(0x40_0000), MemType::KernelRw)?;
//!     pager.unmap::<Size4K, _>(alloc, VirtualAddress::new(0x40_0000));
//!     alloc.free_4k(frame);
//!     Ok(())
//! }
//! ```

use crate::geometry::Geometry;
use crate::level::{L0, Level};
use crate::map_size::{MapSize, leaf_level};
use crate::table::{PageTable, TableRef};
use crate::tlb::TlbInvalidate;
use crate::{FrameAlloc, MemType, PageEntry, TableWindow};
use core::marker::PhantomData;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::trace;

/// Failure to establish a translation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// The frame allocator had nothing left for a table of `level`.
    #[error("out of memory while creating a level {level} table")]
    OutOfMemory { level: usize },
}

/// Maps and unmaps pages of geometry `G`.
///
/// Holds no locks; callers serialize all use of one hierarchy.
pub struct Pager<'w, G, W: ?Sized, I> {
    window: &'w W,
    tlb: I,
    _geometry: PhantomData<G>,
}

impl<'w, G, W, I> Pager<'w, G, W, I>
where
    G: Geometry,
    W: TableWindow + ?Sized,
    I: TlbInvalidate,
{
    /// A pager over the hierarchy visible through `window`, flushing through
    /// `tlb`. The root and its self-map entry must already be in place.
    #[must_use]
    pub const fn new(window: &'w W, tlb: I) -> Self {
        Self {
            window,
            tlb,
            _geometry: PhantomData,
        }
    }

    /// The root table.
    #[inline]
    #[must_use]
    pub fn root(&self) -> PageTable<'w, G, L0, W> {
        PageTable::table(self.window, 0)
    }

    /// Table `index` of level `L`.
    #[inline]
    #[must_use]
    pub fn table<L: Level>(&self, index: usize) -> PageTable<'w, G, L, W> {
        PageTable::table(self.window, index)
    }

    /// Whether table `index` of level `L` is currently backed.
    #[inline]
    #[must_use]
    pub fn exists<L: Level>(&self, index: usize) -> bool {
        self.table::<L>(index).exists()
    }

    /// Map the page `phys` of size `S` at `virt` with type `ty`, creating
    /// intermediate tables as needed.
    ///
    /// `virt` must be aligned to `S` and not mapped yet.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a table could not be allocated. Tables
    /// created by this call are released again before returning.
    pub fn map<S, A>(
        &mut self,
        alloc: &mut A,
        phys: PhysicalPage<S>,
        virt: VirtualAddress,
        ty: MemType,
    ) -> Result<(), MapError>
    where
        S: MapSize<G>,
        A: FrameAlloc + ?Sized,
    {
        debug_assert!(virt.is_aligned::<S>(), "{virt} is not {} aligned", S::as_str());
        let level = leaf_level::<G, S>();

        let table = TableRef::<G, W>::covering(self.window, level, virt)
            .materialize(ty, alloc, &self.tlb)?;
        let slot = table.node().entry(G::slot_of(level, virt));
        debug_assert!(slot.is_clear(), "{virt} is already mapped");

        slot.set_leaf(phys, ty);
        self.tlb.invalidate_page(virt);

        trace!("Mapped {virt} -> {phys} as {ty:?}");
        Ok(())
    }

    /// Remove the `S` page at `virt` and release every table that became
    /// empty. `virt` must be mapped with size `S`.
    pub fn unmap<S, A>(&mut self, alloc: &mut A, virt: VirtualAddress)
    where
        S: MapSize<G>,
        A: FrameAlloc + ?Sized,
    {
        let level = leaf_level::<G, S>();

        let table = TableRef::<G, W>::covering(self.window, level, virt);
        debug_assert!(table.exists(), "{virt} has no level {level} table");
        let slot = table.node().entry(G::slot_of(level, virt));
        debug_assert!(!slot.is_clear(), "{virt} is not mapped");

        slot.clear();
        self.tlb.invalidate_page(virt);
        table.collapse(alloc, &self.tlb);

        trace!("Unmapped {virt} ({})", S::as_str());
    }

    /// The physical address `virt` translates to, if any.
    ///
    /// Non-present leaves (demand pages) do not translate.
    #[must_use]
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        for level in 0..G::DEPTH {
            let table = TableRef::<G, W>::covering(self.window, level, virt);
            let entry = table.node().entry(G::slot_of(level, virt)).get();
            if !entry.is_present() {
                return None;
            }
            if level + 1 == G::DEPTH || entry.is_huge() {
                let offset = virt.as_u64() & ((1 << G::entry_shift(level)) - 1);
                return Some(entry.physical_address() + offset);
            }
        }
        None
    }

    /// Back the base page at `virt` with a fresh frame.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if neither the frame nor its tables could be
    /// allocated. Nothing stays allocated in that case.
    pub fn allocate_block<A>(
        &mut self,
        alloc: &mut A,
        virt: VirtualAddress,
        ty: MemType,
    ) -> Result<PhysicalPage<Size4K>, MapError>
    where
        Size4K: MapSize<G>,
        A: FrameAlloc + ?Sized,
    {
        let leaf = leaf_level::<G, Size4K>();
        let Some(frame) = alloc.alloc_4k() else {
            return Err(MapError::OutOfMemory { level: leaf });
        };

        if let Err(err) = self.map::<Size4K, A>(alloc, frame, virt, ty) {
            alloc.free_4k(frame);
            return Err(err);
        }
        Ok(frame)
    }

    /// Unmap the base page at `virt` and give its frame back.
    ///
    /// `virt` must have been set up by [`allocate_block`](Self::allocate_block).
    pub fn release_block<A>(&mut self, alloc: &mut A, virt: VirtualAddress)
    where
        Size4K: MapSize<G>,
        A: FrameAlloc + ?Sized,
    {
        let level = leaf_level::<G, Size4K>();
        let entry = TableRef::<G, W>::covering(self.window, level, virt)
            .node()
            .entry(G::slot_of(level, virt))
            .get();
        let frame = PhysicalPage::from_addr(entry.physical_address());

        self.unmap::<Size4K, A>(alloc, virt);
        alloc.free_4k(frame);
    }
}
