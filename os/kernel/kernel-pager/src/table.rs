//! # Hierarchical tables
//!
//! A table is named by `(level, index)`. Its self-map address follows from
//! the geometry alone:
//!
//! ```text
//! address = TABLE_BASE[level + 1] + index * table_size(level)
//! parent  = (level - 1, index >> BITS[level - 1])
//! pointer = parent[index & (entries(level - 1) - 1)]
//! ```
//!
//! The entry that points at a table is at the same time the leaf translation
//! of the table's own self-map address. Creating a table therefore installs
//! its frame in the parent and flushes the table's address; destroying it
//! clears that entry and flushes the address again.
//!
//! [`PageTable`] is the typed handle, generic over the level. The pager's own
//! loops run over levels at runtime and use an untyped twin.

use crate::geometry::Geometry;
use crate::level::{ChildLevel, Level};
use crate::node::{EntrySlot, PageTableNode};
use crate::pager::MapError;
use crate::tlb::TlbInvalidate;
use crate::{FrameAlloc, MemType, TableWindow};
use core::fmt;
use core::marker::PhantomData;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use log::{trace, warn};

/// A table whose level is only known at runtime.
pub(crate) struct TableRef<'w, G, W: ?Sized> {
    level: usize,
    index: usize,
    window: &'w W,
    _geometry: PhantomData<G>,
}

impl<G, W: ?Sized> Clone for TableRef<'_, G, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G, W: ?Sized> Copy for TableRef<'_, G, W> {}

impl<'w, G: Geometry, W: TableWindow + ?Sized> TableRef<'w, G, W> {
    #[inline]
    pub(crate) fn at(window: &'w W, level: usize, index: usize) -> Self {
        debug_assert!(level < G::DEPTH);
        debug_assert!(index < G::tables(level), "level {level} has no table {index}");
        Self {
            level,
            index,
            window,
            _geometry: PhantomData,
        }
    }

    /// The table at `level` on the translation path of `virt`.
    #[inline]
    pub(crate) fn covering(window: &'w W, level: usize, virt: VirtualAddress) -> Self {
        Self::at(window, level, G::table_of(level, virt))
    }

    #[inline]
    pub(crate) const fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) fn address(&self) -> VirtualAddress {
        G::table_address(self.level, self.index)
    }

    pub(crate) fn node(&self) -> PageTableNode<'w, G::Entry> {
        let base = self.window.resolve(self.address()).cast::<G::Entry>();
        // SAFETY: the window resolves table addresses to the whole table.
        unsafe { PageTableNode::from_raw(base, G::entries(self.level)) }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Self {
        debug_assert!(self.level > 0, "the root has no parent");
        let level = self.level - 1;
        Self::at(self.window, level, G::ancestor(self.level, self.index, level))
    }

    /// The entry in the parent that points at this table.
    pub(crate) fn pointer(&self) -> EntrySlot<'w, G::Entry> {
        let slot = self.index & (G::entries(self.level - 1) - 1);
        self.parent().node().entry(slot)
    }

    /// Checks the pointing entry of every ancestor, root first.
    pub(crate) fn exists(&self) -> bool {
        (1..=self.level).all(|level| {
            let ancestor = G::ancestor(self.level, self.index, level);
            Self::at(self.window, level, ancestor).pointer().is_present()
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.node().is_empty()
    }

    /// Back the table with a fresh frame and clear it.
    ///
    /// The parent must exist and the table must not.
    pub(crate) fn create<A, I>(
        window: &'w W,
        level: usize,
        index: usize,
        ty: MemType,
        alloc: &mut A,
        tlb: &I,
    ) -> Result<Self, MapError>
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        debug_assert!(
            level >= G::STATIC_LEVELS,
            "level {level} tables are static"
        );
        let table = Self::at(window, level, index);
        debug_assert!(table.parent().exists(), "parent of {table:?} is missing");
        debug_assert!(!table.pointer().is_present(), "{table:?} already exists");

        let Some(frame) = alloc.alloc_4k() else {
            warn!("Out of memory while creating {table:?}");
            return Err(MapError::OutOfMemory { level });
        };

        table.pointer().set_table(frame, ty.parent_type());
        tlb.invalidate_page(table.address());
        table.node().clear();

        trace!("Created {table:?} in frame {frame}");
        Ok(table)
    }

    /// Release the frame of an empty table.
    pub(crate) fn destroy<A, I>(self, alloc: &mut A, tlb: &I)
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        debug_assert!(
            self.level >= G::STATIC_LEVELS,
            "level {} tables are static",
            self.level
        );
        debug_assert!(self.is_empty(), "destroying non-empty {self:?}");

        let pointer = self.pointer();
        let frame = PhysicalPage::from_addr(pointer.physical_address());
        pointer.clear();
        tlb.invalidate_page(self.address());
        alloc.free_4k(frame);

        trace!("Destroyed {self:?}, released frame {frame}");
    }

    /// Create every missing table from the first non-static level down to
    /// this one.
    ///
    /// If a frame cannot be had, the tables created so far are destroyed again.
    pub(crate) fn materialize<A, I>(self, ty: MemType, alloc: &mut A, tlb: &I) -> Result<Self, MapError>
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        let mut first_created = None;
        for level in G::STATIC_LEVELS..=self.level {
            let ancestor = G::ancestor(self.level, self.index, level);
            if Self::at(self.window, level, ancestor).pointer().is_present() {
                continue;
            }

            if let Err(err) = Self::create(self.window, level, ancestor, ty, alloc, tlb) {
                if let Some(first) = first_created {
                    for created in (first..level).rev() {
                        let ancestor = G::ancestor(self.level, self.index, created);
                        Self::at(self.window, created, ancestor).destroy(alloc, tlb);
                    }
                }
                return Err(err);
            }
            if first_created.is_none() {
                first_created = Some(level);
            }
        }
        Ok(self)
    }

    /// Destroy this table if it is empty, then its parent if that became
    /// empty, up to the first static level.
    pub(crate) fn collapse<A, I>(self, alloc: &mut A, tlb: &I)
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        let mut table = self;
        while table.level >= G::STATIC_LEVELS && table.is_empty() {
            let parent = table.parent();
            table.destroy(alloc, tlb);
            table = parent;
        }
    }
}

impl<G: Geometry, W: ?Sized> fmt::Debug for TableRef<'_, G, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {} table {} at {}",
            self.level,
            self.index,
            G::table_address(self.level, self.index)
        )
    }
}

/// A table of geometry `G` at level `L`, seen through window `W`.
///
/// ```rust
/// # use kernel_pager::*;
/// // SAFETY: only address arithmetic, no table is dereferenced.
/// let window = unsafe { SelfMapped::current() };
/// let pdpt = PageTable::<Amd64, L1, _>::table(&window, 0);
/// assert_eq!(pdpt.address().as_u64(), 0xffff_ff7f_bfc0_0000);
/// assert_eq!(pdpt.parent().index(), 0);
/// ```
///
/// Asking for a level the geometry does not have fails to build:
///
/// ```compile_fail
/// # use kernel_pager::*;
/// let window = unsafe { SelfMapped::current() };
/// let _ = PageTable::<Ia32, L2, _>::table(&window, 0);
/// ```
pub struct PageTable<'w, G, L, W: ?Sized> {
    inner: TableRef<'w, G, W>,
    _level: PhantomData<L>,
}

impl<G, L, W: ?Sized> Clone for PageTable<'_, G, L, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G, L, W: ?Sized> Copy for PageTable<'_, G, L, W> {}

impl<'w, G: Geometry, L: Level, W: TableWindow + ?Sized> PageTable<'w, G, L, W> {
    #[inline]
    const fn wrap(inner: TableRef<'w, G, W>) -> Self {
        Self {
            inner,
            _level: PhantomData,
        }
    }

    /// Table `index` of level `L`. No walking takes place.
    #[inline]
    #[must_use]
    pub fn table(window: &'w W, index: usize) -> Self {
        const { assert!(L::INDEX < G::DEPTH, "level beyond the hierarchy") };
        Self::wrap(TableRef::at(window, L::INDEX, index))
    }

    /// The table whose self-map address is `address`.
    #[inline]
    #[must_use]
    pub fn at_address(window: &'w W, address: VirtualAddress) -> Self {
        Self::table(window, G::table_index(L::INDEX, address))
    }

    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.inner.index()
    }

    #[inline]
    #[must_use]
    pub const fn level(&self) -> usize {
        self.inner.level()
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> VirtualAddress {
        self.inner.address()
    }

    /// The entries. The table must exist.
    #[inline]
    #[must_use]
    pub fn node(&self) -> PageTableNode<'w, G::Entry> {
        self.inner.node()
    }

    /// `true` if every ancestor points at the next one down to this table.
    /// Always `true` for the root.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.inner.exists()
    }

    /// `true` if no entry is in use. The table must exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<'w, G: Geometry, L: ChildLevel, W: TableWindow + ?Sized> PageTable<'w, G, L, W> {
    #[inline]
    #[must_use]
    pub fn parent(&self) -> PageTable<'w, G, L::Parent, W> {
        PageTable::wrap(self.inner.parent())
    }

    /// The entry in [`parent`](Self::parent) that points at this table.
    /// The parent must exist.
    #[inline]
    #[must_use]
    pub fn pointer(&self) -> EntrySlot<'w, G::Entry> {
        self.inner.pointer()
    }

    /// Back table `index` with a fresh, cleared frame.
    ///
    /// The parent must exist and the table must not; the pointing entry is
    /// installed with `ty`'s [`parent_type`](MemType::parent_type).
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if the allocator has no frame.
    pub fn create<A, I>(
        window: &'w W,
        index: usize,
        ty: MemType,
        alloc: &mut A,
        tlb: &I,
    ) -> Result<Self, MapError>
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        const { assert!(L::INDEX < G::DEPTH, "level beyond the hierarchy") };
        TableRef::create(window, L::INDEX, index, ty, alloc, tlb).map(Self::wrap)
    }

    /// Release the table. It must be empty.
    pub fn destroy<A, I>(self, alloc: &mut A, tlb: &I)
    where
        A: FrameAlloc + ?Sized,
        I: TlbInvalidate + ?Sized,
    {
        self.inner.destroy(alloc, tlb);
    }
}

impl<G: Geometry, L, W: ?Sized> fmt::Debug for PageTable<'_, G, L, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}
