//! # Recursive Page-Table Pager
//!
//! Creates, walks and tears down x86 page-table hierarchies through a
//! **recursive self-map**: one entry of the root table points back at the root
//! itself, so every table of the hierarchy appears at a fixed virtual address
//! and can be reached in O(1) without walking from the root.
//!
//! ## Paging modes
//!
//! The pager is generic over a [`Geometry`], which carries the depth, the index
//! bits per level and the self-map bases of one paging mode:
//!
//! | Geometry | Levels | Index bits | Entry | Leaf sizes |
//! |:---------|:------:|:-----------|:------|:-----------|
//! | [`Ia32`] | 2 | 10, 10 | [`PageEntry32`] | 4 KiB (L1), 4 MiB (L0) |
//! | [`Ia32Pae`] | 3 | 2, 9, 9 | [`PageEntry64`] | 4 KiB (L2), 2 MiB (L1) |
//! | [`Amd64`] | 4 | 9, 9, 9, 9 | [`PageEntry64`] | 4 KiB (L3), 2 MiB (L2), 1 GiB (L1) |
//!
//! [`NativeGeometry`] names the mode of the build target.
//!
//! ## Self-map layout
//!
//! ```text
//! TABLE_BASE[0]   the root's self-referencing entry
//! TABLE_BASE[1]   the root table
//! TABLE_BASE[2]   all level 1 tables, back to back
//! ...
//! TABLE_BASE[D]   all level D-1 tables, back to back
//! ```
//!
//! Table `i` of level `L` lives at `TABLE_BASE[L + 1] + i * table_size(L)`.
//!
//! ## Lifecycle
//!
//! - Intermediate tables are created **top-down** the first time a mapping
//!   needs them ([`Pager::map`]).
//! - They are destroyed **bottom-up** as soon as the last mapping beneath them
//!   is removed ([`Pager::unmap`]).
//! - The root (and, under PAE, the four page directories) are never created
//!   or destroyed here.
//!
//! ## Collaborators
//!
//! - [`FrameAlloc`]: hands out and takes back physical 4 KiB frames.
//! - [`TableWindow`]: turns self-map addresses into usable pointers.
//! - [`TlbInvalidate`]: drops stale translations on the executing core.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod entry;
mod geometry;
mod level;
mod map_size;
mod mem_type;
mod node;
mod pager;
mod table;
mod tlb;

use core::ptr::NonNull;

pub use crate::entry::{PageEntry, PageEntry32, PageEntry64};
pub use crate::geometry::{Amd64, Geometry, Ia32, Ia32Pae, NativeGeometry};
pub use crate::level::{ChildLevel, L0, L1, L2, L3, Level};
pub use crate::map_size::MapSize;
pub use crate::mem_type::MemType;
pub use crate::node::{EntrySlot, PageTableNode};
pub use crate::pager::{MapError, Pager};
pub use crate::table::PageTable;
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub use crate::tlb::Invlpg;
pub use crate::tlb::TlbInvalidate;

pub use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K, Size4M, VirtualAddress,
};

/// Source of **physical** 4 KiB frames for page tables and data pages.
///
/// The implementation decides where frames come from (bootloader pool,
/// bitmap, buddy allocator). Returned frames **must** be 4 KiB aligned.
/// The pager never touches a frame before it has mapped it.
pub trait FrameAlloc {
    /// Allocate one 4 KiB *physical* frame. Returns `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Give back a frame previously returned by [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage<Size4K>);
}

/// Makes self-map addresses accessible.
///
/// In the kernel the self-map *is* the active address space, so
/// [`SelfMapped`] simply reinterprets the address as a pointer. Other
/// contexts (a loader preparing tables, a simulator) translate the address
/// themselves.
///
/// # Safety
/// For every table address handed to [`resolve`](Self::resolve) whose
/// pointing entries are present, the returned pointer must be valid for
/// volatile reads and writes of the whole table, and must alias the memory the
/// hardware walks for that table.
pub unsafe trait TableWindow {
    /// Return a pointer to the bytes visible at `va`.
    fn resolve(&self, va: VirtualAddress) -> NonNull<u8>;
}

/// The self-map of the currently loaded address space.
///
/// Only obtainable through [`SelfMapped::current`], since every table handle
/// built on it dereferences raw self-map addresses:
///
/// ```compile_fail
/// # use kernel_pager::*;
/// let _ = PageTable::<Amd64, L3, _>::table(&SelfMapped {}, 0).is_empty();
/// ```
#[derive(Debug, Copy, Clone)]
pub struct SelfMapped {
    _private: (),
}

impl SelfMapped {
    /// The window of the address space the executing core runs on.
    ///
    /// # Safety
    /// The loaded root table must hold the self-referencing entry of the
    /// [`Geometry`] used with this window, and the returned value must only be
    /// used while that root stays loaded. Callers must not dereference a table
    /// (through [`PageTable::node`], [`PageTable::is_empty`] or
    /// [`PageTable::pointer`]) whose ancestors are not all present.
    #[inline]
    #[must_use]
    pub const unsafe fn current() -> Self {
        Self { _private: () }
    }
}

// SAFETY: `current` makes the caller vouch for the self-map and for only
// touching tables whose pointing entries are present.
unsafe impl TableWindow for SelfMapped {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn resolve(&self, va: VirtualAddress) -> NonNull<u8> {
        let ptr = core::ptr::with_exposed_provenance_mut::<u8>(va.as_u64() as usize);
        // SAFETY: every self-map address lies at the top of the address space.
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn self_mapped_addresses_are_pointers() {
        // SAFETY: the pointer is only inspected, never dereferenced.
        let window = unsafe { SelfMapped::current() };
        let va = VirtualAddress::new(0xffff_ff7f_bfdf_e000);
        assert_eq!(window.resolve(va).as_ptr().addr() as u64, va.as_u64());
    }
}
