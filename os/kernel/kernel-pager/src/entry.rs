//! # Page-table entries
//!
//! [`PageEntry`] is the contract the pager needs from a hardware entry
//! format. Two encodings are provided:
//!
//! - [`PageEntry32`]: the 32-bit entry of classic ia32 paging (no NX).
//! - [`PageEntry64`]: the 64-bit entry shared by PAE and long mode.
//!
//! Bits 9 and 10 are available to the OS on every level and carry the
//! copy-on-write and demand markers of [`MemType::UserCow`] and
//! [`MemType::UserDemand`].
//!
//! ## Leaf vs. table entries
//!
//! - [`PageEntry::set`] writes a **leaf**; the large-page bit is set for
//!   anything larger than 4 KiB.
//! - [`PageEntry::set_table`] writes a **pointer** to the next-level table.
//!   It never sets the large-page bit, and never sets NX: permissions are
//!   intersected along the walk, so an NX pointer would forbid execution of
//!   every page beneath it.

mod entry32;
mod entry64;

pub use entry32::PageEntry32;
pub use entry64::PageEntry64;

use crate::MemType;
use core::fmt::Debug;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// A hardware page-table entry.
pub trait PageEntry: Copy + Eq + Debug + 'static {
    /// The all-zero entry.
    const CLEAR: Self;

    /// Make this a leaf mapping `phys` with the bits of `ty`.
    fn set<S: PageSize>(&mut self, phys: PhysicalPage<S>, ty: MemType);

    /// Make this a pointer to the next-level table in `table`.
    fn set_table(&mut self, table: PhysicalPage<Size4K>, ty: MemType);

    #[inline]
    fn clear(&mut self) {
        *self = Self::CLEAR;
    }

    /// `true` if every bit is zero. A non-present demand entry is not clear.
    fn is_clear(&self) -> bool;

    fn is_present(&self) -> bool;

    /// `true` if this is a leaf above the last level.
    fn is_huge(&self) -> bool;

    /// The physical base stored in the entry.
    fn physical_address(&self) -> PhysicalAddress;

    /// A fresh leaf entry.
    #[inline]
    #[must_use]
    fn leaf<S: PageSize>(phys: PhysicalPage<S>, ty: MemType) -> Self {
        let mut entry = Self::CLEAR;
        entry.set(phys, ty);
        entry
    }

    /// A fresh table pointer.
    #[inline]
    #[must_use]
    fn table(table: PhysicalPage<Size4K>, ty: MemType) -> Self {
        let mut entry = Self::CLEAR;
        entry.set_table(table, ty);
        entry
    }
}
