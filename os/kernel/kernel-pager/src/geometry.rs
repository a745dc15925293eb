//! # Table geometry
//!
//! A [`Geometry`] describes one x86 paging mode: how many levels it has, how
//! many virtual-address bits index each level, and where the recursive
//! self-map places the tables of each level.
//!
//! Everything else (entry counts, table sizes, the span of one entry, where a
//! virtual address lands) is derived from those constants, so the same pager
//! code drives two, three and four levels.
//!
//! ```text
//! Amd64:   | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//!          |  L0   |  L1   |  L2   |  L3   | offset |
//!
//! Ia32Pae: | 31‒30 | 29‒21 | 20‒12 | 11‒0   |
//!          |  L0   |  L1   |  L2   | offset |
//!
//! Ia32:    | 31‒22 | 21‒12 | 11‒0   |
//!          |  L0   |  L1   | offset |
//! ```

use crate::entry::{PageEntry, PageEntry32, PageEntry64};
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};

/// Constants and derived arithmetic of one paging mode.
pub trait Geometry: Copy + Clone + core::fmt::Debug + 'static {
    /// Number of levels, root included.
    const DEPTH: usize;

    /// Virtual-address index bits consumed by each level, root first.
    const BITS: &'static [u32];

    /// Self-map bases. `TABLE_BASE[0]` is the root's self-referencing entry,
    /// `TABLE_BASE[L + 1]` is where the tables of level `L` begin.
    const TABLE_BASE: &'static [u64];

    /// Virtual-address bits that take part in translation.
    const ADDRESS_MASK: u64;

    /// Number of top levels whose tables exist for the whole life of the
    /// address space and are never created or destroyed by the pager.
    const STATIC_LEVELS: usize;

    /// The hardware entry format.
    type Entry: PageEntry;

    /// Entries in one table of `level`.
    #[inline]
    #[must_use]
    fn entries(level: usize) -> usize {
        1 << Self::BITS[level]
    }

    /// Size in bytes of one table of `level`.
    #[inline]
    #[must_use]
    fn table_size(level: usize) -> u64 {
        (Self::entries(level) * size_of::<Self::Entry>()) as u64
    }

    /// Number of tables that can exist at `level`.
    #[inline]
    #[must_use]
    fn tables(level: usize) -> usize {
        1 << Self::BITS[..level].iter().sum::<u32>()
    }

    /// log2 of the span of virtual memory covered by one entry of `level`.
    #[inline]
    #[must_use]
    fn entry_shift(level: usize) -> u32 {
        Size4K::SHIFT + Self::BITS[level + 1..Self::DEPTH].iter().sum::<u32>()
    }

    /// Self-map address of table `index` at `level`.
    #[inline]
    #[must_use]
    fn table_address(level: usize, index: usize) -> VirtualAddress {
        debug_assert!(index < Self::tables(level), "level {level} has no table {index}");
        VirtualAddress::new(Self::TABLE_BASE[level + 1] + index as u64 * Self::table_size(level))
    }

    /// Inverse of [`table_address`](Self::table_address).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    fn table_index(level: usize, address: VirtualAddress) -> usize {
        debug_assert!(address.as_u64() >= Self::TABLE_BASE[level + 1]);
        ((address.as_u64() - Self::TABLE_BASE[level + 1]) / Self::table_size(level)) as usize
    }

    /// Index of the table at `level` that holds the entry translating `virt`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    fn table_of(level: usize, virt: VirtualAddress) -> usize {
        ((virt.as_u64() & Self::ADDRESS_MASK) >> (Self::entry_shift(level) + Self::BITS[level]))
            as usize
    }

    /// Slot within [`table_of`](Self::table_of) that translates `virt`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    fn slot_of(level: usize, virt: VirtualAddress) -> usize {
        ((virt.as_u64() & Self::ADDRESS_MASK) >> Self::entry_shift(level)) as usize
            & (Self::entries(level) - 1)
    }

    /// Index of the table at `ancestor_level` above table `index` of `level`.
    #[inline]
    #[must_use]
    fn ancestor(level: usize, index: usize, ancestor_level: usize) -> usize {
        debug_assert!(ancestor_level <= level);
        index >> Self::BITS[ancestor_level..level].iter().sum::<u32>()
    }
}

/// 32-bit paging: a page directory of 1024 entries over page tables of 1024
/// entries. Entry 1023 of the directory maps the directory itself.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ia32;

impl Geometry for Ia32 {
    const DEPTH: usize = 2;
    const BITS: &'static [u32] = &[10, 10];
    const TABLE_BASE: &'static [u64] = &[0xffff_fffc, 0xffff_f000, 0xffc0_0000];
    const ADDRESS_MASK: u64 = 0xffff_ffff;
    const STATIC_LEVELS: usize = 1;
    type Entry = PageEntry32;
}

/// 32-bit paging with PAE: a four-entry PDPT over page directories and page
/// tables of 512 entries.
///
/// The four page directories are installed when the address space is built
/// and stay for its whole life. Directory 3 mirrors them in its entries
/// 508 to 511, which makes entry 511 point at directory 3 itself.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ia32Pae;

impl Geometry for Ia32Pae {
    const DEPTH: usize = 3;
    const BITS: &'static [u32] = &[2, 9, 9];
    const TABLE_BASE: &'static [u64] = &[0xffff_fff8, 0xffff_ffe0, 0xffff_c000, 0xff80_0000];
    const ADDRESS_MASK: u64 = 0xffff_ffff;
    const STATIC_LEVELS: usize = 2;
    type Entry = PageEntry64;
}

/// Four-level long-mode paging with the self-map in PML4 entry 510.
#[derive(Copy, Clone, Debug, Default)]
pub struct Amd64;

impl Geometry for Amd64 {
    const DEPTH: usize = 4;
    const BITS: &'static [u32] = &[9, 9, 9, 9];
    const TABLE_BASE: &'static [u64] = &[
        0xffff_ff7f_bfdf_eff0,
        0xffff_ff7f_bfdf_e000,
        0xffff_ff7f_bfc0_0000,
        0xffff_ff7f_8000_0000,
        0xffff_ff00_0000_0000,
    ];
    const ADDRESS_MASK: u64 = 0xffff_ffff_ffff;
    const STATIC_LEVELS: usize = 1;
    type Entry = PageEntry64;
}

/// The paging mode of the build target.
#[cfg(target_arch = "x86_64")]
pub type NativeGeometry = Amd64;

/// The paging mode of the build target.
#[cfg(all(target_arch = "x86", feature = "pae"))]
pub type NativeGeometry = Ia32Pae;

/// The paging mode of the build target.
#[cfg(all(target_arch = "x86", not(feature = "pae")))]
pub type NativeGeometry = Ia32;
