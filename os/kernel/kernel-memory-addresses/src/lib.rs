//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw addresses and page bases used by the paging
//! code. They are zero-cost `u64` newtypes that keep virtual and physical
//! addresses from being mixed up at compile time.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | An address translated by the page tables. |
//! | [`PhysicalAddress`] | A machine (bus) address: RAM or MMIO. |
//! | [`PhysicalPage<S>`] | The page-aligned base of a physical page of size `S`. |
//!
//! ## Page Sizes
//!
//! Page sizes are marker types implementing the sealed [`PageSize`] trait:
//!
//! - [`Size4K`]: 4 KiB, the base granularity of every x86 paging mode
//! - [`Size2M`]: 2 MiB large pages (PAE and long mode)
//! - [`Size4M`]: 4 MiB large pages (32-bit paging with PSE)
//! - [`Size1G`]: 1 GiB huge pages (long mode)
//!
//! Which of these a concrete paging mode can map is decided elsewhere; this
//! crate only describes the sizes.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0040_1234);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0040_1000);
//! assert_eq!(page.join(pa.offset::<Size4K>()), pa);
//!
//! let va = VirtualAddress::new(0xFFFF_8000_0020_0042);
//! assert_eq!(va.align_down::<Size2M>().as_u64(), 0xFFFF_8000_0020_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use crate::page_size::{PageSize, Size1G, Size2M, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;

/// Mask selecting the in-page offset bits of a page of size `S`.
#[inline]
#[must_use]
pub const fn offset_mask<S: PageSize>() -> u64 {
    S::SIZE - 1
}
