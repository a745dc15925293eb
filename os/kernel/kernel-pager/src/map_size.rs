//! # Page size to level
//!
//! [`MapSize<G>`] tells at which level of geometry `G` a leaf of a given page
//! size lives. A size the paging mode cannot map has no implementation, so
//! the mistake surfaces at build time:
//!
//! | Geometry | 4 KiB | 2 MiB | 4 MiB | 1 GiB |
//! |:---------|:-----:|:-----:|:-----:|:-----:|
//! | [`Ia32`] | L1 | | L0 | |
//! | [`Ia32Pae`] | L2 | L1 | | |
//! | [`Amd64`] | L3 | L2 | | L1 |
//!
//! ```rust
//! use kernel_pager::{Amd64, Level, MapSize, Size1G};
//! assert_eq!(<<Size1G as MapSize<Amd64>>::Level as Level>::INDEX, 1);
//! ```
//!
//! ```compile_fail
//! use kernel_pager::{Amd64, Level, MapSize, Size4M};
//! let _ = <<Size4M as MapSize<Amd64>>::Level as Level>::INDEX;
//! ```

use crate::geometry::{Amd64, Geometry, Ia32, Ia32Pae};
use crate::level::{L0, L1, L2, L3, Level};
use kernel_memory_addresses::{PageSize, Size1G, Size2M, Size4K, Size4M};

/// A page size that geometry `G` can map, and the level its leaves live at.
pub trait MapSize<G: Geometry>: PageSize {
    type Level: Level;
}

impl MapSize<Ia32> for Size4K {
    type Level = L1;
}

impl MapSize<Ia32> for Size4M {
    type Level = L0;
}

impl MapSize<Ia32Pae> for Size4K {
    type Level = L2;
}

impl MapSize<Ia32Pae> for Size2M {
    type Level = L1;
}

impl MapSize<Amd64> for Size4K {
    type Level = L3;
}

impl MapSize<Amd64> for Size2M {
    type Level = L2;
}

impl MapSize<Amd64> for Size1G {
    type Level = L1;
}

/// Leaf level of `S` under `G`.
#[inline]
#[must_use]
pub(crate) const fn leaf_level<G: Geometry, S: MapSize<G>>() -> usize {
    <S::Level as Level>::INDEX
}
