//! Compile-time hierarchy levels.
//!
//! Level `0` is the root. Operations that only make sense below the root
//! ([`PageTable::parent`](crate::PageTable::parent),
//! [`PageTable::create`](crate::PageTable::create), ...) are bounded by
//! [`ChildLevel`], so asking the root for its parent does not compile.

use core::fmt::Debug;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A level of the page-table hierarchy.
pub trait Level: sealed::Sealed + Copy + Clone + Debug + Default + Eq + Hash + 'static {
    /// Depth below the root.
    const INDEX: usize;
}

/// A level that has a parent level.
pub trait ChildLevel: Level {
    type Parent: Level;
}

macro_rules! level {
    ($(#[$doc:meta])* $name:ident, $index:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Level for $name {
            const INDEX: usize = $index;
        }
    };
    ($(#[$doc:meta])* $name:ident, $index:literal, $parent:ident) => {
        level!($(#[$doc])* $name, $index);

        impl ChildLevel for $name {
            type Parent = $parent;
        }
    };
}

level!(
    /// The root table (PML4, PDPT under PAE, PD on ia32).
    L0, 0
);
level!(
    /// First level below the root.
    L1, 1, L0
);
level!(
    /// Second level below the root.
    L2, 2, L1
);
level!(
    /// Third level below the root (the PT of long mode).
    L3, 3, L2
);
