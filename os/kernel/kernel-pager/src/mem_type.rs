//! # Memory types
//!
//! A [`MemType`] says what a mapping is *for*; the entry encodings turn it
//! into hardware bits.
//!
//! | Type | P | W | U | NX | PCD | Note |
//! |:-----|:-:|:-:|:-:|:--:|:---:|:-----|
//! | `KernelExec` | 1 | 0 | 0 | 0 | 0 | |
//! | `KernelRo`   | 1 | 0 | 0 | 1 | 0 | |
//! | `KernelRw`   | 1 | 1 | 0 | 1 | 0 | |
//! | `KernelMmio` | 1 | 1 | 0 | 1 | 1 | |
//! | `UserExec`   | 1 | 0 | 1 | 0 | 0 | |
//! | `UserRo`     | 1 | 0 | 1 | 1 | 0 | |
//! | `UserRw`     | 1 | 1 | 1 | 1 | 0 | |
//! | `UserCow`    | 1 | 0 | 1 | 1 | 0 | copy-on-write marker |
//! | `UserDemand` | 0 | 0 | 1 | 1 | 0 | demand marker, faults on access |
//!
//! Tables above a leaf are installed with the leaf's
//! [`parent_type`](MemType::parent_type).

/// What a mapping is used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemType {
    KernelExec,
    KernelRo,
    KernelRw,
    /// Device memory, uncached.
    KernelMmio,
    UserExec,
    UserRo,
    UserRw,
    /// Read-only until the first write fault copies the page.
    UserCow,
    /// Reserved but not backed; the first access faults.
    UserDemand,
}

impl MemType {
    /// Every memory type.
    pub const ALL: [Self; 9] = [
        Self::KernelExec,
        Self::KernelRo,
        Self::KernelRw,
        Self::KernelMmio,
        Self::UserExec,
        Self::UserRo,
        Self::UserRw,
        Self::UserCow,
        Self::UserDemand,
    ];

    /// The type of the intermediate entries above a leaf of this type.
    ///
    /// Kernel leaves hang below kernel read/write tables, user leaves below
    /// user read/write tables; the leaf itself narrows the permissions.
    #[inline]
    #[must_use]
    pub const fn parent_type(self) -> Self {
        match self {
            Self::KernelExec | Self::KernelRo | Self::KernelRw => Self::KernelRw,
            Self::UserExec | Self::UserRo | Self::UserRw | Self::UserCow | Self::UserDemand => {
                Self::UserRw
            }
            Self::KernelMmio => Self::KernelRw,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(
            self,
            Self::UserExec | Self::UserRo | Self::UserRw | Self::UserCow | Self::UserDemand
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::UserDemand)
    }

    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::KernelRw | Self::KernelMmio | Self::UserRw)
    }

    #[inline]
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::KernelExec | Self::UserExec)
    }

    #[inline]
    #[must_use]
    pub const fn is_uncached(self) -> bool {
        matches!(self, Self::KernelMmio)
    }

    #[inline]
    #[must_use]
    pub const fn is_copy_on_write(self) -> bool {
        matches!(self, Self::UserCow)
    }

    #[inline]
    #[must_use]
    pub const fn is_demand(self) -> bool {
        matches!(self, Self::UserDemand)
    }
}
