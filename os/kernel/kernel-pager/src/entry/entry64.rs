use crate::MemType;
use crate::entry::PageEntry;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// A 64-bit x86 page-table entry (PAE and long mode) in its raw bitfield form.
///
/// The layout is the **common superset** of all levels (PML4E, PDPTE, PDE,
/// PTE); which bits matter depends on the level and on `large_page`.
///
/// | Bits  | Name | Meaning |
/// |-------|------|---------|
/// | 0     | `P`   | Present |
/// | 1     | `RW`  | Writable |
/// | 2     | `US`  | User accessible |
/// | 3     | `PWT` | Write-through |
/// | 4     | `PCD` | Cache disable |
/// | 5     | `A`   | Accessed |
/// | 6     | `D`   | Dirty (leaf only) |
/// | 7     | `PS`  | Large page |
/// | 8     | `G`   | Global (leaf only) |
/// | 9     | OS    | Copy-on-write marker |
/// | 10    | OS    | Demand marker |
/// | 11    | OS    | Unused |
/// | 12–51 | addr  | Physical frame bits \[51:12\] |
/// | 52–58 | OS    | Unused |
/// | 59–62 | PKU   | Protection key |
/// | 63    | `NX`  | Execute disable |
///
/// ```rust
/// # use kernel_pager::*;
/// let page = PhysicalAddress::new(0x20_0000).page::<Size2M>();
/// let e = PageEntry64::leaf(page, MemType::KernelRw);
/// assert!(e.present() && e.writable() && e.large_page() && e.no_execute());
/// assert_eq!(e.physical_address(), page.base());
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry64 {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub large_page: bool,
    pub global: bool,
    pub copy_on_write: bool,
    pub demand: bool,
    pub os_available: bool,

    /// Physical address bits \[51:12\].
    #[bits(40)]
    frame: u64,

    #[bits(7)]
    pub os_available_high: u8,

    /// Protection key, if PKU is enabled.
    #[bits(4)]
    pub protection_key: u8,

    /// Instruction fetches are disallowed through this entry (`EFER.NXE`).
    pub no_execute: bool,
}

impl PageEntry64 {
    const FRAME_MASK: u64 = (1 << 40) - 1;

    #[inline]
    const fn with_physical_address(self, phys: PhysicalAddress) -> Self {
        self.with_frame((phys.as_u64() >> 12) & Self::FRAME_MASK)
    }
}

impl PageEntry for PageEntry64 {
    const CLEAR: Self = Self::new();

    fn set<S: PageSize>(&mut self, phys: PhysicalPage<S>, ty: MemType) {
        *self = Self::new()
            .with_present(ty.is_present())
            .with_writable(ty.is_writable())
            .with_user(ty.is_user())
            .with_cache_disable(ty.is_uncached())
            .with_large_page(S::SHIFT > Size4K::SHIFT)
            .with_copy_on_write(ty.is_copy_on_write())
            .with_demand(ty.is_demand())
            .with_no_execute(!ty.is_executable())
            .with_physical_address(phys.base());
    }

    fn set_table(&mut self, table: PhysicalPage<Size4K>, ty: MemType) {
        *self = Self::new()
            .with_present(true)
            .with_writable(ty.is_writable())
            .with_user(ty.is_user())
            .with_physical_address(table.base());
    }

    #[inline]
    fn is_clear(&self) -> bool {
        self.into_bits() == 0
    }

    #[inline]
    fn is_present(&self) -> bool {
        self.present()
    }

    #[inline]
    fn is_huge(&self) -> bool {
        self.large_page()
    }

    #[inline]
    fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::{Size1G, Size2M};

    fn leaf(ty: MemType) -> PageEntry64 {
        PageEntry64::leaf(PhysicalAddress::new(0x1234_5000).page::<Size4K>(), ty)
    }

    #[test]
    fn leaf_encodings() {
        let e = leaf(MemType::KernelExec);
        assert!(e.present() && !e.writable() && !e.user() && !e.no_execute());

        let e = leaf(MemType::KernelRo);
        assert!(e.present() && !e.writable() && !e.user() && e.no_execute());

        let e = leaf(MemType::KernelRw);
        assert!(e.present() && e.writable() && !e.user() && e.no_execute());
        assert!(!e.cache_disable());

        let e = leaf(MemType::KernelMmio);
        assert!(e.present() && e.writable() && e.cache_disable() && e.no_execute());

        let e = leaf(MemType::UserExec);
        assert!(e.present() && !e.writable() && e.user() && !e.no_execute());

        let e = leaf(MemType::UserRo);
        assert!(e.present() && !e.writable() && e.user() && e.no_execute());

        let e = leaf(MemType::UserRw);
        assert!(e.present() && e.writable() && e.user() && e.no_execute());

        let e = leaf(MemType::UserCow);
        assert!(e.present() && !e.writable() && e.user() && e.copy_on_write());
    }

    #[test]
    fn demand_leaf_is_absent_but_not_clear() {
        let e = leaf(MemType::UserDemand);
        assert!(!e.is_present());
        assert!(!e.is_clear());
        assert!(e.demand());
    }

    #[test]
    fn large_page_bit_follows_the_size() {
        assert!(!leaf(MemType::KernelRw).is_huge());

        let two = PageEntry64::leaf(PhysicalAddress::new(0x20_0000).page::<Size2M>(), MemType::KernelRw);
        assert!(two.is_huge());

        let one = PageEntry64::leaf(PhysicalAddress::new(0x4000_0000).page::<Size1G>(), MemType::UserRo);
        assert!(one.is_huge());
        assert_eq!(one.physical_address().as_u64(), 0x4000_0000);
    }

    #[test]
    fn table_pointers_never_forbid_execution() {
        let page = PhysicalAddress::new(0x7000).page::<Size4K>();
        for ty in MemType::ALL {
            let e = PageEntry64::table(page, ty.parent_type());
            assert!(e.present());
            assert!(e.writable());
            assert!(!e.no_execute());
            assert!(!e.large_page());
            assert_eq!(e.user(), ty.is_user());
            assert_eq!(e.physical_address(), page.base());
        }
    }

    #[test]
    fn physical_address_survives_high_bits() {
        let page = PhysicalAddress::new(0x000f_ffff_ffff_f000).page::<Size4K>();
        let e = PageEntry64::leaf(page, MemType::KernelRo);
        assert_eq!(e.physical_address(), page.base());
        assert!(e.no_execute());
    }

    #[test]
    fn clear_resets_everything() {
        let mut e = leaf(MemType::UserRw);
        assert!(!e.is_clear());
        e.clear();
        assert!(e.is_clear());
        assert_eq!(e, PageEntry64::CLEAR);
    }
}
