use crate::MemType;
use crate::entry::PageEntry;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// A 32-bit x86 page-table entry (PDE or PTE of classic ia32 paging).
///
/// Same low twelve bits as [`PageEntry64`](super::PageEntry64), followed by a
/// 20-bit frame number. There is no NX bit: read-only kernel and user data
/// stay executable in this mode.
///
/// A PDE with `large_page` set maps a 4 MiB page (PSE).
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntry32 {
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

    /// Physical address bits \[31:12\].
    #[bits(20)]
    frame: u32,
}

impl PageEntry32 {
    const FRAME_MASK: u64 = (1 << 20) - 1;

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn with_physical_address(self, phys: PhysicalAddress) -> Self {
        debug_assert!(phys.as_u64() <= u64::from(u32::MAX), "{phys} above 4 GiB");
        self.with_frame(((phys.as_u64() >> 12) & Self::FRAME_MASK) as u32)
    }
}

impl PageEntry for PageEntry32 {
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
        PhysicalAddress::new(u64::from(self.frame()) << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::Size4M;

    #[test]
    fn four_megabyte_leaf() {
        let page = PhysicalAddress::new(0x0080_0000).page::<Size4M>();
        let e = PageEntry32::leaf(page, MemType::KernelRw);
        assert!(e.present() && e.writable() && e.large_page());
        assert_eq!(e.physical_address(), page.base());
        assert_eq!(e.into_bits(), 0x0080_0083);
    }

    #[test]
    fn user_table_pointer() {
        let page = PhysicalAddress::new(0xfffff000).page::<Size4K>();
        let e = PageEntry32::table(page, MemType::UserRw);
        assert_eq!(e.into_bits(), 0xffff_f007);
    }

    #[test]
    fn cow_and_demand_markers() {
        let page = PhysicalAddress::new(0x3000).page::<Size4K>();
        let cow = PageEntry32::leaf(page, MemType::UserCow);
        assert_eq!(cow.into_bits(), 0x3000 | 0x200 | 0b101);

        let demand = PageEntry32::leaf(page, MemType::UserDemand);
        assert!(!demand.is_present() && !demand.is_clear());
        assert_eq!(demand.into_bits(), 0x3000 | 0x400 | 0b100);
    }

    #[test]
    fn mmio_is_uncached() {
        let page = PhysicalAddress::new(0xfee0_0000).page::<Size4K>();
        let e = PageEntry32::leaf(page, MemType::KernelMmio);
        assert!(e.cache_disable());
        assert_eq!(e.into_bits(), 0xfee0_0013);
    }
}
