//! Translation cache invalidation.

use kernel_memory_addresses::VirtualAddress;

/// Drops the cached translation of one page on the executing core.
pub trait TlbInvalidate {
    fn invalidate_page(&self, va: VirtualAddress);
}

impl<T: TlbInvalidate + ?Sized> TlbInvalidate for &T {
    #[inline]
    fn invalidate_page(&self, va: VirtualAddress) {
        (**self).invalidate_page(va);
    }
}

/// Invalidation through the `invlpg` instruction.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug, Default, Copy, Clone)]
pub struct Invlpg;

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl TlbInvalidate for Invlpg {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn invalidate_page(&self, va: VirtualAddress) {
        // SAFETY: invlpg only drops a cached translation, it never faults.
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va.as_u64() as usize, options(nostack, preserves_flags));
        }
    }
}
