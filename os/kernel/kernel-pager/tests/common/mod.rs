#![allow(dead_code)]

//! A simulated machine: physical memory made of 4 KiB frames, a frame
//! allocator over it, an MMU that walks the tables the way the hardware does,
//! and a TLB that only records what it was asked to drop.

use kernel_pager::{
    Amd64, FrameAlloc, Geometry, Ia32, Ia32Pae, MemType, PageEntry, PageEntry64, Pager,
    PhysicalAddress, PhysicalPage, Size4K, TableWindow, TlbInvalidate, VirtualAddress,
};
use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::ptr::NonNull;

pub const FRAME_SIZE: usize = 4096;

/// Physical address of the first simulated frame.
pub const PHYS_BASE: u64 = 0x10_0000;

/// What a freshly allocated frame is filled with.
pub const ALLOC_POISON: u8 = 0xAA;

/// What a released frame is filled with.
pub const FREE_POISON: u8 = 0xFF;

#[repr(C, align(4096))]
struct Frame([u8; FRAME_SIZE]);

/// Installs the root and the self-map of a geometry.
pub trait Boot: Geometry {
    /// Frames taken by the initial hierarchy.
    const BOOT_FRAMES: usize;

    fn boot(machine: &Machine<Self>) -> PhysicalPage<Size4K>;
}

pub struct Machine<G> {
    frames: RefCell<Vec<Box<UnsafeCell<Frame>>>>,
    free: RefCell<Vec<PhysicalPage<Size4K>>>,
    live: RefCell<BTreeSet<PhysicalPage<Size4K>>>,
    allocated: RefCell<Vec<PhysicalPage<Size4K>>>,
    released: RefCell<Vec<PhysicalPage<Size4K>>>,
    flushed: RefCell<Vec<VirtualAddress>>,
    budget: Cell<Option<usize>>,
    root: Cell<Option<PhysicalPage<Size4K>>>,
    _geometry: PhantomData<G>,
}

impl<G: Boot> Machine<G> {
    pub fn new() -> Self {
        let machine = Self {
            frames: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
            live: RefCell::new(BTreeSet::new()),
            allocated: RefCell::new(Vec::new()),
            released: RefCell::new(Vec::new()),
            flushed: RefCell::new(Vec::new()),
            budget: Cell::new(None),
            root: Cell::new(None),
            _geometry: PhantomData,
        };
        let root = G::boot(&machine);
        machine.root.set(Some(root));
        machine
    }

    pub fn pager(&self) -> Pager<'_, G, Self, &Self> {
        Pager::new(self, self)
    }

    pub fn frames(&self) -> Frames<'_, G> {
        Frames(self)
    }

    pub fn root(&self) -> PhysicalPage<Size4K> {
        self.root.get().expect("machine not booted")
    }

    /// Fail every allocation after the next `frames`.
    pub fn limit(&self, frames: usize) {
        self.budget.set(Some(frames));
    }

    /// Frames handed out by [`Frames`] and not yet given back.
    pub fn live_frames(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn allocated(&self) -> Vec<PhysicalPage<Size4K>> {
        self.allocated.borrow().clone()
    }

    pub fn released(&self) -> Vec<PhysicalPage<Size4K>> {
        self.released.borrow().clone()
    }

    pub fn take_flushes(&self) -> Vec<VirtualAddress> {
        std::mem::take(&mut *self.flushed.borrow_mut())
    }

    /// A zeroed frame outside of the allocator's bookkeeping.
    pub fn boot_frame(&self) -> PhysicalPage<Size4K> {
        let page = self.new_frame();
        self.fill(page, 0);
        page
    }

    fn new_frame(&self) -> PhysicalPage<Size4K> {
        let mut frames = self.frames.borrow_mut();
        let base = PHYS_BASE + (frames.len() * FRAME_SIZE) as u64;
        frames.push(Box::new(UnsafeCell::new(Frame([0; FRAME_SIZE]))));
        PhysicalAddress::new(base).page()
    }

    fn fill(&self, page: PhysicalPage<Size4K>, byte: u8) {
        let ptr = self.phys_ptr(page.base());
        unsafe { ptr.as_ptr().write_bytes(byte, FRAME_SIZE) };
    }

    /// Pointer to simulated physical memory.
    pub fn phys_ptr(&self, pa: PhysicalAddress) -> NonNull<u8> {
        let offset = pa
            .as_u64()
            .checked_sub(PHYS_BASE)
            .unwrap_or_else(|| panic!("{pa} is not simulated memory"));
        let index = (offset / FRAME_SIZE as u64) as usize;
        let frames = self.frames.borrow();
        let frame = frames
            .get(index)
            .unwrap_or_else(|| panic!("{pa} is not simulated memory"));
        let base = frame.get().cast::<u8>();
        NonNull::new(unsafe { base.add(pa.offset::<Size4K>() as usize) }).expect("null frame")
    }

    pub fn read_entry(&self, table: PhysicalAddress, slot: usize) -> G::Entry {
        let ptr = self.phys_ptr(table).cast::<G::Entry>();
        unsafe { ptr.add(slot).read_volatile() }
    }

    pub fn write_entry(&self, table: PhysicalAddress, slot: usize, entry: G::Entry) {
        let ptr = self.phys_ptr(table).cast::<G::Entry>();
        unsafe { ptr.add(slot).write_volatile(entry) };
    }

    /// Translate like the MMU does: root first, stopping at huge leaves.
    pub fn walk(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let mut table = self.root().base();
        for level in 0..G::DEPTH {
            let entry = self.read_entry(table, G::slot_of(level, va));
            if !entry.is_present() {
                return None;
            }
            if level + 1 == G::DEPTH || entry.is_huge() {
                let offset = va.as_u64() & ((1 << G::entry_shift(level)) - 1);
                return Some(entry.physical_address() + offset);
            }
            table = entry.physical_address();
        }
        None
    }

    /// Number of frames ever created, boot frames included.
    pub fn total_frames(&self) -> usize {
        self.frames.borrow().len()
    }
}

unsafe impl<G: Boot> TableWindow for Machine<G> {
    fn resolve(&self, va: VirtualAddress) -> NonNull<u8> {
        let pa = self
            .walk(va)
            .unwrap_or_else(|| panic!("page fault at {va}"));
        self.phys_ptr(pa)
    }
}

impl<G> TlbInvalidate for Machine<G> {
    fn invalidate_page(&self, va: VirtualAddress) {
        self.flushed.borrow_mut().push(va);
    }
}

/// The frame allocator of a [`Machine`].
pub struct Frames<'m, G>(&'m Machine<G>);

impl<G: Boot> FrameAlloc for Frames<'_, G> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let machine = self.0;
        if let Some(budget) = machine.budget.get() {
            if budget == 0 {
                return None;
            }
            machine.budget.set(Some(budget - 1));
        }

        let reused = machine.free.borrow_mut().pop();
        let page = reused.unwrap_or_else(|| machine.new_frame());
        machine.fill(page, ALLOC_POISON);
        machine.live.borrow_mut().insert(page);
        machine.allocated.borrow_mut().push(page);
        Some(page)
    }

    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        let machine = self.0;
        assert!(
            machine.live.borrow_mut().remove(&page),
            "{page} was not allocated"
        );
        machine.fill(page, FREE_POISON);
        machine.free.borrow_mut().push(page);
        machine.released.borrow_mut().push(page);
    }
}

impl Boot for Amd64 {
    const BOOT_FRAMES: usize = 1;

    fn boot(machine: &Machine<Self>) -> PhysicalPage<Size4K> {
        let pml4 = machine.boot_frame();
        machine.write_entry(pml4.base(), 510, PageEntry::table(pml4, MemType::KernelRw));
        pml4
    }
}

impl Boot for Ia32 {
    const BOOT_FRAMES: usize = 1;

    fn boot(machine: &Machine<Self>) -> PhysicalPage<Size4K> {
        let pd = machine.boot_frame();
        machine.write_entry(pd.base(), 1023, PageEntry::table(pd, MemType::KernelRw));
        pd
    }
}

impl Boot for Ia32Pae {
    const BOOT_FRAMES: usize = 5;

    fn boot(machine: &Machine<Self>) -> PhysicalPage<Size4K> {
        let pdpt = machine.boot_frame();
        let pds: Vec<_> = (0..4).map(|_| machine.boot_frame()).collect();
        for (i, pd) in pds.iter().enumerate() {
            // PDPT entries reserve bits 1 and 2.
            let pdpte = <PageEntry64 as PageEntry>::table(*pd, MemType::KernelRw)
                .with_writable(false)
                .with_user(false);
            machine.write_entry(pdpt.base(), i, pdpte);
            machine.write_entry(pds[3].base(), 508 + i, PageEntry::table(*pd, MemType::KernelRw));
        }
        pdpt
    }
}

pub fn va(v: u64) -> VirtualAddress {
    VirtualAddress::new(v)
}

pub fn page<S: kernel_pager::PageSize>(pa: u64) -> PhysicalPage<S> {
    PhysicalAddress::new(pa).page()
}
