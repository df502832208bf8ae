//! Top-down page pool for conventional memory

use nos_bios_thunk::memory::PAGE_SIZE;
use nos_bios_thunk::{LowMemoryAllocator, MemoryCategory, PhysAddr, Result, ThunkError};

/// Lowest page handed out: above the vector table and BIOS data area
pub const DEFAULT_FLOOR: PhysAddr = PhysAddr::new(0x1000);

/// Top of conventional memory below the extended BIOS data area
pub const DEFAULT_TOP: PhysAddr = PhysAddr::new(0x9F000);

/// One satisfied request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub base: PhysAddr,
    pub pages: usize,
    pub category: MemoryCategory,
}

impl Allocation {
    /// Last byte of the allocation
    pub fn last_byte(&self) -> PhysAddr {
        self.base.add_bytes(self.pages * PAGE_SIZE - 1)
    }
}

/// Bump allocator that hands out pages from the top down, the way firmware
/// places boot-time reservations
#[derive(Debug, Clone)]
pub struct PagePool {
    floor: usize,
    top: usize,
    allocations: Vec<Allocation>,
    fail_next: bool,
}

impl PagePool {
    /// Pool over `[floor, top)`; both ends are rounded inward to pages
    pub fn new(floor: PhysAddr, top: PhysAddr) -> Self {
        Self {
            floor: floor.as_usize().next_multiple_of(PAGE_SIZE),
            top: top.as_usize() & !(PAGE_SIZE - 1),
            allocations: Vec::new(),
            fail_next: false,
        }
    }

    /// Conventional memory pool: 4KB to 636KB
    pub fn conventional() -> Self {
        Self::new(DEFAULT_FLOOR, DEFAULT_TOP)
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Bytes still available
    pub fn free_bytes(&self) -> usize {
        self.top - self.floor
    }

    /// Make the next request fail as if memory were exhausted
    pub fn fail_next_allocation(&mut self) {
        self.fail_next = true;
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::conventional()
    }
}

impl LowMemoryAllocator for PagePool {
    fn allocate_pages(&mut self, max_address: PhysAddr, pages: usize, category: MemoryCategory) -> Result<PhysAddr> {
        if core::mem::take(&mut self.fail_next) || pages == 0 {
            return Err(ThunkError::AllocationFailed);
        }

        let size = pages.checked_mul(PAGE_SIZE).ok_or(ThunkError::AllocationFailed)?;
        let limit = max_address.as_usize().saturating_add(1) & !(PAGE_SIZE - 1);
        let end = self.top.min(limit);
        let base = end
            .checked_sub(size)
            .filter(|base| *base >= self.floor)
            .ok_or(ThunkError::AllocationFailed)?;

        self.top = base;
        let allocation = Allocation {
            base: PhysAddr::new(base),
            pages,
            category,
        };
        log::trace!("page pool: {} pages at {:#x} ({:?})", pages, allocation.base, category);
        self.allocations.push(allocation);
        Ok(allocation.base)
    }
}
