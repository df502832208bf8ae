//! Physical address and page helpers for low memory

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

/// Align a size up to the next page boundary
#[inline]
pub const fn page_round_up(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Number of pages needed to hold `size` bytes
#[inline]
pub const fn size_to_pages(size: usize) -> usize {
    page_round_up(size) >> PAGE_SHIFT
}

/// A physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Creates a new physical address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the physical address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current page.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Checks if the physical address is page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Address `bytes` above this one
    pub const fn add_bytes(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }

    /// Real-mode segment for this address: bits 16..20 moved into the top
    /// nibble of a 16-bit selector.
    pub const fn real_mode_segment(self) -> u16 {
        ((self.0 >> 4) & 0xF000) as u16
    }

    /// Real-mode offset for this address, paired with [`Self::real_mode_segment`].
    pub const fn real_mode_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Linear address of a real-mode `segment:offset` pair
    pub const fn from_real_mode(segment: u16, offset: u16) -> Self {
        Self(((segment as usize) << 4) + offset as usize)
    }
}

impl From<usize> for PhysAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<PhysAddr> for usize {
    fn from(addr: PhysAddr) -> Self {
        addr.0
    }
}

impl core::fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}
