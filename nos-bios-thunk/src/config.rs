//! Platform constants and runtime configuration for the thunk
//!
//! Every fixed physical address the bridge relies on lives here as a named
//! constant. [`ThunkConfig`] carries the values that a platform may want to
//! override at initialization time.

use crate::context::ThunkAttributes;
use crate::memory::PhysAddr;

/// Highest physical address the low-memory reservations may use.
///
/// Real-mode code must reach the buffer through 16-bit `segment:offset`
/// addressing, and the region above this line belongs to option ROMs.
pub const LOW_MEMORY_CEILING: PhysAddr = PhysAddr::new(0x000C_0000);

/// Highest linear address addressable in real mode (1MB).
pub const REAL_MODE_LIMIT: PhysAddr = PhysAddr::new(0x0010_0000);

/// Physical base of the real-mode interrupt vector table.
pub const IVT_BASE: PhysAddr = PhysAddr::new(0);

/// Size of one interrupt vector table entry (`offset:segment`).
pub const IVT_ENTRY_SIZE: usize = 4;

/// Number of entries in the interrupt vector table.
pub const IVT_ENTRY_COUNT: usize = 256;

/// Software interrupt the first redirection stub re-raises (IRQ0 / timer).
pub const REDIRECTED_VECTOR_BASE: u8 = 0x08;

/// Number of hardware interrupt lines handled by the redirection stubs.
pub const REDIRECTED_LINE_COUNT: usize = 8;

/// Canonical protected-mode vector base of the master interrupt controller.
pub const PROTECTED_MODE_VECTOR_BASE: u8 = 0x68;

/// Runtime configuration for the thunk context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThunkConfig {
    /// Ceiling for both low-memory reservations
    pub low_memory_ceiling: PhysAddr,
    /// Mode attributes recorded in the context
    pub attributes: ThunkAttributes,
}

impl ThunkConfig {
    /// Create the platform default configuration
    pub const fn new() -> Self {
        Self {
            low_memory_ceiling: LOW_MEMORY_CEILING,
            attributes: ThunkAttributes::BIG_REAL_MODE
                .union(ThunkAttributes::DISABLE_A20_MASK_INT15),
        }
    }

    /// Override the low-memory ceiling
    pub const fn with_ceiling(mut self, ceiling: PhysAddr) -> Self {
        self.low_memory_ceiling = ceiling;
        self
    }

    /// Override the mode attributes
    pub const fn with_attributes(mut self, attributes: ThunkAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl Default for ThunkConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical address of the interrupt vector table entry for `vector`
#[inline]
pub const fn ivt_entry_address(vector: u8) -> PhysAddr {
    PhysAddr::new(IVT_BASE.as_usize() + vector as usize * IVT_ENTRY_SIZE)
}
