//! Collaborator interfaces consumed by the thunk
//!
//! The bridge never touches hardware directly. Page allocation, the legacy
//! interrupt controller, the raw mode switch, host interrupt masking and
//! physical memory access are all reached through the traits below, so the
//! protocol can run against firmware services on bare metal or against a
//! software real-mode machine in tests.

use crate::context::ThunkContext;
use crate::error::Result;
use crate::memory::PhysAddr;

/// Allocation category for low-memory reservations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryCategory {
    /// Never reclaimed by the general allocator; stays reserved until the
    /// platform is handed off to the operating system
    FirmwareReserved,
    /// Ordinary loader data the general allocator may take back
    Reclaimable,
}

/// Interrupt request line on the legacy interrupt controller pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Irq {
    /// Line 0: system timer
    Irq0 = 0,
    /// Line 1: keyboard
    Irq1,
    /// Line 2: cascade from the slave controller
    Irq2,
    /// Line 3: second serial port
    Irq3,
    /// Line 4: first serial port
    Irq4,
    /// Line 5: second parallel port
    Irq5,
    /// Line 6: floppy controller
    Irq6,
    /// Line 7: first parallel port
    Irq7,
    /// Line 8: real-time clock
    Irq8,
    /// Line 9: ACPI / redirected IRQ2
    Irq9,
    /// Line 10: free
    Irq10,
    /// Line 11: free
    Irq11,
    /// Line 12: PS/2 mouse
    Irq12,
    /// Line 13: FPU
    Irq13,
    /// Line 14: primary ATA channel
    Irq14,
    /// Line 15: secondary ATA channel
    Irq15,
}

impl Irq {
    /// Line number, 0..16
    pub const fn line(self) -> u8 {
        self as u8
    }
}

/// Delivery mode of the legacy interrupt controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerMode {
    /// Historical real-mode vector bases (0x08 / 0x70)
    Legacy,
    /// Vector bases used while the host runs in protected mode
    Protected,
}

/// Buffer sizing reported by the mode-switch primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThunkSizing {
    /// Bytes the primitive needs for its 16-bit code and descriptor tables
    pub real_mode_buffer_size: usize,
    /// Extra bytes reserved for the real-mode stack
    pub extra_stack_size: usize,
}

/// Low-memory page allocator
#[cfg_attr(test, mockall::automock)]
pub trait LowMemoryAllocator {
    /// Allocate `pages` contiguous pages ending at or below `max_address`
    fn allocate_pages(
        &mut self,
        max_address: PhysAddr,
        pages: usize,
        category: MemoryCategory,
    ) -> Result<PhysAddr>;
}

/// Legacy (8259-style) interrupt controller
#[cfg_attr(test, mockall::automock)]
pub trait LegacyInterruptController {
    /// Vector currently programmed for `irq`
    fn vector(&self, irq: Irq) -> Result<u8>;

    /// Reprogram the controller's delivery mode
    fn set_mode(&mut self, mode: ControllerMode) -> Result<()>;
}

/// Raw protected-mode to real-mode switch
///
/// This is the opaque platform boundary: it builds the descriptor tables,
/// flips the processor mode, runs real-mode code until it returns, and leaves
/// the final registers in `context.real_mode_state`.
#[cfg_attr(test, mockall::automock)]
pub trait ModeSwitch {
    /// Sizes the primitive needs for its buffer and stack
    fn thunk_properties(&self) -> ThunkSizing;

    /// Build the low-level structures inside the context's buffer
    fn prepare(&mut self, context: &mut ThunkContext);

    /// Switch to real mode, run from the snapshot's `CS:EIP`, switch back.
    ///
    /// Runs to completion. Real-mode code that never returns never returns
    /// here either.
    fn execute(&mut self, context: &mut ThunkContext);
}

/// Host (protected-mode) interrupt enable state
#[cfg_attr(test, mockall::automock)]
pub trait HostInterrupts {
    /// Disable interrupts and report whether they were enabled
    fn save_and_disable(&mut self) -> bool;

    /// Enable or disable interrupts
    fn set_state(&mut self, enabled: bool);
}

/// Byte-addressed access to physical memory below 1MB
pub trait PhysicalMemory {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]);

    /// Copy `data` to `addr`
    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]);

    /// Little-endian word at `addr`
    fn read_u16(&self, addr: PhysAddr) -> u16 {
        let mut buf = [0u8; 2];
        self.read_bytes(addr, &mut buf);
        u16::from_le_bytes(buf)
    }

    /// Little-endian dword at `addr`
    fn read_u32(&self, addr: PhysAddr) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    /// Store `value` at `addr`, little-endian
    fn write_u16(&mut self, addr: PhysAddr, value: u16) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Store `value` at `addr`, little-endian
    fn write_u32(&mut self, addr: PhysAddr, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }
}
