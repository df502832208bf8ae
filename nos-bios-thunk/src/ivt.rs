//! Real-mode interrupt vector table entries
//!
//! The IVT sits at physical address 0 and holds 256 four-byte
//! `offset:segment` pointers. Entry `n` lives at `n * 4`; the offset is the
//! low word and the segment the high word.

use crate::config::ivt_entry_address;
use crate::memory::PhysAddr;
use crate::platform::PhysicalMemory;

/// One real-mode interrupt vector table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealModeVectorEntry {
    /// Handler offset (low word)
    pub offset: u16,
    /// Handler segment (high word)
    pub segment: u16,
}

impl RealModeVectorEntry {
    /// Create an entry from a `segment:offset` pair
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { offset, segment }
    }

    /// Entry pointing at a physical address below 1MB
    pub const fn for_address(addr: PhysAddr) -> Self {
        Self::new(addr.real_mode_segment(), addr.real_mode_offset())
    }

    /// Decode the raw little-endian dword stored in the table
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            offset: raw as u16,
            segment: (raw >> 16) as u16,
        }
    }

    /// Encode as the raw dword stored in the table
    pub const fn to_raw(self) -> u32 {
        ((self.segment as u32) << 16) | self.offset as u32
    }

    /// Linear address the entry points at
    pub const fn target(self) -> PhysAddr {
        PhysAddr::from_real_mode(self.segment, self.offset)
    }

    /// Read the entry for `vector`
    pub fn read<M: PhysicalMemory + ?Sized>(memory: &M, vector: u8) -> Self {
        Self::from_raw(memory.read_u32(ivt_entry_address(vector)))
    }

    /// Write this entry into the slot for `vector`
    pub fn write<M: PhysicalMemory + ?Sized>(self, memory: &mut M, vector: u8) {
        memory.write_u32(ivt_entry_address(vector), self.to_raw());
    }
}

/// Well-known BIOS interrupt vectors
pub mod vectors {
    /// Single-step trap
    pub const SINGLE_STEP: u8 = 0x01;
    /// IRQ0, system timer
    pub const IRQ0_TIMER: u8 = 0x08;
    /// IRQ1, keyboard controller
    pub const IRQ1_KEYBOARD: u8 = 0x09;
    /// Video services
    pub const VIDEO: u8 = 0x10;
    /// Equipment list
    pub const EQUIPMENT_LIST: u8 = 0x11;
    /// Conventional memory size
    pub const MEMORY_SIZE: u8 = 0x12;
    /// Disk services
    pub const DISK: u8 = 0x13;
    /// Serial port services
    pub const SERIAL: u8 = 0x14;
    /// Miscellaneous system services (E820, A20, ...)
    pub const MISC_SYSTEM: u8 = 0x15;
    /// Keyboard services
    pub const KEYBOARD: u8 = 0x16;
    /// Printer services
    pub const PRINTER: u8 = 0x17;
    /// Bootstrap loader
    pub const BOOTSTRAP: u8 = 0x19;
    /// Time of day / RTC
    pub const TIME_OF_DAY: u8 = 0x1A;
    /// User timer tick hook
    pub const TIMER_TICK: u8 = 0x1C;
}
