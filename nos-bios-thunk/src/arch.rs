//! Bare-metal x86_64 glue
//!
//! Host interrupt masking through the `x86_64` crate and physical memory
//! access for firmware that keeps the first megabyte identity mapped. The
//! mode-switch primitive, the allocator and the interrupt controller stay
//! platform specific.

use core::ptr;

use x86_64::instructions::interrupts;

use crate::config::REAL_MODE_LIMIT;
use crate::memory::PhysAddr;
use crate::platform::{HostInterrupts, PhysicalMemory};

/// The processor's interrupt flag
#[derive(Debug, Default)]
pub struct CpuInterrupts;

impl HostInterrupts for CpuInterrupts {
    fn save_and_disable(&mut self) -> bool {
        let enabled = interrupts::are_enabled();
        interrupts::disable();
        enabled
    }

    fn set_state(&mut self, enabled: bool) {
        if enabled {
            interrupts::enable();
        } else {
            interrupts::disable();
        }
    }
}

/// Volatile access to identity-mapped memory below 1MB
#[derive(Debug)]
pub struct IdentityMappedMemory {
    _private: (),
}

impl IdentityMappedMemory {
    /// # Safety
    ///
    /// Physical addresses below 1MB must be mapped at the same virtual
    /// addresses, readable and writable, for as long as the value lives.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn check(addr: PhysAddr, len: usize) {
        assert!(
            addr.as_usize().saturating_add(len) <= REAL_MODE_LIMIT.as_usize(),
            "access at {:#x} (+{}) beyond the real-mode address space",
            addr,
            len
        );
    }
}

impl PhysicalMemory for IdentityMappedMemory {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        Self::check(addr, buf.len());
        let src = addr.as_usize() as *const u8;
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: in bounds of the identity-mapped first megabyte
            *byte = unsafe { ptr::read_volatile(src.add(i)) };
        }
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        Self::check(addr, data.len());
        let dst = addr.as_usize() as *mut u8;
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: in bounds of the identity-mapped first megabyte
            unsafe { ptr::write_volatile(dst.add(i), *byte) };
        }
    }
}
