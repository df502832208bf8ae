//! BIOS service wrappers
//!
//! [`BiosCaller`] owns one thunk context with its collaborators and exposes
//! the handful of BIOS services a loader actually needs, with the register
//! packing done once here instead of at every call site.

use crate::context::{initialize_real_mode_caller, ThunkContext};
use crate::invoke::invoke_real_mode_interrupt;
use crate::ivt::vectors;
use crate::memory::PhysAddr;
use crate::platform::{HostInterrupts, LegacyInterruptController, LowMemoryAllocator, ModeSwitch, PhysicalMemory};
use crate::redirection::install_interrupt_redirection;
use crate::registers::RegisterSet;

/// 'SMAP', the E820 request and reply signature
pub const SMAP_SIGNATURE: u32 = 0x534D_4150;

/// Bytes requested per E820 entry (ACPI 3.0 layout with extended attributes)
pub const E820_REQUEST_SIZE: u32 = 24;

/// Bytes of an E820 entry without extended attributes
pub const E820_ENTRY_SIZE: usize = 20;

/// Outcome of one BIOS call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// The service returned with carry clear
    Success,
    /// The service returned with carry set; AH usually holds the status
    CarryFlagSet,
}

impl ExecStatus {
    /// Check if the service succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::CarryFlagSet => "Carry flag set (error)",
        }
    }
}

impl From<bool> for ExecStatus {
    /// Map the invoker's carry result
    fn from(carry: bool) -> Self {
        if carry {
            Self::CarryFlagSet
        } else {
            Self::Success
        }
    }
}

/// Cylinder/head/sector disk address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    /// 10 bits
    pub cylinder: u16,
    /// Head number
    pub head: u8,
    /// 1-based, 6 bits
    pub sector: u8,
}

/// Geometry reported by INT 13h AH=08h
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveParams {
    /// Number of drives of this kind
    pub drive_count: u8,
    /// Highest cylinder index
    pub max_cylinder: u16,
    /// Highest head index
    pub max_head: u8,
    /// Sectors per track, 1-based count
    pub sectors_per_track: u8,
}

/// Key read by INT 16h AH=00h
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    /// Keyboard scan code (AH)
    pub scan_code: u8,
    /// ASCII character, 0 for non-character keys (AL)
    pub ascii: u8,
}

/// E820 memory map entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct E820Entry {
    /// Physical start of the range
    pub base_address: u64,
    /// Length in bytes
    pub length: u64,
    /// Address range type (1 = usable)
    pub entry_type: u32,
}

impl E820Entry {
    /// Check if this entry is usable RAM
    pub fn is_usable(&self) -> bool {
        self.entry_type == 1
    }

    /// Get human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self.entry_type {
            1 => "Usable RAM",
            2 => "Reserved",
            3 => "ACPI Reclaimable",
            4 => "ACPI NVS",
            5 => "Bad Memory",
            _ => "Unknown",
        }
    }

    fn from_bytes(bytes: &[u8; E820_ENTRY_SIZE]) -> Self {
        let mut base = [0u8; 8];
        let mut length = [0u8; 8];
        let mut kind = [0u8; 4];
        base.copy_from_slice(&bytes[0..8]);
        length.copy_from_slice(&bytes[8..16]);
        kind.copy_from_slice(&bytes[16..20]);
        Self {
            base_address: u64::from_le_bytes(base),
            length: u64::from_le_bytes(length),
            entry_type: u32::from_le_bytes(kind),
        }
    }
}

/// BIOS interrupt caller
///
/// Owns the thunk context, so the single-instance rule holds for everything
/// routed through one caller.
pub struct BiosCaller<C, P> {
    controller: C,
    platform: P,
    context: ThunkContext,
    last_context: Option<RegisterSet>,
}

impl<C, P> BiosCaller<C, P>
where
    C: LegacyInterruptController,
    P: ModeSwitch + HostInterrupts + PhysicalMemory,
{
    /// Wrap an already initialized context
    pub fn new(controller: C, platform: P, context: ThunkContext) -> Self {
        Self {
            controller,
            platform,
            context,
            last_context: None,
        }
    }

    /// Execute BIOS interrupt
    pub fn execute(&mut self, int_num: u8, regs: &mut RegisterSet) -> ExecStatus {
        let carry = invoke_real_mode_interrupt(
            &mut self.controller,
            &mut self.context,
            &mut self.platform,
            int_num,
            regs,
        );
        self.last_context = Some(*regs);
        ExecStatus::from(carry)
    }

    /// Get last execution context
    pub fn last_context(&self) -> Option<&RegisterSet> {
        self.last_context.as_ref()
    }

    /// Clear last execution context
    pub fn clear_context(&mut self) {
        self.last_context = None;
    }

    /// Get last AX register value
    pub fn last_ax(&self) -> Option<u16> {
        self.last_context.as_ref().map(|regs| regs.get_ax())
    }

    /// Get last AL (low byte of AX)
    pub fn last_al(&self) -> Option<u8> {
        self.last_context.as_ref().map(|regs| regs.get_al())
    }

    /// Get last AH (high byte of AX)
    pub fn last_ah(&self) -> Option<u8> {
        self.last_context.as_ref().map(|regs| regs.get_ah())
    }

    /// The thunk context
    pub fn context(&self) -> &ThunkContext {
        &self.context
    }

    /// The platform collaborator
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The platform collaborator, mutably
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// The interrupt controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Give back the collaborators and the context
    pub fn into_parts(self) -> (C, P, ThunkContext) {
        (self.controller, self.platform, self.context)
    }

    /// Set video mode (INT 10h, AH=00h)
    pub fn set_video_mode(&mut self, mode: u8) -> ExecStatus {
        log::debug!("Setting video mode {:#04x}", mode);
        let mut regs = RegisterSet::new();
        regs.set_ah(0x00);
        regs.set_al(mode);
        self.execute(vectors::VIDEO, &mut regs)
    }

    /// Print one character at the cursor (INT 10h, AH=0Eh)
    pub fn teletype_output(&mut self, ch: u8) -> ExecStatus {
        let mut regs = RegisterSet::new();
        regs.set_ah(0x0E);
        regs.set_al(ch);
        regs.set_bx(0); // BH = page, BL = foreground color
        self.execute(vectors::VIDEO, &mut regs)
    }

    /// Wait for a key (INT 16h, AH=00h)
    pub fn read_key(&mut self) -> KeyStroke {
        let mut regs = RegisterSet::new();
        regs.set_ah(0x00);
        self.execute(vectors::KEYBOARD, &mut regs);
        KeyStroke {
            scan_code: regs.get_ah(),
            ascii: regs.get_al(),
        }
    }

    /// Read `count` sectors at `chs` into `buffer` (INT 13h, AH=02h).
    ///
    /// `buffer` must lie below 1MB. On failure AH holds the BIOS status.
    pub fn read_sectors(&mut self, drive: u8, chs: Chs, count: u8, buffer: PhysAddr) -> ExecStatus {
        log::debug!(
            "Reading {} sectors from drive {:#04x} at C/H/S {}/{}/{}",
            count,
            drive,
            chs.cylinder,
            chs.head,
            chs.sector
        );
        let mut regs = RegisterSet::new();
        regs.set_ah(0x02);
        regs.set_al(count);
        regs.set_ch(chs.cylinder as u8);
        regs.set_cl((chs.sector & 0x3F) | ((chs.cylinder >> 2) as u8 & 0xC0));
        regs.set_dh(chs.head);
        regs.set_dl(drive);
        regs.es = buffer.real_mode_segment();
        regs.set_bx(buffer.real_mode_offset());
        self.execute(vectors::DISK, &mut regs)
    }

    /// Query drive geometry (INT 13h, AH=08h)
    pub fn drive_parameters(&mut self, drive: u8) -> Option<DriveParams> {
        let mut regs = RegisterSet::new();
        regs.set_ah(0x08);
        regs.set_dl(drive);
        if !self.execute(vectors::DISK, &mut regs).is_success() {
            return None;
        }

        let cl = regs.get_cl();
        Some(DriveParams {
            drive_count: regs.get_dl(),
            max_cylinder: regs.get_ch() as u16 | ((cl as u16 & 0xC0) << 2),
            max_head: regs.get_dh(),
            sectors_per_track: cl & 0x3F,
        })
    }

    /// Fetch one memory map entry (INT 15h, EAX=E820h).
    ///
    /// `continuation` is 0 for the first entry. Returns the entry and the
    /// continuation for the next call; a returned continuation of 0 marks the
    /// last entry. `buffer` must lie below 1MB and hold at least
    /// [`E820_REQUEST_SIZE`] bytes.
    pub fn e820_next(&mut self, continuation: u32, buffer: PhysAddr) -> Option<(E820Entry, u32)> {
        let mut regs = RegisterSet::new();
        regs.eax = 0xE820;
        regs.ebx = continuation;
        regs.ecx = E820_REQUEST_SIZE;
        regs.edx = SMAP_SIGNATURE;
        regs.es = buffer.real_mode_segment();
        regs.edi = buffer.real_mode_offset() as u32;

        let status = self.execute(vectors::MISC_SYSTEM, &mut regs);
        if !status.is_success() || regs.eax != SMAP_SIGNATURE || (regs.ecx as usize) < E820_ENTRY_SIZE {
            return None;
        }

        let mut bytes = [0u8; E820_ENTRY_SIZE];
        self.platform.read_bytes(buffer, &mut bytes);
        Some((E820Entry::from_bytes(&bytes), regs.ebx))
    }

    /// Walk the whole E820 map into `out`, returning the entry count
    pub fn memory_map(&mut self, buffer: PhysAddr, out: &mut [E820Entry]) -> usize {
        let mut count = 0;
        let mut continuation = 0;

        while count < out.len() {
            let Some((entry, next)) = self.e820_next(continuation, buffer) else {
                break;
            };
            out[count] = entry;
            count += 1;
            if next == 0 {
                break;
            }
            continuation = next;
        }

        log::debug!("E820 reported {} entries", count);
        count
    }
}

impl<C, P> BiosCaller<C, P>
where
    C: LegacyInterruptController,
    P: LowMemoryAllocator + ModeSwitch + HostInterrupts + PhysicalMemory,
{
    /// Initialize the context and install the redirection stubs, in that
    /// order. Aborts on the same conditions as the two steps.
    pub fn bring_up(controller: C, mut platform: P) -> Self {
        let context = initialize_real_mode_caller(&mut platform);
        install_interrupt_redirection(&controller, &mut platform);
        Self::new(controller, platform, context)
    }
}
