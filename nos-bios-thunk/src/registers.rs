//! Register file passed across the real-mode thunk
//!
//! [`RegisterSet`] is the caller-visible register state for one BIOS call. Its
//! layout is `#[repr(C)]` and frozen by the assertions at the bottom of this
//! file because the mode-switch primitive reads and writes it by offset.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

bitflags! {
    /// x86 EFLAGS word, bit positions as defined by the architecture
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Eflags: u32 {
        /// Carry flag; set by BIOS services to report failure
        const CF = 1 << 0;
        /// Reserved, always reads as 1
        const RESERVED_1 = 1 << 1;
        /// Parity flag
        const PF = 1 << 2;
        /// Reserved, always 0
        const RESERVED_3 = 1 << 3;
        /// Auxiliary carry flag
        const AF = 1 << 4;
        /// Reserved, always 0
        const RESERVED_5 = 1 << 5;
        /// Zero flag
        const ZF = 1 << 6;
        /// Sign flag
        const SF = 1 << 7;
        /// Trap flag (single-step)
        const TF = 1 << 8;
        /// Interrupt enable flag
        const IF = 1 << 9;
        /// Direction flag
        const DF = 1 << 10;
        /// Overflow flag
        const OF = 1 << 11;
        /// I/O privilege level, low bit
        const IOPL_0 = 1 << 12;
        /// I/O privilege level, high bit
        const IOPL_1 = 1 << 13;
        /// Nested task
        const NT = 1 << 14;
        /// Reserved, always 0
        const RESERVED_15 = 1 << 15;
        /// Resume flag
        const RF = 1 << 16;
        /// Virtual 8086 mode
        const VM = 1 << 17;
        /// Alignment check
        const AC = 1 << 18;
        /// Virtual interrupt flag
        const VIF = 1 << 19;
        /// Virtual interrupt pending
        const VIP = 1 << 20;
        /// CPUID available
        const ID = 1 << 21;

        /// Both I/O privilege level bits
        const IOPL = Self::IOPL_0.bits() | Self::IOPL_1.bits();

        const _ = !0;
    }
}

impl Eflags {
    /// Shift of the IOPL field
    pub const IOPL_SHIFT: u32 = 12;

    /// Highest I/O privilege level
    pub const IOPL_MAX: u8 = 3;

    /// Flags every real-mode excursion starts with.
    ///
    /// Reserved bit 1 set, IOPL 3 so legacy code may touch any port, IF set so
    /// hardware interrupts keep flowing through the redirection stubs. TF, NT
    /// and CF are clear.
    pub const THUNK_ENTRY: Self = Self::from_bits_retain(
        Self::RESERVED_1.bits() | Self::IOPL.bits() | Self::IF.bits(),
    );

    /// Current I/O privilege level
    pub const fn iopl(self) -> u8 {
        ((self.bits() & Self::IOPL.bits()) >> Self::IOPL_SHIFT) as u8
    }

    /// Replace the I/O privilege level; only the low two bits of `level` are used
    pub fn set_iopl(&mut self, level: u8) {
        let bits = (self.bits() & !Self::IOPL.bits())
            | (((level & Self::IOPL_MAX) as u32) << Self::IOPL_SHIFT);
        *self = Self::from_bits_retain(bits);
    }

    /// Check that the architecture-reserved bits hold their fixed values
    pub const fn reserved_bits_valid(self) -> bool {
        self.contains(Self::RESERVED_1)
            && !self.intersects(
                Self::RESERVED_3
                    .union(Self::RESERVED_5)
                    .union(Self::RESERVED_15),
            )
    }
}

/// Register state handed to and returned from a real-mode call
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterSet {
    // General registers, in the order the mode-switch primitive pushes them
    /// Destination index
    pub edi: u32,
    /// Source index
    pub esi: u32,
    /// Base pointer
    pub ebp: u32,
    /// Stack pointer; only the low word is meaningful in real mode
    pub esp: u32,
    /// Base register
    pub ebx: u32,
    /// Data register
    pub edx: u32,
    /// Count register
    pub ecx: u32,
    /// Accumulator; AH usually selects the BIOS function
    pub eax: u32,
    /// Data segment
    pub ds: u16,
    /// Extra segment, the usual buffer segment for BIOS services
    pub es: u16,
    /// Flags word
    pub eflags: Eflags,
    /// Real-mode entry offset
    pub eip: u32,
    /// Real-mode code segment
    pub cs: u16,
    /// Real-mode stack segment
    pub ss: u16,
}

const_assert_eq!(core::mem::size_of::<Eflags>(), 4);
const_assert_eq!(core::mem::size_of::<RegisterSet>(), 48);
const_assert_eq!(core::mem::offset_of!(RegisterSet, eax), 28);
const_assert_eq!(core::mem::offset_of!(RegisterSet, ds), 32);
const_assert_eq!(core::mem::offset_of!(RegisterSet, eflags), 36);
const_assert_eq!(core::mem::offset_of!(RegisterSet, eip), 40);
const_assert_eq!(core::mem::offset_of!(RegisterSet, cs), 44);
const_assert_eq!(core::mem::offset_of!(RegisterSet, ss), 46);

impl RegisterSet {
    /// Create new empty register set
    pub const fn new() -> Self {
        Self {
            edi: 0,
            esi: 0,
            ebp: 0,
            esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            ds: 0,
            es: 0,
            eflags: Eflags::empty(),
            eip: 0,
            cs: 0,
            ss: 0,
        }
    }

    /// Working snapshot for a real-mode excursion.
    ///
    /// Only the general registers, DS and ES come from the caller. The flags
    /// are forced to [`Eflags::THUNK_ENTRY`] whatever the caller asked for;
    /// stack and entry point are filled in by the invoker.
    pub fn thunk_snapshot(&self) -> Self {
        Self {
            edi: self.edi,
            esi: self.esi,
            ebp: self.ebp,
            ebx: self.ebx,
            edx: self.edx,
            ecx: self.ecx,
            eax: self.eax,
            ds: self.ds,
            es: self.es,
            eflags: Eflags::THUNK_ENTRY,
            ..Self::new()
        }
    }

    /// Copy the results of an excursion back into the caller's set
    pub fn absorb_result(&mut self, result: &Self) {
        self.edi = result.edi;
        self.esi = result.esi;
        self.ebp = result.ebp;
        self.ebx = result.ebx;
        self.edx = result.edx;
        self.ecx = result.ecx;
        self.eax = result.eax;
        self.ss = result.ss;
        self.cs = result.cs;
        self.ds = result.ds;
        self.es = result.es;
        self.eflags = result.eflags;
    }

    /// Check carry flag (indicates error in BIOS calls)
    pub fn is_carry_set(&self) -> bool {
        self.eflags.contains(Eflags::CF)
    }

    /// Low byte of AX
    pub fn get_al(&self) -> u8 {
        (self.eax & 0xFF) as u8
    }

    /// High byte of AX
    pub fn get_ah(&self) -> u8 {
        ((self.eax >> 8) & 0xFF) as u8
    }

    /// Low word of EAX
    pub fn get_ax(&self) -> u16 {
        (self.eax & 0xFFFF) as u16
    }

    /// Replace the low byte of AX
    pub fn set_al(&mut self, val: u8) {
        self.eax = (self.eax & 0xFFFF_FF00) | (val as u32);
    }

    /// Replace the high byte of AX
    pub fn set_ah(&mut self, val: u8) {
        self.eax = (self.eax & 0xFFFF_00FF) | ((val as u32) << 8);
    }

    /// Replace the low word of EAX
    pub fn set_ax(&mut self, val: u16) {
        self.eax = (self.eax & 0xFFFF_0000) | (val as u32);
    }

    /// Low byte of BX
    pub fn get_bl(&self) -> u8 {
        (self.ebx & 0xFF) as u8
    }

    /// High byte of BX
    pub fn get_bh(&self) -> u8 {
        ((self.ebx >> 8) & 0xFF) as u8
    }

    /// Low word of EBX
    pub fn get_bx(&self) -> u16 {
        (self.ebx & 0xFFFF) as u16
    }

    /// Replace the low byte of BX
    pub fn set_bl(&mut self, val: u8) {
        self.ebx = (self.ebx & 0xFFFF_FF00) | (val as u32);
    }

    /// Replace the high byte of BX
    pub fn set_bh(&mut self, val: u8) {
        self.ebx = (self.ebx & 0xFFFF_00FF) | ((val as u32) << 8);
    }

    /// Replace the low word of EBX
    pub fn set_bx(&mut self, val: u16) {
        self.ebx = (self.ebx & 0xFFFF_0000) | (val as u32);
    }

    /// Low byte of CX
    pub fn get_cl(&self) -> u8 {
        (self.ecx & 0xFF) as u8
    }

    /// High byte of CX
    pub fn get_ch(&self) -> u8 {
        ((self.ecx >> 8) & 0xFF) as u8
    }

    /// Low word of ECX
    pub fn get_cx(&self) -> u16 {
        (self.ecx & 0xFFFF) as u16
    }

    /// Replace the low byte of CX
    pub fn set_cl(&mut self, val: u8) {
        self.ecx = (self.ecx & 0xFFFF_FF00) | (val as u32);
    }

    /// Replace the high byte of CX
    pub fn set_ch(&mut self, val: u8) {
        self.ecx = (self.ecx & 0xFFFF_00FF) | ((val as u32) << 8);
    }

    /// Replace the low word of ECX
    pub fn set_cx(&mut self, val: u16) {
        self.ecx = (self.ecx & 0xFFFF_0000) | (val as u32);
    }

    /// Low byte of DX
    pub fn get_dl(&self) -> u8 {
        (self.edx & 0xFF) as u8
    }

    /// High byte of DX
    pub fn get_dh(&self) -> u8 {
        ((self.edx >> 8) & 0xFF) as u8
    }

    /// Low word of EDX
    pub fn get_dx(&self) -> u16 {
        (self.edx & 0xFFFF) as u16
    }

    /// Replace the low byte of DX
    pub fn set_dl(&mut self, val: u8) {
        self.edx = (self.edx & 0xFFFF_FF00) | (val as u32);
    }

    /// Replace the high byte of DX
    pub fn set_dh(&mut self, val: u8) {
        self.edx = (self.edx & 0xFFFF_00FF) | ((val as u32) << 8);
    }

    /// Replace the low word of EDX
    pub fn set_dx(&mut self, val: u16) {
        self.edx = (self.edx & 0xFFFF_0000) | (val as u32);
    }
}
