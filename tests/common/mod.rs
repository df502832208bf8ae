//! Common test utilities
//!
//! A miniature BIOS for the emulated machine and the result bookkeeping the
//! runner uses.

use nos_bios_thunk::ivt::vectors;
use nos_bios_thunk::{BiosCaller, PhysAddr, PhysicalMemory};
use nos_realmode_emu::{Pic8259, RealModeMachine};

/// Video mode byte in the BIOS data area
pub const BDA_VIDEO_MODE: PhysAddr = PhysAddr::new(0x0449);
/// Teletype cursor (offset into the text buffer)
pub const BDA_CURSOR: PhysAddr = PhysAddr::new(0x0450);
/// Timer tick count
pub const BDA_TICKS: PhysAddr = PhysAddr::new(0x046C);
/// Where teletype output lands
pub const TEXT_BUFFER: PhysAddr = PhysAddr::new(0x0600);
/// E820 table inside the ROM
pub const E820_TABLE: PhysAddr = PhysAddr::new(0xF5000);

/// Memory map the ROM reports: (base, length, type)
pub const MEMORY_MAP: [(u64, u64, u32); 3] = [
    (0x0000_0000, 0x0009_FC00, 1),
    (0x0009_FC00, 0x0000_0400, 2),
    (0x0010_0000, 0x07F0_0000, 1),
];

/// INT 10h: AH=00h set mode, AH=0Eh teletype, anything else fails
pub const VIDEO_ROM: [u8; 33] = [
    0x80, 0xFC, 0x0E, // CMP AH, 0x0E
    0x75, 0x0F, // JNE mode
    0x53, // PUSH BX
    0x8B, 0x1E, 0x50, 0x04, // MOV BX, [0x0450]
    0x88, 0x87, 0x00, 0x06, // MOV [BX+0x0600], AL
    0xFF, 0x06, 0x50, 0x04, // INC WORD [0x0450]
    0x5B, // POP BX
    0xCF, // IRET
    0x80, 0xFC, 0x00, // mode: CMP AH, 0x00
    0x75, 0x04, // JNE fail
    0xA2, 0x49, 0x04, // MOV [0x0449], AL
    0xCF, // IRET
    0xF9, // fail: STC
    0xCA, 0x02, 0x00, // RETF 2
];

/// INT 13h: AH=08h geometry, AH=02h read from drive 80h, anything else fails
pub const DISK_ROM: [u8; 46] = [
    0x80, 0xFC, 0x08, // CMP AH, 0x08
    0x75, 0x0C, // JNE read
    0xB9, 0xFF, 0xFE, // MOV CX, 0xFEFF
    0xBA, 0x01, 0x0F, // MOV DX, 0x0F01
    0x31, 0xC0, // XOR AX, AX
    0xF8, // CLC
    0xCA, 0x02, 0x00, // RETF 2
    0x80, 0xFC, 0x02, // read: CMP AH, 0x02
    0x75, 0x12, // JNE fail
    0x80, 0xFA, 0x80, // CMP DL, 0x80
    0x75, 0x0D, // JNE fail
    0x26, 0xC7, 0x87, 0xFE, 0x01, 0x55, 0xAA, // MOV WORD ES:[BX+0x01FE], 0xAA55
    0xB4, 0x00, // MOV AH, 0
    0xF8, // CLC
    0xCA, 0x02, 0x00, // RETF 2
    0xB4, 0x01, // fail: MOV AH, 1
    0xF9, // STC
    0xCA, 0x02, 0x00, // RETF 2
];

/// INT 15h: EAX=E820h walks [`E820_TABLE`]; the continuation is the byte
/// offset of the next entry
pub const SYSTEM_ROM: [u8; 64] = [
    0x66, 0x3D, 0x20, 0xE8, 0x00, 0x00, // CMP EAX, 0xE820
    0x75, 0x34, // JNE fail
    0x56, // PUSH SI
    0x57, // PUSH DI
    0x89, 0xDE, // MOV SI, BX
    0xB9, 0x0A, 0x00, // MOV CX, 10
    0x2E, 0x8B, 0x84, 0x00, 0x50, // copy: MOV AX, CS:[SI+0x5000]
    0x26, 0x89, 0x05, // MOV ES:[DI], AX
    0x83, 0xC6, 0x02, // ADD SI, 2
    0x83, 0xC7, 0x02, // ADD DI, 2
    0x49, // DEC CX
    0x75, 0xEF, // JNZ copy
    0x5F, // POP DI
    0x5E, // POP SI
    0x83, 0xC3, 0x14, // ADD BX, 20
    0x83, 0xFB, 0x3C, // CMP BX, 60
    0x75, 0x02, // JNE more
    0x31, 0xDB, // XOR BX, BX
    0x66, 0xB8, 0x50, 0x41, 0x4D, 0x53, // more: MOV EAX, 'SMAP'
    0x66, 0xB9, 0x14, 0x00, 0x00, 0x00, // MOV ECX, 20
    0xF8, // CLC
    0xCA, 0x02, 0x00, // RETF 2
    0xF9, // fail: STC
    0xCA, 0x02, 0x00, // RETF 2
];

/// INT 16h AH=00h: always Enter
pub const KEYBOARD_ROM: [u8; 4] = [
    0xB8, 0x0D, 0x1C, // MOV AX, 0x1C0D
    0xCF, // IRET
];

/// INT 08h: count the tick, acknowledge the controller
pub const TIMER_ROM: [u8; 11] = [
    0x50, // PUSH AX
    0xFF, 0x06, 0x6C, 0x04, // INC WORD [0x046C]
    0xB0, 0x20, // MOV AL, 0x20
    0xE6, 0x20, // OUT 0x20, AL
    0x58, // POP AX
    0xCF, // IRET
];

/// Machine with the miniature BIOS in its ROM area
pub fn bios_machine() -> RealModeMachine {
    let mut machine = RealModeMachine::new();
    machine.install_handler(vectors::VIDEO, PhysAddr::new(0xF1000), &VIDEO_ROM);
    machine.install_handler(vectors::DISK, PhysAddr::new(0xF2000), &DISK_ROM);
    machine.install_handler(vectors::MISC_SYSTEM, PhysAddr::new(0xF4000), &SYSTEM_ROM);
    machine.install_handler(vectors::KEYBOARD, PhysAddr::new(0xF3000), &KEYBOARD_ROM);
    machine.install_handler(vectors::IRQ0_TIMER, PhysAddr::new(0xF6000), &TIMER_ROM);

    for (i, (base, length, kind)) in MEMORY_MAP.iter().enumerate() {
        let entry = E820_TABLE.add_bytes(i * 20);
        machine.write_bytes(entry, &base.to_le_bytes());
        machine.write_bytes(entry.add_bytes(8), &length.to_le_bytes());
        machine.write_u32(entry.add_bytes(16), *kind);
    }
    machine
}

/// Fully brought-up caller on the BIOS machine
pub fn bios_caller() -> BiosCaller<Pic8259, RealModeMachine> {
    let machine = bios_machine();
    let pic = machine.pic();
    BiosCaller::bring_up(pic, machine)
}

/// Test result
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Number of tests passed
    pub passed: usize,
    /// Total number of tests
    pub total: usize,
}

impl TestResult {
    /// Create a new test result
    pub fn new() -> Self {
        Self { passed: 0, total: 0 }
    }

    /// Create a test result with values
    pub fn with_values(passed: usize, total: usize) -> Self {
        Self { passed, total }
    }

    /// Record one outcome
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        }
    }

    /// Check if all tests passed
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Get pass rate
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl Default for TestResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Fail the scenario unless `condition` holds
#[macro_export]
macro_rules! check {
    ($condition:expr, $message:expr) => {
        if !($condition) {
            return Err(format!("{}", $message));
        }
    };
}

/// Fail the scenario unless both sides are equal
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr, $message:expr) => {
        let (left, right) = (&$left, &$right);
        if left != right {
            return Err(format!("{} (expected: {:?}, got: {:?})", $message, right, left));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_result() {
        let mut result = TestResult::new();
        assert!(result.all_passed());
        assert_eq!(result.pass_rate(), 1.0);

        result.record(true);
        result.record(false);
        assert_eq!(result.passed, 1);
        assert_eq!(result.total, 2);
        assert!(!result.all_passed());
        assert_eq!(result.pass_rate(), 0.5);
        assert_eq!(TestResult::with_values(3, 3).pass_rate(), 1.0);
    }

    #[test]
    fn test_rom_layout() {
        let machine = bios_machine();
        assert_eq!(machine.read_u32(nos_bios_thunk::config::ivt_entry_address(0x13)), 0xF000_2000);
        assert_eq!(machine.read_u32(E820_TABLE.add_bytes(56)), 1);
    }
}
