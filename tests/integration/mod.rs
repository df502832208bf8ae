//! Integration tests
//!
//! Each scenario brings up a caller on the miniature BIOS and drives it
//! through a BIOS service the way a boot path would.

use nos_bios_thunk::ivt::vectors;
use nos_bios_thunk::services::{Chs, E820Entry, KeyStroke};
use nos_bios_thunk::{ControllerMode, ExecStatus, Irq, PhysAddr, PhysicalMemory, RegisterSet};

use crate::common::{bios_caller, TestResult, BDA_CURSOR, BDA_TICKS, BDA_VIDEO_MODE, MEMORY_MAP, TEXT_BUFFER};
use crate::{check, check_eq};

/// A named scenario
pub type Scenario = (&'static str, fn() -> Result<(), String>);

/// Every scenario, in run order
pub const SCENARIOS: &[Scenario] = &[
    ("video mode and teletype", video_scenario),
    ("keyboard read", keyboard_scenario),
    ("disk geometry and boot sector", disk_scenario),
    ("E820 memory map", memory_map_scenario),
    ("timer ticks during a call", timer_scenario),
    ("controller and host state", controller_scenario),
];

/// Run integration tests
pub fn run_integration_tests() -> TestResult {
    let mut result = TestResult::new();

    for (name, scenario) in SCENARIOS {
        match scenario() {
            Ok(()) => {
                println!("  [PASS] {}", name);
                result.record(true);
            }
            Err(message) => {
                println!("  [FAIL] {}: {}", name, message);
                result.record(false);
            }
        }
    }

    result
}

/// INT 10h: mode set, teletype, unsupported function
pub fn video_scenario() -> Result<(), String> {
    let mut caller = bios_caller();

    check!(caller.set_video_mode(0x03).is_success(), "set_video_mode reported failure");
    check_eq!(caller.platform().read_u16(BDA_VIDEO_MODE) & 0xFF, 0x03, "video mode byte");

    for ch in *b"OK" {
        check!(caller.teletype_output(ch).is_success(), "teletype_output reported failure");
    }
    check_eq!(caller.platform().read_u16(TEXT_BUFFER), u16::from_le_bytes(*b"OK"), "text buffer");
    check_eq!(caller.platform().read_u16(BDA_CURSOR), 2, "cursor");

    // AH=4Fh is not implemented by this ROM
    let mut regs = RegisterSet::new();
    regs.set_ax(0x4F00);
    check_eq!(caller.execute(vectors::VIDEO, &mut regs), ExecStatus::CarryFlagSet, "unsupported video function");
    Ok(())
}

/// INT 16h: one keystroke
pub fn keyboard_scenario() -> Result<(), String> {
    let mut caller = bios_caller();
    let key = caller.read_key();
    check_eq!(key, KeyStroke { scan_code: 0x1C, ascii: 0x0D }, "keystroke");
    check_eq!(caller.last_ax(), Some(0x1C0D), "AX after the call");
    Ok(())
}

/// INT 13h: geometry, a boot sector read and a failing floppy read
pub fn disk_scenario() -> Result<(), String> {
    let mut caller = bios_caller();

    let params = caller
        .drive_parameters(0x80)
        .ok_or_else(|| String::from("drive_parameters failed"))?;
    check_eq!(params.drive_count, 1, "drive count");
    check_eq!(params.max_cylinder, 0x3FE, "max cylinder");
    check_eq!(params.max_head, 0x0F, "max head");
    check_eq!(params.sectors_per_track, 0x3F, "sectors per track");

    let boot_sector = PhysAddr::new(0x7C00);
    let first = Chs { cylinder: 0, head: 0, sector: 1 };
    check_eq!(caller.read_sectors(0x80, first, 1, boot_sector), ExecStatus::Success, "hard disk read");
    check_eq!(caller.platform().read_u16(boot_sector.add_bytes(0x1FE)), 0xAA55, "boot signature");

    check_eq!(caller.read_sectors(0x00, first, 1, boot_sector), ExecStatus::CarryFlagSet, "floppy read");
    check_eq!(caller.last_ah(), Some(0x01), "status in AH");
    Ok(())
}

/// INT 15h E820: the full map, continuation by continuation
pub fn memory_map_scenario() -> Result<(), String> {
    let mut caller = bios_caller();
    let mut entries = [E820Entry::default(); 8];

    let count = caller.memory_map(PhysAddr::new(0x8000), &mut entries);
    check_eq!(count, MEMORY_MAP.len(), "entry count");
    for (entry, (base, length, kind)) in entries.iter().zip(MEMORY_MAP.iter()) {
        check_eq!(entry.base_address, *base, "entry base");
        check_eq!(entry.length, *length, "entry length");
        check_eq!(entry.entry_type, *kind, "entry type");
    }

    let usable: u64 = entries[..count]
        .iter()
        .filter(|e| e.is_usable())
        .map(|e| e.length)
        .sum();
    check_eq!(usable, 0x0009_FC00 + 0x07F0_0000, "usable bytes");
    check_eq!(entries[1].type_name(), "Reserved", "second entry");
    Ok(())
}

/// IRQ0 latched before the call and raised during it both reach the ROM
/// timer handler
pub fn timer_scenario() -> Result<(), String> {
    let mut caller = bios_caller();
    caller.platform_mut().raise_irq(Irq::Irq0);
    caller.platform_mut().schedule_irq(Irq::Irq0, 1);

    caller.read_key();

    let machine = caller.platform();
    check_eq!(machine.read_u16(BDA_TICKS), 2, "tick count");
    check_eq!(machine.pending_irqs(), 0, "undelivered interrupts");
    check_eq!(caller.controller().eoi_count(), 2, "end-of-interrupt count");

    let call = machine
        .last_call()
        .ok_or_else(|| String::from("no call recorded"))?;
    check_eq!(call.delivered, vec![0x68, 0x08], "delivered vectors");
    Ok(())
}

/// Every call moves the controller to legacy bases and back and leaves the
/// host interrupt flag as it was
pub fn controller_scenario() -> Result<(), String> {
    let mut caller = bios_caller();
    check!(caller.controller().transitions().is_empty(), "bring-up changed controller mode");

    caller.set_video_mode(0x03);
    caller.read_key();

    check_eq!(
        caller.controller().transitions(),
        vec![
            ControllerMode::Legacy,
            ControllerMode::Protected,
            ControllerMode::Legacy,
            ControllerMode::Protected,
        ],
        "controller transitions"
    );
    check_eq!(caller.controller().mode(), ControllerMode::Protected, "final controller mode");
    check!(caller.platform().host_interrupts_enabled(), "host interrupts left disabled");

    for call in caller.platform().calls() {
        check_eq!(call.controller_mode, ControllerMode::Legacy, "mode during call");
        check!(!call.host_interrupts_enabled, "host interrupts enabled during call");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_scenario() {
        assert_eq!(video_scenario(), Ok(()));
    }

    #[test]
    fn test_keyboard_scenario() {
        assert_eq!(keyboard_scenario(), Ok(()));
    }

    #[test]
    fn test_disk_scenario() {
        assert_eq!(disk_scenario(), Ok(()));
    }

    #[test]
    fn test_memory_map_scenario() {
        assert_eq!(memory_map_scenario(), Ok(()));
    }

    #[test]
    fn test_timer_scenario() {
        assert_eq!(timer_scenario(), Ok(()));
    }

    #[test]
    fn test_controller_scenario() {
        assert_eq!(controller_scenario(), Ok(()));
    }

    #[test]
    fn test_run_integration_tests() {
        let result = run_integration_tests();
        assert_eq!(result.total, SCENARIOS.len());
        assert!(result.all_passed());
    }
}
