//! Hardware interrupt redirection for real-mode excursions
//!
//! In protected mode the master interrupt controller delivers IRQ0-7 on
//! vectors 0x68-0x6F. Real-mode code has no handlers there; BIOS and platform
//! handlers live at the historical vectors 0x08-0x0F. Each stub installed here
//! turns an interrupt on the remapped vector into a software `INT` on the low
//! one, so the timer, keyboard and friends keep being serviced while the
//! processor runs legacy code.
//!
//! The controller's vector base is only read, never reprogrammed; an interrupt
//! already pending on the old base would be lost.

use crate::config::{ThunkConfig, REDIRECTED_LINE_COUNT, REDIRECTED_VECTOR_BASE};
use crate::error::{OrAbort, Result, ThunkError};
use crate::ivt::RealModeVectorEntry;
use crate::memory::{size_to_pages, PhysAddr};
use crate::platform::{Irq, LegacyInterruptController, LowMemoryAllocator, MemoryCategory, PhysicalMemory};

/// Size of one redirection stub in bytes
pub const STUB_SIZE: usize = 4;

/// Stub code, one little-endian dword per line: `INT n; IRET; NOP`
pub const REDIRECTION_CODE: [u32; REDIRECTED_LINE_COUNT] = [
    0x90CF_08CD, // INT 08h; IRET; NOP
    0x90CF_09CD, // INT 09h; IRET; NOP
    0x90CF_0ACD, // INT 0Ah; IRET; NOP
    0x90CF_0BCD, // INT 0Bh; IRET; NOP
    0x90CF_0CCD, // INT 0Ch; IRET; NOP
    0x90CF_0DCD, // INT 0Dh; IRET; NOP
    0x90CF_0ECD, // INT 0Eh; IRET; NOP
    0x90CF_0FCD, // INT 0Fh; IRET; NOP
];

/// Opcode of `INT imm8`
pub const OPCODE_INT: u8 = 0xCD;
/// Opcode of `IRET`
pub const OPCODE_IRET: u8 = 0xCF;
/// Opcode of `NOP`
pub const OPCODE_NOP: u8 = 0x90;

/// Location of the installed stubs and the vectors that point at them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectionStubTable {
    base: PhysAddr,
    vector_base: u8,
}

impl RedirectionStubTable {
    /// Describe stubs at `base` serving the vectors starting at `vector_base`
    pub const fn new(base: PhysAddr, vector_base: u8) -> Self {
        Self { base, vector_base }
    }

    /// Physical address of the stub page
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// First redirected (protected-mode) vector
    pub fn vector_base(&self) -> u8 {
        self.vector_base
    }

    /// Address of the stub serving line `line`
    pub fn stub_address(&self, line: usize) -> PhysAddr {
        self.base.add_bytes(line * STUB_SIZE)
    }

    /// Vector table entry for line `line`
    pub fn entry(&self, line: usize) -> RealModeVectorEntry {
        RealModeVectorEntry::for_address(self.stub_address(line))
    }

    /// Stubs already installed for `vector_base` below `ceiling`: every
    /// redirected vector points into one intact copy of the stub code.
    pub fn find_installed<M: PhysicalMemory + ?Sized>(
        memory: &M,
        vector_base: u8,
        ceiling: PhysAddr,
    ) -> Option<Self> {
        if vector_base as usize + REDIRECTED_LINE_COUNT > 0x100 {
            return None;
        }
        let base = RealModeVectorEntry::read(memory, vector_base).target();
        if base.as_usize() + REDIRECTED_LINE_COUNT * STUB_SIZE - 1 > ceiling.as_usize() {
            return None;
        }

        let table = Self::new(base, vector_base);
        let intact = (0..REDIRECTED_LINE_COUNT).all(|line| {
            let entry = RealModeVectorEntry::read(memory, vector_base + line as u8);
            entry.target() == table.stub_address(line)
                && memory.read_u32(entry.target()) == REDIRECTION_CODE[line]
        });
        intact.then_some(table)
    }

    /// Copy the stub code and point the redirected vectors at it.
    ///
    /// Writes the same bytes every time, so repeating it (for instance after
    /// an option ROM scribbled over the vector table) leaves identical entries.
    pub fn apply<M: PhysicalMemory + ?Sized>(&self, memory: &mut M) {
        memory.write_bytes(self.base, &stub_bytes());

        for line in 0..REDIRECTED_LINE_COUNT {
            self.entry(line)
                .write(memory, self.vector_base.wrapping_add(line as u8));
        }
    }
}

/// The stub code as it is laid out in memory
pub fn stub_bytes() -> [u8; REDIRECTED_LINE_COUNT * STUB_SIZE] {
    let mut bytes = [0u8; REDIRECTED_LINE_COUNT * STUB_SIZE];
    for (chunk, code) in bytes.chunks_exact_mut(STUB_SIZE).zip(REDIRECTION_CODE) {
        chunk.copy_from_slice(&code.to_le_bytes());
    }
    bytes
}

/// Software interrupt raised by the stub for line `line`
pub const fn redirected_vector(line: usize) -> u8 {
    REDIRECTED_VECTOR_BASE + line as u8
}

/// Install the stubs and patch the real-mode vectors for IRQ0-7.
///
/// Run after the controller's vector base is final and before the first
/// real-mode call. Installing again finds the stubs already in place and
/// leaves the vector entries unchanged without reserving another page; only
/// a damaged stub table gets a fresh one. Aborts if the stub page cannot be
/// reserved or the controller cannot report its vector base.
pub fn install_interrupt_redirection<C, P>(controller: &C, platform: &mut P) -> RedirectionStubTable
where
    C: LegacyInterruptController + ?Sized,
    P: LowMemoryAllocator + PhysicalMemory + ?Sized,
{
    install_interrupt_redirection_with(ThunkConfig::default(), controller, platform)
}

/// [`install_interrupt_redirection`] with an explicit configuration
pub fn install_interrupt_redirection_with<C, P>(
    config: ThunkConfig,
    controller: &C,
    platform: &mut P,
) -> RedirectionStubTable
where
    C: LegacyInterruptController + ?Sized,
    P: LowMemoryAllocator + PhysicalMemory + ?Sized,
{
    try_install(config, controller, platform).or_abort("install_interrupt_redirection")
}

pub(crate) fn try_install<C, P>(
    config: ThunkConfig,
    controller: &C,
    platform: &mut P,
) -> Result<RedirectionStubTable>
where
    C: LegacyInterruptController + ?Sized,
    P: LowMemoryAllocator + PhysicalMemory + ?Sized,
{
    let vector_base = controller.vector(Irq::Irq0)?;
    if vector_base as usize + REDIRECTED_LINE_COUNT > 0x100 {
        return Err(ThunkError::ControllerFailed("vector base out of range"));
    }

    let installed = RedirectionStubTable::find_installed(&*platform, vector_base, config.low_memory_ceiling);
    if let Some(table) = installed {
        log::debug!("Redirection stubs already installed at {:#x}", table.base());
        return Ok(table);
    }

    let code_size = REDIRECTED_LINE_COUNT * STUB_SIZE;
    let base = platform.allocate_pages(
        config.low_memory_ceiling,
        size_to_pages(code_size),
        MemoryCategory::FirmwareReserved,
    )?;
    if base.as_usize() + code_size - 1 > config.low_memory_ceiling.as_usize() {
        return Err(ThunkError::AboveCeiling);
    }

    let table = RedirectionStubTable::new(base, vector_base);
    table.apply(platform);

    log::info!(
        "Redirected vectors {:#04x}-{:#04x} to stubs at {:#x}",
        vector_base,
        vector_base as usize + REDIRECTED_LINE_COUNT - 1,
        base
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ivt_entry_address, LOW_MEMORY_CEILING, PROTECTED_MODE_VECTOR_BASE};
    use crate::platform::MockLegacyInterruptController;

    /// 1MB of flat memory with a top-down page allocator
    struct LowMemory {
        bytes: Vec<u8>,
        next_top: usize,
        fail: bool,
    }

    impl LowMemory {
        fn new() -> Self {
            Self {
                bytes: vec![0; 0x10_0000],
                next_top: LOW_MEMORY_CEILING.as_usize(),
                fail: false,
            }
        }
    }

    impl PhysicalMemory for LowMemory {
        fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
            let start = addr.as_usize();
            buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        }

        fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
            let start = addr.as_usize();
            self.bytes[start..start + data.len()].copy_from_slice(data);
        }
    }

    impl LowMemoryAllocator for LowMemory {
        fn allocate_pages(
            &mut self,
            _max_address: PhysAddr,
            pages: usize,
            _category: MemoryCategory,
        ) -> Result<PhysAddr> {
            if self.fail {
                return Err(ThunkError::AllocationFailed);
            }
            self.next_top -= pages * crate::memory::PAGE_SIZE;
            Ok(PhysAddr::new(self.next_top))
        }
    }

    fn controller(vector_base: u8) -> MockLegacyInterruptController {
        let mut controller = MockLegacyInterruptController::new();
        controller
            .expect_vector()
            .withf(|irq| *irq == Irq::Irq0)
            .return_const(Ok(vector_base));
        controller.expect_set_mode().never();
        controller
    }

    #[test]
    fn test_stub_encoding() {
        let bytes = stub_bytes();
        assert_eq!(&bytes[0..4], &[OPCODE_INT, 0x08, OPCODE_IRET, OPCODE_NOP]);
        assert_eq!(&bytes[28..32], &[OPCODE_INT, 0x0F, OPCODE_IRET, OPCODE_NOP]);
        for line in 0..REDIRECTED_LINE_COUNT {
            assert_eq!(bytes[line * STUB_SIZE + 1], redirected_vector(line));
        }
    }

    #[test]
    fn test_install_patches_remapped_vectors() {
        let mut memory = LowMemory::new();
        let table = install_interrupt_redirection(&controller(PROTECTED_MODE_VECTOR_BASE), &mut memory);

        assert_eq!(table.base(), PhysAddr::new(0xBF000));
        assert_eq!(table.vector_base(), 0x68);

        let entry = RealModeVectorEntry::read(&memory, 0x68);
        assert_eq!(entry, RealModeVectorEntry::new(0xB000, 0xF000));

        let mut first = [0u8; 2];
        memory.read_bytes(entry.target(), &mut first);
        assert_eq!(first, [OPCODE_INT, REDIRECTED_VECTOR_BASE]);

        for line in 0..REDIRECTED_LINE_COUNT {
            let entry = RealModeVectorEntry::read(&memory, 0x68 + line as u8);
            assert_eq!(entry.target(), table.stub_address(line));
            assert_eq!(memory.read_u32(entry.target()), REDIRECTION_CODE[line]);
        }
    }

    #[test]
    fn test_install_leaves_low_vectors_alone() {
        let mut memory = LowMemory::new();
        memory.write_u32(ivt_entry_address(0x08), 0xF000_FEA5);
        install_interrupt_redirection(&controller(0x68), &mut memory);
        assert_eq!(memory.read_u32(ivt_entry_address(0x08)), 0xF000_FEA5);
        assert_eq!(memory.read_u32(ivt_entry_address(0x70)), 0);
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let mut memory = LowMemory::new();
        let table = install_interrupt_redirection(&controller(0x68), &mut memory);
        let before: Vec<u32> = (0x68..0x70)
            .map(|v| memory.read_u32(ivt_entry_address(v)))
            .collect();

        // Clobber stubs and one vector, then apply again
        memory.write_bytes(table.base(), &[0u8; 32]);
        memory.write_u32(ivt_entry_address(0x6A), 0);
        table.apply(&mut memory);

        let after: Vec<u32> = (0x68..0x70)
            .map(|v| memory.read_u32(ivt_entry_address(v)))
            .collect();
        assert_eq!(before, after);
        assert_eq!(memory.read_u32(table.base()), REDIRECTION_CODE[0]);
    }

    #[test]
    fn test_install_twice_keeps_vector_entries() {
        let mut memory = LowMemory::new();
        let controller = controller(PROTECTED_MODE_VECTOR_BASE);
        let entries = |memory: &LowMemory| -> Vec<u32> {
            (0x68..0x70)
                .map(|v| memory.read_u32(ivt_entry_address(v)))
                .collect()
        };

        let first = install_interrupt_redirection(&controller, &mut memory);
        let before = entries(&memory);
        let top = memory.next_top;

        let second = install_interrupt_redirection(&controller, &mut memory);
        assert_eq!(second, first);
        assert_eq!(entries(&memory), before);
        assert_eq!(memory.next_top, top);
    }

    #[test]
    fn test_install_over_damaged_stubs_takes_fresh_page() {
        let mut memory = LowMemory::new();
        let controller = controller(0x68);
        let first = install_interrupt_redirection(&controller, &mut memory);
        memory.write_u32(first.stub_address(3), 0);

        let second = install_interrupt_redirection(&controller, &mut memory);
        assert_eq!(second.base(), PhysAddr::new(0xBE000));
        for line in 0..REDIRECTED_LINE_COUNT {
            let entry = RealModeVectorEntry::read(&memory, 0x68 + line as u8);
            assert_eq!(entry.target(), second.stub_address(line));
        }
    }

    #[test]
    fn test_find_installed_rejects_foreign_vectors() {
        let mut memory = LowMemory::new();
        assert_eq!(RedirectionStubTable::find_installed(&memory, 0x68, LOW_MEMORY_CEILING), None);

        // Consecutive entries, but no stub code behind them
        for line in 0..REDIRECTED_LINE_COUNT {
            RealModeVectorEntry::for_address(PhysAddr::new(0x8000 + line * STUB_SIZE))
                .write(&mut memory, 0x68 + line as u8);
        }
        assert_eq!(RedirectionStubTable::find_installed(&memory, 0x68, LOW_MEMORY_CEILING), None);
        assert_eq!(RedirectionStubTable::find_installed(&memory, 0xFA, LOW_MEMORY_CEILING), None);
    }

    #[test]
    fn test_vector_base_out_of_range() {
        let mut memory = LowMemory::new();
        let result = try_install(ThunkConfig::default(), &controller(0xFA), &mut memory);
        assert_eq!(
            result.unwrap_err(),
            ThunkError::ControllerFailed("vector base out of range")
        );
    }

    #[test]
    #[should_panic(expected = "install_interrupt_redirection failed")]
    fn test_allocation_failure_aborts() {
        let mut memory = LowMemory::new();
        memory.fail = true;
        install_interrupt_redirection(&controller(0x68), &mut memory);
    }

    #[test]
    #[should_panic(expected = "install_interrupt_redirection failed")]
    fn test_controller_failure_aborts() {
        let mut memory = LowMemory::new();
        let mut controller = MockLegacyInterruptController::new();
        controller
            .expect_vector()
            .return_const(Err(ThunkError::ControllerFailed("get_vector")));
        install_interrupt_redirection(&controller, &mut memory);
    }
}
