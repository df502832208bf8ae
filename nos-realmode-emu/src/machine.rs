//! Software real-mode machine
//!
//! [`RealModeMachine`] stands in for the whole platform under the thunk: it
//! owns the first megabyte, hands out low pages, tracks the host interrupt
//! flag and, as the mode switch, runs real-mode code on its interpreter.
//!
//! `prepare` writes the primitive's return pad (`HLT; JMP $-1`) at the bottom
//! of the execution buffer. `execute` pushes a far return to that pad on the
//! call's stack, jumps to the snapshot's `CS:EIP` and runs until the HLT on
//! the pad retires. A handler ending in `IRET` therefore pops the word at the
//! top of the stack as its flags; one ending in `RETF 2` keeps its own.

use std::collections::VecDeque;

use nos_bios_thunk::{
    ControllerMode, Eflags, HostInterrupts, Irq, LowMemoryAllocator, MemoryCategory, ModeSwitch, PhysAddr, PhysicalMemory,
    RealModeVectorEntry, Result, ThunkContext, ThunkSizing,
};

use crate::cpu::{Bus, Cpu, SegReg, Step};
use crate::error::EmuError;
use crate::pic::Pic8259;
use crate::pool::PagePool;
use crate::ram::Ram;

/// Default instruction budget for one call
pub const DEFAULT_STEP_BUDGET: u64 = 1_000_000;

/// Return pad code: HLT, then a jump back to it
pub const RETURN_PAD: [u8; 3] = [0xF4, 0xEB, 0xFD];

/// Sizing the machine reports as its mode-switch primitive
pub const DEFAULT_SIZING: ThunkSizing = ThunkSizing {
    real_mode_buffer_size: 0x200,
    extra_stack_size: 0x1000,
};

/// Memory and ports as the interpreter sees them
struct Board {
    ram: Ram,
    pic: Pic8259,
    port_writes: Vec<(u16, u8)>,
}

impl Bus for Board {
    fn read_u8(&self, linear: u32) -> u8 {
        self.ram.read_u8(linear)
    }

    fn write_u8(&mut self, linear: u32, value: u8) {
        self.ram.write_u8(linear, value);
    }

    fn port_in(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn port_out(&mut self, port: u16, value: u8) {
        if !self.pic.port_write(port, value) {
            self.port_writes.push((port, value));
        }
    }
}

/// What one `execute` saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Real-mode entry point
    pub entry: (u16, u16),
    /// Host interrupt flag while real-mode code ran
    pub host_interrupts_enabled: bool,
    /// Controller mode while real-mode code ran
    pub controller_mode: ControllerMode,
    /// Word at the top of the stack when the call started
    pub stack_word: u16,
    /// Hardware interrupt vectors delivered during the call, in order
    pub delivered: Vec<u8>,
    /// Instructions retired
    pub steps: u64,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledIrq {
    at_step: u64,
    irq: Irq,
}

/// Emulated platform
pub struct RealModeMachine {
    cpu: Cpu,
    board: Board,
    pool: PagePool,
    sizing: ThunkSizing,
    return_pad: Option<PhysAddr>,
    host_interrupts: bool,
    pending: VecDeque<u8>,
    scheduled: Vec<ScheduledIrq>,
    step_budget: u64,
    calls: Vec<CallRecord>,
}

impl RealModeMachine {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            board: Board {
                ram: Ram::new(),
                pic: Pic8259::new(),
                port_writes: Vec::new(),
            },
            pool: PagePool::conventional(),
            sizing: DEFAULT_SIZING,
            return_pad: None,
            host_interrupts: true,
            pending: VecDeque::new(),
            scheduled: Vec::new(),
            step_budget: DEFAULT_STEP_BUDGET,
            calls: Vec::new(),
        }
    }

    pub fn with_pool(mut self, pool: PagePool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_sizing(mut self, sizing: ThunkSizing) -> Self {
        self.sizing = sizing;
        self
    }

    /// Handle to the machine's interrupt controller
    pub fn pic(&self) -> Pic8259 {
        self.board.pic.clone()
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut PagePool {
        &mut self.pool
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn last_call(&self) -> Option<&CallRecord> {
        self.calls.last()
    }

    /// Forget the recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Port writes not claimed by the interrupt controller
    pub fn port_writes(&self) -> &[(u16, u8)] {
        &self.board.port_writes
    }

    pub fn host_interrupts_enabled(&self) -> bool {
        self.host_interrupts
    }

    pub fn return_pad(&self) -> Option<PhysAddr> {
        self.return_pad
    }

    /// Maximum instructions per call before the run is abandoned
    pub fn set_step_budget(&mut self, budget: u64) {
        self.step_budget = budget;
    }

    /// Copy `code` to `at`
    pub fn load(&mut self, at: PhysAddr, code: &[u8]) {
        self.board.ram.load(at, code);
    }

    /// Copy `code` to `at` and point `vector` at it
    pub fn install_handler(&mut self, vector: u8, at: PhysAddr, code: &[u8]) {
        self.load(at, code);
        RealModeVectorEntry::for_address(at).write(self, vector);
    }

    /// Raise `irq` now. The vector is latched from the controller's current
    /// mode and delivered once real-mode code runs with IF set.
    pub fn raise_irq(&mut self, irq: Irq) {
        let vector = self.board.pic.vector_of(irq);
        log::trace!("IRQ{} latched on vector {:#04x}", irq.line(), vector);
        self.pending.push_back(vector);
    }

    /// Raise `irq` after `steps` instructions of the next real-mode call
    pub fn schedule_irq(&mut self, irq: Irq, steps: u64) {
        self.scheduled.push(ScheduledIrq { at_step: steps, irq });
    }

    /// Latched interrupts not yet delivered
    pub fn pending_irqs(&self) -> usize {
        self.pending.len()
    }

    fn fire_scheduled(&mut self, steps: u64) {
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| s.at_step <= steps);
        self.scheduled = later;
        for scheduled in due {
            self.raise_irq(scheduled.irq);
        }
    }

    fn deliver_pending(&mut self, delivered: &mut Vec<u8>) {
        if !self.cpu.flags.contains(Eflags::IF) {
            return;
        }
        if let Some(vector) = self.pending.pop_front() {
            log::trace!("delivering vector {:#04x} at {:#x}", vector, self.cpu.pc());
            self.cpu.interrupt(&mut self.board, vector);
            delivered.push(vector);
        }
    }

    fn run(&mut self, pad: u32, delivered: &mut Vec<u8>) -> core::result::Result<u64, EmuError> {
        let mut steps = 0;
        loop {
            if steps >= self.step_budget {
                return Err(EmuError::StepBudgetExceeded(self.step_budget));
            }
            self.fire_scheduled(steps);
            self.deliver_pending(delivered);

            if self.cpu.is_halted() {
                let interrupts_on = self.cpu.flags.contains(Eflags::IF);
                match self.scheduled.iter().map(|s| s.at_step).min() {
                    // Idle until the next scheduled interrupt
                    Some(next) if interrupts_on => steps = steps.max(next),
                    _ => {
                        return Err(EmuError::Halted {
                            cs: self.cpu.segment(SegReg::Cs),
                            ip: self.cpu.ip,
                        });
                    }
                }
                continue;
            }

            let step = self.cpu.step(&mut self.board)?;
            steps += 1;
            if step == (Step::Halted { linear: pad }) {
                return Ok(steps);
            }
        }
    }

    #[cold]
    fn fail(&self, error: EmuError) -> ! {
        log::error!("real-mode execution failed: {}", error);
        panic!("real-mode execution failed: {}", error)
    }
}

impl Default for RealModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeSwitch for RealModeMachine {
    fn thunk_properties(&self) -> ThunkSizing {
        self.sizing
    }

    fn prepare(&mut self, context: &mut ThunkContext) {
        let pad = context.real_mode_buffer();
        self.load(pad, &RETURN_PAD);
        self.return_pad = Some(pad);
        log::debug!("return pad at {:#x}", pad);
    }

    fn execute(&mut self, context: &mut ThunkContext) {
        let Some(pad) = self.return_pad else {
            self.fail(EmuError::NotPrepared);
        };
        let state = context.real_mode_state;
        let stack_word = self.read_u16(PhysAddr::from_real_mode(state.ss, state.esp as u16));

        self.cpu.load(&state);
        let ret = RealModeVectorEntry::for_address(pad);
        self.cpu.push16(&mut self.board, ret.segment);
        self.cpu.push16(&mut self.board, ret.offset);

        log::debug!("real-mode call to {:04x}:{:04x}", state.cs, state.eip);
        let mut delivered = Vec::new();
        let steps = match self.run(pad.as_usize() as u32, &mut delivered) {
            Ok(steps) => steps,
            Err(error) => self.fail(error),
        };

        self.cpu.store(&mut context.real_mode_state);
        self.calls.push(CallRecord {
            entry: (state.cs, state.eip as u16),
            host_interrupts_enabled: self.host_interrupts,
            controller_mode: self.board.pic.mode(),
            stack_word,
            delivered,
            steps,
        });
    }
}

impl HostInterrupts for RealModeMachine {
    fn save_and_disable(&mut self) -> bool {
        core::mem::replace(&mut self.host_interrupts, false)
    }

    fn set_state(&mut self, enabled: bool) {
        self.host_interrupts = enabled;
    }
}

impl LowMemoryAllocator for RealModeMachine {
    fn allocate_pages(&mut self, max_address: PhysAddr, pages: usize, category: MemoryCategory) -> Result<PhysAddr> {
        self.pool.allocate_pages(max_address, pages, category)
    }
}

impl PhysicalMemory for RealModeMachine {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        self.board.ram.read_bytes(addr, buf);
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        self.board.ram.write_bytes(addr, data);
    }
}
