//! Real-mode call invoker
//!
//! One call walks a fixed sequence of phases:
//!
//! ```text
//! Idle -> FlagsNormalized -> ControllerInLegacyMode -> RealModeExecuting
//!      -> ControllerRestored -> RegistersMarshaledBack -> Idle
//! ```
//!
//! The host's interrupt flag is cleared before the controller is switched to
//! its legacy vector bases and restored only after it is switched back, so no
//! host handler ever sees a half-programmed controller. Inside real mode the
//! snapshot's IF bit is set, and device interrupts keep arriving through the
//! redirection stubs for the whole excursion.
//!
//! # Not reentrant
//!
//! Every call shares the context's one buffer and stack. Starting a call while
//! another is in flight (from an interrupt handler, or through a second
//! context over the same buffer) corrupts that stack. The caller must
//! serialize calls; nothing here checks.

use crate::context::ThunkContext;
use crate::error::{fatal, OrAbort, ThunkError};
use crate::ivt::RealModeVectorEntry;
use crate::platform::{ControllerMode, HostInterrupts, LegacyInterruptController, ModeSwitch, PhysicalMemory};
use crate::registers::RegisterSet;

/// Phase of a real-mode call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPhase {
    /// No call in flight
    Idle,
    /// Working snapshot built with canonical flags
    FlagsNormalized,
    /// Host interrupts off, controller on legacy vector bases
    ControllerInLegacyMode,
    /// The mode-switch primitive is running real-mode code
    RealModeExecuting,
    /// Controller back on protected-mode bases, host interrupts as before
    ControllerRestored,
    /// Results copied into the caller's register set
    RegistersMarshaledBack,
}

/// Invoke real-mode software interrupt `interrupt` with `regs`.
///
/// `regs` supplies the general registers, DS and ES, and receives the
/// general registers, all segment registers and the full flags word the
/// handler returned with. The caller's flags, stack and entry point are
/// ignored.
///
/// Returns `true` if the handler set the carry flag, the BIOS convention for
/// a failed service. Either way `regs` holds whatever status the service
/// reported.
///
/// The context must come from [`crate::initialize_real_mode_caller`], and the
/// vector for `interrupt` must already hold a handler. Aborts if the
/// interrupt controller refuses a mode change.
pub fn invoke_real_mode_interrupt<C, P>(
    controller: &mut C,
    context: &mut ThunkContext,
    platform: &mut P,
    interrupt: u8,
    regs: &mut RegisterSet,
) -> bool
where
    C: LegacyInterruptController + ?Sized,
    P: ModeSwitch + HostInterrupts + PhysicalMemory + ?Sized,
{
    log::debug!("Executing BIOS interrupt 0x{:02X}", interrupt);
    if context.real_mode_buffer_size() < core::mem::size_of::<u16>() {
        fatal("invoke_real_mode_interrupt", ThunkError::NotInitialized);
    }

    let mut snapshot = regs.thunk_snapshot();
    context.enter_phase(CallPhase::FlagsNormalized);

    let interrupts_enabled = platform.save_and_disable();
    controller
        .set_mode(ControllerMode::Legacy)
        .or_abort("invoke_real_mode_interrupt");
    context.enter_phase(CallPhase::ControllerInLegacyMode);

    // The handler's final IRET pops this word as flags; a stray TF here
    // would single-step into INT 1 and never come back.
    let stack = context.stack_top();
    platform.write_u16(stack, 0);
    snapshot.ss = ((stack.as_usize() >> 16) << 12) as u16;
    snapshot.esp = stack.real_mode_offset() as u32;

    let entry = RealModeVectorEntry::read(platform, interrupt);
    snapshot.eip = entry.offset as u32;
    snapshot.cs = entry.segment;

    context.real_mode_state = snapshot;
    context.enter_phase(CallPhase::RealModeExecuting);
    platform.execute(context);

    controller
        .set_mode(ControllerMode::Protected)
        .or_abort("invoke_real_mode_interrupt");
    platform.set_state(interrupts_enabled);
    context.enter_phase(CallPhase::ControllerRestored);

    regs.absorb_result(&context.real_mode_state);
    context.enter_phase(CallPhase::RegistersMarshaledBack);

    let failed = regs.is_carry_set();
    if failed {
        log::debug!("BIOS interrupt 0x{:02X} returned with carry set, AX={:#06x}", interrupt, regs.get_ax());
    }
    context.enter_phase(CallPhase::Idle);
    failed
}
