//! Thunk context and its one-time initialization
//!
//! The context owns the low-memory execution buffer: the mode-switch
//! primitive's 16-bit code and descriptor tables at the bottom, the real-mode
//! stack at the top. It is created once, never freed, and reused by every
//! BIOS call. Interrupts taken while the processor is in real mode run on this
//! stack, so the pages must never go back to a general allocator.

use bitflags::bitflags;

use crate::config::ThunkConfig;
use crate::error::{OrAbort, Result, ThunkError};
use crate::invoke::CallPhase;
use crate::memory::{PhysAddr, PAGE_SIZE};
use crate::platform::{LowMemoryAllocator, MemoryCategory, ModeSwitch, ThunkSizing};
use crate::registers::RegisterSet;

bitflags! {
    /// Mode attributes the mode-switch primitive honours
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThunkAttributes: u32 {
        /// Load 4GB-limit segments ("big real mode") instead of 64KB ones
        const BIG_REAL_MODE = 0x0000_0001;
        /// Do not mask A20 through INT 15h around the call
        const DISABLE_A20_MASK_INT15 = 0x0000_0002;
        /// Do not mask A20 through the keyboard controller around the call
        const DISABLE_A20_MASK_KBD_CTRL = 0x0000_0004;
    }
}

/// Persistent state shared by every real-mode call
///
/// There is one per system. See the crate docs for the single-instance
/// contract.
#[derive(Debug)]
pub struct ThunkContext {
    real_mode_buffer: PhysAddr,
    real_mode_buffer_size: usize,
    attributes: ThunkAttributes,
    /// Register snapshot of the call in flight; the primitive reads its input
    /// from here and leaves the final register state here
    pub real_mode_state: RegisterSet,
    phase: CallPhase,
}

impl ThunkContext {
    /// Describe an already reserved buffer
    pub const fn new(base: PhysAddr, size: usize, attributes: ThunkAttributes) -> Self {
        Self {
            real_mode_buffer: base,
            real_mode_buffer_size: size,
            attributes,
            real_mode_state: RegisterSet::new(),
            phase: CallPhase::Idle,
        }
    }

    /// Base of the execution buffer
    pub fn real_mode_buffer(&self) -> PhysAddr {
        self.real_mode_buffer
    }

    /// Size of the execution buffer in bytes
    pub fn real_mode_buffer_size(&self) -> usize {
        self.real_mode_buffer_size
    }

    /// Mode attributes handed to the mode-switch primitive
    pub fn attributes(&self) -> ThunkAttributes {
        self.attributes
    }

    /// Address of the topmost 16-bit word of the buffer, where the real-mode
    /// stack starts
    pub fn stack_top(&self) -> PhysAddr {
        self.real_mode_buffer
            .add_bytes(self.real_mode_buffer_size - core::mem::size_of::<u16>())
    }

    /// Phase of the call currently using the context
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub(crate) fn enter_phase(&mut self, phase: CallPhase) {
        #[cfg(feature = "log-verbose")]
        log::trace!("thunk call: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

/// Bytes to reserve for a primitive reporting `sizing`: the rounded-up
/// buffer and stack, plus one page of margin.
pub fn reservation_size(sizing: ThunkSizing) -> Result<usize> {
    let needed = sizing
        .real_mode_buffer_size
        .checked_add(sizing.extra_stack_size)
        .ok_or(ThunkError::InvalidSizing)?;
    needed
        .checked_next_multiple_of(PAGE_SIZE)
        .and_then(|rounded| rounded.checked_add(PAGE_SIZE))
        .ok_or(ThunkError::InvalidSizing)
}

/// Reserve the real-mode execution buffer and build the thunk context.
///
/// Must run once, before any other thunk operation. Aborts if the buffer
/// cannot be reserved: nothing in this crate works without it.
pub fn initialize_real_mode_caller<P>(platform: &mut P) -> ThunkContext
where
    P: LowMemoryAllocator + ModeSwitch + ?Sized,
{
    initialize_real_mode_caller_with(ThunkConfig::default(), platform)
}

/// [`initialize_real_mode_caller`] with an explicit configuration
pub fn initialize_real_mode_caller_with<P>(config: ThunkConfig, platform: &mut P) -> ThunkContext
where
    P: LowMemoryAllocator + ModeSwitch + ?Sized,
{
    try_initialize(config, platform).or_abort("initialize_real_mode_caller")
}

pub(crate) fn try_initialize<P>(config: ThunkConfig, platform: &mut P) -> Result<ThunkContext>
where
    P: LowMemoryAllocator + ModeSwitch + ?Sized,
{
    let sizing = platform.thunk_properties();
    let size = reservation_size(sizing)?;

    let base = platform.allocate_pages(
        config.low_memory_ceiling,
        size / PAGE_SIZE,
        MemoryCategory::FirmwareReserved,
    )?;
    if base.as_usize() + size - 1 > config.low_memory_ceiling.as_usize() {
        return Err(ThunkError::AboveCeiling);
    }

    log::info!(
        "Reserved real-mode buffer at {:#x} ({} bytes, buffer {} + stack {})",
        base,
        size,
        sizing.real_mode_buffer_size,
        sizing.extra_stack_size
    );

    let mut context = ThunkContext::new(base, size, config.attributes);
    platform.prepare(&mut context);
    Ok(context)
}
