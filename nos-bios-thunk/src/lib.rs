//! NOS BIOS Thunk - Legacy real-mode BIOS calls from protected mode
//!
//! This crate lets a 32-bit protected-mode environment invoke 16-bit real-mode
//! BIOS interrupt services (video, disk, keyboard, memory map) and read back
//! their results, while hardware interrupts stay serviceable during the
//! excursion.
//!
//! # Architecture
//!
//! The bridge is built from three pieces, set up leaf-first:
//!
//! - **Context**: [`initialize_real_mode_caller`] reserves the permanent
//!   low-memory execution buffer and stack.
//! - **Redirection**: [`install_interrupt_redirection`] places eight stubs in
//!   low memory and points the remapped hardware vectors at them.
//! - **Invoke**: [`invoke_real_mode_interrupt`] marshals a [`RegisterSet`]
//!   across one mode switch and reports the carry flag.
//!
//! The raw mode switch, the page allocator and the interrupt controller are
//! collaborators reached through the traits in [`platform`].
//!
//! # Usage
//!
//! ```ignore
//! let mut context = initialize_real_mode_caller(&mut platform);
//! install_interrupt_redirection(&controller, &mut platform);
//!
//! let mut regs = RegisterSet::new();
//! regs.set_ah(0x00);
//! regs.set_al(0x03);
//! let failed = invoke_real_mode_interrupt(&mut controller, &mut context, &mut platform, 0x10, &mut regs);
//! ```
//!
//! # Single-instance contract
//!
//! There is one execution buffer and one stack for the whole system. Only one
//! call may be in flight at a time; overlapping calls corrupt the shared
//! stack. The `&mut ThunkContext` borrow keeps safe callers honest within one
//! context, but nothing stops a second context or a re-entrant call from an
//! interrupt handler. Callers own that obligation.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod memory;
pub mod registers;
pub mod ivt;
pub mod platform;
pub mod context;
pub mod redirection;
pub mod invoke;
pub mod services;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod arch;

pub use config::{ThunkConfig, LOW_MEMORY_CEILING, REDIRECTED_VECTOR_BASE};
pub use error::{Result, ThunkError};
pub use memory::{PhysAddr, PAGE_SIZE};
pub use registers::{Eflags, RegisterSet};
pub use ivt::RealModeVectorEntry;
pub use platform::{
    ControllerMode, HostInterrupts, Irq, LegacyInterruptController, LowMemoryAllocator,
    MemoryCategory, ModeSwitch, PhysicalMemory, ThunkSizing,
};
pub use context::{
    initialize_real_mode_caller, initialize_real_mode_caller_with, ThunkAttributes, ThunkContext,
};
pub use redirection::{install_interrupt_redirection, RedirectionStubTable, REDIRECTION_CODE};
pub use invoke::{invoke_real_mode_interrupt, CallPhase};
pub use services::{BiosCaller, ExecStatus};
