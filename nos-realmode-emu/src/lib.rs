//! NOS Real-Mode Emulator - A software platform for the BIOS thunk
//!
//! Provides every collaborator `nos-bios-thunk` needs, backed by a small
//! 8086 interpreter instead of hardware:
//!
//! - [`RealModeMachine`]: 1MB of memory, a page pool, the host interrupt flag
//!   and a mode switch that runs real-mode code until it returns.
//! - [`Pic8259`]: the legacy interrupt controller, recording mode changes.
//!
//! Hardware interrupts can be latched before a call or scheduled to fire a
//! number of instructions into it, which makes the redirection stubs and the
//! controller mode sequence observable from tests.

pub mod cpu;
pub mod error;
pub mod machine;
pub mod pic;
pub mod pool;
pub mod ram;

pub use cpu::{Cpu, SegReg, Step};
pub use error::EmuError;
pub use machine::{CallRecord, RealModeMachine, DEFAULT_STEP_BUDGET, RETURN_PAD};
pub use pic::Pic8259;
pub use pool::{Allocation, PagePool};
pub use ram::Ram;
