//! Emulator faults

use core::fmt;

/// Why a real-mode run stopped abnormally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuError {
    /// Opcode outside the supported subset
    UnsupportedOpcode { cs: u16, ip: u16, opcode: u8 },

    /// HLT with interrupts off or nothing left to wake the processor
    Halted { cs: u16, ip: u16 },

    /// The run did not return within the configured number of instructions
    StepBudgetExceeded(u64),

    /// `execute` before `prepare`
    NotPrepared,
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOpcode { cs, ip, opcode } => {
                write!(f, "unsupported opcode {:#04x} at {:04x}:{:04x}", opcode, cs, ip)
            }
            Self::Halted { cs, ip } => write!(f, "processor halted for good at {:04x}:{:04x}", cs, ip),
            Self::StepBudgetExceeded(budget) => write!(f, "step budget of {} instructions exceeded", budget),
            Self::NotPrepared => write!(f, "thunk buffer was never prepared"),
        }
    }
}

impl std::error::Error for EmuError {}
