//! Dual 8259 interrupt controller model
//!
//! Only vector bases and mode changes are modelled. The handle is shared:
//! clones observe and drive the same controller, so the machine can latch
//! vectors while the bridge holds the controller.

use std::cell::RefCell;
use std::rc::Rc;

use nos_bios_thunk::{ControllerMode, Irq, LegacyInterruptController, Result, ThunkError};

/// Master base while running real-mode code
pub const LEGACY_MASTER_BASE: u8 = 0x08;
/// Slave base while running real-mode code
pub const LEGACY_SLAVE_BASE: u8 = 0x70;
/// Master base while the host runs in protected mode
pub const PROTECTED_MASTER_BASE: u8 = 0x68;
/// Slave base while the host runs in protected mode
pub const PROTECTED_SLAVE_BASE: u8 = 0x70;

/// Master command port
pub const MASTER_COMMAND: u16 = 0x20;
/// Slave command port
pub const SLAVE_COMMAND: u16 = 0xA0;
/// Non-specific end of interrupt
pub const EOI: u8 = 0x20;

#[derive(Debug)]
struct PicState {
    mode: ControllerMode,
    transitions: Vec<ControllerMode>,
    eoi_count: usize,
    refuse_mode_changes: bool,
}

/// Shared handle to the controller
#[derive(Debug, Clone)]
pub struct Pic8259 {
    state: Rc<RefCell<PicState>>,
}

impl Pic8259 {
    /// Controller already remapped for protected mode
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(PicState {
                mode: ControllerMode::Protected,
                transitions: Vec::new(),
                eoi_count: 0,
                refuse_mode_changes: false,
            })),
        }
    }

    pub fn mode(&self) -> ControllerMode {
        self.state.borrow().mode
    }

    /// Every mode requested so far, in order
    pub fn transitions(&self) -> Vec<ControllerMode> {
        self.state.borrow().transitions.clone()
    }

    /// End-of-interrupt commands seen on either command port
    pub fn eoi_count(&self) -> usize {
        self.state.borrow().eoi_count
    }

    /// Make `set_mode` fail from now on
    pub fn refuse_mode_changes(&self, refuse: bool) {
        self.state.borrow_mut().refuse_mode_changes = refuse;
    }

    /// Vector `irq` is delivered on in the current mode
    pub fn vector_of(&self, irq: Irq) -> u8 {
        let (master, slave) = match self.mode() {
            ControllerMode::Legacy => (LEGACY_MASTER_BASE, LEGACY_SLAVE_BASE),
            ControllerMode::Protected => (PROTECTED_MASTER_BASE, PROTECTED_SLAVE_BASE),
        };
        match irq.line() {
            line @ 0..=7 => master + line,
            line => slave + line - 8,
        }
    }

    /// Port write from real-mode code; returns false for ports it does not own
    pub fn port_write(&self, port: u16, value: u8) -> bool {
        match port {
            MASTER_COMMAND | SLAVE_COMMAND => {
                if value == EOI {
                    self.state.borrow_mut().eoi_count += 1;
                }
                true
            }
            _ => false,
        }
    }
}

impl Default for Pic8259 {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyInterruptController for Pic8259 {
    fn vector(&self, irq: Irq) -> Result<u8> {
        Ok(self.vector_of(irq))
    }

    fn set_mode(&mut self, mode: ControllerMode) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.refuse_mode_changes {
            return Err(ThunkError::ControllerFailed("mode change refused"));
        }
        log::trace!("8259: {:?} -> {:?}", state.mode, mode);
        state.mode = mode;
        state.transitions.push(mode);
        Ok(())
    }
}
