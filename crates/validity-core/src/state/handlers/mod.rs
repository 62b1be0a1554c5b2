//! Driver phase machines.
//!
//! This module is split into one submodule per machine kind:
//! - `init`: handshake, then the read and next children
//! - `read`: flush and a small image read
//! - `next`: status, flush, print request
//! - `capture`: the per-finger capture loop
//!
//! Every machine operates on a `Session`, which is the engine's context.

mod capture;
mod init;
mod next;
mod read;

pub use capture::{CaptureMachine, CaptureState, capture_machine};
pub use init::{InitMachine, InitState, init_machine};
pub use next::{NextMachine, NextState, next_machine};
pub use read::{ReadMachine, ReadState, read_machine};

use crate::error::{DriverError, Result};
use crate::events::DriverEvent;
use crate::session::Session;
use crate::state::machine::{MachineContext, Transition};
use crate::state::phases::Phase;
use crate::transport::UsbTransport;

impl<T: UsbTransport> MachineContext for Session<T> {
    fn check_cancelled(&self) -> Result<()> {
        self.cancel_token().check()
    }

    fn on_machine_started(&self, machine: &'static str, depth: usize) {
        self.emit(DriverEvent::MachineStarted { machine, depth });
    }

    fn on_machine_completed(&self, machine: &'static str, error: Option<&DriverError>) {
        self.emit(DriverEvent::MachineCompleted {
            machine,
            error: error.map(|e| e.to_string()),
        });
    }
}

/// Run `phase` as the whole action of a state.
fn run_phase<T: UsbTransport>(session: &mut Session<T>, phase: Phase) -> Transition<Session<T>> {
    match phase.run(session) {
        Ok(()) => Transition::Next,
        Err(e) => Transition::Fail(e),
    }
}

fn unknown_state<C>(machine: &'static str, state: usize) -> Transition<C> {
    Transition::Fail(DriverError::invalid_state(format!(
        "{} machine has no state {}",
        machine, state
    )))
}
