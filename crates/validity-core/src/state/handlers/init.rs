//! Init machine: handshake, then one read and one next pass.

use super::{next_machine, read_machine, run_phase, unknown_state};
use crate::session::Session;
use crate::state::machine::{Ssm, StateHandler, Transition};
use crate::state::phases::Phase;
use crate::transport::UsbTransport;

const NAME: &str = "init";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Handshake,
    Read,
    Next,
}

const STATES: [InitState; 3] = [InitState::Handshake, InitState::Read, InitState::Next];

impl InitState {
    fn name(self) -> &'static str {
        match self {
            InitState::Handshake => "handshake",
            InitState::Read => "read",
            InitState::Next => "next",
        }
    }
}

pub struct InitMachine;

impl<T: UsbTransport> StateHandler<Session<T>> for InitMachine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state_count(&self) -> usize {
        STATES.len()
    }

    fn state_name(&self, state: usize) -> &'static str {
        STATES.get(state).map_or("-", |s| s.name())
    }

    fn run_state(&mut self, state: usize, session: &mut Session<T>) -> Transition<Session<T>> {
        match STATES.get(state) {
            Some(InitState::Handshake) => run_phase(session, Phase::Handshake),
            Some(InitState::Read) => Transition::Child(read_machine()),
            Some(InitState::Next) => Transition::Child(next_machine()),
            None => unknown_state(NAME, state),
        }
    }
}

pub fn init_machine<T: UsbTransport>() -> Ssm<Session<T>> {
    Ssm::new(InitMachine)
}
