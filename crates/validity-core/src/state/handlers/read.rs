//! Read machine: B then 2.

use super::{run_phase, unknown_state};
use crate::session::Session;
use crate::state::machine::{Ssm, StateHandler, Transition};
use crate::state::phases::Phase;
use crate::transport::UsbTransport;

const NAME: &str = "read";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Flush,
    SmallRead,
}

const STATES: [ReadState; 2] = [ReadState::Flush, ReadState::SmallRead];

impl ReadState {
    fn phase(self) -> Phase {
        match self {
            ReadState::Flush => Phase::FlushReconfigure,
            ReadState::SmallRead => Phase::SmallImageRead,
        }
    }
}

pub struct ReadMachine;

impl<T: UsbTransport> StateHandler<Session<T>> for ReadMachine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state_count(&self) -> usize {
        STATES.len()
    }

    fn state_name(&self, state: usize) -> &'static str {
        match STATES.get(state) {
            Some(ReadState::Flush) => "flush",
            Some(ReadState::SmallRead) => "small-read",
            None => "-",
        }
    }

    fn run_state(&mut self, state: usize, session: &mut Session<T>) -> Transition<Session<T>> {
        match STATES.get(state) {
            Some(s) => run_phase(session, s.phase()),
            None => unknown_state(NAME, state),
        }
    }
}

pub fn read_machine<T: UsbTransport>() -> Ssm<Session<T>> {
    Ssm::new(ReadMachine)
}
