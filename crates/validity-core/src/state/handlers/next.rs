//! Next machine: D, B, E.

use super::{run_phase, unknown_state};
use crate::session::Session;
use crate::state::machine::{Ssm, StateHandler, Transition};
use crate::state::phases::Phase;
use crate::transport::UsbTransport;

const NAME: &str = "next";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    GetParam,
    Flush,
    PrintRequest,
}

const STATES: [NextState; 3] = [NextState::GetParam, NextState::Flush, NextState::PrintRequest];

impl NextState {
    fn phase(self) -> Phase {
        match self {
            NextState::GetParam => Phase::GetParam,
            NextState::Flush => Phase::FlushReconfigure,
            NextState::PrintRequest => Phase::PrintRequest,
        }
    }
}

pub struct NextMachine;

impl<T: UsbTransport> StateHandler<Session<T>> for NextMachine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state_count(&self) -> usize {
        STATES.len()
    }

    fn state_name(&self, state: usize) -> &'static str {
        match STATES.get(state) {
            Some(NextState::GetParam) => "get-param",
            Some(NextState::Flush) => "flush",
            Some(NextState::PrintRequest) => "print-request",
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

pub fn next_machine<T: UsbTransport>() -> Ssm<Session<T>> {
    Ssm::new(NextMachine)
}
