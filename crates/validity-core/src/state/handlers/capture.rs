//! Capture loop machine, started once per detected finger.
//!
//! State A marks the end of the finger poll, which the worker runs before
//! starting this machine; it moves no traffic of its own.

use tracing::debug;

use super::{next_machine, read_machine, run_phase, unknown_state};
use crate::session::Session;
use crate::state::machine::{Ssm, StateHandler, Transition};
use crate::state::phases::Phase;
use crate::transport::UsbTransport;

const NAME: &str = "capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// A
    FingerPresent,
    /// 1
    FrameRead,
    Read,
    /// C
    Diagnostic,
    /// 3
    PrintRequestRead,
    Next,
}

const STATES: [CaptureState; 6] = [
    CaptureState::FingerPresent,
    CaptureState::FrameRead,
    CaptureState::Read,
    CaptureState::Diagnostic,
    CaptureState::PrintRequestRead,
    CaptureState::Next,
];

impl CaptureState {
    fn name(self) -> &'static str {
        match self {
            CaptureState::FingerPresent => "finger-present",
            CaptureState::FrameRead => "frame-read",
            CaptureState::Read => "read",
            CaptureState::Diagnostic => "diagnostic",
            CaptureState::PrintRequestRead => "print-request-read",
            CaptureState::Next => "next",
        }
    }
}

pub struct CaptureMachine {
    iteration: u64,
}

impl CaptureMachine {
    pub fn new(iteration: u64) -> Self {
        Self { iteration }
    }
}

impl<T: UsbTransport> StateHandler<Session<T>> for CaptureMachine {
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
            Some(CaptureState::FingerPresent) => {
                debug!(iteration = self.iteration, seq = session.sequence(), "Capturing");
                Transition::Next
            }
            Some(CaptureState::FrameRead) => run_phase(session, Phase::FrameRead),
            Some(CaptureState::Read) => Transition::Child(read_machine()),
            Some(CaptureState::Diagnostic) => run_phase(session, Phase::Diagnostic),
            Some(CaptureState::PrintRequestRead) => run_phase(session, Phase::PrintRequestRead),
            Some(CaptureState::Next) => Transition::Child(next_machine()),
            None => unknown_state(NAME, state),
        }
    }
}

pub fn capture_machine<T: UsbTransport>(iteration: u64) -> Ssm<Session<T>> {
    Ssm::new(CaptureMachine::new(iteration))
}
