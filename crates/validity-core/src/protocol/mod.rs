//! Protocol module - Validity wire protocol definitions.

pub mod command;
pub mod constants;
pub mod status;

pub use command::{Command, DiagnosticStep, sequence_of, stamp_sequence};
pub use constants::*;
pub use status::FingerStatus;
