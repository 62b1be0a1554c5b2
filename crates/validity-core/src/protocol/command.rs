//! Command buffers.
//!
//! Every command is a fixed-layout buffer:
//!
//! ```text
//! [0..2]  sequence number (u16 LE, stamped by the session at send time)
//! [2]     opcode
//! [3]     reserved (0)
//! [4..]   parameters (u16 LE fields), command specific
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use super::constants::*;

/// A device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    GetVersion,
    GetParam(u16),
    SetParam(u16, u16),
    GetConfiguration,
    AbortPrint,
    GetFingerState,
    GetPrint,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Reset => OP_RESET,
            Command::GetVersion => OP_GET_VERSION,
            Command::GetParam(_) => OP_GET_PARAM,
            Command::SetParam(..) => OP_SET_PARAM,
            Command::GetConfiguration => OP_GET_CONFIGURATION,
            Command::AbortPrint => OP_ABORT_PRINT,
            Command::GetFingerState => OP_GET_FINGER_STATE,
            Command::GetPrint => OP_GET_PRINT,
        }
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::GetParam(_) => COMMAND_HEADER_LEN + 2,
            Command::SetParam(..) => COMMAND_HEADER_LEN + 4,
            Command::GetPrint => COMMAND_HEADER_LEN + GET_PRINT_ARGS.len(),
            _ => COMMAND_HEADER_LEN,
        }
    }

    /// Build the command buffer. The sequence bytes are left zero.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[2] = self.opcode();
        match *self {
            Command::GetParam(id) => {
                LittleEndian::write_u16(&mut buf[4..6], id);
            }
            Command::SetParam(id, value) => {
                LittleEndian::write_u16(&mut buf[4..6], id);
                LittleEndian::write_u16(&mut buf[6..8], value);
            }
            Command::GetPrint => {
                buf[4..].copy_from_slice(&GET_PRINT_ARGS);
            }
            _ => {}
        }
        buf
    }

    /// Parse an encoded command buffer.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < COMMAND_HEADER_LEN {
            return None;
        }
        let field = |at: usize| -> Option<u16> {
            buf.get(at..at + 2).map(LittleEndian::read_u16)
        };
        let cmd = match buf[2] {
            OP_RESET => Command::Reset,
            OP_GET_VERSION => Command::GetVersion,
            OP_GET_PARAM => Command::GetParam(field(4)?),
            OP_SET_PARAM => Command::SetParam(field(4)?, field(6)?),
            OP_GET_CONFIGURATION => Command::GetConfiguration,
            OP_ABORT_PRINT => Command::AbortPrint,
            OP_GET_FINGER_STATE => Command::GetFingerState,
            OP_GET_PRINT => Command::GetPrint,
            _ => return None,
        };
        Some(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => write!(f, "RESET"),
            Command::GetVersion => write!(f, "GET_VERSION"),
            Command::GetParam(id) => write!(f, "GET_PARAM(0x{:04X})", id),
            Command::SetParam(id, value) => {
                write!(f, "SET_PARAM(0x{:04X}=0x{:04X})", id, value)
            }
            Command::GetConfiguration => write!(f, "GET_CONFIGURATION"),
            Command::AbortPrint => write!(f, "ABORT_PRINT"),
            Command::GetFingerState => write!(f, "GET_FINGER_STATE"),
            Command::GetPrint => write!(f, "GET_PRINT"),
        }
    }
}

/// Overwrite the first two bytes of `buf` with `seq` (low byte first).
pub fn stamp_sequence(buf: &mut [u8], seq: u16) {
    LittleEndian::write_u16(&mut buf[0..2], seq);
}

/// Read back the sequence number of a stamped buffer.
pub fn sequence_of(buf: &[u8]) -> Option<u16> {
    buf.get(0..2).map(LittleEndian::read_u16)
}

/// One entry of the diagnostic register dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticStep {
    Configuration,
    Get(u16),
    Set(u16, u16),
}

impl DiagnosticStep {
    pub fn command(&self) -> Command {
        match *self {
            DiagnosticStep::Configuration => Command::GetConfiguration,
            DiagnosticStep::Get(id) => Command::GetParam(id),
            DiagnosticStep::Set(id, value) => Command::SetParam(id, value),
        }
    }
}
