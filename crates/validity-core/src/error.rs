//! Driver error taxonomy.
//!
//! Every failure below the device lifecycle is one of these. A state machine
//! stores the first one it sees and unwinds with it.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The communication interface could not be claimed.
    #[error("Could not claim interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: TransportError,
    },

    /// The underlying transfer reported failure.
    #[error("Transfer failed on endpoint 0x{endpoint:02X}: {source}")]
    Transfer {
        endpoint: u8,
        #[source]
        source: TransportError,
    },

    #[error("Short write on endpoint 0x{endpoint:02X}: {actual} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Short read on endpoint 0x{endpoint:02X}: {actual} of {expected} bytes")]
    ShortRead {
        endpoint: u8,
        expected: usize,
        actual: usize,
    },

    /// A response's static fields differ from the expected constant header.
    #[error("Protocol mismatch in {context}: expected {expected}, got {actual}")]
    ProtocolMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    /// The session was deactivated while work was in flight.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid device state: {0}")]
    InvalidState(String),

    #[error("Capture worker panicked")]
    WorkerPanicked,
}

impl DriverError {
    pub fn transfer(endpoint: u8, source: TransportError) -> Self {
        Self::Transfer { endpoint, source }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriverError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = DriverError::ShortWrite {
            endpoint: 0x01,
            expected: 8,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Short write on endpoint 0x01: 3 of 8 bytes");

        let err = DriverError::transfer(0x81, TransportError::Disconnected);
        assert_eq!(
            err.to_string(),
            "Transfer failed on endpoint 0x81: Device disconnected"
        );
    }

    #[test]
    fn test_is_cancelled() {
        assert!(DriverError::Cancelled.is_cancelled());
        assert!(!DriverError::invalid_state("closed").is_cancelled());
    }
}
