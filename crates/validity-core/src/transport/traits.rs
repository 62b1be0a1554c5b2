//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for bulk USB communication,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Interface {0} is not claimed")]
    NotClaimed(u8),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Endpoint 0x{endpoint:02X} stalled")]
    Stall { endpoint: u8 },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Timeout-class failures: the device had nothing to send yet.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Abstract USB transport interface.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
///
/// Implementations report the number of bytes actually moved; classifying
/// short transfers is the session's job.
pub trait UsbTransport: Send + Sync {
    /// Claim an interface for exclusive use.
    fn claim_interface(&self, interface: u8) -> Result<(), TransportError>;

    /// Release a previously claimed interface.
    fn release_interface(&self, interface: u8);

    /// Bulk write to an OUT endpoint. Returns the number of bytes written.
    fn bulk_write(&self, endpoint: u8, data: &[u8], timeout: Duration)
    -> Result<usize, TransportError>;

    /// Bulk read of at most `max_len` bytes from an IN endpoint.
    fn bulk_read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
