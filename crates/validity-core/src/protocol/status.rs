//! Finger-state response parsing.
//!
//! Layout of a finger-state response:
//!
//! ```text
//! [0..2]  sequence echo
//! [2..4]  static header (opcode echo + reserved)
//! [4]     finger flag (0 = absent)
//! ```

use std::fmt;

use super::constants::{FINGER_STATE_HEADER, FINGER_STATE_HEADER_OFFSET, FINGER_STATE_OFFSET};

/// Parsed finger-state response.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FingerStatus {
    header: Option<[u8; 2]>,
    flag: Option<u8>,
}

impl FingerStatus {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let header = bytes
            .get(FINGER_STATE_HEADER_OFFSET..FINGER_STATE_HEADER_OFFSET + 2)
            .map(|h| [h[0], h[1]]);
        let flag = bytes.get(FINGER_STATE_OFFSET).copied();
        Self { header, flag }
    }

    /// No response arrived (benign timeout).
    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.flag.is_none()
    }

    /// Finger is on the sensor.
    pub fn is_present(&self) -> bool {
        self.flag.is_some_and(|f| f != 0)
    }

    /// Static header matches the expected constant.
    pub fn header_matches(&self) -> bool {
        self.header == Some(FINGER_STATE_HEADER)
    }

    /// Header bytes as received, for diagnostics.
    pub fn header(&self) -> Option<[u8; 2]> {
        self.header
    }
}

impl fmt::Debug for FingerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.header, self.flag) {
            (Some(h), Some(flag)) => write!(
                f,
                "FingerStatus(header={:02X}{:02X} flag={:02X})",
                h[0], h[1], flag
            ),
            _ => write!(f, "FingerStatus(<short>)"),
        }
    }
}

impl fmt::Display for FingerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            write!(f, "present")
        } else {
            write!(f, "absent")
        }
    }
}
