//! Protocol constants for the Validity swipe sensor.
//!
//! The byte tables below were captured from USB traces of the 138a:0001
//! sensor and are unconfirmed. They are protocol constants: never compute or
//! patch them at runtime.

use super::command::DiagnosticStep;

// ============================================================================
// Device Identification
// ============================================================================

/// Validity Sensors, Inc. Vendor ID
pub const VALIDITY_VENDOR_ID: u16 = 0x138A;

/// VFS101 swipe sensor Product ID
pub const VFS101_PRODUCT_ID: u16 = 0x0001;

/// All supported PIDs for device discovery
pub const SUPPORTED_PIDS: &[u16] = &[VFS101_PRODUCT_ID];

/// Interface carrying the command and image endpoints
pub const SENSOR_INTERFACE: u8 = 0;

// ============================================================================
// Endpoints
// ============================================================================

/// Command OUT endpoint
pub const EP_CMD_OUT: u8 = 0x01;

/// Command response IN endpoint
pub const EP_CMD_IN: u8 = 0x81;

/// High-volume image data IN endpoint
pub const EP_IMAGE_IN: u8 = 0x82;

// ============================================================================
// Timing
// ============================================================================

/// Timeout for command and response transfers.
pub const BULK_TIMEOUT_MS: u64 = 100;

/// Timeout for frame reads on the image endpoint.
pub const FRAME_TIMEOUT_MS: u64 = 2000;

/// Delay between a command write and reading its response.
pub const ROUNDTRIP_DELAY_MS: u64 = 5;

/// Finger-presence poll interval.
pub const POLL_INTERVAL_MS: u64 = 50;

// ============================================================================
// Sizes
// ============================================================================

/// Sequence number + opcode + reserved byte
pub const COMMAND_HEADER_LEN: usize = 4;

/// Scratch buffer used for every command response.
pub const RESPONSE_LEN: usize = 64;

/// One sensor line is transferred as 16 bytes.
pub const LINE_LEN: usize = 16;

/// Lines in a small image read (phases 2 and 3).
pub const SMALL_READ_LINES: usize = 366;
pub const SMALL_READ_LEN: usize = SMALL_READ_LINES * LINE_LEN;

/// Lines in a full swipe frame (phase 1).
pub const FRAME_READ_LINES: usize = 20001;
pub const FRAME_READ_LEN: usize = FRAME_READ_LINES * LINE_LEN;

/// Size of the drain read issued while flushing the image endpoint.
pub const DRAIN_READ_LEN: usize = 0x4000;

/// Raw frames are handed out in packets of this size.
pub const FRAME_PACKET_SIZE: usize = 512;

/// Sensor image width in pixels. Height is variable (swipe).
pub const IMAGE_WIDTH: usize = 128;

// ============================================================================
// Opcodes (Host -> Device)
// ============================================================================

pub const OP_GET_VERSION: u8 = 0x01;
pub const OP_RESET: u8 = 0x05;
pub const OP_GET_PARAM: u8 = 0x0A;
pub const OP_SET_PARAM: u8 = 0x0B;
pub const OP_GET_PRINT: u8 = 0x0D;
pub const OP_ABORT_PRINT: u8 = 0x0E;
pub const OP_GET_FINGER_STATE: u8 = 0x20;
pub const OP_GET_CONFIGURATION: u8 = 0x3E;

/// Trailing bytes of the GetPrint command.
pub const GET_PRINT_ARGS: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

// ============================================================================
// Parameters
// ============================================================================

pub const PARAM_HANDSHAKE: u16 = 0x0017;
pub const HANDSHAKE_VALUE: u16 = 0x0001;

pub const PARAM_SENSOR_STATE: u16 = 0x0004;
pub const PARAM_CAPTURE_MODE: u16 = 0x0011;
pub const CAPTURE_MODE_VALUE: u16 = 0x0021;

pub const PARAM_STATUS: u16 = 0x0019;

/// Register dump issued by phase C. Responses are only logged.
pub const DIAGNOSTIC_SEQUENCE: &[DiagnosticStep] = &[
    DiagnosticStep::Configuration,
    DiagnosticStep::Get(0x0001),
    DiagnosticStep::Get(0x0002),
    DiagnosticStep::Get(0x0003),
    DiagnosticStep::Get(PARAM_SENSOR_STATE),
    DiagnosticStep::Set(0x0005, 0x0008),
    DiagnosticStep::Get(0x0005),
    DiagnosticStep::Set(0x0006, 0x0040),
    DiagnosticStep::Get(0x0006),
    DiagnosticStep::Get(PARAM_STATUS),
];

// ============================================================================
// Responses (Device -> Host)
// ============================================================================

/// Offset of the static header in a finger-state response.
pub const FINGER_STATE_HEADER_OFFSET: usize = 2;

/// Expected static header of a finger-state response (opcode echo + reserved).
pub const FINGER_STATE_HEADER: [u8; 2] = [OP_GET_FINGER_STATE, 0x00];

/// Offset of the finger-presence flag in a finger-state response.
pub const FINGER_STATE_OFFSET: usize = 4;

// ============================================================================
// Driver Identity
// ============================================================================

pub const DRIVER_ID: u16 = 10;
pub const DRIVER_NAME: &str = "validity";
pub const DRIVER_FULL_NAME: &str = "Validity";
