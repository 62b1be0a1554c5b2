//! Validity-Core: a USB fingerprint sensor driver core in Rust.
//!
//! This crate drives Validity swipe sensors (`138a:0001`) through a
//! hierarchical sequential state machine (SSM) engine that sequences
//! sequence-numbered USB bulk exchanges.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command encoding, response parsing
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Session**: Sequence framing, timeouts, short-transfer detection
//! - **Commands**: One call per device operation
//! - **State**: SSM engine, phases and the driver machines
//! - **Poller**: Finger-presence polling
//! - **Device**: Open / activate / deactivate / close lifecycle
//! - **Events**: Observer pattern for caller decoupling and frame delivery
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use validity_core::device::{ImageDeviceState, ValidityDevice};
//! use validity_core::events::TracingObserver;
//! use validity_core::session::SessionConfig;
//! use validity_core::transport::NusbTransport;
//!
//! let transport = NusbTransport::open().expect("no sensor");
//! let mut device = ValidityDevice::open(transport, SessionConfig::default(), Arc::new(TracingObserver))
//!     .expect("open failed");
//!
//! device
//!     .activate(ImageDeviceState::AwaitFingerOn, |result| {
//!         if let Err(e) = result {
//!             eprintln!("activation failed: {e}");
//!         }
//!     })
//!     .expect("activate failed");
//!
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! device.deactivate(|_| {}).expect("deactivate failed");
//! device.close().expect("close failed");
//! ```

pub mod commands;
pub mod device;
pub mod error;
pub mod events;
pub mod frame;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use device::{
    DeviceState, DriverInfo, ImageDeviceState, ScanType, VALIDITY_DRIVER, ValidityDevice,
};
pub use error::{DriverError, Result};
pub use events::{DriverEvent, DriverObserver, NullObserver, RecordingObserver, TracingObserver};
pub use frame::RawFrame;
pub use poller::wait_for_finger;
pub use protocol::{Command, FingerStatus};
pub use session::{CancelToken, ReadMode, Session, SessionConfig, ShortReadPolicy};
pub use state::{Phase, Ssm};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
