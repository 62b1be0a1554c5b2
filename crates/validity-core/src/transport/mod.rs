//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockFault, MockReply, MockTransport, ReadRecord};
pub use nusb::{DeviceSummary, NusbTransport};
pub use traits::{TransportError, UsbTransport};
