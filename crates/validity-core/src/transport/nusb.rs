//! nusb-based USB transport implementation.

use std::sync::Mutex;
use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, In, Out, TransferError as NusbTransferError};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{SUPPORTED_PIDS, VALIDITY_VENDOR_ID};

/// Time allowed for a cancelled transfer to be reaped.
const CANCEL_REAP_TIMEOUT: Duration = Duration::from_millis(50);

/// A supported sensor seen on the bus.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// nusb-based USB transport.
///
/// The device is opened up front; the interface is claimed separately so
/// that claim failures surface from the driver's `open`.
pub struct NusbTransport {
    device: Device,
    interface: Mutex<Option<Interface>>,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// List every attached sensor with a supported VID/PID.
    pub fn list_supported() -> Result<Vec<DeviceSummary>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(devices
            .filter(|d| {
                d.vendor_id() == VALIDITY_VENDOR_ID && SUPPORTED_PIDS.contains(&d.product_id())
            })
            .map(|d| DeviceSummary {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                product: d.product_string().map(str::to_string),
            })
            .collect())
    }

    /// Open the first matching Validity sensor (tries all supported PIDs).
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == VALIDITY_VENDOR_ID
                && SUPPORTED_PIDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: VALIDITY_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(Self {
            device,
            interface: Mutex::new(None),
            vid,
            pid,
        })
    }

    fn with_interface<R>(
        &self,
        f: impl FnOnce(&Interface) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let guard = self
            .interface
            .lock()
            .map_err(|_| TransportError::OpenFailed("interface lock poisoned".into()))?;
        match guard.as_ref() {
            Some(interface) => f(interface),
            None => Err(TransportError::NotClaimed(0)),
        }
    }
}

fn map_transfer_error(endpoint: u8, err: NusbTransferError, write: bool) -> TransportError {
    match err {
        NusbTransferError::Stall => TransportError::Stall { endpoint },
        NusbTransferError::Disconnected => TransportError::Disconnected,
        other if write => TransportError::WriteFailed(other.to_string()),
        other => TransportError::ReadFailed(other.to_string()),
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self))]
    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        let claimed = self
            .device
            .claim_interface(interface)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            })?;

        let mut guard = self
            .interface
            .lock()
            .map_err(|_| TransportError::OpenFailed("interface lock poisoned".into()))?;
        *guard = Some(claimed);
        info!(interface, "Interface claimed");
        Ok(())
    }

    fn release_interface(&self, interface: u8) {
        match self.interface.lock() {
            Ok(mut guard) => {
                // Dropping the handle releases the claim.
                if guard.take().is_some() {
                    info!(interface, "Interface released");
                }
            }
            Err(_) => warn!(interface, "Interface lock poisoned on release"),
        }
    }

    #[instrument(skip(self, data), fields(ep = %format!("0x{:02X}", endpoint), len = data.len()))]
    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.with_interface(|interface| {
            let mut ep = interface
                .endpoint::<Bulk, Out>(endpoint)
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

            let mut buf = ep.allocate(data.len());
            buf.extend_from_slice(data);
            ep.submit(buf);

            let Some(completion) = ep.wait_next_complete(timeout) else {
                ep.cancel_all();
                let _ = ep.wait_next_complete(CANCEL_REAP_TIMEOUT);
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            };

            completion
                .status
                .map_err(|e| map_transfer_error(endpoint, e, true))?;

            debug!(bytes_written = completion.actual_len, "Write complete");
            Ok(completion.actual_len)
        })
    }

    #[instrument(skip(self), fields(ep = %format!("0x{:02X}", endpoint)))]
    fn bulk_read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.with_interface(|interface| {
            let mut ep = interface
                .endpoint::<Bulk, In>(endpoint)
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

            // IN requests must be a whole number of packets.
            let packet = ep.max_packet_size().max(1);
            let requested = max_len.div_ceil(packet) * packet;
            let mut buf = Buffer::new(requested);
            buf.set_requested_len(requested);
            ep.submit(buf);

            let Some(completion) = ep.wait_next_complete(timeout) else {
                ep.cancel_all();
                let _ = ep.wait_next_complete(CANCEL_REAP_TIMEOUT);
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            };

            completion
                .status
                .map_err(|e| map_transfer_error(endpoint, e, false))?;

            let mut data = completion.buffer.to_vec();
            data.truncate(max_len.min(completion.actual_len));
            debug!(bytes_read = data.len(), "Read complete");
            Ok(data)
        })
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
