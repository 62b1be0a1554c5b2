//! Event system for caller decoupling.
//!
//! Allows CLIs, hosts and tests to subscribe to driver events without
//! tight coupling to the core logic. Captured frames are delivered through
//! the same observer.

use std::fmt;
use std::sync::Mutex;

use crate::device::DeviceState;
use crate::frame::RawFrame;
use crate::state::phases::Phase;

/// Events emitted by the driver.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Lifecycle state changed.
    StateChanged { from: DeviceState, to: DeviceState },
    /// A state machine started. Depth 0 is a top-level machine.
    MachineStarted { machine: &'static str, depth: usize },
    /// A state machine ran to completion or failed.
    MachineCompleted {
        machine: &'static str,
        error: Option<String>,
    },
    /// A phase subroutine is about to run.
    PhaseStarted { phase: Phase },
    /// One finger-state query was answered.
    PollQuery { count: u32, present: bool },
    /// A finger was detected after `polls` queries.
    FingerDetected { polls: u32 },
    /// The capture loop machine started.
    LoopStarted { iteration: u64 },
    /// The capture loop machine finished.
    LoopCompleted {
        iteration: u64,
        error: Option<String>,
    },
    /// Init chain finished; activation succeeded if `error` is `None`.
    ActivateComplete { error: Option<String> },
    /// Worker stopped and the session is back with the caller.
    DeactivateComplete,
    /// A frame was read from the image endpoint.
    FrameCaptured {
        phase: Phase,
        length: usize,
        packets: usize,
    },
    /// A response header differed from the expected constant.
    ProtocolMismatch { message: String },
    /// Error occurred.
    Error { message: String },
    /// USB Packet sent/received.
    Packet {
        direction: PacketDirection,
        endpoint: u8,
        length: usize,
        data: Option<Vec<u8>>,
    },
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving driver events.
///
/// Implement this trait in your host layer to receive updates.
pub trait DriverObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DriverEvent);

    /// Called with every frame read from the image endpoint.
    fn on_frame(&self, _frame: &RawFrame) {}
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DriverObserver for NullObserver {
    fn on_event(&self, _event: &DriverEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DriverObserver for TracingObserver {
    fn on_event(&self, event: &DriverEvent) {
        match event {
            DriverEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Device state changed");
            }
            DriverEvent::MachineStarted { machine, depth } => {
                tracing::debug!(machine, depth, "Machine started");
            }
            DriverEvent::MachineCompleted { machine, error } => match error {
                None => tracing::debug!(machine, "Machine completed"),
                Some(e) => tracing::warn!(machine, error = %e, "Machine failed"),
            },
            DriverEvent::PhaseStarted { phase } => {
                tracing::debug!(phase = %phase, "Phase");
            }
            DriverEvent::PollQuery { count, present } => {
                tracing::trace!(count, present, "Finger poll");
            }
            DriverEvent::FingerDetected { polls } => {
                tracing::info!(polls, "Finger detected");
            }
            DriverEvent::LoopStarted { iteration } => {
                tracing::debug!(iteration, "Capture loop started");
            }
            DriverEvent::LoopCompleted { iteration, error } => match error {
                None => tracing::info!(iteration, "Capture loop completed"),
                Some(e) => tracing::error!(iteration, error = %e, "Capture loop failed"),
            },
            DriverEvent::ActivateComplete { error } => match error {
                None => tracing::info!("Activation complete"),
                Some(e) => tracing::error!(error = %e, "Activation failed"),
            },
            DriverEvent::DeactivateComplete => {
                tracing::info!("Deactivation complete");
            }
            DriverEvent::FrameCaptured {
                phase,
                length,
                packets,
            } => {
                tracing::debug!(phase = %phase, length, packets, "Frame captured");
            }
            DriverEvent::ProtocolMismatch { message } => {
                tracing::warn!("Protocol mismatch: {}", message);
            }
            DriverEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            DriverEvent::Packet {
                direction,
                endpoint,
                length,
                ..
            } => {
                tracing::trace!(
                    dir = %direction,
                    ep = %format!("0x{:02X}", endpoint),
                    len = length,
                    "USB Packet"
                );
            }
        }
    }
}

/// Observer that keeps every event (except raw packets) and every frame.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<DriverEvent>>,
    frames: Mutex<Vec<RawFrame>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn frames(&self) -> Vec<RawFrame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Phases in the order they started.
    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::PhaseStarted { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
    }
}

impl DriverObserver for RecordingObserver {
    fn on_event(&self, event: &DriverEvent) {
        if !matches!(event, DriverEvent::Packet { .. })
            && let Ok(mut events) = self.events.lock()
        {
            events.push(event.clone());
        }
    }

    fn on_frame(&self, frame: &RawFrame) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.clone());
        }
    }
}
