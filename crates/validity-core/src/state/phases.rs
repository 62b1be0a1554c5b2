//! Phase subroutines.
//!
//! Each phase is one recurring block of USB traffic, named after the
//! sensor's transfer diagram:
//!
//! ```text
//!        s      transfers     lines (<=16 bytes)
//!  init: Q          3             10
//!        B          4              8
//!        2          1            366
//!        D          1              2
//!        B          4              8
//!        E          1              2
//!  loop: A          n             2n   (finger poll, 50 ms)
//!        1          1          20001
//!        B          4              8
//!        2          1            366
//!        C         10             24
//!        3          1            366
//!        D          2              2
//!        B          4              8
//!        E          1              2
//! ```
//!
//! A phase is a fixed list of commands with no branching; its only effects
//! are on the wire and on the session's sequence counter.

use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::events::DriverEvent;
use crate::frame::RawFrame;
use crate::protocol::constants::*;
use crate::session::{ReadMode, Session, hex};
use crate::transport::UsbTransport;

/// Named block of device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Q: reset, version, handshake parameter.
    Handshake,
    /// B: abort any print, drain the image endpoint, reapply capture mode.
    FlushReconfigure,
    /// 2: print request followed by a small image read.
    SmallImageRead,
    /// D: status parameter read.
    GetParam,
    /// E: print request.
    PrintRequest,
    /// 1: print request followed by a full swipe frame read.
    FrameRead,
    /// C: register dump, logged only.
    Diagnostic,
    /// 3: print request followed by a second small image read.
    PrintRequestRead,
}

impl Phase {
    /// Label in the transfer diagram.
    pub fn code(&self) -> char {
        match self {
            Phase::Handshake => 'Q',
            Phase::FlushReconfigure => 'B',
            Phase::SmallImageRead => '2',
            Phase::GetParam => 'D',
            Phase::PrintRequest => 'E',
            Phase::FrameRead => '1',
            Phase::Diagnostic => 'C',
            Phase::PrintRequestRead => '3',
        }
    }

    /// Execute the phase against `session`.
    pub fn run<T: UsbTransport>(self, session: &mut Session<T>) -> Result<()> {
        debug!(phase = %self, seq = session.sequence(), "Phase start");
        session.emit(DriverEvent::PhaseStarted { phase: self });

        match self {
            Phase::Handshake => handshake(session),
            Phase::FlushReconfigure => flush_reconfigure(session),
            Phase::SmallImageRead | Phase::PrintRequestRead => {
                image_read(session, self, SMALL_READ_LEN)
            }
            Phase::GetParam => session.get_param(PARAM_STATUS),
            Phase::PrintRequest => session.get_print(),
            Phase::FrameRead => image_read(session, self, FRAME_READ_LEN),
            Phase::Diagnostic => diagnostic(session),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Handshake => "handshake",
            Phase::FlushReconfigure => "flush+reconfigure",
            Phase::SmallImageRead => "small-image-read",
            Phase::GetParam => "get-param",
            Phase::PrintRequest => "print-request",
            Phase::FrameRead => "frame-read",
            Phase::Diagnostic => "diagnostic",
            Phase::PrintRequestRead => "print-request-read",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

fn handshake<T: UsbTransport>(s: &mut Session<T>) -> Result<()> {
    s.reset()?;
    s.get_version()?;
    s.set_param(PARAM_HANDSHAKE, HANDSHAKE_VALUE)
}

fn flush_reconfigure<T: UsbTransport>(s: &mut Session<T>) -> Result<()> {
    s.get_param(PARAM_SENSOR_STATE)?;
    s.abort_print()?;
    let stale = s.receive(EP_IMAGE_IN, DRAIN_READ_LEN, ReadMode::Drain)?;
    if !stale.is_empty() {
        debug!(bytes = stale.len(), "Drained stale image data");
    }
    s.get_param(PARAM_CAPTURE_MODE)?;
    s.set_param(PARAM_CAPTURE_MODE, CAPTURE_MODE_VALUE)
}

fn image_read<T: UsbTransport>(s: &mut Session<T>, phase: Phase, len: usize) -> Result<()> {
    s.get_print()?;
    let data = s.receive(EP_IMAGE_IN, len, ReadMode::Frame)?;
    let frame = RawFrame::new(phase, data);

    s.emit(DriverEvent::FrameCaptured {
        phase,
        length: frame.len(),
        packets: frame.packet_count(),
    });
    s.observer().on_frame(&frame);
    Ok(())
}

fn diagnostic<T: UsbTransport>(s: &mut Session<T>) -> Result<()> {
    for step in DIAGNOSTIC_SEQUENCE {
        let cmd = step.command();
        let response = s.query(cmd)?;
        debug!(
            cmd = %cmd,
            response = %hex(&response[..response.len().min(16)]),
            "Diagnostic"
        );
    }
    Ok(())
}
