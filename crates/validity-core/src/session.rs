//! Sensor session - transport framing for one open device.
//!
//! A session owns the transport and the 16-bit sequence counter. Every
//! command buffer is stamped with the counter right before it is written;
//! the counter advances when the following read completes, so a write and
//! its response share one sequence value.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{DriverError, Result};
use crate::events::{DriverEvent, DriverObserver, PacketDirection};
use crate::protocol::command::stamp_sequence;
use crate::protocol::constants::*;
use crate::transport::UsbTransport;

/// What to do when a read returns fewer bytes than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortReadPolicy {
    /// Fail with `ShortRead`.
    #[default]
    Fail,
    /// Accept partial data.
    Tolerate,
}

/// Configuration for a sensor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Finger-presence poll interval.
    pub poll_interval_ms: u64,
    /// Delay between a command and its response read.
    pub roundtrip_delay_ms: u64,
    /// Timeout for command and response transfers.
    pub bulk_timeout_ms: u64,
    /// Timeout for frame reads on the image endpoint.
    pub frame_timeout_ms: u64,
    /// Short-read handling.
    pub short_reads: ShortReadPolicy,
    /// Treat response header mismatches as errors.
    pub strict_protocol: bool,
    /// Stop after this many capture loops (hosts may ignore it).
    pub max_captures: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            roundtrip_delay_ms: ROUNDTRIP_DELAY_MS,
            bulk_timeout_ms: BULK_TIMEOUT_MS,
            frame_timeout_ms: FRAME_TIMEOUT_MS,
            short_reads: ShortReadPolicy::default(),
            strict_protocol: false,
            max_captures: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> AnyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> AnyResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn roundtrip_delay(&self) -> Duration {
        Duration::from_millis(self.roundtrip_delay_ms)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Shared cancellation flag, checked at every transfer and state entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DriverError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How a bulk read is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Command response of at most the requested size: timeouts are benign
    /// and shorter replies are normal.
    Response,
    /// Flushing stale data: timeouts are benign, partial data is fine.
    Drain,
    /// Image data: timeouts are fatal, short reads follow the policy.
    Frame,
}

/// One open sensor.
pub struct Session<T: UsbTransport> {
    transport: T,
    sequence: u16,
    config: SessionConfig,
    cancel: CancelToken,
    observer: Arc<dyn DriverObserver>,
}

impl<T: UsbTransport> Session<T> {
    pub fn new(transport: T, config: SessionConfig, observer: Arc<dyn DriverObserver>) -> Self {
        Self {
            transport,
            sequence: 0,
            config,
            cancel: CancelToken::new(),
            observer,
        }
    }

    /// Sequence value the next command will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&mut self, sequence: u16) {
        self.sequence = sequence;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn observer(&self) -> &Arc<dyn DriverObserver> {
        &self.observer
    }

    pub(crate) fn emit(&self, event: DriverEvent) {
        self.observer.on_event(&event);
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Stamp `buf` with the sequence counter and write it to `endpoint`.
    pub fn send(&mut self, endpoint: u8, buf: &mut [u8]) -> Result<()> {
        self.check_cancelled()?;
        stamp_sequence(buf, self.sequence);

        let written = self
            .transport
            .bulk_write(endpoint, buf, self.config.bulk_timeout())
            .map_err(|e| DriverError::transfer(endpoint, e))?;

        trace!(
            ep = %format!("0x{:02X}", endpoint),
            seq = self.sequence,
            data = %hex(buf),
            "TX"
        );
        self.emit_packet(PacketDirection::Tx, endpoint, &buf[..written.min(buf.len())]);

        if written < buf.len() {
            return Err(DriverError::ShortWrite {
                endpoint,
                expected: buf.len(),
                actual: written,
            });
        }
        Ok(())
    }

    /// Read up to `len` bytes from `endpoint`.
    ///
    /// The sequence counter advances on every read that returns `Ok`,
    /// including benign timeouts (which yield an empty buffer). Only frame
    /// reads have a fixed length, so only they are subject to the short-read
    /// policy.
    pub fn receive(&mut self, endpoint: u8, len: usize, mode: ReadMode) -> Result<Vec<u8>> {
        self.check_cancelled()?;

        let timeout = match mode {
            ReadMode::Frame => self.config.frame_timeout(),
            ReadMode::Response | ReadMode::Drain => self.config.bulk_timeout(),
        };

        let data = match self.transport.bulk_read(endpoint, len, timeout) {
            Ok(data) => data,
            Err(e) if e.is_timeout() && mode != ReadMode::Frame => {
                debug!(ep = %format!("0x{:02X}", endpoint), "Read timed out (benign)");
                self.advance_sequence();
                return Ok(Vec::new());
            }
            Err(e) => return Err(DriverError::transfer(endpoint, e)),
        };

        trace!(
            ep = %format!("0x{:02X}", endpoint),
            len = data.len(),
            head = %hex(&data[..data.len().min(16)]),
            "RX"
        );
        self.emit_packet(PacketDirection::Rx, endpoint, &data);

        if data.len() < len && mode == ReadMode::Frame {
            match self.config.short_reads {
                ShortReadPolicy::Fail => {
                    return Err(DriverError::ShortRead {
                        endpoint,
                        expected: len,
                        actual: data.len(),
                    });
                }
                ShortReadPolicy::Tolerate => {
                    warn!(
                        ep = %format!("0x{:02X}", endpoint),
                        expected = len,
                        actual = data.len(),
                        "Short read tolerated"
                    );
                }
            }
        }

        self.advance_sequence();
        Ok(data)
    }

    /// Send `buf`, wait, and read the response into the scratch buffer.
    /// The response is discarded.
    pub fn roundtrip(&mut self, endpoint: u8, buf: &mut [u8]) -> Result<()> {
        self.exchange(endpoint, buf).map(|_| ())
    }

    /// Like `roundtrip`, but hands the response back.
    pub fn exchange(&mut self, endpoint: u8, buf: &mut [u8]) -> Result<Vec<u8>> {
        self.send(endpoint, buf)?;
        let delay = self.config.roundtrip_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.receive(EP_CMD_IN, RESPONSE_LEN, ReadMode::Response)
    }

    fn advance_sequence(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn emit_packet(&self, direction: PacketDirection, endpoint: u8, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.emit(DriverEvent::Packet {
            direction,
            endpoint,
            length: data.len(),
            data: Some(data.iter().take(32).cloned().collect()),
        });
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::{Command, sequence_of};
    use crate::transport::{MockFault, MockReply, MockTransport};

    fn quick_config() -> SessionConfig {
        SessionConfig {
            roundtrip_delay_ms: 0,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn session(mock: &MockTransport) -> Session<MockTransport> {
        Session::new(mock.clone(), quick_config(), Arc::new(NullObserver))
    }

    #[test]
    fn test_sequence_monotonic() {
        let mock = MockTransport::new();
        let mut s = session(&mock);

        for _ in 0..10 {
            let mut buf = Command::GetVersion.encode();
            s.roundtrip(EP_CMD_OUT, &mut buf).unwrap();
        }

        let seqs: Vec<u16> = mock
            .get_writes()
            .iter()
            .map(|w| sequence_of(w).unwrap())
            .collect();
        assert_eq!(seqs, (0..10).collect::<Vec<u16>>());
        assert_eq!(s.sequence(), 10);
    }

    #[test]
    fn test_send_without_receive_keeps_sequence() {
        let mock = MockTransport::new();
        let mut s = session(&mock);

        let mut a = Command::Reset.encode();
        let mut b = Command::Reset.encode();
        s.send(EP_CMD_OUT, &mut a).unwrap();
        s.send(EP_CMD_OUT, &mut b).unwrap();

        assert_eq!(sequence_of(&a), Some(0));
        assert_eq!(sequence_of(&b), Some(0));
        assert_eq!(s.sequence(), 0);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mock = MockTransport::new();
        let mut s = session(&mock);
        s.set_sequence(0xFFFF);

        let mut first = Command::GetVersion.encode();
        s.roundtrip(EP_CMD_OUT, &mut first).unwrap();
        let mut second = Command::GetVersion.encode();
        s.roundtrip(EP_CMD_OUT, &mut second).unwrap();

        assert_eq!(&first[0..2], &[0xFF, 0xFF]);
        assert_eq!(&second[0..2], &[0x00, 0x00]);
        assert_eq!(s.sequence(), 1);
    }

    #[test]
    fn test_benign_timeout_advances_sequence() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_CMD_IN, MockReply::Timeout);
        let mut s = session(&mock);

        let data = s.receive(EP_CMD_IN, RESPONSE_LEN, ReadMode::Response).unwrap();
        assert!(data.is_empty());
        assert_eq!(s.sequence(), 1);
    }

    #[test]
    fn test_frame_timeout_is_fatal() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_IMAGE_IN, MockReply::Timeout);
        let mut s = session(&mock);

        let err = s.receive(EP_IMAGE_IN, SMALL_READ_LEN, ReadMode::Frame).unwrap_err();
        assert!(matches!(err, DriverError::Transfer { endpoint: EP_IMAGE_IN, .. }));
        assert_eq!(s.sequence(), 0);
    }

    #[test]
    fn test_short_write() {
        let mock = MockTransport::new();
        mock.fail_on_opcode(OP_SET_PARAM, 1, MockFault::Short(4));
        let mut s = session(&mock);

        let mut buf = Command::SetParam(PARAM_HANDSHAKE, HANDSHAKE_VALUE).encode();
        let err = s.send(EP_CMD_OUT, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            DriverError::ShortWrite {
                expected: 8,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_short_frame_fails_by_default() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_IMAGE_IN, MockReply::Data(vec![0u8; LINE_LEN]));
        let mut s = session(&mock);

        let err = s.receive(EP_IMAGE_IN, SMALL_READ_LEN, ReadMode::Frame).unwrap_err();
        assert!(matches!(
            err,
            DriverError::ShortRead {
                expected: SMALL_READ_LEN,
                actual: LINE_LEN,
                ..
            }
        ));
        assert_eq!(s.sequence(), 0);
    }

    #[test]
    fn test_short_frame_tolerated() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_IMAGE_IN, MockReply::Data(vec![0u8; LINE_LEN]));
        let config = SessionConfig {
            short_reads: ShortReadPolicy::Tolerate,
            ..quick_config()
        };
        let mut s = Session::new(mock.clone(), config, Arc::new(NullObserver));

        let data = s.receive(EP_IMAGE_IN, SMALL_READ_LEN, ReadMode::Frame).unwrap();
        assert_eq!(data.len(), LINE_LEN);
        assert_eq!(s.sequence(), 1);
    }

    #[test]
    fn test_line_sized_response_accepted() {
        let mock = MockTransport::new();
        mock.queue_response(&[0u8; LINE_LEN]);
        let mut s = session(&mock);
        assert_eq!(s.config().short_reads, ShortReadPolicy::Fail);

        let mut buf = Command::Reset.encode();
        let data = s.exchange(EP_CMD_OUT, &mut buf).unwrap();
        assert_eq!(data.len(), LINE_LEN);
        assert_eq!(s.sequence(), 1);
    }

    #[test]
    fn test_drain_accepts_partial() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_IMAGE_IN, MockReply::Data(vec![0u8; 100]));
        let mut s = session(&mock);

        let data = s.receive(EP_IMAGE_IN, DRAIN_READ_LEN, ReadMode::Drain).unwrap();
        assert_eq!(data.len(), 100);
    }

    #[test]
    fn test_transfer_error() {
        let mock = MockTransport::new();
        mock.queue_reply(EP_CMD_IN, MockReply::Stall);
        let mut s = session(&mock);

        let err = s.receive(EP_CMD_IN, RESPONSE_LEN, ReadMode::Response).unwrap_err();
        assert!(matches!(err, DriverError::Transfer { endpoint: EP_CMD_IN, .. }));
    }

    #[test]
    fn test_cancelled_session_touches_nothing() {
        let mock = MockTransport::new();
        let mut s = session(&mock);
        s.cancel_token().cancel();

        let mut buf = Command::Reset.encode();
        assert!(s.roundtrip(EP_CMD_OUT, &mut buf).unwrap_err().is_cancelled());
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_config_toml() {
        let config: SessionConfig = toml::from_str(
            r#"
            poll_interval_ms = 20
            short_reads = "tolerate"
            strict_protocol = true
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.short_reads, ShortReadPolicy::Tolerate);
        assert!(config.strict_protocol);
        assert_eq!(config.bulk_timeout_ms, BULK_TIMEOUT_MS);

        let text = toml::to_string_pretty(&config).unwrap();
        let back: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
