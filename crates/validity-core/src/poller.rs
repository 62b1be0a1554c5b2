//! Finger-presence poller.
//!
//! Runs on the capture worker thread between loop iterations. Each query
//! is a normal round-trip, so cancellation is observed at the next transfer
//! or iteration and no request is left outstanding.

use std::thread;

use tracing::{debug, info, warn};

use crate::error::{DriverError, Result};
use crate::events::DriverEvent;
use crate::protocol::FingerStatus;
use crate::protocol::constants::FINGER_STATE_HEADER;
use crate::session::{Session, hex};
use crate::transport::UsbTransport;

/// Poll until a finger is on the sensor. Returns the number of queries
/// issued, including the one that saw the finger.
pub fn wait_for_finger<T: UsbTransport>(session: &mut Session<T>) -> Result<u32> {
    let interval = session.config().poll_interval();
    let mut count: u32 = 0;

    debug!(interval_ms = interval.as_millis() as u64, "Waiting for finger");

    loop {
        session.check_cancelled()?;

        let status = session.get_finger_state()?;
        count = count.saturating_add(1);
        check_header(session, &status)?;

        let present = status.is_present();
        session.emit(DriverEvent::PollQuery { count, present });

        if present {
            info!(polls = count, "Finger detected");
            session.emit(DriverEvent::FingerDetected { polls: count });
            return Ok(count);
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}

fn check_header<T: UsbTransport>(session: &Session<T>, status: &FingerStatus) -> Result<()> {
    // Timed-out queries carry nothing to check.
    if status.is_empty() || status.header_matches() {
        return Ok(());
    }

    let expected = hex(&FINGER_STATE_HEADER);
    let actual = status.header().map(|h| hex(&h)).unwrap_or_else(|| "<short>".into());

    if session.config().strict_protocol {
        return Err(DriverError::ProtocolMismatch {
            context: "finger state",
            expected,
            actual,
        });
    }

    warn!(expected = %expected, actual = %actual, "Unexpected finger-state header");
    session.emit(DriverEvent::ProtocolMismatch {
        message: format!("finger state header {} (expected {})", actual, expected),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::events::RecordingObserver;
    use crate::protocol::constants::*;
    use crate::session::SessionConfig;
    use crate::transport::{MockReply, MockTransport};

    fn config() -> SessionConfig {
        SessionConfig {
            roundtrip_delay_ms: 0,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn polls(observer: &RecordingObserver) -> Vec<(u32, bool)> {
        observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::PollQuery { count, present } => Some((count, present)),
                _ => None,
            })
            .collect()
    }

    fn response_with_header(header: [u8; 2], present: bool) -> Vec<u8> {
        let mut bytes = vec![0u8; RESPONSE_LEN];
        bytes[FINGER_STATE_HEADER_OFFSET..FINGER_STATE_HEADER_OFFSET + 2].copy_from_slice(&header);
        bytes[FINGER_STATE_OFFSET] = present as u8;
        bytes
    }

    #[test]
    fn test_finger_after_fifty_absent_polls() {
        let mock = MockTransport::new();
        mock.script_finger_states(std::iter::repeat_n(false, 50).chain([true]));
        let observer = Arc::new(RecordingObserver::new());
        let mut s = Session::new(mock.clone(), config(), observer.clone());

        assert_eq!(wait_for_finger(&mut s).unwrap(), 51);
        assert_eq!(mock.count_opcode(OP_GET_FINGER_STATE), 51);

        let seen = polls(&observer);
        assert_eq!(seen.len(), 51);
        assert!(seen[..50].iter().all(|(_, present)| !present));
        assert_eq!(seen[50], (51, true));
        assert!(matches!(
            observer.events().last(),
            Some(DriverEvent::FingerDetected { polls: 51 })
        ));
    }

    #[test]
    fn test_timeout_counts_as_absent() {
        let mock = MockTransport::new();
        mock.script_finger_states([true, true]);
        mock.queue_reply(EP_CMD_IN, MockReply::Timeout);
        let mut s = Session::new(mock.clone(), config(), Arc::new(RecordingObserver::new()));

        assert_eq!(wait_for_finger(&mut s).unwrap(), 2);
    }

    #[test]
    fn test_header_mismatch_is_reported() {
        let mock = MockTransport::new();
        mock.queue_response(&response_with_header([0xAA, 0x55], true));
        let observer = Arc::new(RecordingObserver::new());
        let mut s = Session::new(mock.clone(), config(), observer.clone());

        assert_eq!(wait_for_finger(&mut s).unwrap(), 1);
        assert!(
            observer
                .events()
                .iter()
                .any(|e| matches!(e, DriverEvent::ProtocolMismatch { .. }))
        );
    }

    #[test]
    fn test_header_mismatch_strict() {
        let mock = MockTransport::new();
        mock.queue_response(&response_with_header([0xAA, 0x55], true));
        let strict = SessionConfig {
            strict_protocol: true,
            ..config()
        };
        let mut s = Session::new(mock.clone(), strict, Arc::new(RecordingObserver::new()));

        let err = wait_for_finger(&mut s).unwrap_err();
        match err {
            DriverError::ProtocolMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, hex(&FINGER_STATE_HEADER));
                assert_eq!(actual, "AA55");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancel_stops_polling() {
        let mock = MockTransport::new();
        let mut s = Session::new(mock.clone(), config(), Arc::new(RecordingObserver::new()));
        let cancel = s.cancel_token();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let err = wait_for_finger(&mut s).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        let queries = mock.count_opcode(OP_GET_FINGER_STATE);
        assert!(queries >= 1);
        // At most the last query lost its response to the cancel.
        assert!(queries - s.sequence() as usize <= 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let mock = MockTransport::new();
        let mut s = Session::new(mock.clone(), config(), Arc::new(RecordingObserver::new()));
        s.cancel_token().cancel();

        assert!(wait_for_finger(&mut s).unwrap_err().is_cancelled());
        assert_eq!(mock.count_opcode(OP_GET_FINGER_STATE), 0);
    }
}
