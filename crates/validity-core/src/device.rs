//! Device lifecycle.
//!
//! Binds a `Session` to one physical sensor:
//!
//! ```text
//! Closed -> Open -> Activated <-> Capturing -> Deactivated -> Closed
//!                       ^                          |
//!                       +--------------------------+
//! ```
//!
//! While activated the session lives on a dedicated worker thread that runs
//! the init machine, then alternates between the finger poller and the
//! capture loop machine. `deactivate` cancels and joins that thread and
//! takes the session back.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, SendError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{error, info, instrument, warn};

use crate::error::{DriverError, Result};
use crate::events::{DriverEvent, DriverObserver};
use crate::poller::wait_for_finger;
use crate::protocol::constants::*;
use crate::session::{CancelToken, Session, SessionConfig};
use crate::state::{capture_machine, init_machine};
use crate::transport::UsbTransport;

/// Lifecycle state of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
    Activated,
    Capturing,
    Deactivated,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Closed => write!(f, "Closed"),
            DeviceState::Open => write!(f, "Open"),
            DeviceState::Activated => write!(f, "Activated"),
            DeviceState::Capturing => write!(f, "Capturing"),
            DeviceState::Deactivated => write!(f, "Deactivated"),
        }
    }
}

/// Image-device state a caller asks for on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDeviceState {
    AwaitFingerOn,
    Capture,
    AwaitFingerOff,
}

impl fmt::Display for ImageDeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageDeviceState::AwaitFingerOn => write!(f, "await-finger-on"),
            ImageDeviceState::Capture => write!(f, "capture"),
            ImageDeviceState::AwaitFingerOff => write!(f, "await-finger-off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Press,
    Swipe,
}

/// Static driver description used by the enumeration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    pub id: u16,
    pub name: &'static str,
    pub full_name: &'static str,
    /// Supported (vendor, product) pairs.
    pub id_table: &'static [(u16, u16)],
    pub scan_type: ScanType,
    pub img_width: usize,
    /// `None` for swipe sensors, whose image height varies.
    pub img_height: Option<usize>,
}

impl DriverInfo {
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.id_table.iter().any(|&(v, p)| v == vid && p == pid)
    }
}

pub const VALIDITY_DRIVER: DriverInfo = DriverInfo {
    id: DRIVER_ID,
    name: DRIVER_NAME,
    full_name: DRIVER_FULL_NAME,
    id_table: &[(VALIDITY_VENDOR_ID, VFS101_PRODUCT_ID)],
    scan_type: ScanType::Swipe,
    img_width: IMAGE_WIDTH,
    img_height: None,
};

/// Lifecycle state shared with the worker thread.
#[derive(Clone)]
struct StateCell {
    state: Arc<Mutex<DeviceState>>,
    observer: Arc<dyn DriverObserver>,
}

impl StateCell {
    fn new(observer: Arc<dyn DriverObserver>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::Closed)),
            observer,
        }
    }

    fn get(&self) -> DeviceState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set(&self, to: DeviceState) {
        let from = {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *guard, to)
        };
        if from != to {
            info!(from = %from, to = %to, "Device state");
            self.observer.on_event(&DriverEvent::StateChanged { from, to });
        }
    }
}

type Worker<T> = JoinHandle<Option<(Session<T>, Result<()>)>>;

/// Hand `session` to a freshly spawned worker. On failure the session
/// comes back with the reason.
fn launch<T: UsbTransport>(
    spawned: io::Result<Worker<T>>,
    handoff: &Sender<Session<T>>,
    session: Session<T>,
) -> std::result::Result<Worker<T>, (Session<T>, String)> {
    let handle = match spawned {
        Ok(handle) => handle,
        Err(e) => return Err((session, e.to_string())),
    };
    match handoff.send(session) {
        Ok(()) => Ok(handle),
        Err(SendError(session)) => {
            let _ = handle.join();
            Err((session, "worker exited before start".to_string()))
        }
    }
}

/// An open Validity sensor.
pub struct ValidityDevice<T: UsbTransport + 'static> {
    /// Present whenever no worker owns it.
    session: Option<Session<T>>,
    worker: Option<Worker<T>>,
    cancel: CancelToken,
    state: StateCell,
    requested: Option<ImageDeviceState>,
}

impl<T: UsbTransport + 'static> ValidityDevice<T> {
    /// Claim the sensor interface and start a session with sequence 0.
    #[instrument(
        level = "info",
        skip_all,
        fields(
            vid = %format!("{:04X}", transport.vendor_id()),
            pid = %format!("{:04X}", transport.product_id())
        )
    )]
    pub fn open(
        transport: T,
        config: SessionConfig,
        observer: Arc<dyn DriverObserver>,
    ) -> Result<Self> {
        transport
            .claim_interface(SENSOR_INTERFACE)
            .map_err(|source| DriverError::Claim {
                interface: SENSOR_INTERFACE,
                source,
            })?;

        let session = Session::new(transport, config, observer.clone());
        let device = Self {
            cancel: session.cancel_token(),
            session: Some(session),
            worker: None,
            state: StateCell::new(observer),
            requested: None,
        };
        device.state.set(DeviceState::Open);
        Ok(device)
    }

    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    /// Sequence counter, or `None` while the worker owns the session.
    pub fn sequence(&self) -> Option<u16> {
        self.session.as_ref().map(|s| s.sequence())
    }

    /// Image-device state of the last activation.
    pub fn requested_state(&self) -> Option<ImageDeviceState> {
        self.requested
    }

    pub fn info(&self) -> &'static DriverInfo {
        &VALIDITY_DRIVER
    }

    /// Start the init chain on a worker thread.
    ///
    /// `on_complete` runs on the worker once init finishes. Only if it
    /// succeeded does the worker go on to poll for fingers and run the
    /// capture loop after each detection.
    #[instrument(level = "info", skip(self, on_complete))]
    pub fn activate<F>(&mut self, requested: ImageDeviceState, on_complete: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        // A worker that stopped by itself still holds the session. Once it
        // has published Deactivated it is about to return, so join it too.
        if self.worker.as_ref().is_some_and(|w| w.is_finished())
            || (self.worker.is_some() && self.state() == DeviceState::Deactivated)
        {
            let result = self.join_worker()?;
            if let Err(e) = result {
                warn!(error = %e, "Previous activation ended with an error");
            }
        }

        let current = self.state();
        if !matches!(current, DeviceState::Open | DeviceState::Deactivated) {
            return Err(DriverError::invalid_state(format!(
                "cannot activate from {}",
                current
            )));
        }
        let Some(session) = self.session.take() else {
            return Err(DriverError::invalid_state("session is not available"));
        };

        self.requested = Some(requested);
        self.cancel.reset();
        self.state.set(DeviceState::Activated);

        // The session is handed over only once the thread exists, so a failed
        // spawn leaves it with the caller.
        let (handoff, inbox) = mpsc::channel::<Session<T>>();
        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name("validity-capture".into())
            .spawn(move || {
                let mut session = inbox.recv().ok()?;
                let result = run_worker(&mut session, &state, on_complete);
                state.set(DeviceState::Deactivated);
                Some((session, result))
            });

        match launch(spawned, &handoff, session) {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err((session, reason)) => {
                error!(error = %reason, "Could not start capture worker");
                self.session = Some(session);
                self.state.set(current);
                Err(DriverError::invalid_state(format!(
                    "could not start capture worker: {}",
                    reason
                )))
            }
        }
    }

    /// Cancel the worker, wait for it, and take the session back.
    ///
    /// `on_complete` receives the capture loop's final result; a loop
    /// stopped by this call counts as success.
    #[instrument(level = "info", skip(self, on_complete))]
    pub fn deactivate<F>(&mut self, on_complete: F) -> Result<()>
    where
        F: FnOnce(Result<()>),
    {
        if self.worker.is_none() {
            return Err(DriverError::invalid_state(format!(
                "cannot deactivate from {}",
                self.state()
            )));
        }

        self.cancel.cancel();
        let result = self.join_worker()?;

        if let Some(session) = &self.session {
            session.emit(DriverEvent::DeactivateComplete);
        }
        on_complete(result);
        Ok(())
    }

    /// Deactivate if needed, release the interface and drop the session.
    #[instrument(level = "info", skip(self))]
    pub fn close(mut self) -> Result<()> {
        if self.worker.is_some() {
            self.deactivate(|result| {
                if let Err(e) = result {
                    warn!(error = %e, "Capture loop ended with an error");
                }
            })?;
        }

        if let Some(session) = self.session.take() {
            session.transport().release_interface(SENSOR_INTERFACE);
        }
        self.state.set(DeviceState::Closed);
        Ok(())
    }

    fn join_worker(&mut self) -> Result<Result<()>> {
        let Some(handle) = self.worker.take() else {
            return Ok(Ok(()));
        };

        match handle.join() {
            Ok(Some((session, result))) => {
                session.cancel_token().reset();
                self.session = Some(session);
                self.state.set(DeviceState::Deactivated);
                Ok(result)
            }
            Ok(None) => {
                self.state.set(DeviceState::Closed);
                Err(DriverError::invalid_state("capture worker never received the session"))
            }
            Err(_) => {
                error!("Capture worker panicked");
                self.state.set(DeviceState::Closed);
                Err(DriverError::WorkerPanicked)
            }
        }
    }
}

impl<T: UsbTransport + 'static> Drop for ValidityDevice<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

/// Body of the capture worker. Returns the capture loop's final result.
fn run_worker<T, F>(session: &mut Session<T>, state: &StateCell, on_activated: F) -> Result<()>
where
    T: UsbTransport,
    F: FnOnce(Result<()>),
{
    let init = init_machine().run(session);
    session.emit(DriverEvent::ActivateComplete {
        error: init.as_ref().err().map(|e| e.to_string()),
    });

    let activated = init.is_ok();
    on_activated(init);
    if !activated {
        return Ok(());
    }

    capture_loop(session, state)
}

fn capture_loop<T: UsbTransport>(session: &mut Session<T>, state: &StateCell) -> Result<()> {
    let mut iteration: u64 = 0;

    loop {
        if let Some(max) = session.config().max_captures
            && iteration >= max
        {
            info!(captures = iteration, "Capture limit reached");
            return Ok(());
        }

        state.set(DeviceState::Activated);
        match wait_for_finger(session) {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => {
                session.emit(DriverEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        }

        iteration += 1;
        state.set(DeviceState::Capturing);
        session.emit(DriverEvent::LoopStarted { iteration });

        let result = capture_machine(iteration).run(session);
        session.emit(DriverEvent::LoopCompleted {
            iteration,
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        match result {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => {
                error!(iteration, error = %e, "Capture loop failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::events::RecordingObserver;
    use crate::frame::RawFrame;
    use crate::state::Phase;
    use crate::transport::{MockFault, MockTransport};

    /// Records everything and forwards events to the test thread.
    struct Forwarding {
        record: RecordingObserver,
        tx: Mutex<Sender<DriverEvent>>,
    }

    impl Forwarding {
        fn new() -> (Arc<Self>, Receiver<DriverEvent>) {
            let (tx, rx) = mpsc::channel();
            let observer = Arc::new(Self {
                record: RecordingObserver::new(),
                tx: Mutex::new(tx),
            });
            (observer, rx)
        }
    }

    impl DriverObserver for Forwarding {
        fn on_event(&self, event: &DriverEvent) {
            self.record.on_event(event);
            if let Ok(tx) = self.tx.lock() {
                let _ = tx.send(event.clone());
            }
        }

        fn on_frame(&self, frame: &RawFrame) {
            self.record.on_frame(frame);
        }
    }

    fn wait_for(rx: &Receiver<DriverEvent>, pred: impl Fn(&DriverEvent) -> bool) {
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("timed out waiting for event");
            if pred(&event) {
                return;
            }
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            roundtrip_delay_ms: 0,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn open(
        mock: &MockTransport,
        config: SessionConfig,
    ) -> (
        ValidityDevice<MockTransport>,
        Arc<Forwarding>,
        Receiver<DriverEvent>,
    ) {
        let (observer, rx) = Forwarding::new();
        let device = ValidityDevice::open(mock.clone(), config, observer.clone()).unwrap();
        (device, observer, rx)
    }

    fn activation_channel() -> (impl FnOnce(Result<()>) + Send + 'static, Receiver<Result<()>>) {
        let (tx, rx) = mpsc::channel();
        (move |r| tx.send(r).unwrap(), rx)
    }

    fn position(events: &[DriverEvent], pred: impl Fn(&DriverEvent) -> bool) -> Option<usize> {
        events.iter().position(pred)
    }

    #[test]
    fn test_open_claims_interface() {
        let mock = MockTransport::new();
        let (device, _, _) = open(&mock, config());

        assert_eq!(device.state(), DeviceState::Open);
        assert_eq!(device.sequence(), Some(0));
        assert_eq!(mock.claimed_interface(), Some(SENSOR_INTERFACE));

        device.close().unwrap();
        assert_eq!(mock.claimed_interface(), None);
    }

    #[test]
    fn test_claim_failure() {
        let mock = MockTransport::new();
        mock.fail_claim();

        let result = ValidityDevice::open(mock.clone(), config(), Arc::new(RecordingObserver::new()));
        assert!(matches!(
            result,
            Err(DriverError::Claim {
                interface: SENSOR_INTERFACE,
                ..
            })
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_activation_runs_init_then_polls() {
        let mock = MockTransport::new();
        let (mut device, observer, rx) = open(&mock, config());
        let (callback, activated) = activation_channel();

        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        assert!(activated.recv_timeout(Duration::from_secs(10)).unwrap().is_ok());
        wait_for(&rx, |e| matches!(e, DriverEvent::PollQuery { .. }));

        let mut deactivated = None;
        device.deactivate(|r| deactivated = Some(r)).unwrap();
        assert!(deactivated.unwrap().is_ok());
        assert_eq!(device.state(), DeviceState::Deactivated);
        assert_eq!(device.requested_state(), Some(ImageDeviceState::AwaitFingerOn));

        assert_eq!(
            observer.record.phases(),
            vec![
                Phase::Handshake,
                Phase::FlushReconfigure,
                Phase::SmallImageRead,
                Phase::GetParam,
                Phase::FlushReconfigure,
                Phase::PrintRequest,
            ]
        );

        let events = observer.record.events();
        let activated_at = position(&events, |e| {
            matches!(e, DriverEvent::ActivateComplete { error: None })
        })
        .unwrap();
        let first_poll =
            position(&events, |e| matches!(e, DriverEvent::PollQuery { .. })).unwrap();
        assert!(activated_at < first_poll);
        assert!(device.sequence().is_some());
    }

    #[test]
    fn test_first_poll_within_one_interval() {
        let mock = MockTransport::new();
        let interval = Duration::from_millis(200);
        let (mut device, _observer, rx) = open(
            &mock,
            SessionConfig {
                poll_interval_ms: 200,
                ..config()
            },
        );
        let (callback, _activated) = activation_channel();

        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        wait_for(&rx, |e| matches!(e, DriverEvent::ActivateComplete { error: None }));
        let activated_at = Instant::now();
        wait_for(&rx, |e| matches!(e, DriverEvent::PollQuery { .. }));
        assert!(activated_at.elapsed() < interval);

        device.deactivate(|_| {}).unwrap();
    }

    #[test]
    fn test_reactivate_once_worker_reports_deactivated() {
        let mock = MockTransport::new();
        mock.fail_on_opcode(OP_RESET, 1, MockFault::Error);
        let (mut device, _observer, rx) = open(&mock, config());
        let (callback, _activated) = activation_channel();

        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        wait_for(&rx, |e| {
            matches!(
                e,
                DriverEvent::StateChanged {
                    to: DeviceState::Deactivated,
                    ..
                }
            )
        });

        // The worker may not have returned yet.
        let (callback, activated) = activation_channel();
        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        assert!(activated.recv_timeout(Duration::from_secs(10)).unwrap().is_ok());
        device.deactivate(|_| {}).unwrap();
        assert_eq!(mock.count_opcode(OP_RESET), 1);
    }

    #[test]
    fn test_failed_launch_returns_session() {
        let mock = MockTransport::new();
        mock.claim_interface(SENSOR_INTERFACE).unwrap();
        let session = Session::new(mock.clone(), config(), Arc::new(RecordingObserver::new()));
        let (handoff, _inbox) = mpsc::channel();

        let spawned: io::Result<Worker<MockTransport>> =
            Err(io::Error::other("no more threads"));
        let (session, reason) = launch(spawned, &handoff, session).unwrap_err();

        assert_eq!(reason, "no more threads");
        assert_eq!(session.sequence(), 0);
        session.transport().release_interface(SENSOR_INTERFACE);
        assert_eq!(mock.claimed_interface(), None);
    }

    #[test]
    fn test_activation_failure_skips_polling() {
        let mock = MockTransport::new();
        mock.fail_on_opcode(OP_ABORT_PRINT, 1, MockFault::Error);
        let (mut device, observer, _rx) = open(&mock, config());
        let (callback, activated) = activation_channel();

        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        let err = activated.recv_timeout(Duration::from_secs(10)).unwrap().unwrap_err();
        assert!(matches!(err, DriverError::Transfer { endpoint: EP_CMD_OUT, .. }));

        let mut deactivated = None;
        device.deactivate(|r| deactivated = Some(r)).unwrap();
        assert!(deactivated.unwrap().is_ok());

        assert_eq!(
            observer.record.phases(),
            vec![Phase::Handshake, Phase::FlushReconfigure]
        );
        assert_eq!(mock.count_opcode(OP_GET_FINGER_STATE), 0);
        assert_eq!(mock.count_opcode(OP_GET_PRINT), 0);
    }

    #[test]
    fn test_loop_starts_after_fifty_absent_polls() {
        let mock = MockTransport::new();
        mock.script_finger_states(std::iter::repeat_n(false, 50).chain([true]));
        let (mut device, observer, rx) = open(&mock, config());
        let (callback, _activated) = activation_channel();

        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        wait_for(&rx, |e| matches!(e, DriverEvent::LoopStarted { .. }));
        device.deactivate(|_| {}).unwrap();

        let events = observer.record.events();
        let polls: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, DriverEvent::PollQuery { .. }))
            .map(|(i, _)| i)
            .collect();
        let loops: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, DriverEvent::LoopStarted { .. }))
            .map(|(i, _)| i)
            .collect();

        assert!(polls.len() >= 51);
        assert!(!loops.is_empty());
        // Exactly 51 queries precede the first loop, the last one positive.
        let before_loop: Vec<&DriverEvent> =
            polls.iter().filter(|&&i| i < loops[0]).map(|&i| &events[i]).collect();
        assert_eq!(before_loop.len(), 51);
        assert!(matches!(
            before_loop[50],
            DriverEvent::PollQuery {
                count: 51,
                present: true
            }
        ));
    }

    #[test]
    fn test_capture_limit_stops_worker() {
        let mock = MockTransport::new();
        mock.script_finger_states([true, true]);
        let (mut device, observer, rx) = open(
            &mock,
            SessionConfig {
                max_captures: Some(2),
                ..config()
            },
        );
        let (callback, _activated) = activation_channel();

        device.activate(ImageDeviceState::Capture, callback).unwrap();
        wait_for(&rx, |e| {
            matches!(
                e,
                DriverEvent::StateChanged {
                    to: DeviceState::Deactivated,
                    ..
                }
            )
        });

        let mut deactivated = None;
        device.deactivate(|r| deactivated = Some(r)).unwrap();
        assert!(deactivated.unwrap().is_ok());

        let completed: Vec<(u64, bool)> = observer
            .record
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::LoopCompleted { iteration, error } => Some((iteration, error.is_none())),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![(1, true), (2, true)]);
        // Init's small read, then three frames per loop.
        assert_eq!(observer.record.frames().len(), 1 + 2 * 3);
    }

    #[test]
    fn test_loop_failure_reaches_deactivate() {
        let mock = MockTransport::new();
        mock.script_finger_states([true]);
        mock.fail_on_opcode(OP_GET_CONFIGURATION, 1, MockFault::Error);
        let (mut device, observer, rx) = open(&mock, config());
        let (callback, _activated) = activation_channel();

        device.activate(ImageDeviceState::Capture, callback).unwrap();
        wait_for(&rx, |e| matches!(e, DriverEvent::LoopCompleted { .. }));

        let mut deactivated = None;
        device.deactivate(|r| deactivated = Some(r)).unwrap();
        let err = deactivated.unwrap().unwrap_err();
        assert!(matches!(err, DriverError::Transfer { endpoint: EP_CMD_OUT, .. }));

        assert!(observer.record.events().iter().any(|e| matches!(
            e,
            DriverEvent::LoopCompleted {
                iteration: 1,
                error: Some(_)
            }
        )));
    }

    #[test]
    fn test_reactivate_after_deactivate() {
        let mock = MockTransport::new();
        let (mut device, _observer, rx) = open(&mock, config());

        for _ in 0..2 {
            let (callback, activated) = activation_channel();
            device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
            assert!(activated.recv_timeout(Duration::from_secs(10)).unwrap().is_ok());
            wait_for(&rx, |e| matches!(e, DriverEvent::PollQuery { .. }));
            device.deactivate(|r| assert!(r.is_ok())).unwrap();
        }

        assert_eq!(mock.count_opcode(OP_RESET), 2);
        device.close().unwrap();
        assert_eq!(mock.claimed_interface(), None);
    }

    #[test]
    fn test_invalid_transitions() {
        let mock = MockTransport::new();
        let (mut device, _observer, _rx) = open(&mock, config());

        assert!(matches!(
            device.deactivate(|_| {}),
            Err(DriverError::InvalidState(_))
        ));

        let (callback, _activated) = activation_channel();
        device.activate(ImageDeviceState::AwaitFingerOn, callback).unwrap();
        let (again, _) = activation_channel();
        assert!(matches!(
            device.activate(ImageDeviceState::AwaitFingerOn, again),
            Err(DriverError::InvalidState(_))
        ));
        assert_eq!(device.sequence(), None);

        // Closing an active device deactivates it first.
        device.close().unwrap();
        assert_eq!(mock.claimed_interface(), None);
    }

    #[test]
    fn test_driver_info() {
        assert!(VALIDITY_DRIVER.matches(0x138A, 0x0001));
        assert!(!VALIDITY_DRIVER.matches(0x138A, 0x0002));
        assert_eq!(VALIDITY_DRIVER.id, 10);
        assert_eq!(VALIDITY_DRIVER.scan_type, ScanType::Swipe);
        assert_eq!(VALIDITY_DRIVER.img_width, 128);
        assert_eq!(VALIDITY_DRIVER.img_height, None);
    }
}
