//! Mock USB transport for testing.
//!
//! Behaves like a cooperative sensor: command responses are one line long
//! and echo the sequence number and opcode of the last command, image reads
//! return full-length zeroed buffers. Queued replies, scripted finger states and injected
//! faults override that default.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::*;

/// A reply queued for a read on one endpoint.
#[derive(Debug, Clone)]
pub enum MockReply {
    Data(Vec<u8>),
    Timeout,
    Stall,
}

/// A fault injected into a command write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// The write fails outright.
    Error,
    /// Only this many bytes are written.
    Short(usize),
    /// The endpoint stalls.
    Stall,
}

#[derive(Debug, Clone, Copy)]
struct FaultRule {
    opcode: u8,
    occurrence: usize,
    fault: MockFault,
}

/// Captured bulk read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub endpoint: u8,
    pub requested: usize,
    pub returned: usize,
}

/// Mock transport for unit testing state machine logic.
///
/// Clones share state, so a test can keep one handle while the session
/// owns another.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued replies per IN endpoint.
    replies: Arc<Mutex<HashMap<u8, VecDeque<MockReply>>>>,
    /// Scripted finger states, consumed one per finger-state query.
    finger_script: Arc<Mutex<VecDeque<bool>>>,
    /// Captured writes (endpoint, bytes).
    write_log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    /// Captured reads.
    read_log: Arc<Mutex<Vec<ReadRecord>>>,
    /// Last command written, echoed in auto replies.
    last_command: Arc<Mutex<Option<Vec<u8>>>>,
    /// Present flag to answer the last finger-state query with.
    pending_finger: Arc<Mutex<Option<bool>>>,
    faults: Arc<Mutex<Vec<FaultRule>>>,
    opcode_counts: Arc<Mutex<HashMap<u8, usize>>>,
    claimed: Arc<Mutex<Option<u8>>>,
    claim_fails: Arc<Mutex<bool>>,
    auto_reply: Arc<Mutex<bool>>,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(HashMap::new())),
            finger_script: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            read_log: Arc::new(Mutex::new(Vec::new())),
            last_command: Arc::new(Mutex::new(None)),
            pending_finger: Arc::new(Mutex::new(None)),
            faults: Arc::new(Mutex::new(Vec::new())),
            opcode_counts: Arc::new(Mutex::new(HashMap::new())),
            claimed: Arc::new(Mutex::new(None)),
            claim_fails: Arc::new(Mutex::new(false)),
            auto_reply: Arc::new(Mutex::new(true)),
            connected: Arc::new(Mutex::new(true)),
            vid: VALIDITY_VENDOR_ID,
            pid: VFS101_PRODUCT_ID,
        }
    }

    /// Queue a reply to be returned by the next read on `endpoint`.
    pub fn queue_reply(&self, endpoint: u8, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// Queue raw response bytes on the command IN endpoint.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.queue_reply(EP_CMD_IN, MockReply::Data(bytes.to_vec()));
    }

    /// Script the answers to successive finger-state queries.
    /// Once exhausted, the finger is reported absent.
    pub fn script_finger_states(&self, states: impl IntoIterator<Item = bool>) {
        self.finger_script.lock().unwrap().extend(states);
    }

    /// Fail the `occurrence`-th (1-based) write of `opcode`.
    pub fn fail_on_opcode(&self, opcode: u8, occurrence: usize, fault: MockFault) {
        self.faults.lock().unwrap().push(FaultRule {
            opcode,
            occurrence,
            fault,
        });
    }

    /// Make `claim_interface` fail.
    pub fn fail_claim(&self) {
        *self.claim_fails.lock().unwrap() = true;
    }

    /// With auto reply off, reads on an empty queue time out.
    pub fn set_auto_reply(&self, enabled: bool) {
        *self.auto_reply.lock().unwrap() = enabled;
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Get captured writes with their endpoints.
    pub fn get_endpoint_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Get all captured reads.
    pub fn get_reads(&self) -> Vec<ReadRecord> {
        self.read_log.lock().unwrap().clone()
    }

    /// Number of writes carrying `opcode`.
    pub fn count_opcode(&self, opcode: u8) -> usize {
        self.write_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, data)| data.get(2) == Some(&opcode))
            .count()
    }

    /// Clear captured writes and reads.
    pub fn clear_logs(&self) {
        self.write_log.lock().unwrap().clear();
        self.read_log.lock().unwrap().clear();
    }

    /// Currently claimed interface.
    pub fn claimed_interface(&self) -> Option<u8> {
        *self.claimed.lock().unwrap()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn take_fault(&self, opcode: u8) -> Option<MockFault> {
        let count = {
            let mut counts = self.opcode_counts.lock().unwrap();
            let count = counts.entry(opcode).or_insert(0);
            *count += 1;
            *count
        };
        self.faults
            .lock()
            .unwrap()
            .iter()
            .find(|rule| rule.opcode == opcode && rule.occurrence == count)
            .map(|rule| rule.fault)
    }

    fn auto_reply_for(&self, endpoint: u8, max_len: usize) -> Vec<u8> {
        if endpoint != EP_CMD_IN {
            return vec![0u8; max_len];
        }

        let len = LINE_LEN.min(max_len);
        let mut data = vec![0u8; len];
        if let Some(cmd) = self.last_command.lock().unwrap().as_ref() {
            let n = cmd.len().min(COMMAND_HEADER_LEN).min(len);
            data[..n].copy_from_slice(&cmd[..n]);
        }
        if let Some(present) = self.pending_finger.lock().unwrap().take()
            && len > FINGER_STATE_OFFSET
        {
            data[FINGER_STATE_OFFSET] = present as u8;
        }
        data
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        if *self.claim_fails.lock().unwrap() {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "Resource busy".into(),
            });
        }
        *self.claimed.lock().unwrap() = Some(interface);
        Ok(())
    }

    fn release_interface(&self, interface: u8) {
        let mut claimed = self.claimed.lock().unwrap();
        if *claimed == Some(interface) {
            *claimed = None;
        }
    }

    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }

        let opcode = data.get(2).copied().unwrap_or(0);
        let written = match self.take_fault(opcode) {
            Some(MockFault::Error) => {
                return Err(TransportError::WriteFailed("injected fault".into()));
            }
            Some(MockFault::Stall) => return Err(TransportError::Stall { endpoint }),
            Some(MockFault::Short(n)) => n.min(data.len()),
            None => data.len(),
        };

        self.write_log
            .lock()
            .unwrap()
            .push((endpoint, data.to_vec()));
        *self.last_command.lock().unwrap() = Some(data.to_vec());
        if opcode == OP_GET_FINGER_STATE {
            let present = self.finger_script.lock().unwrap().pop_front().unwrap_or(false);
            *self.pending_finger.lock().unwrap() = Some(present);
        }
        Ok(written)
    }

    fn bulk_read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }

        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(|q| q.pop_front());

        let result = match queued {
            Some(MockReply::Data(mut bytes)) => {
                bytes.truncate(max_len);
                Ok(bytes)
            }
            Some(MockReply::Timeout) => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Some(MockReply::Stall) => Err(TransportError::Stall { endpoint }),
            None if *self.auto_reply.lock().unwrap() => Ok(self.auto_reply_for(endpoint, max_len)),
            None => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        self.read_log.lock().unwrap().push(ReadRecord {
            endpoint,
            requested: max_len,
            returned: result.as_ref().map(|b| b.len()).unwrap_or(0),
        });
        result
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
