//! Command vocabulary.
//!
//! One call per device operation. Each builds its fixed-layout buffer and
//! round-trips it on the command endpoint. Responses are not validated here.

use tracing::debug;

use crate::error::Result;
use crate::protocol::constants::EP_CMD_OUT;
use crate::protocol::{Command, FingerStatus};
use crate::session::Session;
use crate::transport::UsbTransport;

impl<T: UsbTransport> Session<T> {
    /// Issue `cmd` and discard the response.
    pub fn command(&mut self, cmd: Command) -> Result<()> {
        debug!(cmd = %cmd, seq = self.sequence(), "Command");
        let mut buf = cmd.encode();
        self.roundtrip(EP_CMD_OUT, &mut buf)
    }

    /// Issue `cmd` and return the raw response.
    pub fn query(&mut self, cmd: Command) -> Result<Vec<u8>> {
        debug!(cmd = %cmd, seq = self.sequence(), "Query");
        let mut buf = cmd.encode();
        self.exchange(EP_CMD_OUT, &mut buf)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.command(Command::Reset)
    }

    pub fn get_version(&mut self) -> Result<()> {
        self.command(Command::GetVersion)
    }

    pub fn get_param(&mut self, param: u16) -> Result<()> {
        self.command(Command::GetParam(param))
    }

    pub fn set_param(&mut self, param: u16, value: u16) -> Result<()> {
        self.command(Command::SetParam(param, value))
    }

    pub fn get_configuration(&mut self) -> Result<()> {
        self.command(Command::GetConfiguration)
    }

    pub fn abort_print(&mut self) -> Result<()> {
        self.command(Command::AbortPrint)
    }

    pub fn get_finger_state(&mut self) -> Result<FingerStatus> {
        let response = self.query(Command::GetFingerState)?;
        Ok(FingerStatus::from_bytes(&response))
    }

    pub fn get_print(&mut self) -> Result<()> {
        self.command(Command::GetPrint)
    }
}
