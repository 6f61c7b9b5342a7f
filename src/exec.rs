//! Remote command execution
//!
//! Runs one command on a session channel of a cached transport and
//! collects stdout and stderr into a single combined output, in arrival
//! order.

use chrono::{DateTime, SecondsFormat, Utc};
use md5::{Digest, Md5};
use russh::ChannelMsg;
use tracing::{debug, info};

use crate::ssh::{SshError, TransportHandle};

/// Exit code reported when the remote process died from a signal
pub const SIGNAL_EXIT_CODE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: i64,
}

impl CommandOutput {
    /// Turn a non-zero exit into `SshError::CommandFailed` when requested
    pub fn check(self, fail_if_nonzero: bool) -> Result<Self, SshError> {
        if fail_if_nonzero && self.exit_code != 0 {
            return Err(SshError::CommandFailed {
                exit_code: self.exit_code,
                output: self.output,
            });
        }
        Ok(self)
    }
}

#[derive(Default)]
struct OutputCollector {
    combined: Vec<u8>,
    exit_code: Option<i64>,
}

impl OutputCollector {
    fn data(&mut self, data: &[u8]) {
        self.combined.extend_from_slice(data);
    }

    fn exit_status(&mut self, status: u32) {
        self.exit_code = Some(i64::from(status));
    }

    fn exit_signal(&mut self) {
        self.exit_code = Some(SIGNAL_EXIT_CODE);
    }

    fn finish(self) -> Result<CommandOutput, SshError> {
        let output = String::from_utf8_lossy(&self.combined).to_string();
        match self.exit_code {
            Some(exit_code) => Ok(CommandOutput { output, exit_code }),
            None => Err(SshError::SessionError(format!(
                "command exited without reporting a status\nOutput: {}",
                output
            ))),
        }
    }
}

/// Run `command` and wait for it to exit
pub async fn run_command(
    transport: &TransportHandle,
    command: &str,
    fail_if_nonzero: bool,
) -> Result<CommandOutput, SshError> {
    let mut channel = transport
        .open_session()
        .await
        .map_err(|e| SshError::SessionError(format!("Failed to create session: {}", e)))?;

    info!("Executing command on {}", transport.remote_endpoint());
    debug!("exec: {}", command);

    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::SessionError(format!("Failed to execute command: {}", e)))?;

    let mut collector = OutputCollector::default();
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => collector.data(&data),
            // ext=1 is stderr
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => collector.data(&data),
            Some(ChannelMsg::ExitStatus { exit_status }) => collector.exit_status(exit_status),
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                debug!("Remote command killed by signal {:?}", signal_name);
                collector.exit_signal();
            }
            // Exit status may still follow EOF
            Some(ChannelMsg::Eof) => {}
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }
    let _ = channel.close().await;

    let result = collector.finish()?;
    debug!(
        "exec completed: exit={} output_len={}",
        result.exit_code,
        result.output.len()
    );
    result.check(fail_if_nonzero)
}

/// Stable identifier for one execution of `command` at `timestamp`
pub fn exec_id(command: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Md5::new();
    hasher.update(command.as_bytes());
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_check_nonzero() {
        let out = CommandOutput {
            output: "boom".into(),
            exit_code: 2,
        };
        assert_eq!(out.clone().check(false).unwrap().exit_code, 2);

        match out.check(true) {
            Err(SshError::CommandFailed { exit_code, output }) => {
                assert_eq!(exit_code, 2);
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_exit_passes_check() {
        let out = CommandOutput {
            output: String::new(),
            exit_code: 0,
        };
        assert!(out.check(true).is_ok());
    }

    #[test]
    fn test_collector_combines_streams() {
        let mut collector = OutputCollector::default();
        collector.data(b"out1\n");
        collector.data(b"err1\n");
        collector.data(b"out2\n");
        collector.exit_status(0);

        let result = collector.finish().unwrap();
        assert_eq!(result.output, "out1\nerr1\nout2\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_collector_signal_is_minus_one() {
        let mut collector = OutputCollector::default();
        collector.exit_signal();
        assert_eq!(collector.finish().unwrap().exit_code, SIGNAL_EXIT_CODE);
    }

    #[test]
    fn test_collector_missing_status_is_error() {
        let mut collector = OutputCollector::default();
        collector.data(b"partial");
        assert!(matches!(collector.finish(), Err(SshError::SessionError(_))));
    }

    #[test]
    fn test_exec_id() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let id = exec_id("uptime", ts);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, exec_id("uptime", ts));
        assert_ne!(id, exec_id("uptime ", ts));

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 6).unwrap();
        assert_ne!(id, exec_id("uptime", later));
    }

    #[test]
    fn test_exec_id_matches_md5_of_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut hasher = Md5::new();
        hasher.update(b"uptime2024-01-02T03:04:05Z");
        let expected: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(exec_id("uptime", ts), expected);
    }
}
