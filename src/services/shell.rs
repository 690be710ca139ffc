use crate::services::transport::TransportError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from running a command on the device
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Ssh connection timed out")]
    Timeout,

    #[error("Ssh connection failed: {0}")]
    Connect(String),

    #[error("Ssh session closed: {0}")]
    Disconnected(String),

    #[error("Ssh authentication rejected for user {0}")]
    Auth(String),

    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: u32,
        stderr: String,
    },

    #[error("`{0}` did not report an exit status")]
    NoExitStatus(String),
}

impl ShellError {
    /// The device could not be reached or dropped the session
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_) | Self::Disconnected(_))
    }
}

impl From<ShellError> for TransportError {
    fn from(err: ShellError) -> Self {
        if err.is_connectivity() {
            TransportError::Unreachable(err.to_string())
        } else {
            TransportError::Command(err.to_string())
        }
    }
}

/// A command line on the device.
///
/// Implementations return stdout of a command that exited with status 0 and
/// turn any other exit status into [`ShellError::Command`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str) -> Result<String, ShellError>;

    /// Run `command` with `input` written to its stdin
    async fn exec_with_input(&self, command: &str, input: &[u8]) -> Result<String, ShellError>;

    /// Close the session, if one is open
    async fn disconnect(&self) -> Result<(), ShellError>;
}

/// Quote `arg` for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+' | ','));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(".lv2/dm-LFO.lv2"), ".lv2/dm-LFO.lv2");
        assert_eq!(shell_quote("my plugin.lv2"), "'my plugin.lv2'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_error_classification() {
        assert!(TransportError::from(ShellError::Timeout).is_unreachable());
        assert!(TransportError::from(ShellError::Disconnected("eof".into())).is_unreachable());
        assert!(!TransportError::from(ShellError::Auth("root".into())).is_unreachable());

        let failed = ShellError::Command {
            command: "ls .lv2".into(),
            status: 2,
            stderr: "No such file or directory".into(),
        };
        assert!(matches!(TransportError::from(failed), TransportError::Command(_)));
    }
}
