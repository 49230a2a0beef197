use std::io;

use thiserror::Error;

pub type LoopResult<T> = std::result::Result<T, LoopError>;

#[derive(Error, Debug)]
pub enum LoopError {
    /// The target device node could not be opened.
    #[error("Failed to open device {device}: {source}")]
    Device { device: String, source: io::Error },

    /// A status ioctl on an opened device failed.
    #[error("Failed to {op} status of the device {device}: {errno}")]
    Operation {
        device: String,
        op: &'static str,
        errno: nix::errno::Errno,
    },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("UTF-8 decode error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}
