//! Process execution helpers.
//!
//! External commands are considered "world-touching" and must go through the
//! HAL so workflows can be tested without spawning real processes.

use std::process::Output;
use std::time::Duration;

use crate::error::{LoopError, LoopResult};

/// Process execution trait (external command runner).
pub trait ProcessOps {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration)
        -> LoopResult<Output>;

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> LoopResult<()> {
        let output = self.command_output(program, args, timeout)?;
        if !output.status.success() {
            return Err(output_failed(program, &output));
        }
        Ok(())
    }
}

/// Classifies a non-zero exit as a command failure carrying the captured
/// diagnostics.
pub(crate) fn output_failed(program: &str, output: &Output) -> LoopError {
    LoopError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
