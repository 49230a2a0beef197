//! Linux HAL implementation using real system calls.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use wait_timeout::ChildExt;

use super::{ProcessOps, ProgressOps, StatusOps};
use crate::error::{LoopError, LoopResult};
use crate::status::{self, LoopInfo64};

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

static NEXT_PROGRESS_ID: AtomicU64 = AtomicU64::new(1);

fn map_command_err(program: &str, err: std::io::Error) -> LoopError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return LoopError::CommandNotFound(program.to_string());
    }
    LoopError::Io(err)
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> LoopResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(LoopError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(LoopError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

impl ProcessOps for LinuxHal {
    fn command_output(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> LoopResult<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        output_with_timeout(program, &mut cmd, timeout)
    }
}

impl StatusOps for LinuxHal {
    fn loop_status(&self, device: &str) -> LoopResult<LoopInfo64> {
        let file = status::open_device(device)?;
        status::get_status(&file, device)
    }

    fn update_loop_status(
        &self,
        device: &str,
        mutate: &mut dyn FnMut(&mut LoopInfo64),
    ) -> LoopResult<()> {
        let file = status::open_device(device)?;
        let mut info = status::get_status(&file, device)?;
        mutate(&mut info);
        status::set_status(&file, device, &info)
    }
}

impl ProgressOps for LinuxHal {
    fn report_started(&self, msg: &str) -> u64 {
        let id = NEXT_PROGRESS_ID.fetch_add(1, Ordering::Relaxed);
        log::info!("[{id}] started: {msg}");
        id
    }

    fn report_finished(&self, id: u64, msg: &str) {
        log::info!("[{id}] finished: {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn command_output_captures_stdout() {
        let hal = LinuxHal::new();
        let output = hal
            .command_output("sh", &["-c", "echo hello"], TEST_TIMEOUT)
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn missing_program_is_command_not_found() {
        let hal = LinuxHal::new();
        let err = hal
            .command_output("definitely-not-a-real-program", &[], TEST_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, LoopError::CommandNotFound(_)));
    }

    #[test]
    fn failing_command_surfaces_stderr() {
        let hal = LinuxHal::new();
        let err = hal
            .command_status("sh", &["-c", "echo nope >&2; exit 3"], TEST_TIMEOUT)
            .unwrap_err();
        match err {
            LoopError::CommandFailed {
                program,
                code,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loop_status_on_missing_device_is_device_error() {
        let hal = LinuxHal::new();
        let err = hal.loop_status("/dev/loop-does-not-exist").unwrap_err();
        assert!(matches!(err, LoopError::Device { .. }));
    }

    #[test]
    fn progress_ids_are_unique() {
        let hal = LinuxHal::new();
        let a = hal.report_started("one");
        let b = hal.report_started("two");
        assert_ne!(a, b);
        hal.report_finished(a, "Completed");
        hal.report_finished(b, "Completed");
    }
}
