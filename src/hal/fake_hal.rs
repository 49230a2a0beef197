//! Fake HAL implementation for testing.
//!
//! Records every collaborator call without touching the system, and keeps
//! just enough simulated kernel state (attached devices, status records,
//! an optional sysfs tree) for workflow tests to run without root.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ProcessOps, ProgressOps, StatusOps};
use crate::error::{LoopError, LoopResult};
use crate::status::{LoopInfo64, LO_FLAGS_PARTSCAN, LO_FLAGS_READ_ONLY};
use crate::sysfs;

/// Operation records for testing and verification.
#[derive(Debug, Clone)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        timeout_secs: u64,
    },
    StatusRead {
        device: String,
    },
    StatusUpdate {
        device: String,
    },
    ProgressStarted {
        id: u64,
        msg: String,
    },
    ProgressFinished {
        id: u64,
        msg: String,
    },
}

/// Shared state for FakeHal operations.
#[derive(Debug, Default)]
struct FakeHalState {
    /// All operations that were recorded.
    operations: Vec<Operation>,
    /// Attached devices: short name -> backing file.
    attached: BTreeMap<String, String>,
    /// Status records: device path -> loop_info64.
    status: BTreeMap<String, LoopInfo64>,
    next_progress_id: u64,
}

/// Fake HAL implementation that records operations without executing them.
///
/// `losetup` invocations are interpreted against the simulated attachment
/// table, so attach-then-detach flows behave like the real tool: attaching
/// picks the first free `loopN`, detaching an unattached device fails.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
    sysfs_root: Option<PathBuf>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake that materializes `loopN/loop/backing_file` entries under
    /// `root` on attach and removes them on detach, for tests that resolve
    /// names through the sysfs scanners.
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHalState::default())),
            sysfs_root: Some(root.into()),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state.lock().unwrap().operations.iter().any(check)
    }

    /// Clear all recorded operations and simulated state.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.operations.clear();
        state.attached.clear();
        state.status.clear();
    }

    /// Seed a status record for a device without going through attach.
    pub fn prime_device(&self, device: &str, info: LoopInfo64) {
        let mut state = self.state.lock().unwrap();
        state.status.insert(sysfs::device_path(device), info);
    }

    /// Backing file currently attached to `device`, if any.
    pub fn attached_file(&self, device: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.attached.get(sysfs::short_name(device)).cloned()
    }

    fn record_operation(&self, op: Operation) {
        self.state.lock().unwrap().operations.push(op);
    }

    fn simulate_losetup(&self, args: &[&str]) -> LoopResult<Output> {
        if args == ["--version"] {
            return Ok(ok_output("losetup from util-linux 2.39.2\n"));
        }
        if args.first() == Some(&"-d") {
            let device = args.get(1).copied().unwrap_or_default();
            return self.detach(device);
        }
        if args.contains(&"-f") {
            let file = args.last().copied().unwrap_or_default();
            let read_only = args.contains(&"-r");
            let part_scan = args.contains(&"-P");
            return self.attach(file, read_only, part_scan);
        }
        Ok(ok_output(""))
    }

    fn attach(&self, file: &str, read_only: bool, part_scan: bool) -> LoopResult<Output> {
        let mut state = self.state.lock().unwrap();
        let name = (0..)
            .map(|n| format!("loop{n}"))
            .find(|name| !state.attached.contains_key(name))
            .unwrap_or_default();

        let mut info = LoopInfo64::default();
        if read_only {
            info.lo_flags |= LO_FLAGS_READ_ONLY;
        }
        if part_scan {
            info.lo_flags |= LO_FLAGS_PARTSCAN;
        }
        let name_bytes = file.as_bytes();
        let len = name_bytes.len().min(info.lo_file_name.len() - 1);
        info.lo_file_name[..len].copy_from_slice(&name_bytes[..len]);

        state.attached.insert(name.clone(), file.to_string());
        state.status.insert(sysfs::device_path(&name), info);
        drop(state);

        if let Some(root) = &self.sysfs_root {
            let dir = root.join(&name).join("loop");
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("backing_file"), format!("{file}\n"))?;
        }
        Ok(ok_output(""))
    }

    fn detach(&self, device: &str) -> LoopResult<Output> {
        let name = sysfs::short_name(device).to_string();
        let mut state = self.state.lock().unwrap();
        if state.attached.remove(&name).is_none() {
            return Err(LoopError::CommandFailed {
                program: "losetup".to_string(),
                code: Some(1),
                stderr: format!(
                    "losetup: {}: detach failed: No such device or address",
                    sysfs::device_path(device)
                ),
            });
        }
        state.status.remove(&sysfs::device_path(device));
        drop(state);

        if let Some(root) = &self.sysfs_root {
            let _ = fs::remove_file(root.join(&name).join("loop/backing_file"));
        }
        Ok(ok_output(""))
    }
}

fn ok_output(stdout: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

impl ProcessOps for FakeHal {
    fn command_output(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> LoopResult<Output> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: timeout.as_secs(),
        });
        if program == "losetup" {
            return self.simulate_losetup(args);
        }
        Ok(ok_output(""))
    }
}

impl StatusOps for FakeHal {
    fn loop_status(&self, device: &str) -> LoopResult<LoopInfo64> {
        self.record_operation(Operation::StatusRead {
            device: device.to_string(),
        });
        let state = self.state.lock().unwrap();
        state
            .status
            .get(device)
            .copied()
            .ok_or_else(|| LoopError::Device {
                device: device.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
    }

    fn update_loop_status(
        &self,
        device: &str,
        mutate: &mut dyn FnMut(&mut LoopInfo64),
    ) -> LoopResult<()> {
        self.record_operation(Operation::StatusUpdate {
            device: device.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        let info = state
            .status
            .get_mut(device)
            .ok_or_else(|| LoopError::Device {
                device: device.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })?;
        mutate(info);
        Ok(())
    }
}

impl ProgressOps for FakeHal {
    fn report_started(&self, msg: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_progress_id += 1;
        let id = state.next_progress_id;
        state.operations.push(Operation::ProgressStarted {
            id,
            msg: msg.to_string(),
        });
        id
    }

    fn report_finished(&self, id: u64, msg: &str) {
        self.record_operation(Operation::ProgressFinished {
            id,
            msg: msg.to_string(),
        });
    }
}
