//! Runtime dependency probing for the external losetup utility.

use std::time::Duration;

use regex::Regex;

use crate::error::{LoopError, LoopResult};
use crate::hal::process_ops::output_failed;
use crate::hal::ProcessOps;

/// Oldest losetup release carrying every option the setup path uses.
pub const LOSETUP_MIN_VERSION: &str = "2.23.2";

const VERSION_PATTERN: &str = r"losetup from util-linux\s+([\d\.]+)";
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Confirms the external losetup utility is present and recent enough.
///
/// A failed probe disables the component; it is reported to the embedding
/// host as a warning, never as an error.
pub fn check_deps(hal: &dyn ProcessOps) -> bool {
    if which::which("losetup").is_err() {
        log::warn!("Cannot enable loop operations: losetup not found in PATH");
        return false;
    }

    match probe_version(hal) {
        Ok(version) if version_at_least(&version, LOSETUP_MIN_VERSION) => true,
        Ok(version) => {
            log::warn!(
                "Cannot enable loop operations: losetup {version} is older than the \
                 required {LOSETUP_MIN_VERSION}"
            );
            false
        }
        Err(err) => {
            log::warn!("Cannot enable loop operations: {err}");
            false
        }
    }
}

/// Runs `losetup --version` and extracts the reported version string.
pub fn probe_version(hal: &dyn ProcessOps) -> LoopResult<String> {
    let output = hal.command_output("losetup", &["--version"], VERSION_TIMEOUT)?;
    if !output.status.success() {
        return Err(output_failed("losetup", &output));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(&stdout).ok_or_else(|| {
        LoopError::Parse(format!(
            "unexpected losetup version output: {}",
            stdout.trim()
        ))
    })
}

fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(VERSION_PATTERN).ok()?;
    Some(re.captures(output)?[1].to_string())
}

fn version_at_least(found: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    let mut found = parse(found);
    let mut minimum = parse(minimum);
    let len = found.len().max(minimum.len());
    found.resize(len, 0);
    minimum.resize(len, 0);
    found >= minimum
}
