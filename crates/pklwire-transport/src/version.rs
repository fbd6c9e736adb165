//! `pkl --version` probe.

use regex::Regex;

use crate::command::PklCommand;
use crate::error::{Result, TransportError};

const VERSION_PATTERN: &str =
    r"Pkl (\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)";

/// Extract the semantic version from `pkl --version` output.
///
/// `Pkl 0.25.3 (macOS 14.2, native)` yields `0.25.3`.
pub fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(VERSION_PATTERN).ok()?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Run `<command> --version` synchronously and parse the result.
pub fn probe_version(command: &PklCommand) -> Result<String> {
    let output = command
        .std_command()
        .arg("--version")
        .output()
        .map_err(|source| TransportError::Spawn {
            program: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(TransportError::VersionProbe {
            program: command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = parse_version(&stdout)
        .ok_or_else(|| TransportError::VersionNotFound(stdout.trim().to_string()))?;
    tracing::debug!(command = %command, %version, "probed pkl version");
    Ok(version)
}
