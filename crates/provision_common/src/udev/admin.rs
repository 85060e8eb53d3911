//! Thin wrappers around the `udevadm` tool.
//!
//! These only assemble arguments, check exit status and hand stdout to the
//! property parser; all process execution goes through the
//! [`CommandRunner`] seam.

use crate::command::{run_checked, CommandRunner};
use crate::error::ProvisionError;
use crate::udev::properties::{parse_property_database, PropertyMapping};
use std::path::Path;
use tracing::debug;

/// Options for [`udevadm_settle`].
#[derive(Debug, Clone, Default)]
pub struct SettleOptions {
    /// Stop waiting (and skip the call entirely if already present) once
    /// this path exists.
    pub exists: Option<String>,
    /// Maximum seconds to wait for the event queue to empty.
    pub timeout: Option<u64>,
}

/// Query the udev property database for the device at `path` (/dev or /sys).
///
/// Fails with `InvalidArgument` before any subprocess is spawned when the
/// path is empty; a non-zero `udevadm` exit is surfaced unchanged.
pub fn udevadm_info(
    runner: &dyn CommandRunner,
    path: &str,
) -> Result<PropertyMapping, ProvisionError> {
    if path.is_empty() {
        return Err(ProvisionError::InvalidArgument(format!(
            "invalid device path: \"{path}\""
        )));
    }

    let output = run_checked(
        runner,
        "udevadm",
        &["info", "--query=property", "--export", path],
    )?;
    parse_property_database(&output.stdout)
}

/// Wait for the udev event queue to empty.
pub fn udevadm_settle(
    runner: &dyn CommandRunner,
    options: &SettleOptions,
) -> Result<(), ProvisionError> {
    let mut args: Vec<String> = vec!["settle".to_string()];
    if let Some(exists) = &options.exists {
        // Skip the settle if the requested path already exists.
        if Path::new(exists).exists() {
            debug!("settle skipped, {} already exists", exists);
            return Ok(());
        }
        args.push(format!("--exit-if-exists={exists}"));
    }
    if let Some(timeout) = options.timeout {
        args.push(format!("--timeout={timeout}"));
    }

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_checked(runner, "udevadm", &arg_refs)?;
    Ok(())
}

/// Request device events for `devices` (all devices when empty), then
/// settle so the events have been processed before returning.
pub fn udevadm_trigger(
    runner: &dyn CommandRunner,
    devices: &[String],
) -> Result<(), ProvisionError> {
    let mut args: Vec<&str> = vec!["trigger"];
    args.extend(devices.iter().map(String::as_str));
    run_checked(runner, "udevadm", &args)?;
    udevadm_settle(runner, &SettleOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeCommandRunner;
    use crate::udev::properties::PropertyValue;

    #[test]
    fn info_rejects_empty_path_without_spawning() {
        let runner = FakeCommandRunner::new();
        let err = udevadm_info(&runner, "").unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidArgument(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn info_parses_export_output() {
        let runner = FakeCommandRunner::new().respond(
            "udevadm info --query=property --export /dev/sda",
            "DEVNAME='/dev/sda'\nDEVTYPE='disk'\n",
        );
        let mapping = udevadm_info(&runner, "/dev/sda").unwrap();
        assert_eq!(mapping["DEVNAME"], PropertyValue::Scalar("/dev/sda".to_string()));
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn info_surfaces_command_failure_unchanged() {
        let runner = FakeCommandRunner::new().respond_with(
            "udevadm info --query=property --export /dev/nope",
            "",
            "Unknown device",
            4,
        );
        let err = udevadm_info(&runner, "/dev/nope").unwrap_err();
        match err {
            ProvisionError::CommandFailed { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 4);
                assert_eq!(stderr, "Unknown device");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn settle_skips_subprocess_when_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("present");
        std::fs::write(&marker, b"").unwrap();

        let runner = FakeCommandRunner::new();
        let options = SettleOptions {
            exists: Some(marker.to_string_lossy().into_owned()),
            timeout: None,
        };
        udevadm_settle(&runner, &options).unwrap();
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn settle_passes_exists_and_timeout_flags() {
        let runner = FakeCommandRunner::new();
        let options = SettleOptions {
            exists: Some("/dev/mapper/mpatha".to_string()),
            timeout: Some(30),
        };
        udevadm_settle(&runner, &options).unwrap();
        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            "udevadm settle --exit-if-exists=/dev/mapper/mpatha --timeout=30"
        );
    }

    #[test]
    fn trigger_settles_afterwards() {
        let runner = FakeCommandRunner::new();
        udevadm_trigger(&runner, &["/dev/sda".to_string()]).unwrap();
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], "udevadm trigger /dev/sda");
        assert_eq!(calls[1], "udevadm settle");
    }
}
