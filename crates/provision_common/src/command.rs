//! Subprocess execution seam.
//!
//! Everything in this crate that talks to an external tool does so through
//! the [`CommandRunner`] trait, so parsers and composers stay pure and the
//! callers are testable without spawning real processes.
//!
//! Production code uses [`SystemCommandRunner`]. Test code uses the fake in
//! this module with pre-configured responses.

use crate::error::ProvisionError;
use std::process::Command;
use tracing::debug;

/// Captured result of one external command invocation.
///
/// Output is captured without interpretation; callers decide what a
/// non-zero exit means for them.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Narrow interface over external command execution.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing stdout/stderr and exit status.
    ///
    /// Returns `Err` only when the process could not be spawned; a command
    /// that ran and exited non-zero is an `Ok` with a non-zero `exit_code`.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProvisionError>;
}

/// Runs real subprocesses on the host system.
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProvisionError> {
        debug!("executing: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ProvisionError::Spawn {
                command: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Run a command and require a zero exit status.
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ProvisionError> {
    let output = runner.run(program, args)?;
    if !output.success() {
        return Err(ProvisionError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Scripted command runner for tests: responses are returned per
    /// (program, args) key and every invocation is recorded.
    pub struct FakeCommandRunner {
        responses: Mutex<Vec<(String, CommandOutput)>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn respond(self, program_and_args: &str, stdout: &str) -> Self {
            self.respond_with(program_and_args, stdout, "", 0)
        }

        pub fn respond_with(
            self,
            program_and_args: &str,
            stdout: &str,
            stderr: &str,
            exit_code: i32,
        ) -> Self {
            self.responses.lock().unwrap().push((
                program_and_args.to_string(),
                CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code,
                },
            ));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandRunner for FakeCommandRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProvisionError> {
            let key = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(key.clone());
            let responses = self.responses.lock().unwrap();
            let scripted = responses
                .iter()
                .find(|(k, _)| *k == key || key.starts_with(k.as_str()))
                .map(|(_, out)| out.clone());
            Ok(scripted.unwrap_or(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            }))
        }
    }
}
