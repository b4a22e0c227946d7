//! Package manager and hardware probe backends
//!
//! The engine never shells out directly. Everything it needs from the system
//! goes through the traits below, which keeps the catalog, tracker,
//! recommender and session testable with scripted fakes.
//!
//! | Trait | apt implementation |
//! |-------|--------------------|
//! | `InstalledQuery` | `dpkg-query -W -f=${Status} <pkg>` |
//! | `PackageBackend::all_package_names` | `apt-cache pkgnames` |
//! | `PackageBackend::run` | `apt-get install/remove -y <pkg>`, `apt-get autoremove --purge -y` |
//! | `HardwareProbe` | `lspci -nn` |

use crate::config::{CommandSpec, CommandsConfig, DriverManagerConfig};
use crate::error::{DriverManagerError, Result};
use crate::process_guard::{CommandProcessGroup, RegisteredChild};
use crate::types::Action;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// A mutating package manager command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageCommand {
    Install(String),
    Remove(String),
    /// Purge dependencies nothing needs any more
    Autoremove,
}

impl PackageCommand {
    pub fn for_action(action: Action, target: &str) -> Self {
        match action {
            Action::Install => Self::Install(target.to_string()),
            Action::Remove => Self::Remove(target.to_string()),
        }
    }
}

/// Captured result of an external command that was started successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given stderr and exit code 100 (apt's error code)
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(100),
            success: false,
        }
    }

    /// Diagnostic text for a failed command: stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Answers whether a single package is installed.
pub trait InstalledQuery {
    fn is_installed(&self, name: &str) -> Result<bool>;
}

/// Everything the engine needs from the package manager.
pub trait PackageBackend: InstalledQuery + Send + Sync {
    /// All package names known to the package index
    fn all_package_names(&self) -> Result<Vec<String>>;

    /// Run a mutating command, feeding each stdout line to `progress` as it
    /// is produced.
    ///
    /// `Err` means the command could not be started at all; a command that
    /// ran and failed is `Ok` with `success == false`.
    fn run(&self, command: &PackageCommand, progress: &mut dyn FnMut(&str))
        -> Result<CommandOutput>;
}

/// Produces hardware descriptor lines, one device per line.
pub trait HardwareProbe: Send + Sync {
    fn enumerate(&self) -> Result<Vec<String>>;
}

// ============================================================================
// apt / dpkg
// ============================================================================

/// `PackageBackend` driving apt-get, apt-cache and dpkg-query.
#[derive(Debug, Clone)]
pub struct AptBackend {
    commands: CommandsConfig,
    noninteractive: bool,
}

impl AptBackend {
    pub fn new(config: &DriverManagerConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            noninteractive: config.noninteractive,
        }
    }

    fn spec_for<'a>(
        &'a self,
        command: &'a PackageCommand,
    ) -> (&'a CommandSpec, Option<&'a str>) {
        match command {
            PackageCommand::Install(target) => (&self.commands.install, Some(target.as_str())),
            PackageCommand::Remove(target) => (&self.commands.remove, Some(target.as_str())),
            PackageCommand::Autoremove => (&self.commands.autoremove, None),
        }
    }
}

impl Default for AptBackend {
    fn default() -> Self {
        Self::new(&DriverManagerConfig::default())
    }
}

impl InstalledQuery for AptBackend {
    fn is_installed(&self, name: &str) -> Result<bool> {
        let output = run_captured(&self.commands.installed_query, &[name])?;
        if output.success {
            return Ok(output.stdout.contains("install ok installed"));
        }
        // Names only present in the sync index are unknown to dpkg
        if output.stderr.contains("no packages found") {
            return Ok(false);
        }
        Err(DriverManagerError::command(
            self.commands.installed_query.display(),
            output.diagnostic().trim().to_string(),
        ))
    }
}

impl PackageBackend for AptBackend {
    fn all_package_names(&self) -> Result<Vec<String>> {
        let output = run_captured(&self.commands.package_index, &[])?;
        if !output.success {
            return Err(DriverManagerError::command(
                self.commands.package_index.display(),
                output.diagnostic().trim().to_string(),
            ));
        }
        Ok(parse_package_names(&output.stdout))
    }

    fn run(
        &self,
        command: &PackageCommand,
        progress: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput> {
        let (spec, target) = self.spec_for(command);
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(target) = target {
            cmd.arg(target);
        }
        if self.noninteractive {
            cmd.env("DEBIAN_FRONTEND", "noninteractive");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let command_line = match target {
            Some(target) => format!("{} {}", spec.display(), target),
            None => spec.display(),
        };
        info!("Running: {}", command_line);

        let mut child = cmd
            .spawn()
            .map_err(|e| DriverManagerError::command(&command_line, e.to_string()))?;
        let _registered = RegisteredChild::new(child.id());

        // Drain stderr concurrently so a chatty child cannot block on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut buf) {
                    warn!("Failed to read child stderr: {}", e);
                }
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let mut stdout = String::new();
        let read_result = match child.stdout.take() {
            Some(out) => stream_lines(out, &mut |line| {
                progress(line);
                stdout.push_str(line);
                stdout.push('\n');
            }),
            None => Ok(()),
        };

        // Reap the child on every path; an unreaped apt must never look finished
        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if let Err(e) = read_result {
            warn!("{} output could not be read: {}", command_line, e);
            return Err(e.into());
        }

        if status.success() {
            info!("{} finished successfully", command_line);
        } else {
            warn!("{} failed with exit code {:?}", command_line, status.code());
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            success: status.success(),
        })
    }
}

/// Feed each line of `reader` to `on_line`, decoding invalid UTF-8 lossily.
fn stream_lines<R: Read>(reader: R, on_line: &mut dyn FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.strip_suffix('\n').unwrap_or(&text);
                on_line(line.strip_suffix('\r').unwrap_or(line));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Package names from `apt-cache pkgnames` output, sorted and deduplicated.
pub fn parse_package_names(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}

// ============================================================================
// lspci
// ============================================================================

/// `HardwareProbe` running `lspci -nn`.
#[derive(Debug, Clone)]
pub struct LspciProbe {
    command: CommandSpec,
}

impl LspciProbe {
    pub fn new(config: &DriverManagerConfig) -> Self {
        Self {
            command: config.commands.hardware_probe.clone(),
        }
    }
}

impl Default for LspciProbe {
    fn default() -> Self {
        Self::new(&DriverManagerConfig::default())
    }
}

impl HardwareProbe for LspciProbe {
    fn enumerate(&self) -> Result<Vec<String>> {
        let output = run_captured(&self.command, &[])?;
        if !output.success {
            return Err(DriverManagerError::command(
                self.command.display(),
                output.diagnostic().trim().to_string(),
            ));
        }
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Run a read-only command to completion and capture its output.
fn run_captured(spec: &CommandSpec, extra_args: &[&str]) -> Result<CommandOutput> {
    debug!("Executing: {} {:?}", spec.display(), extra_args);

    let output = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra_args)
        .stdin(Stdio::null())
        .in_new_process_group()
        .output()
        .map_err(|e| DriverManagerError::command(spec.display(), e.to_string()))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(commands: CommandsConfig) -> AptBackend {
        AptBackend::new(&DriverManagerConfig {
            commands,
            ..DriverManagerConfig::default()
        })
    }

    #[test]
    fn test_parse_package_names_sorted_unique() {
        let names = parse_package_names("nvidia-driver\n\nalsa-base\n  cups \nalsa-base\n");
        assert_eq!(names, vec!["alsa-base", "cups", "nvidia-driver"]);
    }

    #[test]
    fn test_command_for_action() {
        assert_eq!(
            PackageCommand::for_action(Action::Remove, "cups"),
            PackageCommand::Remove("cups".to_string())
        );
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let mut output = CommandOutput::failed("E: Unable to locate package foo");
        assert_eq!(output.diagnostic(), "E: Unable to locate package foo");
        output.stderr.clear();
        output.stdout = "only stdout".to_string();
        assert_eq!(output.diagnostic(), "only stdout");
    }

    #[test]
    fn test_run_streams_stdout_lines() {
        let backend = backend_with(CommandsConfig {
            install: CommandSpec::new("sh", &["-c", "printf 'one\\ntwo\\n'", "sh"]),
            ..CommandsConfig::default()
        });

        let mut lines = Vec::new();
        let output = backend
            .run(&PackageCommand::Install("pkg".to_string()), &mut |l| {
                lines.push(l.to_string())
            })
            .unwrap();

        assert!(output.success);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_run_captures_failure() {
        let backend = backend_with(CommandsConfig {
            remove: CommandSpec::new("sh", &["-c", "echo 'E: boom' >&2; exit 100", "sh"]),
            ..CommandsConfig::default()
        });

        let output = backend
            .run(&PackageCommand::Remove("pkg".to_string()), &mut |_| {})
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(100));
        assert_eq!(output.stderr.trim(), "E: boom");
    }

    #[test]
    fn test_run_survives_invalid_utf8_and_waits_for_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!(
            "printf 'ok\\n\\377bad\\n'; sleep 1; echo after > '{}'",
            marker.display()
        );
        let backend = backend_with(CommandsConfig {
            install: CommandSpec::new("sh", &["-c", script.as_str(), "sh"]),
            ..CommandsConfig::default()
        });

        let mut lines = Vec::new();
        let output = backend
            .run(&PackageCommand::Install("pkg".to_string()), &mut |l| {
                lines.push(l.to_string())
            })
            .unwrap();

        assert!(output.success);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ok");
        assert!(lines[1].ends_with("bad"));
        assert!(marker.exists(), "run must not return before the child exits");
    }

    #[test]
    fn test_run_keeps_non_utf8_stderr() {
        let backend = backend_with(CommandsConfig {
            remove: CommandSpec::new(
                "sh",
                &["-c", "printf 'E: caf\\351 lock\\n' >&2; exit 100", "sh"],
            ),
            ..CommandsConfig::default()
        });

        let output = backend
            .run(&PackageCommand::Remove("pkg".to_string()), &mut |_| {})
            .unwrap();

        assert!(!output.success);
        assert!(output.diagnostic().starts_with("E: caf"));
        assert!(output.diagnostic().contains("lock"));
    }

    #[test]
    fn test_run_missing_program_is_error() {
        let backend = backend_with(CommandsConfig {
            autoremove: CommandSpec::new("/nonexistent/apt-get", &[]),
            ..CommandsConfig::default()
        });

        let result = backend.run(&PackageCommand::Autoremove, &mut |_| {});
        assert!(matches!(result, Err(DriverManagerError::Command { .. })));
    }

    #[test]
    fn test_installed_query_parses_status() {
        let backend = backend_with(CommandsConfig {
            installed_query: CommandSpec::new("sh", &["-c", "echo 'install ok installed'", "sh"]),
            ..CommandsConfig::default()
        });
        assert!(backend.is_installed("alsa-base").unwrap());
    }

    #[test]
    fn test_installed_query_unknown_package_is_not_installed() {
        let backend = backend_with(CommandsConfig {
            installed_query: CommandSpec::new(
                "sh",
                &["-c", "echo \"dpkg-query: no packages found matching $1\" >&2; exit 1", "sh"],
            ),
            ..CommandsConfig::default()
        });
        assert!(!backend.is_installed("nvidia-driver").unwrap());
    }

    #[test]
    fn test_probe_failure_is_error() {
        let probe = LspciProbe {
            command: CommandSpec::new("false", &[]),
        };
        assert!(probe.enumerate().is_err());
    }
}
