//! Lifecycle protection for package-manager child processes
//!
//! Interrupting dpkg halfway through an install leaves the package database
//! in a state that needs `dpkg --configure -a` to repair. This module keeps
//! apt/dpkg children out of the terminal's reach and makes the parent wait
//! for them before exiting.
//!
//! - Children are spawned in their own process group, so a Ctrl+C typed at
//!   the terminal reaches drivermgr but not apt-get.
//! - Every mutating child is tracked in a global registry.
//! - On SIGINT/SIGTERM/SIGHUP the signal thread waits for tracked children
//!   to exit, then exits with 128 + signal number.

use nix::sys::signal;
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking running package-manager processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Drop PIDs whose process is gone and return how many are still alive.
    pub fn prune_dead(&mut self) -> usize {
        self.pids.retain(|&pid| is_process_alive(pid));
        self.pids.len()
    }
}

/// Register `pid` in the global registry for the lifetime of the guard.
pub struct RegisteredChild {
    pid: u32,
}

impl RegisteredChild {
    pub fn new(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }
}

impl Drop for RegisteredChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

/// Block until every tracked child has exited or `timeout` elapses.
///
/// Returns the number of children still alive.
pub fn wait_for_children(timeout: Duration) -> usize {
    let start = Instant::now();
    loop {
        let alive = match ChildRegistry::global().lock() {
            Ok(mut registry) => registry.prune_dead(),
            Err(_) => return 0,
        };
        if alive == 0 || start.elapsed() >= timeout {
            return alive;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state: Z = zombie, X = dead
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// Call once at program start. A running package-manager child is never
/// signalled; the process exits only after it finishes.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            let running = ChildRegistry::global()
                .lock()
                .map(|mut r| r.prune_dead())
                .unwrap_or(0);

            if running > 0 {
                warn!(
                    "Received {}, waiting for {} package manager process(es) to finish",
                    signal_name, running
                );
                eprintln!("Waiting for the package manager to finish before exiting...");
                // dpkg runs can take a long time; wait them out
                while wait_for_children(Duration::from_secs(60)) > 0 {
                    info!("Package manager still running");
                }
            } else {
                info!("Received {}, exiting", signal_name);
            }

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group so terminal
    /// signals aimed at the foreground group do not reach it
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // PGID = child PID
        self.process_group(0)
    }
}
