//! Handles to launched service processes.

use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

use berth_common::constants::STOP_GRACE_SECS;
use berth_common::error::{BerthError, Result};

/// A running service.
///
/// Exit codes follow the shell convention: a process killed by signal `n`
/// reports `128 + n`.
pub trait Service: Send {
    /// PID of the service process.
    fn pid(&self) -> u32;

    /// Returns the exit code if the process has terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    fn try_wait(&mut self) -> Result<Option<i32>>;

    /// Blocks until the process terminates.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    fn wait(&mut self) -> Result<i32>;

    /// Asks the process to terminate and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be signaled or reaped.
    fn stop(&mut self) -> Result<i32>;
}

/// A service backed by a child process of this one.
#[derive(Debug)]
pub struct ProcessService {
    child: Child,
    grace: Duration,
}

impl ProcessService {
    /// Wraps a spawned child.
    #[must_use]
    pub const fn new(child: Child) -> Self {
        Self {
            child,
            grace: Duration::from_secs(STOP_GRACE_SECS),
        }
    }

    /// Overrides how long `stop` waits between SIGTERM and SIGKILL.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn reap_error(&self, e: std::io::Error) -> BerthError {
        BerthError::io(format!("pid {}", self.child.id()), e)
    }

    fn wait_for(&mut self, limit: Duration) -> Result<Option<i32>> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(code) = self.try_wait()? {
                return Ok(Some(code));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Service for ProcessService {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<i32>> {
        match self.child.try_wait() {
            Ok(status) => Ok(status.map(exit_code)),
            Err(e) => Err(self.reap_error(e)),
        }
    }

    fn wait(&mut self) -> Result<i32> {
        match self.child.wait() {
            Ok(status) => Ok(exit_code(status)),
            Err(e) => Err(self.reap_error(e)),
        }
    }

    #[cfg(unix)]
    fn stop(&mut self) -> Result<i32> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(code) = self.try_wait()? {
            return Ok(code);
        }
        let pid = self.pid();
        let raw = i32::try_from(pid).map_err(|_| BerthError::Config {
            message: format!("pid {pid} out of range"),
        })?;
        let target = Pid::from_raw(raw);

        if kill(target, Signal::SIGTERM).is_ok() {
            tracing::info!(pid, "sent SIGTERM");
            if let Some(code) = self.wait_for(self.grace)? {
                return Ok(code);
            }
            if kill(target, Signal::SIGKILL).is_ok() {
                tracing::warn!(pid, grace = ?self.grace, "service ignored SIGTERM, sent SIGKILL");
            }
        }
        self.wait()
    }

    #[cfg(not(unix))]
    fn stop(&mut self) -> Result<i32> {
        if let Some(code) = self.try_wait()? {
            return Ok(code);
        }
        if let Err(e) = self.child.kill() {
            return Err(self.reap_error(e));
        }
        self.wait()
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
