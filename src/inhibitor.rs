//! Idle-sleep inhibition for the lifetime of a running test.

use anyhow::Result;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// Proof that an inhibition was granted. Releasing a stale handle is a no-op.
#[derive(Debug, PartialEq, Eq)]
pub struct InhibitHandle(pub(crate) u64);

pub trait SleepInhibitor: Send {
    /// Asks the OS to stay awake. Failure is logged and yields `None`.
    fn acquire(&mut self, reason: &str) -> Option<InhibitHandle>;
    fn release(&mut self, handle: InhibitHandle);
}

#[cfg(target_os = "macos")]
mod platform {
    use anyhow::Result;

    use crate::macos_bridge;

    pub struct Assertion(u32);

    pub fn acquire(reason: &str) -> Result<Assertion> {
        macos_bridge::prevent_idle_sleep(reason).map(Assertion)
    }

    pub fn release(assertion: Assertion) -> Result<()> {
        macos_bridge::release_assertion(assertion.0)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::process::{Child, Command, Stdio};

    use anyhow::{Context, Result};

    /// `systemd-inhibit` holds the block lock for as long as its child runs.
    /// The child is `cat` on a pipe we own, so closing the pipe ends it.
    pub struct Assertion(Child);

    pub fn acquire(reason: &str) -> Result<Assertion> {
        let child = Command::new("systemd-inhibit")
            .args([
                "--what=idle:sleep",
                "--who=drainlab",
                "--mode=block",
            ])
            .arg(format!("--why={reason}"))
            .arg("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn systemd-inhibit")?;
        Ok(Assertion(child))
    }

    pub fn release(mut assertion: Assertion) -> Result<()> {
        drop(assertion.0.stdin.take());
        assertion.0.wait().context("failed to reap systemd-inhibit")?;
        Ok(())
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod platform {
    use anyhow::{bail, Result};

    pub struct Assertion;

    pub fn acquire(_reason: &str) -> Result<Assertion> {
        bail!("sleep inhibition is not supported on this platform")
    }

    pub fn release(_assertion: Assertion) -> Result<()> {
        Ok(())
    }
}

/// Holds at most one OS assertion at a time.
pub struct SystemSleepInhibitor {
    next_id: u64,
    held: Option<(u64, platform::Assertion)>,
}

impl SystemSleepInhibitor {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            held: None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    fn release_held(&mut self) -> Result<()> {
        match self.held.take() {
            Some((_, assertion)) => platform::release(assertion),
            None => Ok(()),
        }
    }
}

impl Default for SystemSleepInhibitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepInhibitor for SystemSleepInhibitor {
    fn acquire(&mut self, reason: &str) -> Option<InhibitHandle> {
        if self.held.is_some() {
            log_warn!("sleep inhibition already held; replacing it");
            if let Err(err) = self.release_held() {
                log_error!("Failed to release previous sleep inhibition: {err:#}");
            }
        }

        match platform::acquire(reason) {
            Ok(assertion) => {
                let id = self.next_id;
                self.next_id += 1;
                self.held = Some((id, assertion));
                Some(InhibitHandle(id))
            }
            Err(err) => {
                log_warn!("Could not prevent idle sleep, continuing without it: {err:#}");
                None
            }
        }
    }

    fn release(&mut self, handle: InhibitHandle) {
        let matches = matches!(self.held, Some((id, _)) if id == handle.0);
        if !matches {
            return;
        }
        if let Err(err) = self.release_held() {
            log_error!("Failed to release sleep inhibition: {err:#}");
        }
    }
}

impl Drop for SystemSleepInhibitor {
    fn drop(&mut self) {
        if let Err(err) = self.release_held() {
            log_error!("Failed to release sleep inhibition on shutdown: {err:#}");
        }
    }
}
