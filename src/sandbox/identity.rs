//! Dedicated user ids for submissions when the worker runs as root
//!
//! Every run borrows one uid from a configured range for its whole lifetime.
//! Nothing else runs under that uid, so process limits count only the run's
//! own processes, file permissions keep it away from the worker's files, and
//! afterwards every process left under the uid can be killed without knowing
//! its pid or process group.

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chown, fork, setgid, setgroups, setuid, ForkResult, Gid, Pid, Uid};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tokio::sync::Notify;
use tracing::debug;

/// Kill rounds per sweep; a forking submission can race a single round
const SWEEP_ROUNDS: usize = 64;

/// Uids currently lent out, across every range in the process
static IN_USE: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

fn released() -> &'static Notify {
    static RELEASED: OnceLock<Notify> = OnceLock::new();
    RELEASED.get_or_init(Notify::new)
}

/// A uid/gid pair a submission runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Give `dir` and its direct entries to this identity
    pub fn hand_over(&self, dir: &Path) -> Result<()> {
        let uid = Some(Uid::from_raw(self.uid));
        let gid = Some(Gid::from_raw(self.gid));

        chown(dir, uid, gid).with_context(|| format!("Failed to chown {:?}", dir))?;
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            chown(path.as_path(), uid, gid)
                .with_context(|| format!("Failed to chown {:?}", path))?;
        }
        Ok(())
    }

    /// Kill every process running as this identity.
    ///
    /// Blocking: forks a helper that switches to the uid and signals
    /// everything it is allowed to signal.
    pub fn sweep(&self) -> Result<()> {
        let identity = *self;
        // SAFETY: the child only issues setgroups/setgid/setuid/kill before _exit.
        match unsafe { fork() }.context("Failed to fork sweeper")? {
            ForkResult::Child => {
                let code = match identity.kill_all() {
                    Ok(()) => 0,
                    Err(_) => 1,
                };
                // SAFETY: _exit skips destructors and atexit handlers of the forked copy.
                unsafe { nix::libc::_exit(code) }
            }
            ForkResult::Parent { child } => match waitpid(child, None)? {
                WaitStatus::Exited(_, 0) => {
                    debug!("Swept processes of uid {}", identity.uid);
                    Ok(())
                }
                status => bail!("Sweeper for uid {} ended with {:?}", identity.uid, status),
            },
        }
    }

    fn kill_all(&self) -> nix::Result<()> {
        setgroups(&[])?;
        setgid(Gid::from_raw(self.gid))?;
        setuid(Uid::from_raw(self.uid))?;

        // kill(-1) skips the caller and ends with ESRCH once nothing is left
        for _ in 0..SWEEP_ROUNDS {
            match kill(Pid::from_raw(-1), Signal::SIGKILL) {
                Ok(()) => continue,
                Err(Errno::ESRCH) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Contiguous range of uids lent out one run at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRange {
    base: u32,
    count: u32,
}

impl IdentityRange {
    pub fn new(base: u32, count: u32) -> Self {
        Self { base, count }
    }

    /// The range, if the worker is privileged enough to switch users
    pub fn for_current_user(base: u32, count: u32) -> Option<Self> {
        nix::unistd::geteuid()
            .is_root()
            .then(|| Self::new(base, count))
    }

    /// Borrow a free uid, waiting until one is returned if all are lent out
    pub async fn acquire(&self) -> IdentityLease {
        loop {
            // Registered before the check so a release in between is not missed
            let notified = released().notified();
            if let Some(identity) = self.try_claim() {
                return IdentityLease { identity };
            }
            notified.await;
        }
    }

    fn try_claim(&self) -> Option<Identity> {
        let mut in_use = IN_USE.lock().unwrap_or_else(|e| e.into_inner());
        let uid = (self.base..self.base.saturating_add(self.count))
            .find(|uid| !in_use.contains(uid))?;
        in_use.insert(uid);
        Some(Identity { uid, gid: uid })
    }
}

/// A borrowed identity, returned to its range on drop
#[derive(Debug)]
pub struct IdentityLease {
    identity: Identity,
}

impl IdentityLease {
    pub fn identity(&self) -> Identity {
        self.identity
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        IN_USE
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.identity.uid);
        released().notify_waiters();
    }
}
