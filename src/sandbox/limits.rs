//! Resource limits applied in the child between fork and exec

use nix::sched::{unshare, CloneFlags};
use nix::sys::resource::{setrlimit, Resource};
use std::io;

use crate::runner::RunLimits;

/// Raw rlimit values, computed in the parent so the child only issues syscalls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLimits {
    /// Soft CPU limit in seconds; the hard limit is one second above it
    pub cpu_secs: u64,
    /// Address space in bytes (None = leave unlimited)
    pub address_space_bytes: Option<u64>,
    pub file_size_bytes: u64,
    pub open_files: u64,
    pub processes: u64,
    pub isolate_network: bool,
}

impl ChildLimits {
    pub fn from_run_limits(limits: &RunLimits) -> Self {
        Self {
            cpu_secs: u64::from(limits.time_ms).div_ceil(1000) + 1,
            address_space_bytes: (limits.memory_mb > 0)
                .then(|| u64::from(limits.memory_mb) * 1024 * 1024),
            file_size_bytes: u64::from(limits.file_size_kb) * 1024,
            open_files: u64::from(limits.open_files),
            processes: u64::from(limits.processes),
            isolate_network: limits.isolate_network,
        }
    }

    /// Limits for a run under its own uid, where the interpreter itself
    /// counts toward the process limit
    pub fn for_dedicated_user(mut self) -> Self {
        self.processes = self.processes.saturating_add(1);
        self
    }

    /// Apply to the calling process.
    ///
    /// Runs inside `pre_exec`, so it must not allocate or take locks.
    pub fn apply(&self) -> io::Result<()> {
        if self.isolate_network {
            unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET)?;
        }

        setrlimit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs + 1)?;
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        setrlimit(
            Resource::RLIMIT_FSIZE,
            self.file_size_bytes,
            self.file_size_bytes,
        )?;
        setrlimit(Resource::RLIMIT_NOFILE, self.open_files, self.open_files)?;
        setrlimit(Resource::RLIMIT_NPROC, self.processes, self.processes)?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;

        Ok(())
    }
}
