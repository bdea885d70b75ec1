//! Process probe
//!
//! Liveness checks and graceful termination for server pids. Neither
//! operation blocks or escalates beyond SIGTERM.

use thiserror::Error;

/// Failure to signal a process
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("permission denied signalling process {0}")]
    PermissionDenied(u32),

    #[error("failed to signal process {pid}: {source}")]
    Other {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Answers liveness questions about pids and sends termination signals
pub trait ProcessProbe: Send + Sync {
    /// Whether a process with this pid currently exists
    fn alive(&self, pid: u32) -> bool;

    /// Send the graceful termination signal (SIGTERM or equivalent)
    fn terminate(&self, pid: u32) -> Result<(), ProbeError>;
}

/// Probe backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

#[cfg(unix)]
impl SystemProbe {
    fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
        // pid 0 and negative values address process groups, never a single process
        libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
    }
}

#[cfg(unix)]
impl ProcessProbe for SystemProbe {
    fn alive(&self, pid: u32) -> bool {
        let Some(raw) = Self::to_pid_t(pid) else {
            return false;
        };
        let rc = unsafe { libc::kill(raw, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        let raw = Self::to_pid_t(pid).ok_or(ProbeError::NotFound(pid))?;
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(ProbeError::NotFound(pid)),
            Some(libc::EPERM) => Err(ProbeError::PermissionDenied(pid)),
            _ => Err(ProbeError::Other { pid, source: err }),
        }
    }
}

#[cfg(not(unix))]
impl ProcessProbe for SystemProbe {
    fn alive(&self, pid: u32) -> bool {
        use sysinfo::{Pid, ProcessesToUpdate, System};

        if pid == 0 {
            return false;
        }
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
        system.process(sys_pid).is_some()
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
        let process = system.process(sys_pid).ok_or(ProbeError::NotFound(pid))?;

        // Windows has no SIGTERM; sysinfo falls back to TerminateProcess
        let sent = process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill());
        if sent {
            Ok(())
        } else {
            Err(ProbeError::PermissionDenied(pid))
        }
    }
}
