//! Session guards: an OS process-table scan and an in-memory flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ups_core::supervisor::SessionGuard;

use crate::error::GuardError;

pub const SESSION_SUBCOMMAND: &str = "escalate";

/// Returns `true` when `cmdline` is an escalation session of `program`.
///
/// Matches on the executable's file name so relative and absolute
/// invocations are both recognised.
pub fn is_session_cmdline<S: AsRef<str>>(cmdline: &[S], program: &str) -> bool {
    let Some((argv0, rest)) = cmdline.split_first() else {
        return false;
    };

    let exe = argv0.as_ref().rsplit('/').next().unwrap_or_default();
    exe == program && rest.iter().any(|arg| arg.as_ref() == SESSION_SUBCOMMAND)
}

/// Looks for a running `<program> escalate` in `/proc`.
#[derive(Debug)]
pub struct ProcessTableGuard {
    program: String,
    own_pid: u32,
}

impl ProcessTableGuard {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            own_pid: std::process::id(),
        }
    }
}

impl SessionGuard for ProcessTableGuard {
    type Error = GuardError;

    #[cfg(target_os = "linux")]
    fn session_active(&mut self) -> Result<bool, Self::Error> {
        let own_pid = i32::try_from(self.own_pid).unwrap_or(i32::MAX);

        for process in procfs::process::all_processes()? {
            // Processes exiting mid-scan are skipped.
            let Ok(process) = process else { continue };
            if process.pid() == own_pid {
                continue;
            }
            if process.stat().is_ok_and(|stat| stat.state == 'Z') {
                continue;
            }
            if process
                .cmdline()
                .is_ok_and(|cmdline| is_session_cmdline(&cmdline, &self.program))
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    #[cfg(not(target_os = "linux"))]
    fn session_active(&mut self) -> Result<bool, Self::Error> {
        Err(GuardError::Unsupported)
    }
}

/// Shared "session running" flag used in task mode.
#[derive(Clone, Debug, Default)]
pub struct SessionFlag {
    active: Arc<AtomicBool>,
}

impl SessionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Sets the flag unless it is already set. The flag clears when the
    /// returned token drops.
    pub fn try_claim(&self) -> Option<SessionToken> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionToken {
                active: Arc::clone(&self.active),
            })
    }
}

#[derive(Debug)]
pub struct SessionToken {
    active: Arc<AtomicBool>,
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Guard reading a [`SessionFlag`].
#[derive(Clone, Debug)]
pub struct FlagGuard {
    flag: SessionFlag,
}

impl FlagGuard {
    pub fn new(flag: SessionFlag) -> Self {
        Self { flag }
    }
}

impl SessionGuard for FlagGuard {
    type Error = GuardError;

    fn session_active(&mut self) -> Result<bool, Self::Error> {
        Ok(self.flag.is_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_session_invocations() {
        assert!(is_session_cmdline(
            &["/usr/local/bin/ups-monitor", "--verbose", "escalate", "--dry-run"],
            "ups-monitor"
        ));
        assert!(is_session_cmdline(&["ups-monitor", "escalate"], "ups-monitor"));
    }

    #[test]
    fn ignores_other_processes() {
        assert!(!is_session_cmdline(&["ups-monitor", "watch"], "ups-monitor"));
        assert!(!is_session_cmdline(
            &["grep", "ups-monitor", "escalate"],
            "ups-monitor"
        ));
        assert!(!is_session_cmdline::<&str>(&[], "ups-monitor"));
    }

    #[test]
    fn flag_is_held_for_the_token_lifetime() {
        let flag = SessionFlag::new();
        let mut guard = FlagGuard::new(flag.clone());
        assert!(!guard.session_active().unwrap());

        let token = flag.try_claim().expect("first claim succeeds");
        assert!(guard.session_active().unwrap());
        assert!(flag.try_claim().is_none(), "second claim must fail");

        drop(token);
        assert!(!guard.session_active().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn process_scan_does_not_match_the_test_binary() {
        let mut guard = ProcessTableGuard::new("ups-monitor-no-such-binary");
        assert!(!guard.session_active().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn process_table_failures_surface_as_scan_errors() {
        let err = GuardError::from(procfs::ProcError::NotFound(None));
        assert!(matches!(err, GuardError::Scan(_)));
        assert!(err.to_string().starts_with("process table scan failed"));
    }
}
