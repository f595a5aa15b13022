// src/runner/terminator.rs

//! Platform strategies for stopping a run's process tree.
//!
//! A run's interpreter may itself start further processes (a local server,
//! a worker pool). Stopping only the direct child would orphan those, so
//! each strategy targets the whole tree:
//!
//! - POSIX ([`ProcessGroupTerminator`]): the child is made leader of a new
//!   process group at spawn time, and signals go to the group.
//! - Windows ([`TaskkillTerminator`]): `taskkill /T` walks the tree.
//!
//! [`platform_terminator`] picks the strategy for the current platform.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::process::Command;

/// Capability to stop a process and its descendants by pid.
pub trait ProcessTerminator: Send + Sync + fmt::Debug {
    /// Adjust a command before it is spawned so later signals reach every
    /// process it starts.
    fn prepare(&self, command: &mut Command);

    /// Ask the process tree to shut down cooperatively.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forcefully end the process tree.
    fn kill_tree(&self, pid: u32) -> io::Result<()>;
}

/// The strategy for the platform this binary was built for.
pub fn platform_terminator() -> Arc<dyn ProcessTerminator> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupTerminator)
    }

    #[cfg(windows)]
    {
        Arc::new(TaskkillTerminator)
    }

    #[cfg(not(any(unix, windows)))]
    {
        Arc::new(UnsupportedTerminator)
    }
}

#[cfg(unix)]
pub use self::unix::ProcessGroupTerminator;

#[cfg(unix)]
mod unix {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tokio::process::Command;

    use super::ProcessTerminator;

    /// Signals the process group led by the run's child.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ProcessGroupTerminator;

    impl ProcessGroupTerminator {
        fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
            let raw = i32::try_from(pid).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range"))
            })?;
            let pid = Pid::from_raw(raw);
            match killpg(pid, signal) {
                Ok(()) => Ok(()),
                // The child may have moved to another group (setsid); reach
                // it directly.
                Err(Errno::ESRCH) => kill(pid, signal).map_err(io::Error::from),
                Err(e) => Err(io::Error::from(e)),
            }
        }
    }

    impl ProcessTerminator for ProcessGroupTerminator {
        fn prepare(&self, command: &mut Command) {
            command.process_group(0);
        }

        fn terminate(&self, pid: u32) -> io::Result<()> {
            Self::signal_group(pid, Signal::SIGTERM)
        }

        fn kill_tree(&self, pid: u32) -> io::Result<()> {
            Self::signal_group(pid, Signal::SIGKILL)
        }
    }
}

#[cfg(windows)]
pub use self::windows::TaskkillTerminator;

#[cfg(windows)]
mod windows {
    use std::io;
    use std::process::Stdio;

    use tokio::process::Command;

    use super::ProcessTerminator;

    /// Shells out to `taskkill /T`, which follows the parent/child tree.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TaskkillTerminator;

    impl TaskkillTerminator {
        fn taskkill(pid: u32, force: bool) -> io::Result<()> {
            let mut cmd = std::process::Command::new("taskkill");
            cmd.args(["/PID", &pid.to_string(), "/T"]);
            if force {
                cmd.arg("/F");
            }
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map(|_| ())
        }
    }

    impl ProcessTerminator for TaskkillTerminator {
        fn prepare(&self, _command: &mut Command) {}

        fn terminate(&self, pid: u32) -> io::Result<()> {
            Self::taskkill(pid, false)
        }

        fn kill_tree(&self, pid: u32) -> io::Result<()> {
            Self::taskkill(pid, true)
        }
    }
}

#[cfg(not(any(unix, windows)))]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedTerminator;

#[cfg(not(any(unix, windows)))]
impl ProcessTerminator for UnsupportedTerminator {
    fn prepare(&self, _command: &mut Command) {}

    fn terminate(&self, pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot terminate pid {pid} on this platform"),
        ))
    }

    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        self.terminate(pid)
    }
}
