//! Process launching and control

use crate::error::{Error, Result};
use crate::spec::ServiceSpec;
use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// A handle to control a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to complete and return its exit status.
    ///
    /// Dropping the returned future before it resolves must leave the
    /// handle usable, since the orchestrator races many waits at once.
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Send SIGINT (or equivalent) to ask the process to stop
    async fn interrupt(&mut self) -> Result<()>;

    /// Send SIGKILL (or equivalent) to forcefully stop the process
    async fn kill(&mut self) -> Result<()>;
}

/// Spawns the process described by a [`ServiceSpec`]
pub trait Launcher: Send + Sync + 'static {
    /// The process handle type this launcher produces
    type Handle: ProcessHandle + 'static;

    /// Spawn the service; the returned handle owns the child
    fn launch(&self, spec: &ServiceSpec) -> std::io::Result<Self::Handle>;
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

impl Launcher for LocalLauncher {
    type Handle = LocalProcessHandle;

    fn launch(&self, spec: &ServiceSpec) -> std::io::Result<Self::Handle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);

        // Overrides are layered on the inherited environment
        cmd.envs(&spec.env);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let child = cmd.spawn()?;
        Ok(LocalProcessHandle { child })
    }
}

/// A handle to control a local process.
///
/// The child is killed when the handle is dropped, so an orchestrator that
/// unwinds never leaves services behind.
pub struct LocalProcessHandle {
    child: Child,
}

impl LocalProcessHandle {
    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::errno::Errno;
        use nix::unistd::Pid;

        let pid = Pid::from_raw(self.child.id() as i32);
        match nix::sys::signal::kill(pid, signal) {
            // Already reaped
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::signal_failed(signal as i32, e.to_string())),
        }
    }
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.status().await?;
        Ok(status.into())
    }

    async fn interrupt(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGINT)
        }

        #[cfg(not(unix))]
        {
            // No SIGINT equivalent for arbitrary children
            self.kill().await
        }
    }

    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            match self.child.kill() {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                Err(e) => Err(Error::signal_failed(-1, e.to_string())),
            }
        }
    }
}

impl Drop for LocalProcessHandle {
    fn drop(&mut self) {
        // Errors mean the child is already gone
        let _ = self.child.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_exit_code_is_reported() {
        let spec = ServiceSpec::builder("exit", "sh")
            .args(["-c", "exit 7"])
            .build();
        let mut handle = LocalLauncher.launch(&spec).unwrap();
        assert!(handle.pid().is_some());

        let status = handle.wait().await.unwrap();
        assert_eq!(status.code, Some(7));
        assert!(!status.success());
        assert_eq!(status.to_string(), "exit code 7");
    }

    #[smol_potat::test]
    async fn test_interrupt_is_reported_as_signal() {
        let spec = ServiceSpec::builder("sleeper", "sleep").arg("30").build();
        let mut handle = LocalLauncher.launch(&spec).unwrap();

        handle.interrupt().await.unwrap();
        let status = handle.wait().await.unwrap();
        assert_eq!(status.code, None);
        assert_eq!(status.signal, Some(2));
    }

    #[smol_potat::test]
    async fn test_signalling_a_reaped_child_is_not_an_error() {
        let spec = ServiceSpec::builder("quick", "true").build();
        let mut handle = LocalLauncher.launch(&spec).unwrap();
        handle.wait().await.unwrap();

        assert!(handle.interrupt().await.is_ok());
        assert!(handle.kill().await.is_ok());
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let spec = ServiceSpec::builder("ghost", "/definitely/not/here").build();
        assert!(LocalLauncher.launch(&spec).is_err());
    }
}
