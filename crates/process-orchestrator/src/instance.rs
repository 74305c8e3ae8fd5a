//! Runtime records for launched services

use crate::error::{Error, Result};
use crate::process::{ExitStatus, ProcessHandle};
use crate::spec::ServiceSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle of one service instance.
///
/// Instances only move forward: `Pending -> Starting -> Running`, then
/// either `Exited` or `Failed`. `Starting` may also fail directly when the
/// spawn is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceState {
    /// Not launched yet
    Pending,
    /// Spawn in progress
    Starting,
    /// Process is alive
    Running,
    /// Process ended on its own or was stopped
    Exited {
        /// How it ended
        status: ExitStatus,
    },
    /// Process could not be spawned or observed
    Failed {
        /// Why
        reason: String,
    },
}

impl InstanceState {
    fn rank(&self) -> u8 {
        match self {
            InstanceState::Pending => 0,
            InstanceState::Starting => 1,
            InstanceState::Running => 2,
            InstanceState::Exited { .. } | InstanceState::Failed { .. } => 3,
        }
    }

    /// Short label for logs and tables
    pub fn label(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Exited { .. } => "exited",
            InstanceState::Failed { .. } => "failed",
        }
    }

    /// Whether the instance has reached the end of its lifecycle
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    fn allows(&self, next: &InstanceState) -> bool {
        match (self, next) {
            (InstanceState::Starting, InstanceState::Failed { .. }) => true,
            (InstanceState::Pending, InstanceState::Starting)
            | (InstanceState::Starting, InstanceState::Running) => true,
            (InstanceState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Exited { status } => write!(f, "exited ({})", status),
            InstanceState::Failed { reason } => write!(f, "failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// A service under orchestration
pub struct ServiceInstance<H> {
    spec: ServiceSpec,
    handle: Option<H>,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    state: InstanceState,
    stop_requested: bool,
    forced: bool,
}

impl<H: ProcessHandle> ServiceInstance<H> {
    /// Wrap a spec in a fresh `Pending` instance
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            handle: None,
            pid: None,
            started_at: None,
            state: InstanceState::Pending,
            stop_requested: false,
            forced: false,
        }
    }

    /// The spec this instance was created from
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current state
    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    /// Process ID, once spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether the process is believed to be alive
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Move to `next`, rejecting anything that is not a forward step
    pub fn transition(&mut self, next: InstanceState) -> Result<()> {
        if !self.state.allows(&next) {
            return Err(Error::InvalidTransition {
                service: self.spec.name.clone(),
                from: self.state.label(),
                to: next.label(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a freshly spawned process and mark the instance `Running`
    pub fn attach(&mut self, handle: H) -> Result<()> {
        self.transition(InstanceState::Running)?;
        self.pid = handle.pid();
        self.started_at = Some(Utc::now());
        self.handle = Some(handle);
        Ok(())
    }

    /// Mutable access to the process handle while it is held
    pub fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    /// Record the exit, releasing the handle
    pub fn record_exit(&mut self, status: ExitStatus) -> Result<()> {
        self.transition(InstanceState::Exited { status })?;
        self.handle = None;
        Ok(())
    }

    /// Record a failure, releasing the handle
    pub fn record_failure(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(InstanceState::Failed {
            reason: reason.into(),
        })?;
        self.handle = None;
        Ok(())
    }

    /// Note that the orchestrator asked this instance to stop
    pub fn mark_stop_requested(&mut self) {
        self.stop_requested = true;
    }

    /// Note that the grace period ran out and the instance was killed
    pub fn mark_forced(&mut self) {
        self.forced = true;
    }

    /// Whether the instance had to be killed
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Exit code this instance contributes to the aggregate.
    ///
    /// Signals the orchestrator itself delivered while stopping the group
    /// count as a clean stop; any other signal maps to `128 + signal`.
    pub fn exit_contribution(&self) -> i32 {
        match &self.state {
            InstanceState::Exited { status } => match (status.code, status.signal) {
                (Some(code), _) => code,
                (None, Some(_)) if self.stop_requested => 0,
                (None, Some(signal)) => 128 + signal,
                (None, None) => 1,
            },
            InstanceState::Failed { .. } => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullHandle;

    #[async_trait]
    impl ProcessHandle for NullHandle {
        fn pid(&self) -> Option<u32> {
            Some(42)
        }
        async fn wait(&mut self) -> Result<ExitStatus> {
            Ok(ExitStatus {
                code: Some(0),
                signal: None,
            })
        }
        async fn interrupt(&mut self) -> Result<()> {
            Ok(())
        }
        async fn kill(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn instance() -> ServiceInstance<NullHandle> {
        ServiceInstance::new(ServiceSpec::builder("svc", "true").build())
    }

    #[test]
    fn test_forward_lifecycle() {
        let mut inst = instance();
        assert_eq!(inst.state(), &InstanceState::Pending);

        inst.transition(InstanceState::Starting).unwrap();
        inst.attach(NullHandle).unwrap();
        assert!(inst.is_running());
        assert_eq!(inst.pid(), Some(42));
        assert!(inst.started_at().is_some());

        inst.record_exit(ExitStatus {
            code: Some(0),
            signal: None,
        })
        .unwrap();
        assert!(inst.state().is_terminal());
        assert!(inst.handle_mut().is_none());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut inst = instance();
        inst.transition(InstanceState::Starting).unwrap();
        inst.attach(NullHandle).unwrap();

        let err = inst.transition(InstanceState::Starting).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "running",
                to: "starting",
                ..
            }
        ));
    }

    #[test]
    fn test_cannot_start_twice_or_skip() {
        let mut inst = instance();
        assert!(inst.transition(InstanceState::Running).is_err());
        inst.transition(InstanceState::Starting).unwrap();
        assert!(inst.transition(InstanceState::Starting).is_err());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut inst = instance();
        inst.transition(InstanceState::Starting).unwrap();
        inst.record_failure("no such file").unwrap();
        assert!(inst.record_failure("again").is_err());
        assert_eq!(inst.exit_contribution(), 1);
    }

    #[test]
    fn test_exit_contribution() {
        let exited = |code, signal, stop_requested| {
            let mut inst = instance();
            inst.transition(InstanceState::Starting).unwrap();
            inst.attach(NullHandle).unwrap();
            if stop_requested {
                inst.mark_stop_requested();
            }
            inst.record_exit(ExitStatus { code, signal }).unwrap();
            inst.exit_contribution()
        };

        assert_eq!(exited(Some(0), None, false), 0);
        assert_eq!(exited(Some(3), None, true), 3);
        assert_eq!(exited(None, Some(2), true), 0);
        assert_eq!(exited(None, Some(9), false), 137);
        assert_eq!(instance().exit_contribution(), 0);
    }
}
