//! Dependency-ordered launch and group supervision
//!
//! The orchestrator owns every child it spawns. It launches them in
//! dependency order, suspends until any of them exits or a stop is
//! requested, and tears the whole group down before returning.

use crate::error::{ConfigError, LaunchError};
use crate::graph;
use crate::instance::{InstanceState, ServiceInstance};
use crate::process::{ExitStatus, Launcher, LocalLauncher, ProcessHandle};
use crate::spec::ServiceSpec;
use crate::stop::{SignalForwarder, StopHandle, StopSignal};
use crate::summary::{
    EXIT_CONFIG, EXIT_LAUNCH, RunOutcome, RunSummary, ServiceReport, ShutdownTimeout,
};
use futures::future::select_all;
use serde::Serialize;
use smol::Timer;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What the group does when a single service exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Any exit stops every other service
    #[default]
    AllOrNothing,
    /// Keep the rest running until all have exited or a stop is requested
    WaitAll,
}

impl fmt::Display for ExitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitPolicy::AllOrNothing => f.write_str("all-or-nothing"),
            ExitPolicy::WaitAll => f.write_str("wait-all"),
        }
    }
}

impl FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-or-nothing" => Ok(ExitPolicy::AllOrNothing),
            "wait-all" => Ok(ExitPolicy::WaitAll),
            other => Err(format!(
                "unknown exit policy '{}', expected 'all-or-nothing' or 'wait-all'",
                other
            )),
        }
    }
}

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// How long services get to exit after the interrupt
    pub grace: Duration,
    /// Reaction to a single service exiting
    pub policy: ExitPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            policy: ExitPolicy::AllOrNothing,
        }
    }
}

/// What [`Orchestrator::wait_any`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExitEvent {
    /// A service process ended
    Exited {
        /// Service name
        name: String,
        /// How it ended
        status: ExitStatus,
    },
    /// Waiting on a service failed; it is no longer tracked
    Failed {
        /// Service name
        name: String,
        /// The wait error
        reason: String,
    },
    /// An external stop request arrived
    StopRequested,
    /// Nothing is running
    Idle,
}

/// Launches a service set and supervises it as a single unit
pub struct Orchestrator<L: Launcher = LocalLauncher> {
    launcher: L,
    options: OrchestratorOptions,
    /// Instances in launch order
    instances: Vec<ServiceInstance<L::Handle>>,
    loaded: bool,
    started: bool,
    stop_handle: StopHandle,
    stop: StopSignal,
    signals: Option<SignalForwarder>,
    timeouts: Vec<ShutdownTimeout>,
    /// Floor for the aggregate code, raised by config and launch errors and
    /// by a service ending the group on its own
    exit_floor: i32,
    error: Option<String>,
}

impl Orchestrator<LocalLauncher> {
    /// Create an orchestrator that spawns local processes
    pub fn local(options: OrchestratorOptions) -> Self {
        Self::new(LocalLauncher, options)
    }
}

impl<L: Launcher> Orchestrator<L> {
    /// Create an orchestrator using `launcher` to spawn services
    pub fn new(launcher: L, options: OrchestratorOptions) -> Self {
        let (stop_handle, stop) = StopSignal::new();
        Self {
            launcher,
            options,
            instances: Vec::new(),
            loaded: false,
            started: false,
            stop_handle,
            stop,
            signals: None,
            timeouts: Vec::new(),
            exit_floor: 0,
            error: None,
        }
    }

    /// A handle that makes a pending [`wait_any`](Self::wait_any) return
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Turn SIGINT, SIGTERM and SIGHUP into stop requests.
    ///
    /// The handlers stay installed until the orchestrator is dropped.
    pub fn forward_signals(&mut self) -> std::io::Result<()> {
        if self.signals.is_none() {
            self.signals = Some(SignalForwarder::install(self.stop_handle())?);
        }
        Ok(())
    }

    /// Options this orchestrator runs with
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Instances in launch order
    pub fn instances(&self) -> &[ServiceInstance<L::Handle>] {
        &self.instances
    }

    /// Service names in launch order
    pub fn launch_order(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name()).collect()
    }

    /// Validate `specs` and fix the launch order.
    ///
    /// Nothing is spawned here, and on error the previously loaded set is
    /// left untouched.
    pub fn load_specs(&mut self, specs: Vec<ServiceSpec>) -> Result<(), ConfigError> {
        if self.started {
            return Err(ConfigError::AlreadyStarted);
        }

        for spec in &specs {
            if spec.program.trim().is_empty() {
                return Err(ConfigError::MissingCommand(spec.name.clone()));
            }
        }

        let order = graph::launch_order(&specs)?;

        for spec in &specs {
            if spec.resolve_program().is_none() {
                return Err(ConfigError::MissingExecutable {
                    service: spec.name.clone(),
                    program: spec.program.clone(),
                });
            }
        }

        let mut slots: Vec<Option<ServiceSpec>> = specs.into_iter().map(Some).collect();
        self.instances = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(ServiceInstance::new)
            .collect();
        self.loaded = true;

        debug!("Launch order: {}", self.launch_order().join(", "));
        Ok(())
    }

    /// Spawn every service in dependency order.
    ///
    /// On the first spawn failure the remaining services stay `Pending`,
    /// everything already running is shut down, and the failure is returned.
    pub async fn start_all(&mut self) -> Result<(), LaunchError> {
        if !self.loaded {
            return Err(LaunchError::NotLoaded);
        }
        if self.started {
            return Err(LaunchError::AlreadyStarted);
        }
        self.started = true;

        for idx in 0..self.instances.len() {
            let instance = &mut self.instances[idx];
            advance(instance, InstanceState::Starting);

            let spec = instance.spec();
            debug!("Command for {}: {}", spec.name, spec.command_line());

            match self.launcher.launch(spec) {
                Ok(handle) => {
                    let pid = handle.pid().unwrap_or(0);
                    if let Err(e) = instance.attach(handle) {
                        warn!("{}", e);
                    }
                    match instance.spec().port {
                        Some(port) => info!(
                            "Started service '{}' with PID {} (port {})",
                            instance.name(),
                            pid,
                            port
                        ),
                        None => info!("Started service '{}' with PID {}", instance.name(), pid),
                    }
                }
                Err(cause) => {
                    let name = instance.name().to_string();
                    error!("Failed to spawn service '{}': {}", name, cause);
                    if let Err(e) = instance.record_failure(cause.to_string()) {
                        warn!("{}", e);
                    }

                    self.exit_floor = self.exit_floor.max(EXIT_LAUNCH);
                    let grace = self.options.grace;
                    self.shutdown(grace).await;
                    return Err(LaunchError::SpawnFailed { name, cause });
                }
            }
        }

        Ok(())
    }

    /// Suspend until any running service exits or a stop is requested
    pub async fn wait_any(&mut self) -> ServiceExitEvent {
        if self.stop.is_requested() {
            return ServiceExitEvent::StopRequested;
        }

        let waits: Vec<_> = self
            .instances
            .iter_mut()
            .enumerate()
            .filter(|(_, instance)| instance.is_running())
            .filter_map(|(idx, instance)| instance.handle_mut().map(|handle| (idx, handle)))
            .map(|(idx, handle)| Box::pin(async move { (idx, handle.wait().await) }))
            .collect();

        if waits.is_empty() {
            return ServiceExitEvent::Idle;
        }

        let stop = &mut self.stop;
        let observed = futures_lite::future::or(
            async move {
                let ((idx, result), _, _) = select_all(waits).await;
                Some((idx, result))
            },
            async move {
                stop.requested().await;
                None
            },
        )
        .await;

        let Some((idx, result)) = observed else {
            return ServiceExitEvent::StopRequested;
        };

        // A stop that raced this exit means the signal was meant for us too
        let stopping = self.stop.is_requested();
        let instance = &mut self.instances[idx];
        let name = instance.name().to_string();
        if stopping {
            instance.mark_stop_requested();
        }

        match result {
            Ok(status) => {
                if status.success() {
                    info!("Service '{}' exited cleanly", name);
                } else {
                    warn!("Service '{}' exited with {}", name, status);
                }
                if let Err(e) = instance.record_exit(status) {
                    warn!("{}", e);
                }
                ServiceExitEvent::Exited { name, status }
            }
            Err(e) => {
                let reason = e.to_string();
                error!("Lost track of service '{}': {}", name, reason);
                if let Err(e) = instance.record_failure(reason.clone()) {
                    warn!("{}", e);
                }
                ServiceExitEvent::Failed { name, reason }
            }
        }
    }

    /// Stop every running service.
    ///
    /// Each one gets an interrupt, then the group shares `grace` to exit.
    /// Survivors are killed and reaped, so every spawned process is terminal
    /// when this returns. Calling it again once everything is terminal does
    /// nothing.
    pub async fn shutdown(&mut self, grace: Duration) {
        // Dependents first
        let running: Vec<usize> = (0..self.instances.len())
            .rev()
            .filter(|&idx| self.instances[idx].is_running())
            .collect();

        if running.is_empty() {
            debug!("No running services to stop");
            return;
        }

        info!("Stopping {} service(s)", running.len());

        for &idx in &running {
            let instance = &mut self.instances[idx];
            instance.mark_stop_requested();
            let name = instance.name().to_string();
            if let Some(handle) = instance.handle_mut() {
                if let Err(e) = handle.interrupt().await {
                    warn!("Failed to interrupt '{}': {}", name, e);
                }
            }
        }

        let deadline = Instant::now() + grace;
        for &idx in &running {
            let instance = &mut self.instances[idx];
            let name = instance.name().to_string();
            let Some(handle) = instance.handle_mut() else {
                continue;
            };

            let waited = futures_lite::future::or(
                async { Some(handle.wait().await) },
                async {
                    Timer::at(deadline).await;
                    None
                },
            )
            .await;

            let (result, forced) = match waited {
                Some(result) => (result, false),
                None => {
                    warn!(
                        "Service '{}' did not stop within {:?}, killing it",
                        name, grace
                    );
                    if let Err(e) = handle.kill().await {
                        warn!("Failed to kill '{}': {}", name, e);
                    }
                    (handle.wait().await, true)
                }
            };

            if forced {
                instance.mark_forced();
                self.timeouts.push(ShutdownTimeout {
                    service: name.clone(),
                    grace,
                });
            }

            match result {
                Ok(status) => {
                    debug!("Service '{}' stopped with {}", name, status);
                    if let Err(e) = instance.record_exit(status) {
                        warn!("{}", e);
                    }
                }
                Err(e) => {
                    if let Err(e) = instance.record_failure(e.to_string()) {
                        warn!("{}", e);
                    }
                }
            }
        }
    }

    /// Load, launch and supervise `specs` until the group is done
    pub async fn run(&mut self, specs: Vec<ServiceSpec>) -> RunOutcome {
        if let Err(e) = self.load_specs(specs) {
            error!("Invalid service configuration: {}", e);
            self.exit_floor = self.exit_floor.max(EXIT_CONFIG);
            self.error = Some(e.to_string());
            return self.outcome();
        }

        if let Err(e) = self.start_all().await {
            self.error = Some(e.to_string());
            return self.outcome();
        }

        info!(
            "All {} service(s) started, policy {}",
            self.instances.len(),
            self.options.policy
        );

        loop {
            match self.wait_any().await {
                ServiceExitEvent::StopRequested => {
                    info!("Stop requested, shutting down");
                    break;
                }
                ServiceExitEvent::Idle => {
                    info!("All services have exited");
                    break;
                }
                ServiceExitEvent::Exited { name, .. } | ServiceExitEvent::Failed { name, .. } => {
                    if self.options.policy == ExitPolicy::AllOrNothing {
                        if !self.stop.is_requested() {
                            // Nobody asked for this, so the run cannot be clean
                            warn!("Service '{}' ended on its own, stopping the group", name);
                            self.exit_floor = self.exit_floor.max(1);
                            self.error = Some(format!("service '{}' ended unexpectedly", name));
                        }
                        break;
                    }
                }
            }
        }

        let grace = self.options.grace;
        self.shutdown(grace).await;
        self.outcome()
    }

    /// Aggregate exit code from everything recorded so far
    pub fn exit_code(&self) -> i32 {
        self.instances
            .iter()
            .map(|i| i.exit_contribution())
            .fold(self.exit_floor, i32::max)
    }

    /// Snapshot of every instance's state
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            services: self
                .instances
                .iter()
                .map(|i| ServiceReport {
                    name: i.name().to_string(),
                    pid: i.pid(),
                    port: i.spec().port,
                    started_at: i.started_at(),
                    state: i.state().clone(),
                    forced: i.forced(),
                    exit_code: i.exit_contribution(),
                })
                .collect(),
            timeouts: self.timeouts.clone(),
            stop_requested: self.stop.was_requested(),
            error: self.error.clone(),
        }
    }

    fn outcome(&mut self) -> RunOutcome {
        // Latch a request that arrived after the last wait
        self.stop.is_requested();
        let exit_code = self.exit_code();
        RunOutcome {
            exit_code,
            summary: self.summary(),
        }
    }
}

fn advance<H: ProcessHandle>(instance: &mut ServiceInstance<H>, next: InstanceState) {
    if let Err(e) = instance.transition(next) {
        warn!("{}", e);
    }
}
