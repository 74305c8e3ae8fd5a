//! # Process orchestrator
//!
//! Launches a fixed set of dependent child processes in dependency order and
//! supervises them as one group: when any service exits, or a stop is
//! requested, every remaining service is interrupted, given a grace period,
//! and then killed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use process_orchestrator::{Orchestrator, OrchestratorOptions, ServiceSpec};
//!
//! # fn example() {
//! let specs = vec![
//!     ServiceSpec::builder("cache", "redis-server").arg("--port").arg("6379").build(),
//!     ServiceSpec::builder("worker", "celery")
//!         .args(["-A", "app.worker", "worker"])
//!         .depends_on("cache")
//!         .build(),
//! ];
//!
//! let outcome = smol::block_on(async {
//!     let mut orchestrator = Orchestrator::local(OrchestratorOptions::default());
//!     orchestrator.forward_signals().ok();
//!     orchestrator.run(specs).await
//! });
//! std::process::exit(outcome.exit_code);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod error;
mod graph;
mod instance;
mod orchestrator;
mod process;
mod spec;
mod stop;
mod summary;

pub use error::{ConfigError, Error, LaunchError, Result};
pub use graph::launch_order;
pub use instance::{InstanceState, ServiceInstance};
pub use orchestrator::{ExitPolicy, Orchestrator, OrchestratorOptions, ServiceExitEvent};
pub use process::{ExitStatus, Launcher, LocalLauncher, LocalProcessHandle, ProcessHandle};
pub use spec::{ServiceSpec, ServiceSpecBuilder};
pub use stop::StopHandle;
pub use summary::{
    EXIT_CONFIG, EXIT_LAUNCH, RunOutcome, RunSummary, ServiceReport, ShutdownTimeout,
};
