//! Error types for orchestration

use thiserror::Error;

/// Problems with the declared service set, detected before anything is spawned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two specs share a name
    #[error("duplicate service name: {0}")]
    DuplicateName(String),

    /// The `depends_on` relation contains a cycle
    #[error("dependency cycle between services: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A service depends on a name that was never declared
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// The declaring service
        service: String,
        /// The missing dependency
        dependency: String,
    },

    /// The launch command has no program
    #[error("service '{0}' has no command")]
    MissingCommand(String),

    /// The program could not be resolved to an executable
    #[error("executable '{program}' for service '{service}' not found")]
    MissingExecutable {
        /// The service that names the program
        service: String,
        /// The program as configured
        program: String,
    },

    /// Specs cannot be replaced once the group has been launched
    #[error("services have already been started")]
    AlreadyStarted,
}

/// Failures while launching the service set
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Spawning one service failed; already started services were stopped
    #[error("failed to spawn service '{name}': {cause}")]
    SpawnFailed {
        /// The service that could not be spawned
        name: String,
        /// The underlying I/O error
        #[source]
        cause: std::io::Error,
    },

    /// `start_all` was called on a group that has already been launched
    #[error("services have already been started")]
    AlreadyStarted,

    /// `start_all` was called before `load_specs`
    #[error("no service specs loaded")]
    NotLoaded,
}

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Launch error
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A service instance was asked to move backwards in its lifecycle
    #[error("service '{service}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// The service name
        service: String,
        /// Current state label
        from: &'static str,
        /// Requested state label
        to: &'static str,
    },

    /// Failed to send a signal to a child
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
