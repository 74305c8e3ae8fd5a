//! Final report of an orchestrator run

use crate::instance::InstanceState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Exit code for configuration errors (`EX_CONFIG`)
pub const EXIT_CONFIG: i32 = 78;

/// Exit code for spawn failures (`EX_OSERR`)
pub const EXIT_LAUNCH: i32 = 71;

/// A service that ignored the graceful stop and had to be killed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownTimeout {
    /// Service name
    pub service: String,
    /// Grace period that elapsed
    #[serde(with = "duration_secs")]
    pub grace: Duration,
}

/// Terminal record of one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    /// Service name
    pub name: String,
    /// Process ID, if it was spawned
    pub pid: Option<u32>,
    /// Declared port
    pub port: Option<u16>,
    /// When the process was spawned
    pub started_at: Option<DateTime<Utc>>,
    /// Final state
    #[serde(flatten)]
    pub state: InstanceState,
    /// Whether the orchestrator had to kill it
    pub forced: bool,
    /// Code this service contributed to the aggregate
    pub exit_code: i32,
}

/// Everything a caller needs to explain an orchestrator run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Services in launch order
    pub services: Vec<ServiceReport>,
    /// Services that had to be force-killed
    pub timeouts: Vec<ShutdownTimeout>,
    /// Whether an external stop was requested
    pub stop_requested: bool,
    /// Why the run ended abnormally: a configuration or launch error, or a
    /// service that stopped on its own
    pub error: Option<String>,
}

/// Result of [`Orchestrator::run`](crate::Orchestrator::run)
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Aggregate exit code
    pub exit_code: i32,
    /// Per-service detail
    pub summary: RunSummary,
}

impl RunOutcome {
    /// Whether every service finished cleanly
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExitStatus;

    #[test]
    fn test_report_serializes_flat_state() {
        let report = ServiceReport {
            name: "cache".to_string(),
            pid: Some(10),
            port: Some(6379),
            started_at: None,
            state: InstanceState::Exited {
                status: ExitStatus {
                    code: Some(1),
                    signal: None,
                },
            },
            forced: false,
            exit_code: 1,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "exited");
        assert_eq!(json["status"]["code"], 1);
        assert_eq!(json["port"], 6379);
    }

    #[test]
    fn test_timeout_grace_in_seconds() {
        let timeout = ShutdownTimeout {
            service: "worker".to_string(),
            grace: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&timeout).unwrap();
        assert_eq!(json["grace"], 1.5);
    }
}
