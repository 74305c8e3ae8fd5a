//! Static service descriptions.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// An immutable description of one service to launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    /// Unique service name
    pub name: String,
    /// Executable to run
    pub program: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Working directory; inherits the orchestrator's when unset
    pub working_dir: Option<PathBuf>,
    /// Variables layered over the inherited environment
    pub env: BTreeMap<String, String>,
    /// Services that must be spawned before this one
    pub depends_on: BTreeSet<String>,
    /// Listening port, for diagnostics only
    pub port: Option<u16>,
}

impl ServiceSpec {
    /// Create a builder for a service running `program`
    pub fn builder(name: impl Into<String>, program: impl Into<String>) -> ServiceSpecBuilder {
        ServiceSpecBuilder(ServiceSpec {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            port: None,
        })
    }

    /// The full command line, for logging
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Look up an override, falling back to the inherited environment
    pub fn effective_var(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Resolve the program to an executable path the way `execvp` would.
    ///
    /// Relative paths containing a separator are taken against the working
    /// directory. Bare names are searched on the effective `PATH`, so a
    /// per-service `PATH` override is honoured.
    pub fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if self.program.contains(std::path::MAIN_SEPARATOR) {
            let candidate = match (&self.working_dir, program.is_relative()) {
                (Some(dir), true) => dir.join(program),
                _ => program.to_path_buf(),
            };
            return is_executable(&candidate).then_some(candidate);
        }

        let path = self.effective_var("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Builder wrapper for more ergonomic spec construction
pub struct ServiceSpecBuilder(ServiceSpec);

impl ServiceSpecBuilder {
    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.0.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment override
    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.0.env.insert(key.into(), val.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.0.working_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Declare a dependency on another service
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.0.depends_on.insert(service.into());
        self
    }

    /// Record the service's port
    pub fn port(mut self, port: u16) -> Self {
        self.0.port = Some(port);
        self
    }

    /// Finish building the service description
    pub fn build(self) -> ServiceSpec {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = ServiceSpec::builder("api", "uvicorn")
            .args(["main:app", "--reload"])
            .env("PORT", "8000")
            .working_dir("/srv/backend")
            .depends_on("cache")
            .port(8000)
            .build();

        assert_eq!(spec.name, "api");
        assert_eq!(spec.command_line(), "uvicorn main:app --reload");
        assert_eq!(spec.env.get("PORT").map(String::as_str), Some("8000"));
        assert_eq!(spec.working_dir.as_deref(), Some(Path::new("/srv/backend")));
        assert!(spec.depends_on.contains("cache"));
        assert_eq!(spec.port, Some(8000));
    }

    #[test]
    fn test_override_wins_over_inherited() {
        let spec = ServiceSpec::builder("svc", "true")
            .env("PATH", "/nowhere")
            .build();
        assert_eq!(spec.effective_var("PATH").as_deref(), Some("/nowhere"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program_on_path() {
        let spec = ServiceSpec::builder("svc", "sh").build();
        assert!(spec.resolve_program().is_some());

        let spec = ServiceSpec::builder("svc", "sh").env("PATH", "/nowhere").build();
        assert!(spec.resolve_program().is_none());

        let spec = ServiceSpec::builder("svc", "/bin/sh").build();
        assert_eq!(spec.resolve_program(), Some(PathBuf::from("/bin/sh")));
    }
}
