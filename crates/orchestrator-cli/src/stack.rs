//! The built-in service table.
//!
//! Four services make up the stack: a Redis cache, a Celery worker, the
//! FastAPI backend and the frontend preview server. Everything that varies
//! between machines is read from an enumerated environment variable.

use clap::Args;
use process_orchestrator::ServiceSpec;
use std::path::PathBuf;

/// Settings for the built-in stack
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Application root; service directories are resolved against it
    #[arg(long, env = "ORCH_APP_DIR", default_value = ".", global = true)]
    pub app_dir: PathBuf,

    /// Backend directory, relative to the application root
    #[arg(long, env = "ORCH_BACKEND_DIR", default_value = "backend", global = true)]
    pub backend_dir: PathBuf,

    /// Frontend directory, relative to the application root
    #[arg(long, env = "ORCH_FRONTEND_DIR", default_value = "frontend", global = true)]
    pub frontend_dir: PathBuf,

    /// Redis server executable
    #[arg(long, env = "ORCH_REDIS", default_value = "redis-server", global = true)]
    pub redis: String,

    /// Python interpreter used for the worker and backend
    #[arg(long, env = "ORCH_PYTHON", default_value = "python3", global = true)]
    pub python: String,

    /// npm executable used for the frontend
    #[arg(long, env = "ORCH_NPM", default_value = "npm", global = true)]
    pub npm: String,

    /// Cache server port
    #[arg(long, env = "REDIS_PORT", default_value_t = 6379, global = true)]
    pub redis_port: u16,

    /// Backend bind address
    #[arg(long, env = "BACKEND_HOST", default_value = "0.0.0.0", global = true)]
    pub backend_host: String,

    /// Backend port
    #[arg(long, env = "BACKEND_PORT", default_value_t = 8000, global = true)]
    pub backend_port: u16,

    /// Frontend preview bind address
    #[arg(long, env = "FRONTEND_HOST", default_value = "0.0.0.0", global = true)]
    pub frontend_host: String,

    /// Frontend preview port
    #[arg(long, env = "FRONTEND_PORT", default_value_t = 5000, global = true)]
    pub frontend_port: u16,
}

impl StackArgs {
    fn backend(&self) -> PathBuf {
        self.app_dir.join(&self.backend_dir)
    }

    fn frontend(&self) -> PathBuf {
        self.app_dir.join(&self.frontend_dir)
    }

    fn redis_url(&self) -> String {
        format!("redis://127.0.0.1:{}/0", self.redis_port)
    }

    /// Build the service specs, in the order the old start script used
    pub fn specs(&self) -> Vec<ServiceSpec> {
        vec![
            ServiceSpec::builder("cache", &self.redis)
                .arg("--port")
                .arg(self.redis_port.to_string())
                .args(["--bind", "127.0.0.1"])
                .working_dir(&self.app_dir)
                .port(self.redis_port)
                .build(),
            ServiceSpec::builder("worker", &self.python)
                .args(["-m", "celery", "-A", "app.worker", "worker", "--loglevel=info"])
                .working_dir(self.backend())
                .env("REDIS_URL", self.redis_url())
                .depends_on("cache")
                .build(),
            ServiceSpec::builder("backend", &self.python)
                .args(["-m", "uvicorn", "app.main:app"])
                .args(["--host", self.backend_host.as_str()])
                .arg("--port")
                .arg(self.backend_port.to_string())
                .working_dir(self.backend())
                .env("REDIS_URL", self.redis_url())
                .env("HOST", &self.backend_host)
                .env("PORT", self.backend_port.to_string())
                .depends_on("cache")
                .port(self.backend_port)
                .build(),
            ServiceSpec::builder("frontend", &self.npm)
                .args(["run", "preview", "--"])
                .args(["--host", self.frontend_host.as_str()])
                .arg("--port")
                .arg(self.frontend_port.to_string())
                .working_dir(self.frontend())
                .env("HOST", &self.frontend_host)
                .env("PORT", self.frontend_port.to_string())
                .env(
                    "VITE_API_URL",
                    format!("http://127.0.0.1:{}", self.backend_port),
                )
                .depends_on("backend")
                .port(self.frontend_port)
                .build(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use process_orchestrator::launch_order;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        stack: StackArgs,
    }

    fn parse(args: &[&str]) -> StackArgs {
        let argv = std::iter::once("test").chain(args.iter().copied());
        Harness::parse_from(argv).stack
    }

    #[test]
    fn test_stack_is_acyclic_and_ordered() {
        let specs = parse(&[
            "--redis-port",
            "6379",
            "--backend-port",
            "8000",
            "--frontend-port",
            "5000",
        ])
        .specs();
        let order: Vec<_> = launch_order(&specs)
            .unwrap()
            .into_iter()
            .map(|i| specs[i].name.as_str())
            .collect();
        assert_eq!(order, vec!["cache", "worker", "backend", "frontend"]);
    }

    #[test]
    fn test_ports_and_dirs_flow_into_specs() {
        let specs = parse(&[
            "--app-dir",
            "/srv/app",
            "--backend-port",
            "9000",
            "--frontend-port",
            "3000",
            "--frontend-host",
            "127.0.0.1",
        ])
        .specs();

        let backend = specs.iter().find(|s| s.name == "backend").unwrap();
        assert_eq!(backend.port, Some(9000));
        assert_eq!(
            backend.working_dir.as_deref(),
            Some(std::path::Path::new("/srv/app/backend"))
        );
        assert!(backend.args.contains(&"9000".to_string()));

        let frontend = specs.iter().find(|s| s.name == "frontend").unwrap();
        assert_eq!(frontend.env.get("PORT").map(String::as_str), Some("3000"));
        assert_eq!(frontend.env.get("HOST").map(String::as_str), Some("127.0.0.1"));
        assert_eq!(
            frontend.env.get("VITE_API_URL").map(String::as_str),
            Some("http://127.0.0.1:9000")
        );
        assert!(frontend.depends_on.contains("backend"));
    }
}
