use anyhow::Result;
use process_orchestrator::{EXIT_CONFIG, Orchestrator, OrchestratorOptions, ServiceSpec};

pub fn run(specs: Vec<ServiceSpec>) -> Result<i32> {
    let count = specs.len();
    let mut orchestrator = Orchestrator::local(OrchestratorOptions::default());

    match orchestrator.load_specs(specs) {
        Ok(()) => {
            println!(
                "✓ {} services, launch order: {}",
                count,
                orchestrator.launch_order().join(" → ")
            );
            Ok(0)
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            Ok(EXIT_CONFIG)
        }
    }
}
