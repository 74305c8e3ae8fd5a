use anyhow::{Context, Result};
use comfy_table::Table;
use process_orchestrator::{EXIT_CONFIG, Orchestrator, OrchestratorOptions, ServiceSpec};
use serde::Serialize;

#[derive(Serialize)]
struct PlannedService<'a> {
    order: usize,
    #[serde(flatten)]
    spec: &'a ServiceSpec,
}

pub fn run(specs: Vec<ServiceSpec>, json: bool) -> Result<i32> {
    let mut orchestrator = Orchestrator::local(OrchestratorOptions::default());
    if let Err(e) = orchestrator.load_specs(specs) {
        eprintln!("✗ {}", e);
        return Ok(EXIT_CONFIG);
    }

    let planned: Vec<_> = orchestrator
        .instances()
        .iter()
        .enumerate()
        .map(|(i, instance)| PlannedService {
            order: i + 1,
            spec: instance.spec(),
        })
        .collect();

    if json {
        let rendered =
            serde_json::to_string_pretty(&planned).context("Failed to serialize plan")?;
        println!("{}", rendered);
    } else {
        display_plan(&planned);
    }
    Ok(0)
}

fn display_plan(planned: &[PlannedService<'_>]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "SERVICE", "COMMAND", "DIRECTORY", "DEPENDS ON", "PORT"]);

    for entry in planned {
        let spec = entry.spec;
        let deps: Vec<&str> = spec.depends_on.iter().map(String::as_str).collect();
        table.add_row(vec![
            entry.order.to_string(),
            spec.name.clone(),
            spec.command_line(),
            spec.working_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            if deps.is_empty() { "-".to_string() } else { deps.join(", ") },
            spec.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{}", table);
}
