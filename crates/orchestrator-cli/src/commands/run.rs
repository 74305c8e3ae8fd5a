use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use process_orchestrator::{
    InstanceState, Orchestrator, OrchestratorOptions, RunSummary, ServiceSpec,
};
use tracing::{info, warn};

pub async fn run(
    specs: Vec<ServiceSpec>,
    options: OrchestratorOptions,
    json: bool,
) -> Result<i32> {
    let mut orchestrator = Orchestrator::local(options);

    if let Err(e) = orchestrator.forward_signals() {
        warn!("Could not install signal handlers: {}", e);
    }

    info!("Starting {} services. Press Ctrl+C to stop.", specs.len());
    let outcome = orchestrator.run(specs).await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("Failed to serialize summary")?;
        println!("{}", rendered);
    } else {
        display_summary(&outcome.summary);
    }

    if outcome.success() {
        info!("All services stopped cleanly");
    } else {
        warn!("Exiting with code {}", outcome.exit_code);
    }
    Ok(outcome.exit_code)
}

fn display_summary(summary: &RunSummary) {
    if let Some(error) = &summary.error {
        eprintln!("Error: {}", error);
    }
    if summary.services.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "PID", "STATUS", "EXIT", "NOTE"]);

    for report in &summary.services {
        let (status_str, status_color) = match &report.state {
            InstanceState::Pending => ("not started", Color::DarkGrey),
            InstanceState::Starting | InstanceState::Running => ("running", Color::Yellow),
            InstanceState::Exited { .. } if report.exit_code == 0 => ("stopped", Color::Green),
            InstanceState::Exited { .. } => ("exited", Color::Red),
            InstanceState::Failed { .. } => ("failed", Color::Red),
        };

        let note = match &report.state {
            InstanceState::Exited { status } if report.forced => {
                format!("{}, killed after grace period", status)
            }
            InstanceState::Exited { status } => status.to_string(),
            InstanceState::Failed { reason } => reason.clone(),
            _ => "-".to_string(),
        };

        table.add_row(vec![
            Cell::new(&report.name),
            Cell::new(report.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(status_str).fg(status_color),
            Cell::new(report.exit_code),
            Cell::new(note),
        ]);
    }

    println!("{}", table);
}
