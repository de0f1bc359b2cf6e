//! Starweave session runner.
//!
//! Wires one orchestration session end-to-end against a scripted planner
//! and a simulated device pool, and prints the final snapshot as JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use starweave_core::BusEvent;
use starweave_orchestrator::{
    EventBus, EventObserver, ModificationSynchronizer, ObserverError, OrchestratorConfig,
    PlannerAgent, Scheduler, SessionStatus,
};

mod sim;

use sim::{ScriptedPlanner, SimulatedDispatcher};

/// Run a Starweave session against simulated devices
#[derive(Parser)]
#[command(name = "starweave")]
#[command(about = "Orchestrate a constellation of tasks", long_about = None)]
struct Cli {
    /// User request; semicolon-separated steps become sequential tasks
    request: String,

    /// Maximum concurrently dispatched tasks
    #[arg(long, default_value_t = 4)]
    max_concurrent: usize,

    /// Number of simulated devices in the pool
    #[arg(long, default_value_t = 2)]
    devices: usize,

    /// Simulated execution time per task, in milliseconds
    #[arg(long, default_value_t = 250)]
    task_delay_ms: u64,
}

/// Observer that narrates bus traffic to the log.
struct ProgressObserver;

#[async_trait]
impl EventObserver for ProgressObserver {
    async fn on_event(&self, event: &BusEvent) -> Result<(), ObserverError> {
        match event {
            BusEvent::Task(completion) => {
                info!(
                    task_id = %completion.task_id,
                    status = ?completion.status,
                    "Task event"
                );
            }
            BusEvent::Graph(change) => {
                info!(
                    constellation_id = %change.constellation_id,
                    kind = ?change.kind,
                    tasks = change.new.task_count(),
                    "Graph event"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "progress"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = OrchestratorConfig {
        max_concurrent_tasks: cli.max_concurrent,
        ..OrchestratorConfig::default()
    };

    let bus = Arc::new(EventBus::new());
    bus.subscribe(Arc::new(ProgressObserver)).await;

    let dispatcher = Arc::new(SimulatedDispatcher::new(
        cli.devices,
        Duration::from_millis(cli.task_delay_ms),
    ));
    let scheduler = Arc::new(Scheduler::new(
        config.clone(),
        Arc::clone(&bus),
        dispatcher,
    ));
    let synchronizer = Arc::new(ModificationSynchronizer::new());

    let agent = PlannerAgent::new(
        config,
        scheduler,
        bus,
        Some(synchronizer),
        Arc::new(ScriptedPlanner),
        cli.request,
    );

    let outcome = agent.run().await;

    let status = match outcome.status {
        SessionStatus::Finished => "finished",
        SessionStatus::Failed => "failed",
        SessionStatus::Cancelled => "cancelled",
    };
    let report = serde_json::json!({
        "status": status,
        "statistics": outcome.statistics,
        "constellation": outcome.constellation,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
