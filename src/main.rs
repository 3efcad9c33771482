// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use bovi_flow::bus::events::{
    FLOW_COMPLETED, FLOW_ERROR, FLOW_STARTED, FLOW_STOPPED, NODE_EXECUTED, UI_ACTION_OVERRIDE,
    UI_COUNTDOWN_TICK,
};
use bovi_flow::bus::{timer_event, BusEvent, EventBus, TimerPhase};
use bovi_flow::flow::{FlowLoader, FlowRunner, Mode};
use bovi_flow::RunnerConfig;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow to completion and print its node outputs
    Run {
        /// Path to the flow file (.json, .yaml or .yml)
        #[arg(short, long)]
        file: PathBuf,

        /// JSON object merged over the flow's context
        #[arg(short, long)]
        context: Option<String>,

        /// Execute timed nodes immediately instead of counting down
        #[arg(long)]
        no_timed_defaults: bool,

        /// Give up if the flow has not finished after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Load and validate a flow without running it
    Validate {
        /// Path to the flow file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            context,
            no_timed_defaults,
            timeout_secs,
        } => {
            let mut config = RunnerConfig::from_env()?;
            if no_timed_defaults {
                config = config.with_timed_defaults(false);
            }
            let overrides = context
                .map(|raw| serde_json::from_str::<Map<String, Value>>(&raw))
                .transpose()
                .context("--context must be a JSON object")?;

            let spec = FlowLoader::new()
                .load_flow_file(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let flow_id = spec.id.clone();

            let bus = EventBus::new();
            log_events(&bus);
            let mut finished = watch_finish(&bus, &flow_id);

            let runner = FlowRunner::new(bus, config);
            runner.load_flow(spec)?;
            if let Err(e) = runner.start_flow(&flow_id, overrides) {
                bail!("Flow {} failed: {}", flow_id, e);
            }

            let outcome =
                tokio::time::timeout(Duration::from_secs(timeout_secs), finished.recv()).await;
            match outcome {
                Ok(Some(BusEvent::FlowCompleted { outputs, .. })) => {
                    let sorted: BTreeMap<String, Value> = outputs.into_iter().collect();
                    println!("{}", serde_json::to_string_pretty(&sorted)?);
                }
                Ok(Some(BusEvent::FlowError {
                    node_id, message, ..
                })) => {
                    bail!(
                        "Flow {} failed at {}: {}",
                        flow_id,
                        node_id.as_deref().unwrap_or("<unknown>"),
                        message
                    );
                }
                Ok(_) => bail!("Flow {} ended without a result", flow_id),
                Err(_) => {
                    runner.stop_flow(&flow_id)?;
                    bail!("Flow {} did not finish within {}s", flow_id, timeout_secs);
                }
            }
        }
        Commands::Validate { file } => {
            let spec = FlowLoader::new()
                .load_flow_file(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            println!(
                "Flow '{}' is valid: {} nodes, {} edges",
                spec.id,
                spec.nodes.len(),
                spec.edges.len()
            );
        }
    }

    Ok(())
}

/// Log every event the runner and timers publish
fn log_events(bus: &EventBus) {
    let mut names: Vec<String> = [
        FLOW_STARTED,
        FLOW_COMPLETED,
        FLOW_ERROR,
        FLOW_STOPPED,
        UI_COUNTDOWN_TICK,
        UI_ACTION_OVERRIDE,
        NODE_EXECUTED,
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    for mode in Mode::ALL {
        for phase in [
            TimerPhase::Started,
            TimerPhase::Cancelled,
            TimerPhase::Applied,
        ] {
            names.push(timer_event(mode, phase));
        }
    }

    for name in names {
        bus.on(name, |event| log::info!("{} {}", event.name(), event.to_json()));
    }
}

/// Channel receiving the terminal event of `flow_id`
fn watch_finish(bus: &EventBus, flow_id: &str) -> mpsc::UnboundedReceiver<BusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for name in [FLOW_COMPLETED, FLOW_ERROR] {
        let tx = tx.clone();
        let flow_id = flow_id.to_string();
        bus.on(name, move |event| {
            if event.flow_id() == flow_id {
                let _ = tx.send(event.clone());
            }
        });
    }
    rx
}
