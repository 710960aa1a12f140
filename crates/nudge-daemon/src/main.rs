//! `nudged`: due-date reminders and daily greetings for a JSON task file.
//!
//! Usage:
//!   nudged                      # run until Ctrl-C
//!   nudged tick                 # one pass over the tasks, print the report
//!   nudged personas             # list available personas

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nudge_agent::composer::MessageComposer;
use nudge_agent::persona::PersonaRegistry;
use nudge_channels::{ChannelDispatcher, FanoutDispatcher};
use nudge_core::config::NudgeConfig;
use nudge_core::types::TaskUpdate;
use nudge_scheduler::{NotificationLedger, RecurrenceCalculator, ReminderScheduler};

mod store;

use store::JsonTaskStore;

#[derive(Parser)]
#[command(name = "nudged", version, about = "Persona-voiced task reminders")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file path (default: $NUDGE_CONFIG or ~/.nudge/nudge.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Task file path (default: ~/.nudge/tasks.json)
    #[arg(short, long, global = true)]
    tasks: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Evaluate every task once and exit
    Tick,
    /// List built-in and configured personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nudged=info,nudge_scheduler=info,nudge_agent=info,nudge_channels=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("NUDGE_CONFIG").ok());
    let config = NudgeConfig::load_or_default(config_path.as_deref());

    match cli.command.unwrap_or(Command::Run) {
        Command::Personas => {
            let registry = PersonaRegistry::new(config.persona.custom.clone());
            for id in registry.ids() {
                let marker = if id == config.persona.active { "*" } else { " " };
                println!("{marker} {id}");
            }
            Ok(())
        }
        Command::Tick => {
            let mut scheduler = build_scheduler(&config, cli.tasks.as_deref())?;
            let report = scheduler.run_tick_now().await?;
            scheduler.stop().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run => {
            info!(version = env!("CARGO_PKG_VERSION"), "nudged starting");
            let mut scheduler = build_scheduler(&config, cli.tasks.as_deref())?;
            scheduler.run_tick_now().await?;

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            scheduler.stop().await;
            Ok(())
        }
    }
}

/// Wire ledger, composer, channels and the task store into a running scheduler.
fn build_scheduler(config: &NudgeConfig, tasks_path: Option<&str>) -> Result<ReminderScheduler> {
    let ledger = NotificationLedger::open(&config.database.path)?;

    let composer = Arc::new(MessageComposer::from_config(config));
    let dispatcher = FanoutDispatcher::from_config(&config.channels);
    let channels = dispatcher.enabled_channels();
    if channels.is_empty() {
        tracing::warn!("no delivery channel enabled; events will be recorded but not sent");
    } else {
        info!(channels = ?channels, "delivery channels ready");
    }

    let calc = RecurrenceCalculator::new(config.schedule.offset());
    let tasks_path = tasks_path
        .map(String::from)
        .unwrap_or_else(store::default_tasks_path);
    let store = Arc::new(JsonTaskStore::open(&tasks_path, calc)?);
    info!(path = %store.path().display(), "task store ready");

    let mut scheduler = ReminderScheduler::new(ledger, composer, Arc::new(dispatcher));
    let source = store.clone();
    scheduler.start(
        move || source.snapshot(),
        move |updates: Vec<TaskUpdate>| store.apply(updates),
        config,
    );
    Ok(scheduler)
}
