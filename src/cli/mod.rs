//! Command-line interface.
//!
//! Thin glue over the engine: loads configuration, wires the services
//! together, seeds a demonstration workload, and renders status output.
//! No scheduling or aggregation logic lives here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use console::style;
use tokio::sync::watch;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ItemPriority, ProducerSnapshot, WorkItem};
use crate::domain::ports::StatusProducer;
use crate::infrastructure::config::Config;
use crate::services::{
    AggregationBus, AggregationConfig, EngineHealthProducer, EventBus, LevelMachine, PlanExecutor,
    PlanScheduler, ProducerSet, SchedulerConfig, StageLibrary, ValueBoard, WorkItemRegistry,
};

/// Stagecraft: staged work-item execution with telemetry aggregation.
#[derive(Debug, Parser)]
#[command(name = "stagecraft", version, about)]
pub struct Cli {
    /// Path to a configuration file (defaults to hierarchical loading)
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the engine with a demonstration workload
    Run(RunArgs),
}

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after this many seconds (runs until ctrl-c when omitted)
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

/// A demo producer whose health ramps deterministically toward a ceiling.
struct RampProducer {
    id: String,
    interval: Duration,
    base: f64,
    slope: f64,
    ticks: AtomicU64,
}

impl RampProducer {
    fn new(id: &str, interval_ms: u64, base: f64, slope: f64) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            interval: Duration::from_millis(interval_ms),
            base,
            slope,
            ticks: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl StatusProducer for RampProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn tick_interval(&self) -> Duration {
        self.interval
    }

    async fn snapshot(&self) -> DomainResult<ProducerSnapshot> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        let health = self.slope.mul_add(n as f64, self.base);
        Ok(ProducerSnapshot::new(&self.id, health))
    }
}

fn demo_work_items() -> Vec<WorkItem> {
    vec![
        WorkItem::new("Close index consistency gap", "indexing", 55.0, 80.0)
            .with_priority(ItemPriority::Critical)
            .with_scores(7, 3)
            .with_estimated_duration_ms(4_000),
        WorkItem::new("Shrink p99 query latency", "latency", 40.0, 70.0)
            .with_priority(ItemPriority::High)
            .with_scores(6, 4)
            .with_estimated_duration_ms(6_000),
        WorkItem::new("Raise cache hit rate", "caching", 62.0, 85.0)
            .with_priority(ItemPriority::High)
            .with_scores(4, 2)
            .with_estimated_duration_ms(3_000),
        WorkItem::new("Compact cold segments", "storage", 30.0, 55.0)
            .with_priority(ItemPriority::Medium)
            .with_scores(5, 3)
            .with_estimated_duration_ms(8_000),
        WorkItem::new("Probe adaptive batching", "batching", 10.0, 45.0)
            .with_priority(ItemPriority::Experimental)
            .with_scores(8, 7)
            .with_estimated_duration_ms(10_000),
    ]
}

/// Execute the run command.
pub async fn run(args: RunArgs, config: Config, json: bool) -> Result<()> {
    let event_bus = Arc::new(EventBus::default());
    let registry = Arc::new(WorkItemRegistry::new());
    let value_board = Arc::new(ValueBoard::new());
    let executor = Arc::new(PlanExecutor::new(
        Arc::new(StageLibrary::builtin()),
        value_board.clone(),
    ));
    let scheduler = Arc::new(PlanScheduler::new(
        registry.clone(),
        executor,
        event_bus.clone(),
        SchedulerConfig {
            tick_interval: Duration::from_millis(config.scheduler.tick_interval_ms),
            grace: Duration::from_millis(config.scheduler.grace_ms),
            top_k: config.scheduler.top_k,
        },
    ));

    let level_machine = LevelMachine::new(config.levels.thresholds.clone())
        .map_err(|e| anyhow::anyhow!("invalid level thresholds: {e}"))?;
    let aggregation = Arc::new(AggregationBus::new(
        level_machine,
        crate::domain::models::default_property_rules(),
        event_bus.clone(),
        AggregationConfig {
            contribution_increment: config.aggregation.contribution_increment,
            history_cap: config.aggregation.history_cap,
            ..Default::default()
        },
    ));

    for item in demo_work_items() {
        value_board.seed(item.category.clone(), item.current_value).await;
        scheduler.submit_work_item(item).await?;
    }

    // Producer intervals are deliberately unsynchronized.
    let mut producers = ProducerSet::new();
    producers.register(RampProducer::new("query-path", 250, 35.0, 1.5));
    producers.register(RampProducer::new("storage-path", 900, 25.0, 2.0));
    producers.register(RampProducer::new("replication", 2_000, 50.0, 3.0));
    producers.register(Arc::new(EngineHealthProducer::new(
        scheduler.clone(),
        Duration::from_millis(1_500),
    )));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (bus_tx, bus_rx) = aggregation.channel();

    let producer_handles = producers.spawn_all(bus_tx, shutdown_rx.clone());
    let bus_handle = {
        let aggregation = aggregation.clone();
        tokio::spawn(async move { aggregation.run(bus_rx).await })
    };
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    match args.duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    // Send fails only when every receiver is already gone.
    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;
    for handle in producer_handles {
        handle.await?;
    }
    // All senders are gone once the producer loops exit; the bus drains
    // and its run loop returns.
    bus_handle.await?;

    render_report(&scheduler, &aggregation, &value_board, json).await
}

async fn render_report(
    scheduler: &PlanScheduler,
    aggregation: &AggregationBus,
    value_board: &ValueBoard,
    json: bool,
) -> Result<()> {
    let scheduler_state = scheduler.state().await;
    let aggregate = aggregation.state().await;
    let board = value_board.snapshot().await;

    if json {
        let report = serde_json::json!({
            "scheduler": scheduler_state,
            "aggregate": {
                "combined_score": aggregate.combined_score,
                "level": aggregate.level,
                "emergent_properties": aggregate.emergent_properties,
                "contributions": aggregate.contributions(),
            },
            "value_board": board,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", style("Plans").bold().underlined());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Title", "Status", "Stage", "Progress"]);
    for summary in scheduler_state
        .completed_plans
        .iter()
        .chain(scheduler_state.active_plans.iter())
    {
        table.add_row(vec![
            summary.title.clone(),
            summary.status.to_string(),
            summary.stage.to_string(),
            format!("{:.0}%", summary.progress),
        ]);
    }
    println!("{table}");

    println!("\n{}", style("Aggregate").bold().underlined());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Combined score", "Level", "Emergent properties"]);
    table.add_row(vec![
        format!("{:.1}", aggregate.combined_score),
        aggregate.level.to_string(),
        aggregate.emergent_properties.join(", "),
    ]);
    println!("{table}");

    println!(
        "\n{} succeeded, {} failed, {} cycles, efficiency {:.0}%",
        scheduler_state.metrics.succeeded_plans,
        scheduler_state.metrics.failed_plans,
        scheduler_state.metrics.cycles_completed,
        scheduler_state.metrics.efficiency(),
    );
    Ok(())
}
