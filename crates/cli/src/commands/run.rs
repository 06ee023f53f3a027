//! Run command - execute the engine

use clap::Args;
use colored::Colorize;
use processor::metrics::MetricsRegistry;
use processor::pipeline::{
    build_checkpoint_store, build_source, ExecutorReport, PipelineHealth, StreamExecutor,
};
use sales_kpi_config::AppConfig;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Print Prometheus metrics on exit
    #[arg(long)]
    pub print_metrics: bool,
}

impl RunCommand {
    pub async fn execute(&self, config: AppConfig) -> anyhow::Result<()> {
        let engine = config.engine;
        let registry = MetricsRegistry::with_prefix("sales_kpi");

        let source = build_source(&engine.source)?;
        let store = build_checkpoint_store(&engine.checkpoint);
        let executor = StreamExecutor::from_config(engine, source, store, &registry)?;

        let shutdown = executor.shutdown_handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, finishing in-flight ticks");
                    shutdown.shutdown();
                }
                Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
            }
        });

        let report = executor.run().await?;
        print_report(&report);

        if self.print_metrics {
            println!();
            print!("{}", registry.encode()?);
        }

        if !report.failures.is_empty() {
            anyhow::bail!("{} pipeline(s) halted", report.failures.len());
        }
        Ok(())
    }
}

fn print_report(report: &ExecutorReport) {
    println!();
    println!("{}", "Run summary".bold().cyan());
    println!("{}", "-".repeat(40));
    println!(
        "  events: {}  parse errors: {}  source errors: {}",
        report.ingestion.events, report.ingestion.parse_errors, report.ingestion.source_errors
    );

    for (pipeline, health) in &report.health {
        let status = match health {
            PipelineHealth::Halted { .. } => health.to_string().red(),
            PipelineHealth::Stopped => health.to_string().green(),
            _ => health.to_string().yellow(),
        };
        println!("  {} [{}]", pipeline.bold(), status);

        if let Some(pipeline) = report.pipeline(pipeline) {
            println!(
                "    batches: {}  merged: {}  late dropped: {}  windows sealed: {}",
                pipeline.next_batch_id,
                pipeline.stats.merged,
                pipeline.stats.late_dropped,
                pipeline.stats.records_sealed
            );
        }
    }
}
