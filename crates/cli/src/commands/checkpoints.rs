//! Checkpoints command - inspect stored pipeline progress

use clap::Args;
use colored::Colorize;
use processor::pipeline::build_checkpoint_store;
use processor::state::CheckpointStore;
use sales_kpi_config::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct CheckpointsCommand {}

impl CheckpointsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let store = build_checkpoint_store(&config.engine.checkpoint);

        println!("{}", "Pipeline checkpoints".bold().cyan());
        println!("{}", "-".repeat(40));

        for spec in &config.engine.specs {
            match store.load(&spec.id).await? {
                Some(checkpoint) => {
                    println!("  {}", spec.id.green().bold());
                    println!("    next batch: {}", checkpoint.next_batch_id);
                    println!("    sealed through: {}", checkpoint.sealed_through);
                    println!("    resume offsets: {}", checkpoint.source_offsets);
                    println!("    high offsets: {}", checkpoint.source_high);
                    println!("    committed at: {}", checkpoint.committed_at);
                }
                None => println!("  {} {}", spec.id.bold(), "(no checkpoint)".dimmed()),
            }
        }
        Ok(())
    }
}
