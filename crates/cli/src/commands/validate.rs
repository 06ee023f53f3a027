//! Validate command - print the effective pipeline list

use clap::Args;
use colored::Colorize;
use processor::config::SinkConfig;
use sales_kpi_config::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct ValidateCommand {}

impl ValidateCommand {
    /// The configuration was already loaded and validated by the caller
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let engine = &config.engine;
        println!("{} configuration is valid", "✓".green());
        println!();
        println!("  source: {:?}", engine.source.kind);
        println!(
            "  checkpoints: {:?} ({})",
            engine.checkpoint.kind,
            engine.checkpoint.path.display()
        );
        println!(
            "  enriched console: {}",
            if engine.enriched_console.enabled { "on" } else { "off" }
        );
        println!();

        for spec in &engine.specs {
            let metrics: Vec<&str> = spec.metrics.iter().map(|m| m.name()).collect();
            let sink = match &spec.sink {
                SinkConfig::Console { truncate } => format!("console (truncate: {})", truncate),
                SinkConfig::JsonDirectory { path } => format!("json directory {}", path.display()),
            };

            println!("  {}", spec.id.green().bold());
            println!(
                "    window: {}ms  lateness: {}ms  trigger: {}ms  group by: {}",
                spec.window_size_ms, spec.allowed_lateness_ms, spec.trigger_interval_ms, spec.group_by
            );
            println!("    metrics: {}", metrics.join(", "));
            println!("    sink: {}", sink);
        }
        Ok(())
    }
}
