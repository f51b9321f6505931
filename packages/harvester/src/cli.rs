//! Command-line interface for the harvester.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{HarvesterConfig, RegistryKind};
use crate::error::Result;
use crate::harvester::harvest;

/// FSA Harvester - Export certificates and declarations from the FSA registry.
#[derive(Parser)]
#[command(name = "fsa-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest the certificate register.
    Certificates(RunArgs),
    /// Harvest the declaration register.
    Declarations(RunArgs),
}

/// Overrides for the environment configuration.
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Earliest end date (overrides MIN_END_DATE)
    #[arg(long)]
    pub min_end_date: Option<String>,

    /// Latest end date (overrides MAX_END_DATE)
    #[arg(long)]
    pub max_end_date: Option<String>,

    /// Comma-separated regulation codes, e.g. 017,020 (overrides IDS_TECH_REG)
    #[arg(long)]
    pub tech_reg: Option<String>,

    /// Directory for caches and exports (overrides FSA_DOWNLOADS_DIR)
    #[arg(long)]
    pub downloads_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Flag values keyed by the environment variable they shadow.
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        if let Some(v) = &self.min_end_date {
            map.insert("MIN_END_DATE", v.clone());
        }
        if let Some(v) = &self.max_end_date {
            map.insert("MAX_END_DATE", v.clone());
        }
        if let Some(v) = &self.tech_reg {
            map.insert("IDS_TECH_REG", v.clone());
        }
        if let Some(v) = &self.downloads_dir {
            map.insert("FSA_DOWNLOADS_DIR", v.display().to_string());
        }
        map
    }

    /// Build the run configuration; flags win over the environment.
    pub fn load_config(&self) -> Result<HarvesterConfig> {
        let overrides = self.overrides();
        HarvesterConfig::from_env(|name| overrides.get(name).cloned())
    }
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let (kind, args) = match cli.command {
        Commands::Certificates(args) => (RegistryKind::Certificates, args),
        Commands::Declarations(args) => (RegistryKind::Declarations, args),
    };

    let config = args.load_config()?;

    harvest_command(&config, kind)
}

/// Execute one harvest run.
fn harvest_command(config: &HarvesterConfig, kind: RegistryKind) -> Result<()> {
    println!(
        "{} {} with end dates {} to {}",
        style("Harvesting").bold(),
        style(kind.as_str()).cyan(),
        style(config.min_end_date).green(),
        style(config.max_end_date).green()
    );
    println!();

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {pos}/{len}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let summary = match harvest(config, kind, &pb) {
        Ok(summary) => summary,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    println!("  Listed: {}", summary.listed);
    println!("  Exported: {}", style(summary.rows).green());
    println!();
    println!(
        "{} {}",
        style("Listing:").green().bold(),
        summary.listing_path.display()
    );
    println!(
        "{} {}",
        style("Saved to:").green().bold(),
        summary.output_path.display()
    );

    Ok(())
}
