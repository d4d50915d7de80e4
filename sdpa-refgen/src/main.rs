//! Command-line entry point for the reference generator.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use sdpa_refgen::cases;
use sdpa_refgen::embeddings::ModelFamily;

#[derive(Parser, Debug)]
#[command(name = "sdpa-refgen", about = "Reference data generator for attention validation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the case catalog and write the reference document.
    Generate {
        /// Where to write the document.
        #[arg(long, default_value = "sdpa.json")]
        output: PathBuf,
    },
    /// List the embedding model families and their extraction strategies.
    Families,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate { output } => {
            let document = cases::run_catalog(&cases::catalog())?;
            document.write_to(&output)?;
            info!(
                cases = document.test_cases.len(),
                path = %output.display(),
                "reference document written"
            );
        }
        Command::Families => {
            for family in ModelFamily::ALL {
                let strategy = family.strategy();
                println!(
                    "{:<18} pooling={:?} truncate={:?} normalize={}",
                    family.tag(),
                    strategy.pooling,
                    strategy.truncate_dim,
                    strategy.normalize
                );
            }
        }
    }
    Ok(())
}
