use crate::config::DEFAULT_WATERMARK_LABEL;
use crate::load_config::load_config;
use crate::server::serve;
use crate::watermark::write_template;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for openreferee-server: run the editing service or prepare its assets.
#[derive(Parser)]
#[clap(
    name = "openreferee-server",
    version,
    about = "Reference OpenReferee editing service"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the OpenReferee HTTP API using the given config file
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Render a watermark template PDF
    RenderWatermark {
        /// Where to write the template
        #[clap(long)]
        output: PathBuf,
        /// Text stamped on every page
        #[clap(long, default_value = DEFAULT_WATERMARK_LABEL)]
        text: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(config)?;
            serve(config).await
        }
        Commands::RenderWatermark { output, text } => {
            write_template(&output, &text)?;
            tracing::info!(output = %output.display(), "Watermark template written");
            println!("Wrote watermark template to {}", output.display());
            Ok(())
        }
    }
}
