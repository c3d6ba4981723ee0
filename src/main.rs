use std::io::{self, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "diagram-ar",
    version,
    about = "Extract AR-ready components from technical diagram images"
)]
struct Cli {
    /// Diagram image to analyze (png/jpeg/gif/bmp/webp/tiff). Reads stdin when omitted.
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Expected component label; repeat in detection order
    #[arg(long = "hint")]
    hints: Vec<String>,

    /// Append proximity relationships to the output
    #[arg(long = "with-relationships")]
    with_relationships: bool,

    /// Serve the HTTP API instead (optional bind address, default from settings)
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    diagram_ar::logging::init(cli.verbose)?;

    let input = if cli.server.is_none() && cli.data.is_none() && !io::stdin().is_terminal() {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let output = diagram_ar::run(
        diagram_ar::Config {
            data: cli.data,
            hints: cli.hints,
            with_relationships: cli.with_relationships,
            server: cli.server,
            settings_path: cli.read_settings,
        },
        input,
    )
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
