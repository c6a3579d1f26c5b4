//! PixelView CLI - headless harness for the live classification overlay.
//!
//! Drives the `pixelview` library the way a slide viewer would: a simulated
//! paint loop, a UI event queue and a background worker pool.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pixelview::config::ConfigFile;
use pixelview::logging::{init_logging, LoggingOptions};
use tracing::{debug, warn};

use commands::config::ConfigCommands;
use commands::demo::DemoArgs;
use error::CliError;

#[derive(Parser, Debug)]
#[command(name = "pixelview")]
#[command(version, about = "Live pixel-classification tile overlay")]
struct Cli {
    /// Verbose logging (honours RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pan a viewport over a synthetic image with the overlay running
    Demo {
        /// Tile source to use
        #[arg(short, long, default_value = "pattern")]
        source: String,

        /// Source parameter as name=value (repeatable)
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Worker threads (overrides overlay.threads)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Image width in pixels
        #[arg(long, default_value_t = 20_000)]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 15_000)]
        height: u32,

        /// Number of frames to paint
        #[arg(short, long, default_value_t = 60)]
        frames: usize,

        /// Milliseconds between frames
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,

        /// Viewer downsample
        #[arg(short, long, default_value_t = 4.0)]
        downsample: f64,

        /// Draw cached tiles only, never start computations
        #[arg(long)]
        no_live: bool,

        /// Overlay opacity 0..1 (overrides overlay.opacity)
        #[arg(long)]
        opacity: Option<f32>,

        /// Fill missing tiles from coarser cached levels
        #[arg(long)]
        complete: bool,

        /// Write the final frame as a PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available tile sources
    Sources,

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (config, load_error) = match ConfigFile::load() {
        Ok(config) => (config, None),
        Err(e) => (ConfigFile::default(), Some(e)),
    };

    let options = LoggingOptions::default()
        .verbose(cli.verbose || config.logging.verbose)
        .with_directory(config.logging.directory.clone());
    let _guard = init_logging(&options)?;

    if let Some(e) = load_error {
        warn!(error = %e, "Could not load config file, using defaults");
    }
    debug!(version = pixelview::VERSION, "pixelview starting");

    match cli.command {
        Commands::Demo {
            source,
            params,
            threads,
            width,
            height,
            frames,
            frame_ms,
            downsample,
            no_live,
            opacity,
            complete,
            output,
        } => commands::demo::run(
            DemoArgs {
                source,
                params,
                threads,
                width,
                height,
                frames,
                frame_ms,
                downsample,
                no_live,
                opacity,
                complete,
                output,
            },
            &config,
        ),
        Commands::Sources => commands::sources::run(),
        Commands::Config { command } => commands::config::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo_args() {
        let cli = Cli::try_parse_from([
            "pixelview",
            "demo",
            "--param",
            "latency_ms=5",
            "-p",
            "mode=probability",
            "--frames",
            "3",
            "--no-live",
        ])
        .unwrap();
        match cli.command {
            Commands::Demo {
                params,
                frames,
                no_live,
                source,
                ..
            } => {
                assert_eq!(params, vec!["latency_ms=5", "mode=probability"]);
                assert_eq!(frames, 3);
                assert!(no_live);
                assert_eq!(source, "pattern");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli =
            Cli::try_parse_from(["pixelview", "config", "set", "overlay.threads", "4"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Set { .. }
            }
        ));
    }
}
