//! EFV CLI: run eyes-free videography sessions against loopback collaborators.
//!
//! Usage:
//!   efv simulate [OPTIONS]    Run a full session with a simulated sensor
//!   efv keys [NAME]           List the key vocabulary or look up one request key
//!   efv config                Show the effective configuration

use clap::{Parser, Subcommand};
use efv_common::config::AppConfig;
use efv_metadata::StabilizationMode;
use efv_session::ExtenderKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "efv",
    about = "Eyes-free videography camera extension session tools",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session end to end with a simulated camera
    Simulate {
        /// Extension to load: eyes-free|unsupported
        #[arg(long, default_value = "eyes-free")]
        extension: ExtenderKind,

        /// Number of preview frames (defaults to the configured value)
        #[arg(long)]
        frames: Option<u32>,

        /// Sensor frame rate (defaults to the configured value)
        #[arg(long)]
        fps: Option<u32>,

        /// Stabilization mode: off|gimbal|locked
        #[arg(long)]
        stabilization: Option<StabilizationMode>,

        /// Enable auto-zoom
        #[arg(long)]
        auto_zoom: bool,

        /// Padding zoom factor
        #[arg(long)]
        padding_zoom: Option<f32>,

        /// Maximum padding zoom factor used while auto-zoom runs
        #[arg(long)]
        max_padding_zoom: Option<f32>,

        /// Take a still capture every N preview frames (0 disables)
        #[arg(long, default_value = "30")]
        still_every: u32,

        /// Per-frame latency of the simulated preview surface in ms
        #[arg(long)]
        forward_delay_ms: Option<u64>,

        /// Print every capture event as a JSON line
        #[arg(long)]
        events: bool,
    },

    /// List the request and result keys and whether they are published
    Keys {
        /// Only show the request key with this dotted name (e.g. efv.autoZoom)
        name: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    efv_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Simulate {
            extension,
            frames,
            fps,
            stabilization,
            auto_zoom,
            padding_zoom,
            max_padding_zoom,
            still_every,
            forward_delay_ms,
            events,
        } => {
            let mut simulation = config.simulation.clone();
            if let Some(frames) = frames {
                simulation.frames = frames;
            }
            if let Some(fps) = fps {
                simulation.fps = fps;
            }
            if let Some(delay) = forward_delay_ms {
                simulation.forward_delay_ms = delay;
            }
            commands::simulate::run(commands::simulate::SimulateArgs {
                extension,
                simulation,
                session: config.session.clone(),
                stabilization,
                auto_zoom,
                padding_zoom,
                max_padding_zoom,
                still_every,
                print_events: events,
            })
            .await
        }
        Commands::Keys { name, json } => commands::keys::run(&config, name.as_deref(), json),
        Commands::Config { save } => commands::config::run(&config, save),
    }
}
