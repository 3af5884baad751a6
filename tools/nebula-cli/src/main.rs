//! Nebula CLI: trim, join, filter, and watermark clips from the command line.
//!
//! Usage:
//!   nebula trim <INPUT>           Cut a time range out of a clip
//!   nebula join <A> <B>           Join two clips with a transition
//!   nebula filter <INPUT>         Apply a filter chain to a clip
//!   nebula watermark <INPUT>      Stamp an image over a clip
//!   nebula plan                   Print the render plan for given clip lengths
//!   nebula probe <INPUT>          Show media information
//!   nebula check                  Check system capabilities
//!   nebula config                 Show or initialize the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::OutputArgs;

#[derive(Parser)]
#[command(
    name = "nebula",
    about = "Trim, join, filter, and watermark screen recordings",
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
    /// Cut [start, end) out of a clip
    Trim {
        /// Input media file
        input: PathBuf,

        /// Start time in seconds
        #[arg(long, default_value = "0")]
        start: f64,

        /// End time in seconds (defaults to the end of the clip)
        #[arg(long)]
        end: Option<f64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Join two clips with a transition
    Join {
        /// First clip
        first: PathBuf,

        /// Second clip
        second: PathBuf,

        /// Transition kind (fade, crossfade, wipe-left, slide-left, dissolve, ...)
        #[arg(long, default_value = "crossfade")]
        transition: String,

        /// Transition duration in seconds (0 for a hard cut)
        #[arg(long, default_value = "1.0")]
        duration: f64,

        /// Named preset; overrides --transition and --duration
        #[arg(long)]
        preset: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Apply filters to a whole clip
    Filter {
        /// Input media file
        input: PathBuf,

        /// Filter as kind[:json-params], repeatable, applied in order
        #[arg(short, long = "filter", required = true)]
        filters: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stamp a PNG over every frame of a clip
    Watermark {
        /// Input media file
        input: PathBuf,

        /// PNG stamp
        #[arg(long)]
        stamp: PathBuf,

        /// Anchor (top-left, center, bottom-right, ...) or "x,y"
        #[arg(long, default_value = "bottom-right")]
        anchor: String,

        /// Stamp opacity [0.0, 1.0]
        #[arg(long, default_value = "0.7")]
        opacity: f32,

        /// Margin from the canvas edge in pixels
        #[arg(long, default_value = "20")]
        margin: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the render plan for one or two clip lengths as JSON
    Plan {
        /// Clip length in seconds; give two to plan a join
        #[arg(long = "clip", required = true)]
        clips: Vec<f64>,

        /// Trim start (single clip)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Trim end (single clip)
        #[arg(long)]
        end: Option<f64>,

        /// Transition kind (two clips)
        #[arg(long, default_value = "crossfade")]
        transition: String,

        /// Transition duration in seconds (two clips)
        #[arg(long, default_value = "1.0")]
        duration: f64,

        /// Filter as kind[:json-params], repeatable
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Output frame rate
        #[arg(long, default_value = "30")]
        fps: u32,
    },

    /// Show media information
    Probe {
        /// Input media file
        input: PathBuf,
    },

    /// Check system capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = nebula_common::config::AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    nebula_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Trim {
            input,
            start,
            end,
            output,
        } => commands::trim::run(&config, input, start, end, output).await,
        Commands::Join {
            first,
            second,
            transition,
            duration,
            preset,
            output,
        } => {
            commands::join::run(
                &config, first, second, transition, duration, preset, output,
            )
            .await
        }
        Commands::Filter {
            input,
            filters,
            output,
        } => commands::filter::run(&config, input, filters, output).await,
        Commands::Watermark {
            input,
            stamp,
            anchor,
            opacity,
            margin,
            output,
        } => commands::watermark::run(&config, input, stamp, anchor, opacity, margin, output).await,
        Commands::Plan {
            clips,
            start,
            end,
            transition,
            duration,
            filters,
            fps,
        } => commands::plan::run(clips, start, end, transition, duration, filters, fps),
        Commands::Probe { input } => commands::probe::run(input).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
