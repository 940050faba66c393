//! CLI Module
//!
//! Command-line interface for the VoiceFX voice filter engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::filter::VoiceFilter;

/// VoiceFX - voice filters for video soundtracks
#[derive(Parser, Debug)]
#[command(name = "voicefx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the available voice filters
    #[command(name = "filters")]
    Filters,

    /// Render a WAV file through a filter
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Filter to apply
        #[arg(short, long, value_enum, default_value = "clear")]
        filter: VoiceFilter,

        /// Frames per render block
        #[arg(short, long)]
        block_capacity: Option<usize>,

        /// Print the rendered asset as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a WAV file through a filter
    #[command(name = "preview")]
    Preview {
        /// Input WAV file
        input: PathBuf,

        /// Filter to apply
        #[arg(short, long, value_enum, default_value = "clear")]
        filter: VoiceFilter,

        /// Stop after this many seconds
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f64,
    },

    /// Extract, filter and re-mux the audio of a video (requires ffmpeg)
    #[command(name = "process")]
    Process {
        /// Input video
        video: PathBuf,

        /// Filter to apply
        #[arg(short, long, value_enum)]
        filter: VoiceFilter,

        /// Copy the result into this directory
        #[arg(short, long)]
        export_dir: Option<PathBuf>,

        /// Directory for intermediate files
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
    },
}
