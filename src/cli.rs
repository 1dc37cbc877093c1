use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediagate")]
#[command(author, version, about = "Token-encoded image and video transformations")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a request against a local directory of objects
    Process {
        /// Request path and query, e.g. "cat.jpg?x-process=image/resize,w_100"
        #[arg(required = true)]
        request: String,

        /// Directory holding the objects
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// JSON file of styles ({"name": "image/..."})
        #[arg(short, long)]
        styles: Option<PathBuf>,

        /// Write the payload here instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a request and show its resource and action tokens
    Parse {
        /// Request path and query
        #[arg(required = true)]
        request: String,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
