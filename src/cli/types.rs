//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::config::ConfigArgs;
use super::commands::methodologies::MethodologiesArgs;
use super::commands::resume::ResumeArgs;
use super::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "convergent")]
#[command(about = "Convergent - multi-methodology review until convergence", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .convergent/
    #[arg(short, long, global = true, env = "CONVERGENT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted scenario until it converges or a bound is hit
    Run(RunArgs),

    /// Continue a run from a checkpoint file
    Resume(ResumeArgs),

    /// List the built-in methodology catalog
    Methodologies(MethodologiesArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}
