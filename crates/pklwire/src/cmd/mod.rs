use clap::{Args, Subcommand};
use pklwire_evaluator::OutputFormat as RenderFormat;
use pklwire_transport::PklCommand;
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod eval;
pub mod version;

/// Settings shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub pkl_command: PklCommand,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a module and print the result.
    Eval(EvalArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Eval(args) => eval::run(args, ctx),
        Command::Version(args) => version::run(args, ctx),
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Module path or URI; `-` reads module text from stdin.
    pub module: String,
    /// Expression to evaluate against the module.
    #[arg(long, short = 'x', conflicts_with_all = ["text", "files"])]
    pub expr: Option<String>,
    /// Print the module's rendered `output.text`.
    #[arg(long, conflicts_with_all = ["expr", "files"])]
    pub text: bool,
    /// Print the module's `output.files`.
    #[arg(long, conflicts_with_all = ["expr", "text"])]
    pub files: bool,
    /// Directory containing a PklProject to evaluate within.
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,
    /// External property as NAME=VALUE (repeatable).
    #[arg(long = "property", short = 'p', value_name = "NAME=VALUE")]
    pub properties: Vec<String>,
    /// Renderer for `output.text` (json, yaml, pcf, ...).
    #[arg(long, value_name = "FORMAT")]
    pub output_format: Option<RenderFormat>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
    /// Probe the Pkl binary's version instead.
    #[arg(long, conflicts_with = "extended")]
    pub pkl: bool,
}
