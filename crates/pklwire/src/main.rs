mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use pklwire_transport::PklCommand;

use crate::cmd::{Command, Context};
use crate::exit::{CliError, USAGE};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pklwire", version, about = "Evaluate Pkl modules through pkl server")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). PKLWIRE_LOG overrides it when set.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Command used to run Pkl, split on whitespace. Defaults to PKL_EXEC, then `pkl`.
    #[arg(long, value_name = "COMMAND", global = true)]
    pkl_command: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn context(&self) -> Result<Context, CliError> {
        let override_command = match &self.pkl_command {
            Some(words) => Some(
                PklCommand::from_words(words.split_whitespace())
                    .ok_or_else(|| CliError::new(USAGE, "--pkl-command must not be empty"))?,
            ),
            None => None,
        };
        Ok(Context {
            format: self.format.unwrap_or_else(OutputFormat::default_for_stdout),
            pkl_command: PklCommand::resolve(override_command),
        })
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result = cli.context().and_then(|ctx| cmd::run(cli.command, &ctx));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
