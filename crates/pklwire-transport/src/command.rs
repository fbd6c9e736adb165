//! Resolution of the command used to run Pkl.

use std::fmt;

/// Environment variable holding a whitespace-separated Pkl command line.
pub const PKL_EXEC_ENV: &str = "PKL_EXEC";

/// Program used when nothing else is configured.
pub const DEFAULT_PROGRAM: &str = "pkl";

/// A program plus leading arguments, e.g. `java -jar pkl.jar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PklCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PklCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a full command line split into words. `None` if empty.
    pub fn from_words<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = words.into_iter().map(Into::into);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Resolve the command: explicit override, else `PKL_EXEC`, else `pkl`.
    pub fn resolve(override_command: Option<PklCommand>) -> Self {
        Self::resolve_with_env(override_command, std::env::var(PKL_EXEC_ENV).ok())
    }

    /// Like [`PklCommand::resolve`], with the `PKL_EXEC` value passed in.
    pub fn resolve_with_env(override_command: Option<PklCommand>, pkl_exec: Option<String>) -> Self {
        if let Some(command) = override_command {
            return command;
        }
        pkl_exec
            .and_then(|line| Self::from_words(line.split_whitespace()))
            .unwrap_or_else(|| Self::new(DEFAULT_PROGRAM))
    }

    /// A blocking command with the leading arguments applied.
    pub fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// An async command with the leading arguments applied.
    pub fn tokio_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl Default for PklCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl fmt::Display for PklCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
