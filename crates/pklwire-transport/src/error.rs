/// Errors that can occur while starting or probing the Pkl binary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The Pkl command could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The child was started without a piped stdin or stdout.
    #[error("child process has no {0} handle")]
    MissingStdio(&'static str),

    /// An I/O error occurred on the child's stdio.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `--version` ran but exited unsuccessfully.
    #[error("{program} --version failed ({status}): {stderr}")]
    VersionProbe {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// `--version` output did not contain a recognisable version.
    #[error("no Pkl version found in output: {0:?}")]
    VersionNotFound(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
