//! The `pkl server` child process.

use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::command::PklCommand;
use crate::error::{Result, TransportError};

/// Subcommand that puts Pkl into message-passing mode.
pub const SERVER_SUBCOMMAND: &str = "server";

/// A running `pkl server` with its stdio taken.
///
/// stdin and stdout carry the protocol; stderr is inherited so evaluator
/// diagnostics reach the host's terminal. The child is killed when dropped.
#[derive(Debug)]
pub struct PklProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

impl PklProcess {
    /// Spawn `<command> server`. Must be called inside a tokio runtime.
    pub fn spawn(command: &PklCommand) -> Result<Self> {
        let mut child = command
            .tokio_command()
            .arg(SERVER_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: command.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(TransportError::MissingStdio("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingStdio("stdout"))?;

        tracing::debug!(command = %command, pid = ?child.id(), "spawned pkl server");
        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn into_parts(self) -> (Child, ChildStdin, ChildStdout) {
        (self.child, self.stdin, self.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = PklProcess::spawn(&PklCommand::new("/nonexistent/pklwire-test-pkl")).unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/pklwire-test-pkl"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_pipes_stdio() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // `sh -c cat server` echoes stdin; `server` lands in $0.
        let command = PklCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat".to_string()],
        };
        let process = PklProcess::spawn(&command).unwrap();
        let (mut child, mut stdin, mut stdout) = process.into_parts();

        stdin.write_all(b"ping").await.unwrap();
        drop(stdin);

        let mut echoed = Vec::new();
        stdout.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, b"ping");
        assert!(child.wait().await.unwrap().success());
    }
}
