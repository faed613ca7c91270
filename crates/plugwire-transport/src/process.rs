use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A worker process whose stdin/stdout carry the plugin transport.
///
/// The host writes to the child's stdin and reads from its stdout. Stderr is
/// left to the caller's `Command` configuration (inherited by default) so
/// worker diagnostics stay visible.
#[derive(Debug)]
pub struct PipedChild {
    child: Child,
    program: String,
}

impl PipedChild {
    /// Spawn `command` with piped stdin and stdout.
    pub fn spawn(mut command: Command) -> Result<(Self, ChildStdout, ChildStdin)> {
        let program = command.get_program().to_string_lossy().into_owned();
        command.stdin(Stdio::piped()).stdout(Stdio::piped());

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: program.clone(),
            source,
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(TransportError::MissingPipe("stdout"));
        };
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            return Err(TransportError::MissingPipe("stdin"));
        };

        debug!(%program, pid = child.id(), "spawned worker process");
        Ok((Self { child, program }, stdout, stdin))
    }

    /// OS process id of the worker.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Program name the worker was launched from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Wait up to `grace` for the worker to exit on its own, then kill it.
    ///
    /// Returns the exit status, or `None` if the worker had to be killed.
    pub fn shutdown(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!(program = %self.program, %status, "worker exited");
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }

        warn!(program = %self.program, pid = self.child.id(), "worker did not exit; killing");
        self.kill()?;
        Ok(None)
    }

    /// Kill the worker and reap it.
    pub fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            // Already exited.
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err.into()),
        }
        self.child.wait()?;
        Ok(())
    }
}
