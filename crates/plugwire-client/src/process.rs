use std::process::{Command, ExitStatus};
use std::time::Duration;

use plugwire_frame::Message;
use plugwire_transport::PipedChild;
use tracing::debug;

use crate::client::{Client, ClientConfig};
use crate::error::Result;

/// A worker child process and the client talking to it over stdio.
///
/// Dropping a `WorkerProcess` stops the client and kills the child.
#[derive(Debug)]
pub struct WorkerProcess<M: Message> {
    client: Client<M>,
    child: PipedChild,
}

/// Spawn `command` as a worker. The returned client is not started.
pub fn spawn_worker<M: Message>(command: Command) -> Result<WorkerProcess<M>> {
    spawn_worker_with_config(command, ClientConfig::default())
}

pub fn spawn_worker_with_config<M: Message>(
    command: Command,
    config: ClientConfig,
) -> Result<WorkerProcess<M>> {
    let (child, stdout, stdin) = PipedChild::spawn(command)?;
    let client = Client::with_config(stdout, stdin, config);
    Ok(WorkerProcess { client, child })
}

impl<M: Message> WorkerProcess<M> {
    pub fn client(&self) -> &Client<M> {
        &self.client
    }

    /// OS process id of the worker.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Drain queued messages, close the worker's stdin, and wait up to
    /// `grace` for it to exit before killing it.
    ///
    /// Returns the exit status, or `None` if the worker had to be killed.
    pub fn shutdown(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        if let Err(err) = self.client.stop_after_drain(grace) {
            debug!(error = %err, "worker queue not drained before shutdown");
        }
        Ok(self.child.shutdown(grace)?)
    }

    /// Stop the client and kill the worker.
    pub fn kill(&mut self) -> Result<()> {
        self.client.stop();
        Ok(self.child.kill()?)
    }
}

impl<M: Message> Drop for WorkerProcess<M> {
    fn drop(&mut self) {
        self.client.stop();
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::mpsc;
    use std::sync::Mutex;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::envelope::{CompilerMessage, SourceFile};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn frames_round_trip_through_an_echoing_child() {
        // `cat` writes every frame straight back.
        let mut worker = spawn_worker::<CompilerMessage>(Command::new("cat")).unwrap();
        assert!(worker.id() > 0);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        worker.client().on_message(move |msg: &CompilerMessage| {
            let _ = tx.lock().unwrap().send(msg.clone());
        });
        worker.client().start().unwrap();

        let request = CompilerMessage::compile(5, vec![SourceFile::new("Echo.cs", "class Echo {}")]);
        worker.client().push_message(request.clone());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), request);

        let status = worker.shutdown(WAIT).unwrap();
        assert!(status.expect("cat exits once stdin closes").success());
        assert_eq!(worker.client().state(), ConnectionState::Closed);
    }

    #[test]
    fn unstarted_worker_sees_stdin_close_on_shutdown() {
        let mut worker = spawn_worker::<CompilerMessage>(Command::new("cat")).unwrap();

        let status = worker.shutdown(WAIT).unwrap();
        assert!(status.expect("cat exits before the grace period").success());
        assert_eq!(worker.client().state(), ConnectionState::Closed);
    }

    #[test]
    fn kill_stops_a_silent_worker() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let mut worker = spawn_worker::<CompilerMessage>(command).unwrap();
        worker.client().start().unwrap();

        worker.kill().unwrap();
        assert_eq!(worker.client().state(), ConnectionState::Closed);
    }

    #[test]
    fn missing_program_is_a_transport_error() {
        let err = spawn_worker::<CompilerMessage>(Command::new("plugwire-missing-worker"))
            .unwrap_err();
        assert!(matches!(err, crate::ClientError::Transport(_)));
    }
}
