use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use plugwire_frame::Message;
use plugwire_transport::UnixDomainSocket;

use crate::client::{Client, ClientConfig};
use crate::error::Result;

/// Accepts socket connections and wraps each in an unstarted [`Client`].
pub struct ClientListener {
    socket: UnixDomainSocket,
    config: ClientConfig,
    next_id: AtomicU64,
}

impl ClientListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            socket: UnixDomainSocket::bind(path)?,
            config: ClientConfig::default(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Config for accepted clients. Each one is named `<name>-<n>`.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection (blocking).
    pub fn accept<M: Message>(&self) -> Result<Client<M>> {
        let stream = self.socket.accept()?;
        let reader_stream = stream.try_clone()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut config = self.config.clone();
        config.name = format!("{}-{id}", self.config.name);

        Ok(Client::with_config(reader_stream, stream, config))
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use super::*;
    use crate::connector::connect;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/plugwire-l-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("listener.sock")
    }

    #[test]
    fn accepted_clients_are_numbered() {
        let sock_path = make_sock_path("multi");
        let listener = ClientListener::bind(&sock_path)
            .expect("listener should bind")
            .with_config(ClientConfig::named("plugins"));
        assert_eq!(listener.path(), sock_path.as_path());

        let server = thread::spawn(move || {
            let first: Client<u32> = listener.accept().expect("first accept should succeed");
            let second: Client<u32> = listener.accept().expect("second accept should succeed");
            assert_eq!(first.name(), "plugins-1");
            assert_eq!(second.name(), "plugins-2");
        });

        let _c1 = connect::<u32>(&sock_path).expect("first client should connect");
        let _c2 = connect::<u32>(&sock_path).expect("second client should connect");
        server.join().expect("server thread should finish");

        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
