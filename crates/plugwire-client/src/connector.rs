use std::path::Path;

use plugwire_frame::Message;
#[cfg(unix)]
use plugwire_transport::UnixDomainSocket;

use crate::client::{Client, ClientConfig};
use crate::error::Result;

/// Connect to a host or worker listening on `path`.
///
/// The returned client is not started.
pub fn connect<M: Message>(path: impl AsRef<Path>) -> Result<Client<M>> {
    connect_with_config(path, ClientConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config<M: Message>(
    path: impl AsRef<Path>,
    config: ClientConfig,
) -> Result<Client<M>> {
    #[cfg(not(unix))]
    {
        let _ = config;
        return Err(plugwire_transport::TransportError::Connect {
            path: path.as_ref().to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "socket connections require Unix domain sockets; use spawn_worker instead",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let stream = UnixDomainSocket::connect(path)?;
        let reader_stream = stream.try_clone()?;
        Ok(Client::with_config(reader_stream, stream, config))
    }
}
