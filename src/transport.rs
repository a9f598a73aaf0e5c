use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// A connected byte stream to the configured server
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    /// Connect to the server. No retry: the first failure is returned.
    pub async fn open(config: &ClientConfig) -> Result<Self> {
        let addr = config.server_addr();
        let connect_error = |source: std::io::Error| ClientError::Connect {
            addr: addr.to_string(),
            source,
        };

        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| {
                connect_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })?
            .map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;
        let peer = stream.peer_addr().map_err(connect_error)?;

        debug!("Connected to {}", peer);
        Ok(Connection { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}
