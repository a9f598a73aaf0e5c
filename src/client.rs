use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::dispatcher;
use crate::error::Result;
use crate::session::{LogSink, NotificationSink, Session};
use crate::transport::Connection;

/// One logical client: a private connection and session plus a lifetime scope.
///
/// Call [`ClientHandle::close`] when done. Dropping an unclosed handle still
/// cancels its lifetime and stops the session's reader task.
pub struct ClientHandle {
    id: u64,
    peer: SocketAddr,
    session: Session,
    lifetime: CancellationToken,
}

impl ClientHandle {
    /// Connect a new client that logs server pushes.
    pub async fn connect(id: u64, config: &ClientConfig) -> Result<Self> {
        Self::connect_with_sink(id, config, Arc::new(LogSink)).await
    }

    pub async fn connect_with_sink(
        id: u64,
        config: &ClientConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let connection = Connection::open(config).await?;
        let peer = connection.peer_addr();
        info!("Connected to {} as ID:{}", peer, id);

        Ok(ClientHandle {
            id,
            peer,
            session: Session::open(connection.into_stream(), sink),
            lifetime: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Ask the server for the length of `message`, trimmed.
    pub async fn count_string(&self, message: &str) -> Result<i64> {
        dispatcher::count_string(&self.session, &self.lifetime, message).await
    }

    /// Close the session, then cancel the lifetime. The lifetime is cancelled
    /// even if closing the session fails. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let closed = self.session.close().await;
        self.lifetime.cancel();
        debug!("Client ID:{} closed", self.id);
        closed
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}
