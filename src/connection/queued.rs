use snafu::OptionExt;
use tokio::net::ToSocketAddrs;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{
    ConnectOptions, ConnectionError, Protocol, SendSnafu, SerializableCommand, ServerConnection,
};

enum QueueItem {
    Request {
        request: Vec<u8>,
        has_response: bool,
        response: oneshot::Sender<Result<String, ConnectionError>>,
    },
    Close {
        done: oneshot::Sender<Result<(), ConnectionError>>,
    },
}

async fn worker(mut connection: ServerConnection, mut rx: mpsc::Receiver<QueueItem>) {
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Request {
                request,
                has_response,
                response,
            } => {
                let result = connection.send_raw(&request, has_response).await;
                _ = response.send(result);
            }
            QueueItem::Close { done } => {
                _ = done.send(connection.close().await);
                return;
            }
        }
    }
    debug!("all connection handles dropped, closing");
    _ = connection.close().await;
}

/// A cloneable handle to one server connection.
///
/// All handles feed a single worker task that sends one request at a time,
/// so responses can never be handed to the wrong caller. The connection is
/// closed after the last handle is dropped and the queue has drained.
#[derive(Debug, Clone)]
pub struct QueuedConnection {
    channel: mpsc::Sender<QueueItem>,
}

impl QueuedConnection {
    /// Connects to `addr`. At most `queue_size` requests wait for the worker.
    pub async fn new(
        addr: impl ToSocketAddrs,
        options: ConnectOptions,
        queue_size: usize,
    ) -> std::io::Result<Self> {
        let connection = ServerConnection::new(addr, options).await?;
        Ok(Self::from_connection(connection, queue_size))
    }

    /// Moves `connection` into a new worker task.
    pub fn from_connection(connection: ServerConnection, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        tokio::spawn(worker(connection, rx));
        Self { channel: tx }
    }
}

impl Protocol for QueuedConnection {
    async fn send<C: SerializableCommand + Send>(
        &mut self,
        command: C,
    ) -> Result<String, ConnectionError> {
        let permit = self.channel.reserve().await.ok().context(SendSnafu)?;
        let (tx, rx) = oneshot::channel();
        permit.send(QueueItem::Request {
            request: command.to_command_bytes(),
            has_response: C::HAS_RESPONSE,
            response: tx,
        });
        rx.await?
    }

    /// Closes the connection once every request queued before this one has
    /// been sent.
    async fn close(&mut self) -> Result<(), ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.channel
            .send(QueueItem::Close { done: tx })
            .await
            .ok()
            .context(SendSnafu)?;
        rx.await?
    }
}
