//! Client side of the line-based Minecraft API protocol.
//!
//! Every command is a single line of the form `package.method(arg,arg,...)`.
//! Requests are answered with exactly one line; plain commands are not
//! acknowledged unless they fail. The protocol is spoken natively by
//! Minecraft: Pi Edition and by Java servers running the Raspberry Juice
//! plugin.
//!
//! Sources include:
//! - [Wiki.vg](https://wiki.vg/Minecraft_Pi_Protocol)
//! - [Raspberry Juice](https://dev.bukkit.org/projects/raspberryjuice)

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use derive_more::derive::FromStr;
use derive_more::{AsRef, Display};
use snafu::{ensure, Backtrace, Snafu};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot::error::RecvError;
use tokio::time::error::Elapsed;
use tokio::time::timeout;

pub mod commands;
pub mod queued;

use commands::SerializableCommand;
pub use queued::QueuedConnection;

// MARK: Types

/// A numeric block type, as used on the wire.
///
/// Which number means which block depends on the game version; see
/// [`BlockTable`](crate::BlockTable). Only air is the same everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromStr)]
pub struct Tile(pub u16);

impl Tile {
    pub const AIR: Self = Self(0);
}

/// Entity id assigned by the server, e.g. by `world.getPlayerId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Display, FromStr)]
pub struct EntityId(pub i32);

/// A string argument that cannot break the one-command-per-line framing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Display)]
pub struct ApiStr<'a>(pub &'a str);

impl<'a> ApiStr<'a> {
    /// Fails if `inner` contains a line feed.
    pub fn new(inner: &'a str) -> Result<Self, NewlineStrError> {
        ensure!(!inner.contains('\n'), NewlineStrSnafu);
        Ok(Self(inner))
    }
}

impl<'a> TryFrom<&'a str> for ApiStr<'a> {
    type Error = NewlineStrError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Argument contains a line feed"))]
pub struct NewlineStrError;

/// A chat message that is safe to put on the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Display)]
#[as_ref(forward)]
pub struct ChatString(String);

impl ChatString {
    /// Creates a new [`ChatString`], replacing line breaks with spaces so the
    /// message stays on a single line.
    #[must_use]
    pub fn from_str_lossy(inner: &str) -> Self {
        Self(
            inner
                .chars()
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                .collect(),
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// MARK: Connection

/// Transport-level failures. See [`ConnectionError::is_fatal`].
#[derive(Debug, Snafu)]
pub enum ConnectionError {
    #[snafu(display("Socket error: {source}"), context(false))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    /// The server answered `Fail`: it rejected this one command.
    #[snafu(display("Server rejected the command"))]
    GenericFail { backtrace: Backtrace },
    #[snafu(display("Response is not UTF-8: {source}"), context(false))]
    ResponseNotUtf8 {
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Server closed the connection"))]
    ConnectionClosed { backtrace: Backtrace },
    /// The reply did not arrive in time. It is discarded if it shows up later.
    #[snafu(display("No response in time: {source}"), context(false))]
    Timeout {
        source: Elapsed,
        backtrace: Backtrace,
    },
    /// The queue worker is gone.
    #[snafu(display("Connection worker has shut down"))]
    Send { backtrace: Backtrace },
    /// The queue worker dropped the request without answering.
    #[snafu(display("Request was dropped: {source}"), context(false))]
    Recv {
        source: RecvError,
        backtrace: Backtrace,
    },
}

impl ConnectionError {
    /// Whether the connection can no longer be used after this error.
    ///
    /// A `Fail` reply only rejects one command and a slow reply only delays
    /// one. Everything else leaves the stream in an unknown state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::GenericFail { .. } | Self::Timeout { .. })
    }
}

/// Per-connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectOptions {
    /// How long a response may take.
    pub response_timeout: Duration,
}

/// Something that can carry API commands to a server.
pub trait Protocol: Debug {
    /// Sends `command` and returns the raw response line.
    fn send<C: SerializableCommand + Send>(
        &mut self,
        command: C,
    ) -> impl Future<Output = Result<String, ConnectionError>> + Send;

    /// Shuts the connection down once everything sent before has been
    /// written.
    fn close(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// A connection to a game server using the Minecraft API protocol.
pub struct ServerConnection {
    socket: BufWriter<TcpStream>,
    buffer: BytesMut,
    /// Replies still owed to requests that already timed out.
    stale: usize,
    pub options: ConnectOptions,
}

impl Debug for ServerConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("peer", &self.socket.get_ref().peer_addr().ok())
            .field("buffered", &self.buffer.len())
            .field("stale", &self.stale)
            .field("options", &self.options)
            .finish()
    }
}

impl ServerConnection {
    /// Connects to the game server at the given address.
    pub async fn new(addr: impl ToSocketAddrs, options: ConnectOptions) -> std::io::Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(socket, options))
    }

    /// Wraps an already connected socket.
    pub fn from_stream(socket: TcpStream, options: ConnectOptions) -> Self {
        Self {
            socket: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4096),
            stale: 0,
            options,
        }
    }

    /// Sends a raw, already serialized command to the server.
    pub(crate) async fn send_raw(
        &mut self,
        data: &[u8],
        has_response: bool,
    ) -> Result<String, ConnectionError> {
        self.socket.write_all(data).await?;
        self.socket.flush().await?;

        if !has_response {
            return Ok(String::new());
        }

        let frame = match timeout(self.options.response_timeout, self.read_frame()).await {
            Ok(frame) => frame?,
            Err(elapsed) => {
                self.stale += 1;
                return Err(elapsed.into());
            }
        };

        ensure!(frame != "Fail", GenericFailSnafu);
        Ok(frame)
    }

    /// Next response line, reading from the socket only when the buffer has no
    /// complete line. Late replies to timed-out requests are skipped.
    pub(crate) async fn read_frame(&mut self) -> Result<String, ConnectionError> {
        loop {
            if let Some(frame) = parse_frame(&mut self.buffer)? {
                if self.stale == 0 {
                    return Ok(frame);
                }
                self.stale -= 1;
                continue;
            }

            let bytes_read = self.socket.get_mut().read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return ConnectionClosedSnafu.fail();
            }
        }
    }
}

/// Takes one line out of `buffer`, without its line terminator.
///
/// Returns `None` when the buffer does not hold a complete line yet.
pub(crate) fn parse_frame(buffer: &mut BytesMut) -> Result<Option<String>, ConnectionError> {
    let Some(idx) = buffer.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let mut line = buffer.split_to(idx).to_vec();
    buffer.advance(1);
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8(line)?))
}

impl Protocol for ServerConnection {
    /// Plain commands resolve to an empty string as soon as they are written.
    async fn send<C: SerializableCommand + Send>(
        &mut self,
        command: C,
    ) -> Result<String, ConnectionError> {
        self.send_raw(&command.to_command_bytes(), C::HAS_RESPONSE)
            .await
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.socket.shutdown().await?;
        Ok(())
    }
}

// MARK: Tests
