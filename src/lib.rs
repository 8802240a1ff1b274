//! A small agent that logs into a Minecraft server through the line-based
//! Minecraft API protocol, harvests the grass blocks around it, shows what it
//! is doing on a web viewer, and leaves after a fixed number of ticks.

use std::num::ParseIntError;

use snafu::{Backtrace, Snafu};

pub mod agent;
pub mod block;
pub mod collect;
pub mod config;
pub mod connection;
pub mod entity;
pub mod search;
pub mod state;
pub mod ticks;
pub mod util;
pub mod viewer;
pub mod world;

pub use block::BlockTable;
pub use connection::{EntityId, Tile};
pub use world::World;

/// An error produced while talking to the game world: either the connection
/// failed, or the server answered with something that could not be understood.
#[derive(Debug, Snafu)]
pub enum WorldError {
    #[snafu(display("{source}"), context(false))]
    Connection {
        source: connection::ConnectionError,
    },
    #[snafu(
        display("Failed to parse integer in server response: {source}"),
        context(false)
    )]
    ParseInt {
        source: ParseIntError,
        backtrace: Backtrace,
    },
    #[snafu(display("Malformed server response `{response}`"))]
    MalformedResponse {
        response: String,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"), context(false))]
    InvalidString {
        source: connection::NewlineStrError,
    },
}

impl WorldError {
    /// Whether this error means the connection itself is unusable, as opposed
    /// to a single request going wrong.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Connection { source } if source.is_fatal()
        )
    }
}

pub type Result<T = (), E = WorldError> = std::result::Result<T, E>;
