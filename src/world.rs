use std::time::Duration;

use async_stream::try_stream;
use futures_core::Stream;
use nalgebra::Point3;
use snafu::OptionExt;
use tokio::net::ToSocketAddrs;

use crate::connection::commands::*;
use crate::connection::{
    ApiStr, ChatString, ConnectOptions, ConnectionError, EntityId, Protocol, QueuedConnection,
    Tile,
};
use crate::entity::Player;
use crate::util::{parse_list, parse_point};
use crate::{MalformedResponseSnafu, Result};

/// How many requests may wait for the connection worker at once.
const QUEUE_SIZE: usize = 64;

/// A chat message posted by a player, as reported by `events.chat.posts()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub entity: EntityId,
    pub message: String,
}

/// A handle to a game world reached over the API protocol.
///
/// Cloning a `World<QueuedConnection>` gives another handle to the same
/// connection.
#[derive(Debug, Clone)]
pub struct World<T: Protocol = QueuedConnection> {
    connection: T,
}

impl World {
    /// Connects to the server at `addr` through a [`QueuedConnection`].
    pub async fn connect_with_options(
        addr: impl ToSocketAddrs,
        options: ConnectOptions,
    ) -> std::io::Result<Self> {
        let connection = QueuedConnection::new(addr, options, QUEUE_SIZE).await?;
        Ok(Self::new(connection))
    }
}

impl<T: Protocol> World<T> {
    pub const fn new(connection: T) -> Self {
        Self { connection }
    }

    pub(crate) async fn send_command<C: SerializableCommand + Send>(
        &mut self,
        command: C,
    ) -> Result<String, ConnectionError> {
        self.connection.send(command).await
    }

    /// Posts a message to the in-game chat.
    pub async fn post(&mut self, message: &str) -> Result {
        self.send_command(ChatPost {
            message: ChatString::from_str_lossy(message),
        })
        .await?;
        Ok(())
    }

    pub async fn get_block(&mut self, coords: Point3<i32>) -> Result<Tile> {
        let response = self.send_command(WorldGetBlock { coords }).await?;
        Ok(response.trim().parse()?)
    }

    /// Reads every block in the cuboid spanned by two corners.
    ///
    /// Ids come back in y, then x, then z order starting from the lowest
    /// corner. The response length is checked against the cuboid volume.
    pub async fn get_blocks(
        &mut self,
        corner_1: Point3<i32>,
        corner_2: Point3<i32>,
    ) -> Result<Vec<Tile>> {
        let response = self
            .send_command(WorldGetBlocks {
                coords_1: corner_1,
                coords_2: corner_2,
            })
            .await?;
        let tiles: Vec<Tile> = parse_list(&response)?;

        let volume: usize = (0..3)
            .map(|axis| (corner_1[axis] - corner_2[axis]).unsigned_abs() as usize + 1)
            .product();
        snafu::ensure!(
            tiles.len() == volume,
            MalformedResponseSnafu {
                response: format!("{} ids for a cuboid of {volume} blocks", tiles.len())
            }
        );
        Ok(tiles)
    }

    pub async fn set_block(&mut self, coords: Point3<i32>, tile: Tile) -> Result {
        self.send_command(WorldSetBlock { coords, tile }).await?;
        Ok(())
    }

    /// Resolves a player's name to their entity id.
    pub async fn player_id(&mut self, name: &str) -> Result<EntityId> {
        let response = self
            .send_command(WorldGetPlayerId {
                name: Some(ApiStr::new(name)?),
            })
            .await?;
        Ok(response.trim().parse()?)
    }

    /// Returns a handle to the player with the given entity id.
    pub fn player(&self, id: EntityId) -> Player<T>
    where
        T: Clone,
    {
        Player::new(self.clone(), id)
    }

    /// Drains the chat messages posted since the last call.
    pub async fn chat_posts(&mut self) -> Result<Vec<ChatEvent>> {
        let response = self.send_command(EventsChatPosts {}).await?;
        parse_chat_posts(&response)
    }

    /// Polls the server for chat messages every `period`, yielding them one
    /// at a time. The stream ends after the first error.
    pub fn chat_events(&self, period: Duration) -> impl Stream<Item = Result<ChatEvent>>
    where
        T: Clone,
    {
        let mut world = self.clone();
        try_stream! {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                for event in world.chat_posts().await? {
                    yield event;
                }
            }
        }
    }

    /// Asks an MCPI Reborn server for its version.
    pub async fn reborn_version(&mut self) -> Result<String> {
        let response = self.send_command(CustomRebornVersion {}).await?;
        Ok(response.trim().to_owned())
    }

    /// Flushes pending commands and closes the connection.
    pub async fn disconnect(mut self) -> Result {
        self.connection.close().await?;
        Ok(())
    }
}

fn parse_chat_posts(response: &str) -> Result<Vec<ChatEvent>> {
    response
        .split('|')
        .filter(|post| !post.is_empty())
        .map(|post| {
            let (entity, message) = post
                .split_once(',')
                .context(MalformedResponseSnafu { response: post })?;
            Ok(ChatEvent {
                entity: entity.trim().parse()?,
                message: message.to_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_posts_are_split_per_message() {
        let events = parse_chat_posts("12,hello there|40,a, b").unwrap();
        assert_eq!(
            events,
            vec![
                ChatEvent {
                    entity: EntityId(12),
                    message: "hello there".to_owned()
                },
                ChatEvent {
                    entity: EntityId(40),
                    message: "a, b".to_owned()
                },
            ]
        );
    }

    #[test]
    fn no_chat_posts() {
        assert!(parse_chat_posts("").unwrap().is_empty());
    }

    #[test]
    fn malformed_chat_posts_fail() {
        assert!(parse_chat_posts("nocomma").is_err());
        assert!(parse_chat_posts("x,hi").is_err());
    }
}
