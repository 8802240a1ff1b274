use std::future::Future;

use nalgebra::Point3;

use crate::connection::commands::*;
use crate::connection::{EntityId, Protocol};
use crate::util::parse_point;
use crate::{Result, World};

pub trait Entity {
    /// Gets the 3D coordinates of the entity as an integer Point.
    ///
    /// If the entity is standing on a block, this can be thought of as the
    /// coordinates of that block, plus 1 in the y-axis.
    fn get_tile(&mut self) -> impl Future<Output = Result<Point3<i32>>> + Send;
    /// Sets the 3D coordinates of the entity as an integer Point.
    fn set_tile(&mut self, tile: Point3<i32>) -> impl Future<Output = Result> + Send;
}

/// A player's entity ID with a connection to their game.
///
/// This struct is used to interact with a player's entity in the game world.
#[derive(Debug)]
pub struct Player<T: Protocol> {
    world: World<T>,
    id: EntityId,
}

impl<T: Protocol + Clone> Clone for Player<T> {
    fn clone(&self) -> Self {
        Self {
            world: self.world.clone(),
            id: self.id,
        }
    }
}

impl<T: Protocol> Player<T> {
    pub const fn new(world: World<T>, id: EntityId) -> Self {
        Self { world, id }
    }
}

impl<T: Protocol + Send> Entity for Player<T> {
    async fn get_tile(&mut self) -> Result<Point3<i32>> {
        let tile = self
            .world
            .send_command(EntityGetTile { target: self.id })
            .await?;
        let point = parse_point(&tile)?;
        Ok(point)
    }

    async fn set_tile(&mut self, tile: Point3<i32>) -> Result {
        self.world
            .send_command(EntitySetTile {
                target: self.id,
                coords: tile,
            })
            .await?;
        Ok(())
    }
}
