//! Raspberry Juice plugin extensions
//!
//! https://dev.bukkit.org/projects/raspberryjuice

use super::*;
use crate::command_library;
use crate::connection::ApiStr;

command_library!(
    mod RaspberryJuice {
        // ## World APIs

        /// Block ids in the cuboid between both corners, inclusive. The server
        /// walks y, then x, then z.
        pub req WorldGetBlocks(
            "world.getBlocks({},{})",
            point(coords_1),
            point(coords_2),
        ) {
            coords_1: TileCoords,
            coords_2: TileCoords,
        }

        /// Entity id of the named player. Raspberry Juice requires the name.
        pub req WorldGetPlayerId<'a>(
            "world.getPlayerId({})",
            optional(name, false),
        ) {
            name: Option<ApiStr<'a>>,
        }
    }
);
