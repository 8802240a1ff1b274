//! Commands that can be sent to the game server to perform an action or query
//! information.
//!
//! Includes the vanilla commands the agent relies on, plus the ones it needs
//! from these API extensions:
//!
//! - [Raspberry Juice](https://dev.bukkit.org/projects/raspberryjuice) plugin
//! - [MCPI Addons](https://github.com/Bigjango13/MCPI-Addons) mod
//!
//! Structs are named after the API method they correspond to.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use nalgebra::{Point, Point3, Scalar};

use super::{ChatString, EntityId, Tile};

mod mcpi_addons;
mod raspberry_juice;

pub use mcpi_addons::*;
pub use raspberry_juice::*;

/// Values implementing this trait are commands that can be serialized and sent to the Minecraft
/// game server.
pub trait SerializableCommand {
    /// Whether the specified command should wait for a response from the game server.
    const HAS_RESPONSE: bool;
    // Serializes the specified command into bytes that can be sent to the game server.
    #[must_use]
    fn to_command_bytes(&self) -> Vec<u8>;
}

#[macro_export]
macro_rules! command_library {
    // Requests have a response from the server, while commands do not.
    (@packet_awaits_response req) => { true };
    (@packet_awaits_response cmd) => { false };

    {
        mod $lib_name:ident {
            $(
                $(#[$packet_meta:meta])*
                $vis:vis $packet_type:ident $packet_name:ident $(<$lt:lifetime>)? ($($fmt:tt)*) {
                    $(
                        $(#[$field_meta:meta])*
                        $field:ident : $type:ty
                    ),*
                    $(,)?
                }
            )*
        }
    } => {
        $(
            #[derive(Debug, Clone)]
            $(#[$packet_meta])*
            $vis struct $packet_name $(<$lt>)? {
                $(
                    $(#[$field_meta])*
                    pub $field: $type,
                )*
            }

            impl $(<$lt>)? SerializableCommand for $packet_name $(<$lt>)? {
                const HAS_RESPONSE: bool = $crate::command_library!(@packet_awaits_response $packet_type);
                fn to_command_bytes(&self) -> Vec<u8> {
                    let Self {
                        $(
                            $field,
                        )*
                    } = &self;
                    let mut line = format!($($fmt)*);
                    line.push('\n');
                    line.into_bytes()
                }
            }
        )*
    };
}

/// A helper for command libraries that displays an empty string
/// when its inner field is empty.
pub fn optional<T: Display>(param: &Option<T>, comma_if_some: bool) -> impl Display + '_ {
    struct MaybeField<'a, T: Display> {
        param: &'a Option<T>,
        comma_if_some: bool,
    }

    impl<T: Display> Display for MaybeField<'_, T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            if let Some(inner) = &self.param {
                write!(f, "{inner}")?;
                if self.comma_if_some {
                    write!(f, ",")?;
                }
            }
            Ok(())
        }
    }

    MaybeField {
        param,
        comma_if_some,
    }
}

pub fn point<T: Display + Scalar, const D: usize>(param: &Point<T, D>) -> String {
    param.iter().join(",")
}

pub type TileCoords = Point3<i32>;

// # Vanilla Commands

command_library!(
    mod Vanilla {
        // ## World APIs

        pub req WorldGetBlock("world.getBlock({})", point(coords)) {
            coords: TileCoords,
        }

        pub cmd WorldSetBlock("world.setBlock({},{tile})", point(coords)) {
            coords: TileCoords,
            tile: Tile,
        }

        // ## Chat APIs

        pub cmd ChatPost("chat.post({message})") {
            message: ChatString,
        }

        // ## Entity APIs

        pub req EntityGetTile("entity.getTile({target})") {
            target: EntityId,
        }

        pub cmd EntitySetTile("entity.setTile({target},{})", point(coords)) {
            target: EntityId,
            coords: TileCoords,
        }

        // ## Event APIs

        pub req EventsChatPosts("events.chat.posts()") {}
    }
);
