//! MCPI Addons Extensions
//!
//! https://github.com/Bigjango13/MCPI-Addons

use super::*;
use crate::command_library;

command_library!(
    mod MCPIAddons {
        // ## Custom Reborn APIs

        pub req CustomRebornVersion("custom.reborn.version()") {}
    }
);
