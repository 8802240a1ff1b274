use std::collections::HashMap;

use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::connection::Tile;

static BLOCK_DATA: &str = include_str!("../data/blocks.json");

/// Older names that map onto the names used in the tables.
const ALIASES: &[(&str, &str)] = &[("grass", "grass_block"), ("wood", "planks")];

#[derive(Debug, Snafu)]
pub enum BlockTableError {
    #[snafu(display("Embedded block data is invalid: {source}"))]
    Data { source: serde_json::Error },
    #[snafu(display("No block data for game version `{version}`"))]
    UnknownVersion { version: String },
    #[snafu(display("Game version `{version}` has no block named `{name}`"))]
    UnknownBlock { version: String, name: String },
}

#[derive(Debug, Deserialize)]
struct VersionData {
    blocks: HashMap<String, u16>,
}

/// Block ids for one game version.
///
/// Only versions whose servers speak the Raspberry Juice extensions
/// (`world.getPlayerId`, `world.getBlocks`) have a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTable {
    version: String,
    by_name: HashMap<String, Tile>,
}

impl BlockTable {
    /// Looks up the table for `version`.
    pub fn load(version: &str) -> Result<Self, BlockTableError> {
        let data = Self::data()?
            .remove(version)
            .context(UnknownVersionSnafu { version })?;

        Ok(Self {
            version: version.to_owned(),
            by_name: data
                .blocks
                .into_iter()
                .map(|(name, id)| (name, Tile(id)))
                .collect(),
        })
    }

    fn data() -> Result<HashMap<String, VersionData>, BlockTableError> {
        serde_json::from_str(BLOCK_DATA).context(DataSnafu)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The id of the block called `name`, accepting legacy aliases.
    pub fn id(&self, name: &str) -> Result<Tile, BlockTableError> {
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map_or(name, |&(_, canonical)| canonical);
        self.by_name
            .get(canonical)
            .copied()
            .context(UnknownBlockSnafu {
                version: &self.version,
                name,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_embedded_version_loads() {
        for version in ["raspberry-juice", "mcpi-reborn"] {
            let table = BlockTable::load(version).unwrap();
            assert_eq!(table.version(), version);
            assert_eq!(table.id("air").unwrap(), Tile::AIR);
        }
    }

    #[test]
    fn grass_is_found_by_either_name() {
        let table = BlockTable::load("mcpi-reborn").unwrap();
        assert_eq!(table.id("grass_block").unwrap(), Tile(2));
        assert_eq!(table.id("grass").unwrap(), Tile(2));
    }

    #[test]
    fn servers_without_bulk_reads_have_no_table() {
        assert!(matches!(
            BlockTable::load("mcpi-0.1.1"),
            Err(BlockTableError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn unknown_lookups_fail() {
        assert!(matches!(
            BlockTable::load("1.21.4"),
            Err(BlockTableError::UnknownVersion { .. })
        ));
        let table = BlockTable::load("raspberry-juice").unwrap();
        assert!(matches!(
            table.id("netherite_block"),
            Err(BlockTableError::UnknownBlock { .. })
        ));
    }
}
