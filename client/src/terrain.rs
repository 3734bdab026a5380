//! Static terrain configuration.
//!
//! Terrain is authored in the map editor and exported as a JSON object keyed
//! by `"x,y"`:
//!
//! ```json
//! { "0,0": { "terrainType": "GRASS" }, "1,0": { "terrainType": "WATER" } }
//! ```
//!
//! Coordinates missing from the file default to [`TerrainType::None`].

use crate::error::ConfigError;
use serde::Deserialize;
use shared::{Coord, TerrainType};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct TerrainEntry {
    #[serde(rename = "terrainType")]
    terrain_type: TerrainType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainConfig {
    cells: HashMap<Coord, TerrainType>,
}

impl TerrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `size`×`size` configuration from a generator function.
    pub fn from_fn(size: usize, mut terrain_at: impl FnMut(Coord) -> TerrainType) -> Self {
        let mut config = Self::new();
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let coord = Coord::new(x, y);
                config.insert(coord, terrain_at(coord));
            }
        }
        config
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, TerrainEntry> = serde_json::from_str(s)?;
        let mut config = Self::new();

        for (key, entry) in raw {
            let coord = parse_coord_key(&key)?;
            config.insert(coord, entry.terrain_type);
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn insert(&mut self, coord: Coord, terrain: TerrainType) {
        self.cells.insert(coord, terrain);
    }

    pub fn terrain_at(&self, coord: Coord) -> TerrainType {
        self.cells.get(&coord).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

fn parse_coord_key(key: &str) -> Result<Coord, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("bad terrain coordinate key '{}'", key));

    let (x, y) = key.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse::<i32>().map_err(|_| invalid())?;
    let y = y.trim().parse::<i32>().map_err(|_| invalid())?;

    let coord = Coord::new(x, y);
    if !coord.is_non_negative() {
        return Err(invalid());
    }
    Ok(coord)
}
