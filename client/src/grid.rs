//! Client-side tile cache with fog-of-war semantics.
//!
//! The grid is dense and fixed-size; terrain is written once at
//! initialization, while occupants are volatile and only survive as long as
//! their tile stays inside the viewport.

use crate::terrain::TerrainConfig;
use log::debug;
use shared::{CellData, Coord, EntityType, Occupant, Player, TerrainType};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub coord: Coord,
    pub terrain: TerrainType,
    /// Water touching land on one of its four sides. Rendering only.
    pub is_bordering_land: bool,
    pub occupant: Occupant,
    pub is_shown: bool,
    /// `None` until the first successful fetch.
    pub fetched_at: Option<Instant>,
}

/// How current a tile's knowledge is, from a renderer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Outside the viewport and never fetched.
    Unexplored,
    /// Outside the viewport; terrain is remembered, occupants are not.
    Remembered,
    /// In the viewport but not fetched yet.
    Pending,
    Fresh,
    /// In the viewport, last fetched longer ago than the aging window.
    Aging,
}

impl Tile {
    fn new(coord: Coord, terrain: TerrainType) -> Self {
        Self {
            coord,
            terrain,
            is_bordering_land: false,
            occupant: Occupant::NONE,
            is_shown: false,
            fetched_at: None,
        }
    }

    /// Never fetched, or fetched longer than `threshold` ago.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) > threshold,
        }
    }

    pub fn freshness(&self, now: Instant, aging_after: Duration) -> Freshness {
        match (self.is_shown, self.fetched_at) {
            (false, None) => Freshness::Unexplored,
            (false, Some(_)) => Freshness::Remembered,
            (true, None) => Freshness::Pending,
            (true, Some(at)) if now.saturating_duration_since(at) > aging_after => {
                Freshness::Aging
            }
            (true, Some(_)) => Freshness::Fresh,
        }
    }
}

/// A server cell paired with the coordinate it was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchedTile {
    pub coord: Coord,
    pub cell: CellData,
}

#[derive(Debug, Clone)]
pub struct GridStore {
    size: usize,
    tiles: Vec<Tile>,
    observed_players: HashMap<u32, Player>,
    local_player_id: Option<u32>,
}

impl GridStore {
    pub fn new(size: usize, terrain: &TerrainConfig) -> Self {
        let mut tiles = Vec::with_capacity(size * size);
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let coord = Coord::new(x, y);
                tiles.push(Tile::new(coord, terrain.terrain_at(coord)));
            }
        }

        let mut grid = Self {
            size,
            tiles,
            observed_players: HashMap::new(),
            local_player_id: None,
        };
        grid.mark_shorelines();
        grid
    }

    fn mark_shorelines(&mut self) {
        let shoreline: Vec<usize> = (0..self.tiles.len())
            .filter(|&i| {
                let tile = &self.tiles[i];
                tile.terrain == TerrainType::Water
                    && shared::Direction::ALL.iter().any(|&dir| {
                        self.get_tile(tile.coord.step(dir))
                            .map_or(false, |neighbor| neighbor.terrain.is_land())
                    })
            })
            .collect();

        for i in shoreline {
            self.tiles[i].is_bordering_land = true;
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        if !coord.is_non_negative() {
            return None;
        }
        let (x, y) = (coord.x as usize, coord.y as usize);
        if x < self.size && y < self.size {
            Some(y * self.size + x)
        } else {
            None
        }
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.index(coord).is_some()
    }

    pub fn get_tile(&self, coord: Coord) -> Option<&Tile> {
        self.index(coord).map(|i| &self.tiles[i])
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    /// Players seen in fetched tiles, excluding the local player.
    pub fn observed_players(&self) -> &HashMap<u32, Player> {
        &self.observed_players
    }

    /// Keeps the locally controlled player out of [`observed_players`](Self::observed_players).
    pub fn set_local_player(&mut self, player_id: u32) {
        self.local_player_id = Some(player_id);
        self.observed_players.remove(&player_id);
    }

    /// Recomputes viewport membership and merges freshly fetched cells.
    ///
    /// Tiles outside `viewport` lose their occupant (fog of war) but keep
    /// their terrain. Each fetched tile is then merged into its cell, marked
    /// shown and stamped with `now`. Fetched coordinates outside the grid are
    /// ignored. Applying the same inputs twice leaves the grid unchanged.
    ///
    /// Returns the local player's occupant record if one of the fetched
    /// cells held it.
    pub fn update_visibility(
        &mut self,
        viewport: &HashSet<Coord>,
        fetched: &[FetchedTile],
        now: Instant,
    ) -> Option<Occupant> {
        for tile in &mut self.tiles {
            tile.is_shown = viewport.contains(&tile.coord);
            if !tile.is_shown {
                tile.occupant = Occupant::NONE;
            }
        }

        let tiles = &self.tiles;
        let size = self.size;
        self.observed_players.retain(|_, player| {
            let c = player.coord;
            c.is_non_negative()
                && (c.x as usize) < size
                && (c.y as usize) < size
                && tiles[c.y as usize * size + c.x as usize].is_shown
        });

        let mut local = None;
        for fetched_tile in fetched {
            let Some(i) = self.index(fetched_tile.coord) else {
                debug!("Ignoring fetched tile outside grid at {}", fetched_tile.coord);
                continue;
            };

            let occupant = fetched_tile.cell.occupant();
            let tile = &mut self.tiles[i];
            tile.occupant = occupant;
            if let Some(terrain) = fetched_tile.cell.terrain_type {
                if tile.terrain == TerrainType::None {
                    tile.terrain = terrain;
                }
            }
            tile.is_shown = true;
            tile.fetched_at = Some(now);

            if occupant.entity_type == EntityType::Player
                && Some(occupant.entity_id) == self.local_player_id
            {
                local = Some(occupant);
            }
            self.record_observation(fetched_tile.coord, occupant);
        }
        local
    }

    fn record_observation(&mut self, coord: Coord, occupant: Occupant) {
        let seen_player = (occupant.entity_type == EntityType::Player
            && Some(occupant.entity_id) != self.local_player_id)
            .then_some(occupant.entity_id);

        // Anyone last seen here who is no longer here has moved out of sight.
        self.observed_players
            .retain(|id, player| player.coord != coord || Some(*id) == seen_player);

        if let Some(id) = seen_player {
            self.observed_players
                .insert(id, Player::new(id, occupant.hp, occupant.atk, coord));
        }
    }

    pub fn shown_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.is_shown).count()
    }
}
