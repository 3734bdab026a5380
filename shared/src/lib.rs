use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const GRID_SIZE: usize = 64;
pub const VIEW_RADIUS: i32 = 2;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_PRIORITY_COUNT: usize = 5;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_STALE_THRESHOLD_MS: u64 = 5000;
pub const DEFAULT_MOVE_COOLDOWN_MS: u64 = 3500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_INPUT_DEBOUNCE_MS: u64 = 200;

/// Batches of exactly this many coordinates go to the fixed-size cell route.
pub const FIXED_BATCH_ROUTE_SIZE: usize = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate one step in `direction`. May be negative.
    pub fn step(self, direction: Direction) -> Coord {
        let (dx, dy) = direction.offset();
        Coord::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan_distance(self, other: Coord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn is_non_negative(self) -> bool {
        self.x >= 0 && self.y >= 0
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TerrainType {
    #[default]
    None,
    Ice,
    Water,
    Sand,
    Rock,
    Grass,
}

impl TerrainType {
    /// Walkable ground as far as shoreline detection is concerned.
    pub fn is_land(self) -> bool {
        matches!(self, TerrainType::Ice | TerrainType::Sand | TerrainType::Grass)
    }
}

impl FromStr for TerrainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(TerrainType::None),
            "ICE" => Ok(TerrainType::Ice),
            "WATER" => Ok(TerrainType::Water),
            "SAND" => Ok(TerrainType::Sand),
            "ROCK" => Ok(TerrainType::Rock),
            "GRASS" => Ok(TerrainType::Grass),
            other => Err(format!("unknown terrain type '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityType {
    #[default]
    None,
    Player,
    Item,
    Monster,
}

/// Whatever stands on a tile. Volatile: only meaningful while the tile is in view.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupant {
    pub entity_type: EntityType,
    pub entity_id: u32,
    pub hp: u32,
    pub atk: u32,
}

impl Occupant {
    pub const NONE: Occupant = Occupant {
        entity_type: EntityType::None,
        entity_id: 0,
        hp: 0,
        atk: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.entity_type == EntityType::None
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Screen-space offset: y grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        };
        f.write_str(name)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" | "k" => Ok(Direction::Up),
            "down" | "s" | "j" => Ok(Direction::Down),
            "left" | "a" | "h" => Ok(Direction::Left),
            "right" | "d" | "l" => Ok(Direction::Right),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub hp: u32,
    pub atk: u32,
    pub coord: Coord,
}

impl Player {
    pub fn new(id: u32, hp: u32, atk: u32, coord: Coord) -> Self {
        Self { id, hp, atk, coord }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GetCellsRequest {
    pub coords: Vec<Coord>,
}

/// One entry of `cell_data`, aligned by index with the requested coordinates.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellData {
    #[serde(
        rename = "terrainType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub terrain_type: Option<TerrainType>,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: u32,
    #[serde(default)]
    pub hp: u32,
    #[serde(default)]
    pub atk: u32,
}

impl CellData {
    pub fn occupant(&self) -> Occupant {
        Occupant {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            hp: self.hp,
            atk: self.atk,
        }
    }

    pub fn with_occupant(occupant: Occupant) -> Self {
        Self {
            terrain_type: None,
            entity_type: occupant.entity_type,
            entity_id: occupant.entity_id,
            hp: occupant.hp,
            atk: occupant.atk,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GetCellsResponse {
    pub cell_data: Vec<CellData>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub player_id: u32,
    pub direction: Direction,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveResponse {
    /// Absent when the server did not apply the move.
    #[serde(default)]
    pub my_new_coords: Option<Coord>,
    #[serde(default)]
    pub rate_limited: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GetPlayerRequest {
    pub player_id: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PlayerData {
    #[serde(default)]
    pub hp: u32,
    #[serde(default)]
    pub atk: u32,
    pub loc: Coord,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GetPlayerResponse {
    pub player_data: PlayerData,
}

/// Square neighbourhood of `radius` around `center`, minus negative coordinates,
/// ordered nearest first. Equal distances keep enumeration order (dx outer, dy inner).
pub fn viewport_neighborhood(center: Coord, radius: i32) -> Vec<Coord> {
    let mut coords = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);

    for dx in -radius..=radius {
        for dy in -radius..=radius {
            let candidate = Coord::new(center.x + dx, center.y + dy);
            if candidate.is_non_negative() {
                coords.push(candidate);
            }
        }
    }

    // sort_by_key is stable
    coords.sort_by_key(|coord| coord.manhattan_distance(center));
    coords
}
