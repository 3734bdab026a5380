//! In-memory game server.
//!
//! Backs the `--offline` mode of the client binary and doubles as a request
//! spy for tests: every call is recorded, and failures, latency and forced
//! move results can be scripted ahead of time.

use crate::api::GameApi;
use crate::error::ApiError;
use crate::terrain::TerrainConfig;
use async_trait::async_trait;
use shared::{
    CellData, Coord, Direction, EntityType, MoveRequest, MoveResponse, Occupant, PlayerData,
    TerrainType,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct ZoneState {
    size: usize,
    terrain: TerrainConfig,
    blocked: HashSet<TerrainType>,
    occupants: HashMap<Coord, Occupant>,
    players: HashMap<u32, PlayerData>,

    fetch_log: Vec<Vec<Coord>>,
    move_log: Vec<MoveRequest>,

    failing_fetches: usize,
    failing_moves: usize,
    forced_moves: VecDeque<MoveResponse>,
    fetch_latency: Duration,
    move_latency: Duration,
}

pub struct MockGameApi {
    state: Mutex<ZoneState>,
}

impl MockGameApi {
    pub fn new(size: usize, terrain: TerrainConfig) -> Self {
        Self {
            state: Mutex::new(ZoneState {
                size,
                terrain,
                blocked: [TerrainType::Water, TerrainType::Rock, TerrainType::None]
                    .into_iter()
                    .collect(),
                ..ZoneState::default()
            }),
        }
    }

    /// A small hand-shaped world for offline play: a lake, a rock ridge,
    /// a sand beach, an ice patch and a few monsters around `player_id`.
    pub fn demo(size: usize, player_id: u32) -> (Self, TerrainConfig) {
        let center = (size / 2) as i32;
        let terrain = TerrainConfig::from_fn(size, |c| {
            let lake = (c.x - center / 2).pow(2) + (c.y - center / 2).pow(2);
            if lake <= 9 {
                TerrainType::Water
            } else if lake <= 16 {
                TerrainType::Sand
            } else if c.x == center + 3 && c.y % 6 != 0 {
                TerrainType::Rock
            } else if c.y > center + 4 && c.x < center {
                TerrainType::Ice
            } else {
                TerrainType::Grass
            }
        });

        let api = Self::new(size, terrain.clone());
        api.add_player(player_id, 20, 4, Coord::new(center, center));

        let monsters = [(2, 1), (-3, 2), (1, -4), (5, 5)];
        for (i, (dx, dy)) in monsters.into_iter().enumerate() {
            api.place(
                Coord::new(center + dx, center + dy),
                Occupant {
                    entity_type: EntityType::Monster,
                    entity_id: 1000 + i as u32,
                    hp: 5 + i as u32,
                    atk: 1 + i as u32,
                },
            );
        }
        (api, terrain)
    }

    fn state(&self) -> MutexGuard<'_, ZoneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_player(&self, id: u32, hp: u32, atk: u32, loc: Coord) {
        let mut state = self.state();
        state.players.insert(id, PlayerData { hp, atk, loc });
        state.occupants.insert(
            loc,
            Occupant {
                entity_type: EntityType::Player,
                entity_id: id,
                hp,
                atk,
            },
        );
    }

    pub fn place(&self, coord: Coord, occupant: Occupant) {
        self.state().occupants.insert(coord, occupant);
    }

    pub fn clear(&self, coord: Coord) {
        self.state().occupants.remove(&coord);
    }

    pub fn player_location(&self, id: u32) -> Option<Coord> {
        self.state().players.get(&id).map(|p| p.loc)
    }

    /// The next `count` cell fetches fail.
    pub fn fail_fetches(&self, count: usize) {
        self.state().failing_fetches = count;
    }

    /// The next `count` move requests fail.
    pub fn fail_moves(&self, count: usize) {
        self.state().failing_moves = count;
    }

    /// Answers the next move with `response` instead of resolving it.
    pub fn force_move_response(&self, response: MoveResponse) {
        self.state().forced_moves.push_back(response);
    }

    pub fn set_fetch_latency(&self, latency: Duration) {
        self.state().fetch_latency = latency;
    }

    pub fn set_move_latency(&self, latency: Duration) {
        self.state().move_latency = latency;
    }

    pub fn fetch_requests(&self) -> Vec<Vec<Coord>> {
        self.state().fetch_log.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetch_log.len()
    }

    pub fn move_requests(&self) -> Vec<MoveRequest> {
        self.state().move_log.clone()
    }

    pub fn move_count(&self) -> usize {
        self.state().move_log.len()
    }
}

impl ZoneState {
    fn contains(&self, coord: Coord) -> bool {
        coord.is_non_negative() && (coord.x as usize) < self.size && (coord.y as usize) < self.size
    }

    fn cell_at(&self, coord: Coord) -> CellData {
        let mut cell = CellData::with_occupant(
            self.occupants.get(&coord).copied().unwrap_or(Occupant::NONE),
        );
        if self.contains(coord) {
            cell.terrain_type = Some(self.terrain.terrain_at(coord));
        }
        cell
    }

    fn resolve_move(&mut self, player_id: u32, direction: Direction) -> MoveResponse {
        let Some(player) = self.players.get(&player_id).copied() else {
            return MoveResponse::default();
        };

        let target = player.loc.step(direction);
        let walkable =
            self.contains(target) && !self.blocked.contains(&self.terrain.terrain_at(target));
        let free = !self.occupants.contains_key(&target);

        if !(walkable && free) {
            return MoveResponse {
                my_new_coords: Some(player.loc),
                rate_limited: false,
            };
        }

        if let Some(occupant) = self.occupants.remove(&player.loc) {
            self.occupants.insert(target, occupant);
        }
        if let Some(p) = self.players.get_mut(&player_id) {
            p.loc = target;
        }
        MoveResponse {
            my_new_coords: Some(target),
            rate_limited: false,
        }
    }
}

#[async_trait]
impl GameApi for MockGameApi {
    async fn fetch_cells(&self, coords: &[Coord]) -> Result<Vec<CellData>, ApiError> {
        let latency = {
            let mut state = self.state();
            state.fetch_log.push(coords.to_vec());
            state.fetch_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(ApiError::Unavailable("scripted fetch failure".into()));
        }
        Ok(coords.iter().map(|&coord| state.cell_at(coord)).collect())
    }

    async fn submit_move(
        &self,
        player_id: u32,
        direction: Direction,
    ) -> Result<MoveResponse, ApiError> {
        let latency = {
            let mut state = self.state();
            state.move_log.push(MoveRequest {
                player_id,
                direction,
            });
            state.move_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.failing_moves > 0 {
            state.failing_moves -= 1;
            return Err(ApiError::Unavailable("scripted move failure".into()));
        }
        if let Some(forced) = state.forced_moves.pop_front() {
            return Ok(forced);
        }
        Ok(state.resolve_move(player_id, direction))
    }

    async fn get_player(&self, player_id: u32) -> Result<PlayerData, ApiError> {
        self.state()
            .players
            .get(&player_id)
            .copied()
            .ok_or_else(|| ApiError::Status(404))
    }
}
