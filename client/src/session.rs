//! Per-session state shared by the grid, scheduler and move coordinator.

use crate::api::GameApi;
use crate::config::SyncConfig;
use crate::error::SessionError;
use crate::grid::GridStore;
use crate::terrain::TerrainConfig;
use log::{debug, info};
use shared::Player;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

const ACTION_LOG_CAPACITY: usize = 64;

/// Locks a session mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Move bookkeeping. Mutated only by the move coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveState {
    pub last_move_at: Option<Instant>,
    pub pending: bool,
}

/// Bounded history of user-visible events, oldest first.
#[derive(Debug, Default)]
pub struct ActionLog {
    entries: VecDeque<String>,
}

impl ActionLog {
    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == ACTION_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one game session owns, constructed once and handed to each
/// component. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct SessionContext {
    config: Arc<SyncConfig>,
    api: Arc<dyn GameApi>,
    grid: Arc<Mutex<GridStore>>,
    player: Arc<Mutex<Player>>,
    move_state: Arc<Mutex<MoveState>>,
    action_log: Arc<Mutex<ActionLog>>,
}

impl SessionContext {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn GameApi>,
        mut grid: GridStore,
        player: Player,
    ) -> Self {
        grid.set_local_player(player.id);
        Self {
            config: Arc::new(config),
            api,
            grid: Arc::new(Mutex::new(grid)),
            player: Arc::new(Mutex::new(player)),
            move_state: Arc::new(Mutex::new(MoveState::default())),
            action_log: Arc::new(Mutex::new(ActionLog::default())),
        }
    }

    /// Fetches the local player and builds a fresh grid around it.
    ///
    /// A failed player lookup is returned to the caller; there is no retry.
    pub async fn bootstrap(
        config: SyncConfig,
        api: Arc<dyn GameApi>,
        terrain: &TerrainConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let player_id = config.player_id;
        let data = api
            .get_player(player_id)
            .await
            .map_err(|source| SessionError::Bootstrap { player_id, source })?;

        let player = Player::new(player_id, data.hp, data.atk, data.loc);
        info!(
            "Player {} starts at {} (hp {}, atk {})",
            player.id, player.coord, player.hp, player.atk
        );

        let grid = GridStore::new(config.grid_size, terrain);
        Ok(Self::new(config, api, grid, player))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn api(&self) -> Arc<dyn GameApi> {
        Arc::clone(&self.api)
    }

    pub fn grid(&self) -> Arc<Mutex<GridStore>> {
        Arc::clone(&self.grid)
    }

    pub fn with_grid<R>(&self, f: impl FnOnce(&GridStore) -> R) -> R {
        f(&lock(&self.grid))
    }

    pub fn player(&self) -> Player {
        *lock(&self.player)
    }

    pub(crate) fn set_player_coord(&self, coord: shared::Coord) {
        lock(&self.player).coord = coord;
    }

    /// Takes hit points and attack from the server's view of the local
    /// player's cell. The coordinate only changes through a confirmed move.
    pub(crate) fn refresh_player_stats(&self, hp: u32, atk: u32) {
        let mut player = lock(&self.player);
        if (player.hp, player.atk) != (hp, atk) {
            debug!("Player {} now hp {} atk {}", player.id, hp, atk);
            player.hp = hp;
            player.atk = atk;
        }
    }

    pub fn move_state(&self) -> MoveState {
        *lock(&self.move_state)
    }

    pub(crate) fn update_move_state(&self, f: impl FnOnce(&mut MoveState)) {
        f(&mut lock(&self.move_state));
    }

    pub fn log_action(&self, message: impl Into<String>) {
        lock(&self.action_log).push(message);
    }

    pub fn recent_actions(&self, count: usize) -> Vec<String> {
        let log = lock(&self.action_log);
        let skip = log.len().saturating_sub(count);
        log.entries().skip(skip).cloned().collect()
    }
}
