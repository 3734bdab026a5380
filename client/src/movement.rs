//! Rate-limited, server-authoritative player movement.
//!
//! A move goes `IDLE → PENDING → IDLE`. The cooldown is armed when the
//! request is sent, not when it completes, so a fast server cannot shorten
//! it. The viewport scheduler is paused for the whole pending window and
//! resumed around whichever coordinate the player ends up on.

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::scheduler::ViewportScheduler;
use crate::session::SessionContext;
use log::{debug, info, warn};
use shared::{Coord, Direction, MoveResponse, TerrainType};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Terrain types a player may step onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPolicy {
    allowed: HashSet<TerrainType>,
}

impl TraversalPolicy {
    pub fn new(allowed: impl IntoIterator<Item = TerrainType>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.traversable.iter().copied())
    }

    pub fn allows(&self, terrain: TerrainType) -> bool {
        self.allowed.contains(&terrain)
    }
}

impl Default for TraversalPolicy {
    fn default() -> Self {
        Self::new([TerrainType::Grass, TerrainType::Ice, TerrainType::Sand])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Rejected locally; nothing was sent and no cooldown was spent.
    Blocked { target: Coord, terrain: TerrainType },
    /// The server placed the player at `to`.
    Moved { to: Coord },
    Failed { reason: String },
}

#[derive(Clone)]
pub struct MoveCoordinator {
    session: SessionContext,
    scheduler: ViewportScheduler,
    policy: TraversalPolicy,
    cooldown: Duration,
}

impl MoveCoordinator {
    pub fn new(session: &SessionContext, scheduler: ViewportScheduler) -> Self {
        Self {
            policy: TraversalPolicy::from_config(session.config()),
            cooldown: session.config().move_cooldown(),
            session: session.clone(),
            scheduler,
        }
    }

    pub fn with_policy(mut self, policy: TraversalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &TraversalPolicy {
        &self.policy
    }

    pub fn scheduler(&self) -> &ViewportScheduler {
        &self.scheduler
    }

    pub fn is_pending(&self) -> bool {
        self.session.move_state().pending
    }

    /// True when no move is in flight and the cooldown has elapsed.
    pub fn is_move_available(&self) -> bool {
        let state = self.session.move_state();
        let cooled_down = match state.last_move_at {
            None => true,
            Some(at) => at.elapsed() >= self.cooldown,
        };
        cooled_down && !state.pending
    }

    /// Remaining cooldown; zero once a new move may be sent.
    pub fn time_until_next_move(&self) -> Duration {
        self.session
            .move_state()
            .last_move_at
            .map_or(Duration::ZERO, |at| self.cooldown.saturating_sub(at.elapsed()))
    }

    /// Attempts one step in `direction`.
    ///
    /// Callers must check [`is_move_available`](Self::is_move_available)
    /// first. Nothing here prevents a second call while a move is pending.
    pub async fn submit_move(&self, direction: Direction) -> MoveOutcome {
        let player = self.session.player();
        let origin = player.coord;
        let target = origin.step(direction);

        let terrain = self.session.with_grid(|grid| {
            grid.get_tile(target)
                .map_or(TerrainType::None, |tile| tile.terrain)
        });
        if !self.policy.allows(terrain) {
            debug!("Move {} onto {:?} at {} rejected", direction, terrain, target);
            return MoveOutcome::Blocked { target, terrain };
        }

        self.session.update_move_state(|state| {
            state.last_move_at = Some(Instant::now());
            state.pending = true;
        });
        self.scheduler.stop();

        let request_timeout = self.session.config().request_timeout();
        let api = self.session.api();
        let result = match timeout(request_timeout, api.submit_move(player.id, direction)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(request_timeout)),
        };

        let outcome = match result {
            Ok(MoveResponse {
                my_new_coords: Some(to),
                rate_limited,
            }) => {
                if rate_limited {
                    warn!("Server flagged move {} as rate limited", direction);
                }
                self.session.set_player_coord(to);
                self.scheduler.update_reference(to);
                self.session
                    .log_action(format!("move {} received: success {}", direction, to));
                info!("Moved {} from {} to {}", direction, origin, to);
                MoveOutcome::Moved { to }
            }
            Ok(_) => self.fail(direction, origin, "response carried no coordinates".into()),
            Err(e) => self.fail(direction, origin, e.to_string()),
        };

        self.session.update_move_state(|state| state.pending = false);
        outcome
    }

    fn fail(&self, direction: Direction, origin: Coord, reason: String) -> MoveOutcome {
        warn!("Move {} from {} failed: {}", direction, origin, reason);
        self.session
            .log_action(format!("move {} received: failure", direction));
        self.scheduler.update_reference(origin);
        MoveOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GameApi;
    use crate::grid::GridStore;
    use crate::mock_api::MockGameApi;
    use crate::terrain::TerrainConfig;
    use shared::Player;
    use std::sync::Arc;

    const START: Coord = Coord { x: 2, y: 4 };

    /// Grass everywhere except a water column at x = 1.
    fn world() -> (Arc<MockGameApi>, SessionContext, MoveCoordinator) {
        let terrain = TerrainConfig::from_fn(16, |c| {
            if c.x == 1 {
                TerrainType::Water
            } else {
                TerrainType::Grass
            }
        });
        let api = Arc::new(MockGameApi::new(16, terrain.clone()));
        api.add_player(1, 10, 2, START);

        let dyn_api: Arc<dyn GameApi> = api.clone();
        let config = SyncConfig {
            player_id: 1,
            grid_size: 16,
            ..SyncConfig::default()
        };
        let session = SessionContext::new(
            config,
            dyn_api,
            GridStore::new(16, &terrain),
            Player::new(1, 10, 2, START),
        );
        let scheduler = ViewportScheduler::new(&session, START);
        let mover = MoveCoordinator::new(&session, scheduler);
        (api, session, mover)
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_takes_server_coordinate() {
        let (api, session, mover) = world();
        api.force_move_response(MoveResponse {
            my_new_coords: Some(Coord::new(9, 9)),
            rate_limited: false,
        });

        let outcome = mover.submit_move(Direction::Right).await;

        assert_eq!(outcome, MoveOutcome::Moved { to: Coord::new(9, 9) });
        assert_eq!(session.player().coord, Coord::new(9, 9));
        assert_eq!(mover.scheduler().reference(), Coord::new(9, 9));
        assert!(mover.scheduler().is_running());
        assert!(!mover.is_pending());
        assert_eq!(
            session.recent_actions(1),
            vec!["move RIGHT received: success (9, 9)".to_string()]
        );
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_move_sends_nothing() {
        let (api, session, mover) = world();
        mover.scheduler().start();

        let outcome = mover.submit_move(Direction::Left).await;

        assert_eq!(
            outcome,
            MoveOutcome::Blocked {
                target: Coord::new(1, 4),
                terrain: TerrainType::Water
            }
        );
        assert_eq!(api.move_count(), 0);
        assert_eq!(session.move_state().last_move_at, None);
        assert_eq!(session.player().coord, START);
        assert!(mover.is_move_available());
        assert!(mover.scheduler().is_running());
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_off_grid_is_blocked() {
        let (api, session, mover) = world();
        session.set_player_coord(Coord::new(5, 0));

        let outcome = mover.submit_move(Direction::Up).await;
        assert!(matches!(outcome, MoveOutcome::Blocked { terrain: TerrainType::None, .. }));
        assert_eq!(api.move_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_resumes_at_origin() {
        let (api, session, mover) = world();
        api.fail_moves(1);
        mover.scheduler().start();

        let outcome = mover.submit_move(Direction::Right).await;

        assert!(matches!(outcome, MoveOutcome::Failed { .. }));
        assert_eq!(session.player().coord, START);
        assert_eq!(mover.scheduler().reference(), START);
        assert!(mover.scheduler().is_running());
        assert!(!mover.is_pending());
        assert_eq!(
            session.recent_actions(1),
            vec!["move RIGHT received: failure".to_string()]
        );
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_without_coordinates_is_failure() {
        let (api, session, mover) = world();
        api.force_move_response(MoveResponse::default());

        let outcome = mover.submit_move(Direction::Right).await;
        assert!(matches!(outcome, MoveOutcome::Failed { .. }));
        assert_eq!(session.player().coord, START);
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_move_times_out() {
        let (api, session, mover) = world();
        api.set_move_latency(Duration::from_secs(120));

        let outcome = mover.submit_move(Direction::Right).await;
        assert!(matches!(outcome, MoveOutcome::Failed { .. }));
        assert_eq!(session.player().coord, START);
        assert!(!mover.is_pending());
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_runs_from_submission() {
        let (_, _, mover) = world();
        assert!(mover.is_move_available());
        assert_eq!(mover.time_until_next_move(), Duration::ZERO);

        let outcome = mover.submit_move(Direction::Right).await;
        assert_eq!(outcome, MoveOutcome::Moved { to: Coord::new(3, 4) });
        assert!(!mover.is_move_available());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(mover.time_until_next_move(), Duration::from_millis(2500));
        assert!(!mover.is_move_available());

        tokio::time::advance(Duration::from_millis(2499)).await;
        assert!(!mover.is_move_available());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(mover.is_move_available());
        mover.scheduler().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_paused_while_pending() {
        let (api, _, mover) = world();
        api.set_move_latency(Duration::from_millis(400));
        mover.scheduler().start();

        let in_flight = {
            let mover = mover.clone();
            tokio::spawn(async move { mover.submit_move(Direction::Down).await })
        };
        tokio::task::yield_now().await;

        assert!(mover.is_pending());
        assert!(!mover.is_move_available());
        assert!(!mover.scheduler().is_running());

        let outcome = in_flight.await.unwrap();
        assert_eq!(outcome, MoveOutcome::Moved { to: Coord::new(2, 5) });
        assert!(!mover.is_pending());
        assert!(mover.scheduler().is_running());
        mover.scheduler().stop();
    }

    #[test]
    fn test_traversal_policy() {
        let policy = TraversalPolicy::default();
        assert!(policy.allows(TerrainType::Grass));
        assert!(policy.allows(TerrainType::Ice));
        assert!(policy.allows(TerrainType::Sand));
        assert!(!policy.allows(TerrainType::Water));
        assert!(!policy.allows(TerrainType::Rock));
        assert!(!policy.allows(TerrainType::None));

        let config = SyncConfig {
            traversable: vec![TerrainType::Water],
            ..SyncConfig::default()
        };
        assert!(TraversalPolicy::from_config(&config).allows(TerrainType::Water));
    }
}
