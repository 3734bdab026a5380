//! Viewport refresh scheduler.
//!
//! Keeps the 5×5 neighbourhood around a reference coordinate fresh by
//! fetching it in fixed-size batches on a timer. The queue puts the cells
//! nearest the reference first, then cells never fetched, then expired
//! ones, then everything else, so staleness stays bounded under a small,
//! constant request rate.
//!
//! Each request is tagged with the scheduler's generation. Stopping or
//! retargeting bumps the generation, and a response carrying an old
//! generation is dropped instead of being written into the grid.

use crate::api::GameApi;
use crate::config::SchedulerConfig;
use crate::error::ApiError;
use crate::grid::{FetchedTile, GridStore};
use crate::session::{lock, SessionContext};
use log::{debug, info, warn};
use shared::{viewport_neighborhood, Coord, VIEW_RADIUS};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

/// Called after every applied batch with the fetched tiles and the full viewport.
pub type FetchListener = Arc<dyn Fn(&[FetchedTile], &HashSet<Coord>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The batch was written into the grid.
    Applied(usize),
    /// The request failed; the same batch is retried next cycle.
    Failed,
    /// The response belonged to a superseded generation.
    Discarded,
    /// Nothing to fetch.
    Idle,
}

struct SchedulerState {
    reference: Coord,
    queue: Vec<Coord>,
    viewport: HashSet<Coord>,
    cursor: usize,
    generation: u64,
    consecutive_failures: u32,
    task: Option<JoinHandle<()>>,
}

impl SchedulerState {
    /// The next `batch_size` queue entries from the cursor, wrapping around.
    /// A queue shorter than the batch repeats entries to fill it.
    fn next_batch(&self, batch_size: usize) -> Vec<Coord> {
        let len = self.queue.len();
        (0..batch_size)
            .map(|i| self.queue[(self.cursor + i) % len])
            .collect()
    }
}

/// Orders a neighbourhood for fetching.
///
/// The `priority_count` cells nearest `reference` come first regardless of
/// age. The remainder follows in three tiers (never fetched, older than
/// `stale_threshold`, fresh), each nearest first. Distance ties keep the
/// order of `neighborhood`.
pub fn order_queue(
    neighborhood: &[Coord],
    reference: Coord,
    grid: &GridStore,
    priority_count: usize,
    stale_threshold: Duration,
    now: Instant,
) -> Vec<Coord> {
    let mut queue = neighborhood.to_vec();
    queue.sort_by_key(|coord| coord.manhattan_distance(reference));

    let rest = queue.split_off(priority_count.min(queue.len()));

    let mut unknown = Vec::new();
    let mut expired = Vec::new();
    let mut fresh = Vec::new();
    for coord in rest {
        match grid.get_tile(coord).and_then(|tile| tile.fetched_at) {
            None => unknown.push(coord),
            Some(at) if now.saturating_duration_since(at) > stale_threshold => expired.push(coord),
            Some(_) => fresh.push(coord),
        }
    }

    queue.extend(unknown);
    queue.extend(expired);
    queue.extend(fresh);
    queue
}

/// Handle to the scheduler. Clones share the same state and polling task.
#[derive(Clone)]
pub struct ViewportScheduler {
    config: SchedulerConfig,
    api: Arc<dyn GameApi>,
    grid: Arc<Mutex<GridStore>>,
    session: SessionContext,
    state: Arc<Mutex<SchedulerState>>,
    listener: Option<FetchListener>,
}

impl ViewportScheduler {
    /// Creates a stopped scheduler with its queue built around `reference`.
    pub fn new(session: &SessionContext, reference: Coord) -> Self {
        let scheduler = Self {
            config: session.config().scheduler_config(),
            api: session.api(),
            grid: session.grid(),
            session: session.clone(),
            state: Arc::new(Mutex::new(SchedulerState {
                reference,
                queue: Vec::new(),
                viewport: HashSet::new(),
                cursor: 0,
                generation: 0,
                consecutive_failures: 0,
                task: None,
            })),
            listener: None,
        };
        scheduler.retarget(reference);
        scheduler
    }

    pub fn with_listener(mut self, listener: FetchListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).task.is_some()
    }

    pub fn reference(&self) -> Coord {
        lock(&self.state).reference
    }

    pub fn queue(&self) -> Vec<Coord> {
        lock(&self.state).queue.clone()
    }

    pub fn viewport(&self) -> HashSet<Coord> {
        lock(&self.state).viewport.clone()
    }

    pub fn cursor(&self) -> usize {
        lock(&self.state).cursor
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Spawns the polling task: one batch immediately, then one per poll
    /// interval (longer while backing off). No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut state = lock(&self.state);
        if state.task.is_some() {
            return;
        }

        let this = self.clone();
        state.task = Some(tokio::spawn(async move { this.poll_loop().await }));
        debug!("Viewport scheduler started around {}", state.reference);
    }

    /// Cancels the polling task if there is one. Any batch still in flight,
    /// including one driven through [`run_cycle`](Self::run_cycle) directly,
    /// is discarded when it returns.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
            debug!("Viewport scheduler stopped");
        }
    }

    /// Moves the viewport to `reference` and restarts polling from the
    /// front of the new queue.
    pub fn update_reference(&self, reference: Coord) {
        self.stop();
        self.retarget(reference);
        self.start();
        info!("Viewport now centred on {}", reference);
    }

    /// Rebuilds neighbourhood and queue around `reference` and resets the
    /// cursor, leaving the running state alone.
    pub fn retarget(&self, reference: Coord) {
        let mut state = lock(&self.state);
        let grid = lock(&self.grid);

        let neighborhood: Vec<Coord> = viewport_neighborhood(reference, VIEW_RADIUS)
            .into_iter()
            .filter(|&coord| grid.contains(coord))
            .collect();

        state.queue = order_queue(
            &neighborhood,
            reference,
            &grid,
            self.config.priority_count,
            self.config.stale_threshold,
            Instant::now(),
        );
        state.viewport = neighborhood.into_iter().collect();
        state.reference = reference;
        state.cursor = 0;
        state.consecutive_failures = 0;
        state.generation += 1;
    }

    /// Fetches the next batch and, if still current, writes it into the grid.
    ///
    /// Stats carried by the local player's own cell refresh the session
    /// player; its position is left to the move coordinator.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let (generation, batch) = {
            let state = lock(&self.state);
            if state.queue.is_empty() {
                return CycleOutcome::Idle;
            }
            (state.generation, state.next_batch(self.config.batch_size))
        };

        debug!("Fetching {} tiles: {:?}", batch.len(), batch);
        let result = match timeout(self.config.request_timeout, self.api.fetch_cells(&batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.config.request_timeout)),
        };

        let (tiles, viewport, local) = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                debug!(
                    "Discarding batch from generation {} (now {})",
                    generation, state.generation
                );
                return CycleOutcome::Discarded;
            }

            let cells = match result {
                Ok(cells) if cells.len() >= batch.len() => cells,
                Ok(cells) => {
                    state.consecutive_failures += 1;
                    warn!(
                        "Tile fetch returned {} cells for {} coordinates",
                        cells.len(),
                        batch.len()
                    );
                    return CycleOutcome::Failed;
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    warn!(
                        "Tile fetch failed ({} in a row): {}",
                        state.consecutive_failures, e
                    );
                    return CycleOutcome::Failed;
                }
            };

            let tiles: Vec<FetchedTile> = batch
                .iter()
                .zip(cells)
                .map(|(&coord, cell)| FetchedTile { coord, cell })
                .collect();

            let local =
                lock(&self.grid).update_visibility(&state.viewport, &tiles, Instant::now());
            state.cursor = (state.cursor + self.config.batch_size) % state.queue.len();
            state.consecutive_failures = 0;
            (tiles, state.viewport.clone(), local)
        };

        if let Some(occupant) = local {
            self.session.refresh_player_stats(occupant.hp, occupant.atk);
        }

        if let Some(listener) = &self.listener {
            listener(&tiles, &viewport);
        }
        CycleOutcome::Applied(tiles.len())
    }

    async fn poll_loop(self) {
        loop {
            self.run_cycle().await;
            let failures = lock(&self.state).consecutive_failures;
            tokio::time::sleep(self.config.retry_delay(failures)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::mock_api::MockGameApi;
    use crate::terrain::TerrainConfig;
    use shared::{CellData, EntityType, Occupant, Player};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(reference: Coord) -> (Arc<MockGameApi>, SessionContext, ViewportScheduler) {
        let api = Arc::new(MockGameApi::new(64, TerrainConfig::new()));
        let dyn_api: Arc<dyn GameApi> = api.clone();
        let config = SyncConfig {
            request_timeout_ms: 5000,
            max_backoff_ms: 10_000,
            ..SyncConfig::default()
        };
        let session = SessionContext::new(
            config,
            dyn_api,
            GridStore::new(64, &TerrainConfig::new()),
            Player::new(1, 10, 1, reference),
        );
        let scheduler = ViewportScheduler::new(&session, reference);
        (api, session, scheduler)
    }

    fn mark_fetched(session: &SessionContext, coords: &[Coord], at: Instant) {
        let tiles: Vec<FetchedTile> = coords
            .iter()
            .map(|&coord| FetchedTile {
                coord,
                cell: CellData::default(),
            })
            .collect();
        let viewport: HashSet<Coord> = coords.iter().copied().collect();
        lock(&session.grid()).update_visibility(&viewport, &tiles, at);
    }

    #[tokio::test]
    async fn test_queue_starts_with_priority_then_distance() {
        let reference = Coord::new(10, 10);
        let (_, _, scheduler) = setup(reference);
        let queue = scheduler.queue();

        assert_eq!(queue.len(), 25);
        assert_eq!(queue[0], reference);
        assert!(queue
            .windows(2)
            .all(|w| w[0].manhattan_distance(reference) <= w[1].manhattan_distance(reference)));
        assert_eq!(scheduler.viewport().len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfetched_tiles_precede_fetched_in_non_priority_portion() {
        let reference = Coord::new(10, 10);
        let (_, session, scheduler) = setup(reference);
        let start = Instant::now();

        // expired tiles nearby, fresh tiles at the corners
        let expired = [Coord::new(9, 9), Coord::new(11, 11)];
        let fresh = [Coord::new(8, 8), Coord::new(12, 12)];
        mark_fetched(&session, &expired, start);
        tokio::time::advance(Duration::from_millis(6000)).await;
        mark_fetched(&session, &fresh, Instant::now());

        scheduler.retarget(reference);
        let queue = scheduler.queue();
        let rest = &queue[5..];

        let tier = |coord: &Coord| {
            if expired.contains(coord) {
                1
            } else if fresh.contains(coord) {
                2
            } else {
                0
            }
        };
        let tiers: Vec<u8> = rest.iter().map(tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort();
        assert_eq!(tiers, sorted, "queue tiers out of order: {:?}", rest);
        assert_eq!(&rest[rest.len() - 2..], &fresh[..]);
        assert_eq!(&rest[rest.len() - 4..rest.len() - 2], &expired[..]);
    }

    #[tokio::test]
    async fn test_priority_cells_ignore_freshness() {
        let reference = Coord::new(10, 10);
        let (_, session, scheduler) = setup(reference);
        mark_fetched(&session, &[reference, Coord::new(10, 11)], Instant::now());

        scheduler.retarget(reference);
        let queue = scheduler.queue();
        assert_eq!(queue[0], reference);
        assert!(queue[..5].contains(&Coord::new(10, 11)));
    }

    #[tokio::test]
    async fn test_cycles_cover_neighborhood() {
        for reference in [Coord::new(0, 0), Coord::new(1, 0), Coord::new(20, 20)] {
            let (api, _, scheduler) = setup(reference);
            let size = scheduler.queue().len();
            let cycles = (size + 4) / 5;

            for _ in 0..cycles {
                assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Applied(_)));
            }

            let visited: HashSet<Coord> = api.fetch_requests().into_iter().flatten().collect();
            assert_eq!(visited, scheduler.viewport(), "reference {}", reference);
        }
    }

    #[tokio::test]
    async fn test_batches_wrap_around_queue() {
        let (api, _, scheduler) = setup(Coord::new(0, 0));
        let queue = scheduler.queue();
        assert_eq!(queue.len(), 9);

        scheduler.run_cycle().await;
        scheduler.run_cycle().await;
        let requests = api.fetch_requests();

        assert_eq!(requests[0], queue[0..5].to_vec());
        assert_eq!(
            requests[1],
            vec![queue[5], queue[6], queue[7], queue[8], queue[0]]
        );
        assert_eq!(scheduler.cursor(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried() {
        let (api, session, scheduler) = setup(Coord::new(10, 10));
        api.fail_fetches(1);

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Failed);
        assert_eq!(scheduler.cursor(), 0);
        session.with_grid(|grid| {
            assert!(grid.tiles().all(|t| t.fetched_at.is_none()));
        });

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Applied(5));
        let requests = api.fetch_requests();
        assert_eq!(requests[0], requests[1]);
        assert_eq!(scheduler.cursor(), 5);
    }

    #[tokio::test]
    async fn test_short_response_counts_as_failure() {
        struct ShortApi;

        #[async_trait::async_trait]
        impl GameApi for ShortApi {
            async fn fetch_cells(&self, _: &[Coord]) -> Result<Vec<CellData>, ApiError> {
                Ok(vec![CellData::default()])
            }
            async fn submit_move(
                &self,
                _: u32,
                _: shared::Direction,
            ) -> Result<shared::MoveResponse, ApiError> {
                Err(ApiError::Unavailable("unused".into()))
            }
            async fn get_player(&self, _: u32) -> Result<shared::PlayerData, ApiError> {
                Err(ApiError::Unavailable("unused".into()))
            }
        }

        let session = SessionContext::new(
            SyncConfig::default(),
            Arc::new(ShortApi),
            GridStore::new(64, &TerrainConfig::new()),
            Player::new(1, 1, 1, Coord::new(5, 5)),
        );
        let scheduler = ViewportScheduler::new(&session, Coord::new(5, 5));
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Failed);
        assert_eq!(scheduler.cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_is_discarded() {
        let (api, session, scheduler) = setup(Coord::new(10, 10));
        api.place(
            Coord::new(10, 10),
            Occupant {
                entity_type: EntityType::Monster,
                entity_id: 4,
                hp: 3,
                atk: 1,
            },
        );
        api.set_fetch_latency(Duration::from_millis(300));

        let in_flight = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_cycle().await })
        };
        tokio::task::yield_now().await;
        scheduler.retarget(Coord::new(30, 30));

        assert_eq!(in_flight.await.unwrap(), CycleOutcome::Discarded);
        session.with_grid(|grid| {
            assert!(grid.get_tile(Coord::new(10, 10)).unwrap().occupant.is_empty());
            assert_eq!(grid.shown_count(), 0);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_times_out() {
        let (api, _, scheduler) = setup(Coord::new(10, 10));
        api.set_fetch_latency(Duration::from_secs(60));

        let started = Instant::now();
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Failed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately_then_on_interval() {
        let (api, _, scheduler) = setup(Coord::new(10, 10));

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetch_count(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(api.fetch_count(), 2);

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_exponentially() {
        let (api, _, scheduler) = setup(Coord::new(10, 10));
        api.fail_fetches(3);

        scheduler.start();
        // attempts at 0s, 2s, 6s (fail) and 14s (succeeds), then every 1s
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetch_count(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(api.fetch_count(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(api.fetch_count(), 2);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(api.fetch_count(), 3);

        tokio::time::sleep(Duration::from_millis(8000)).await;
        assert_eq!(api.fetch_count(), 4);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(api.fetch_count(), 5);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_reference_restarts_from_front() {
        let (api, _, scheduler) = setup(Coord::new(10, 10));
        scheduler.run_cycle().await;
        assert_eq!(scheduler.cursor(), 5);
        let generation = scheduler.generation();

        scheduler.update_reference(Coord::new(11, 10));
        assert!(scheduler.is_running());
        assert_eq!(scheduler.reference(), Coord::new(11, 10));
        assert!(scheduler.generation() > generation);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let requests = api.fetch_requests();
        assert_eq!(requests.last().unwrap()[0], Coord::new(11, 10));
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_listener_receives_batch_and_viewport() {
        let (_, session, _) = setup(Coord::new(10, 10));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let scheduler = ViewportScheduler::new(&session, Coord::new(10, 10)).with_listener(
            Arc::new(move |tiles: &[FetchedTile], viewport: &HashSet<Coord>| {
                assert_eq!(tiles.len(), 5);
                assert_eq!(viewport.len(), 25);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scheduler.run_cycle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_manual_cycle_in_flight() {
        let (api, session, scheduler) = setup(Coord::new(10, 10));
        api.set_fetch_latency(Duration::from_millis(300));
        assert!(!scheduler.is_running());

        let in_flight = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_cycle().await })
        };
        tokio::task::yield_now().await;
        scheduler.stop();

        assert_eq!(in_flight.await.unwrap(), CycleOutcome::Discarded);
        session.with_grid(|grid| assert_eq!(grid.shown_count(), 0));
    }

    #[tokio::test]
    async fn test_short_queue_fills_batch() {
        let api = Arc::new(MockGameApi::new(2, TerrainConfig::new()));
        let dyn_api: Arc<dyn GameApi> = api.clone();
        let session = SessionContext::new(
            SyncConfig::default(),
            dyn_api,
            GridStore::new(2, &TerrainConfig::new()),
            Player::new(1, 10, 1, Coord::new(0, 0)),
        );
        let scheduler = ViewportScheduler::new(&session, Coord::new(0, 0));
        let queue = scheduler.queue();
        assert_eq!(queue.len(), 4);

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Applied(5));
        let requests = api.fetch_requests();
        assert_eq!(requests[0].len(), 5);
        assert_eq!(&requests[0][..4], &queue[..]);
        assert_eq!(requests[0][4], queue[0]);
        assert_eq!(scheduler.cursor(), 1);
    }

    #[tokio::test]
    async fn test_local_player_stats_refresh_from_fetch() {
        let reference = Coord::new(10, 10);
        let (api, session, scheduler) = setup(reference);
        api.add_player(1, 3, 7, reference);

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Applied(_)));
        let player = session.player();
        assert_eq!((player.hp, player.atk), (3, 7));
        assert_eq!(player.coord, reference);
        session.with_grid(|grid| assert!(grid.observed_players().is_empty()));
    }

    #[tokio::test]
    async fn test_local_player_seen_elsewhere_keeps_position() {
        let reference = Coord::new(10, 10);
        let (api, session, scheduler) = setup(reference);
        api.place(
            Coord::new(10, 11),
            Occupant {
                entity_type: EntityType::Player,
                entity_id: 1,
                hp: 4,
                atk: 5,
            },
        );

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Applied(_)));
        let player = session.player();
        assert_eq!((player.hp, player.atk), (4, 5));
        assert_eq!(player.coord, reference);
    }

    #[tokio::test]
    async fn test_neighborhood_clipped_to_grid() {
        let (_, _, scheduler) = setup(Coord::new(63, 63));
        assert_eq!(scheduler.queue().len(), 9);
        assert!(scheduler.viewport().iter().all(|c| c.x <= 63 && c.y <= 63));
    }
}
