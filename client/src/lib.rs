//! # World View Client Library
//!
//! This library keeps a client-side picture of a tile-based world in sync with
//! an authoritative game server. The server owns every position; the client
//! owns a fog-of-war cache of what it has recently seen and decides what to
//! ask for next.
//!
//! ## Architecture Overview
//!
//! Three components share one [`session::SessionContext`]:
//!
//! ### Tile Cache
//! [`grid::GridStore`] is a dense `size × size` array of tiles. Terrain is
//! known up front from a static configuration and never changes. Occupants
//! (players, monsters, items) are only trusted while their tile is inside
//! the viewport and are forgotten as soon as it leaves.
//!
//! ### Viewport Scheduler
//! [`scheduler::ViewportScheduler`] polls the 5×5 neighbourhood around the
//! player a few cells at a time. The nearest cells are always refreshed
//! first, then whatever has never been seen, then whatever has gone stale.
//! Responses that arrive after the viewport has moved are dropped.
//!
//! ### Move Coordinator
//! [`movement::MoveCoordinator`] turns a direction into a server move. It
//! rejects moves onto non-traversable terrain without a round trip, enforces
//! a cooldown measured from submission, pauses polling while the move is in
//! flight and adopts whatever position the server answers with.
//!
//! ## Module Organization
//!
//! - `api`: the [`api::GameApi`] seam and its HTTP/JSON implementation
//! - `mock_api`: an in-memory server for offline play and tests
//! - `config`, `terrain`: JSON configuration and the static terrain map
//! - `grid`, `scheduler`, `movement`: the synchronization engine
//! - `session`: shared per-session state and bootstrap
//! - `input`, `view`, `app`: the terminal front end
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{app::Client, api::HttpGameApi, config::SyncConfig};
//! use client::{session::SessionContext, terrain::TerrainConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig { player_id: 1, ..SyncConfig::default() };
//! let api = Arc::new(HttpGameApi::new(&config.server_url, config.request_timeout())?);
//! let terrain = TerrainConfig::load("terrain.json".as_ref())?;
//!
//! let session = SessionContext::bootstrap(config, api, &terrain).await?;
//! Client::new(session).run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Timing
//!
//! Every timestamp is a [`tokio::time::Instant`], so the whole engine runs
//! against tokio's clock and can be driven deterministically with a paused
//! runtime in tests.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod grid;
pub mod input;
pub mod mock_api;
pub mod movement;
pub mod scheduler;
pub mod session;
pub mod terrain;
pub mod view;
