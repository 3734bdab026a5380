//! Interactive terminal client: a command loop over stdin with periodic
//! status logging and moves submitted in the background.

use crate::input::{parse_command, Command, InputDebouncer, HELP_TEXT};
use crate::movement::{MoveCoordinator, MoveOutcome};
use crate::scheduler::ViewportScheduler;
use crate::session::SessionContext;
use crate::view::{status_line, Renderer, LEGEND};
use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};

const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const RECENT_ACTIONS_SHOWN: usize = 5;
/// Occupants fetched longer ago than this are drawn as aging.
const OCCUPANT_AGING: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

/// Terminal front end: reads commands from stdin and drives the engine.
pub struct Client {
    session: SessionContext,
    scheduler: ViewportScheduler,
    mover: MoveCoordinator,
    debouncer: InputDebouncer,
    renderer: Renderer,
    in_flight: Option<JoinHandle<MoveOutcome>>,
}

impl Client {
    pub fn new(session: SessionContext) -> Self {
        let scheduler = ViewportScheduler::new(&session, session.player().coord);
        let mover = MoveCoordinator::new(&session, scheduler.clone());
        let debouncer = InputDebouncer::new(session.config().input_debounce());
        let renderer = Renderer::new(shared::VIEW_RADIUS + 2, OCCUPANT_AGING);

        Self {
            session,
            scheduler,
            mover,
            debouncer,
            renderer,
            in_flight: None,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn scheduler(&self) -> &ViewportScheduler {
        &self.scheduler
    }

    pub fn mover(&self) -> &MoveCoordinator {
        &self.mover
    }

    pub fn frame(&self) -> String {
        let player = self.session.player();
        let now = Instant::now();
        self.session
            .with_grid(|grid| self.renderer.render(grid, &player, now))
    }

    pub fn status(&self) -> String {
        status_line(
            &self.session.player(),
            self.mover.time_until_next_move(),
            self.mover.is_pending(),
        )
    }

    /// Executes one command. Moves run in the background; their result is
    /// printed when the server answers.
    pub fn handle_command(&mut self, command: Command, now: Instant) -> Action {
        match command {
            Command::Move(direction) => {
                if !self.debouncer.accept(now) {
                    debug!("Dropped {} input inside debounce window", direction);
                    return Action::Continue;
                }
                if !self.mover.is_move_available() {
                    println!("Can't move yet: {}", self.status());
                    return Action::Continue;
                }

                let mover = self.mover.clone();
                self.in_flight = Some(tokio::spawn(async move {
                    let outcome = mover.submit_move(direction).await;
                    println!("{}", describe(&outcome));
                    outcome
                }));
            }
            Command::Look => {
                println!("{}\n{}", self.frame(), LEGEND);
            }
            Command::Status => {
                println!("{}", self.status());
                let others = self.session.with_grid(|grid| grid.observed_players().len());
                println!("{} other player(s) in sight", others);
                for action in self.session.recent_actions(RECENT_ACTIONS_SHOWN) {
                    println!("  {}", action);
                }
            }
            Command::Help => println!("{}", HELP_TEXT),
            Command::Quit => return Action::Quit,
        }
        Action::Continue
    }

    /// Waits for the last submitted move, if any, to finish.
    pub async fn wait_for_move(&mut self) -> Option<MoveOutcome> {
        let handle = self.in_flight.take()?;
        handle.await.ok()
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.scheduler.start();
        println!("{}\n\n{}", HELP_TEXT, self.status());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut status_interval = interval(STATUS_INTERVAL);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("Input closed");
                        break;
                    };
                    match parse_command(&line) {
                        Some(command) => {
                            if self.handle_command(command, Instant::now()) == Action::Quit {
                                break;
                            }
                        }
                        None if line.trim().is_empty() => {}
                        None => println!("Unknown command '{}', try 'help'", line.trim()),
                    }
                },

                _ = status_interval.tick() => {
                    let shown = self.session.with_grid(|grid| grid.shown_count());
                    info!("{} ({} tiles in view)", self.status(), shown);
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        // a finishing move restarts the scheduler, so settle it first
        self.wait_for_move().await;
        self.scheduler.stop();
        info!("Client stopped");
    }
}

fn describe(outcome: &MoveOutcome) -> String {
    match outcome {
        MoveOutcome::Blocked { target, terrain } => {
            format!("Can't walk onto {:?} at {}", terrain, target)
        }
        MoveOutcome::Moved { to } => format!("Moved to {}", to),
        MoveOutcome::Failed { reason } => format!("Move failed: {}", reason),
    }
}
