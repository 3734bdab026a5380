//! Player input: debouncing and command parsing

use shared::Direction;
use std::time::Duration;
use tokio::time::Instant;

/// Drops inputs that arrive too soon after the last accepted one.
#[derive(Debug, Clone)]
pub struct InputDebouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl InputDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Returns whether an input arriving at `now` is accepted. Rejected
    /// inputs do not extend the window.
    pub fn accept(&mut self, now: Instant) -> bool {
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if accepted {
            self.last_accepted = Some(now);
        }
        accepted
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    /// Redraw the viewport.
    Look,
    Status,
    Help,
    Quit,
}

pub const HELP_TEXT: &str = "\
Commands:
  w/a/s/d, h/j/k/l, up/down/left/right   move one tile
  move <direction>                       same as above
  look                                   redraw the viewport
  status                                 player, cooldown and recent events
  help                                   this text
  quit                                   exit";

/// Parses one line of user input. Blank lines and unknown words yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let first = words.next()?.to_ascii_lowercase();

    let command = match first.as_str() {
        "look" => Command::Look,
        "status" | "st" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "move" | "go" => Command::Move(words.next()?.parse().ok()?),
        other => Command::Move(other.parse().ok()?),
    };

    if words.next().is_some() {
        return None;
    }
    Some(command)
}
