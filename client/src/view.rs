//! ASCII rendering of the area around the player.

use crate::grid::{Freshness, GridStore, Tile};
use shared::{Coord, EntityType, Player, TerrainType};
use std::time::Duration;
use tokio::time::Instant;

const FOG: char = '#';
const OFF_GRID: char = ' ';

pub struct Renderer {
    /// Cells drawn on each side of the player.
    radius: i32,
    /// Occupants older than this are drawn in lower case.
    aging_after: Duration,
}

impl Renderer {
    pub fn new(radius: i32, aging_after: Duration) -> Self {
        Self {
            radius,
            aging_after,
        }
    }

    /// Draws the square around `player`, one line per row, top row first.
    pub fn render(&self, grid: &GridStore, player: &Player, now: Instant) -> String {
        let center = player.coord;
        let mut lines = Vec::with_capacity((2 * self.radius + 1) as usize);

        for y in (center.y - self.radius)..=(center.y + self.radius) {
            let line: String = ((center.x - self.radius)..=(center.x + self.radius))
                .map(|x| {
                    let coord = Coord::new(x, y);
                    if coord == center {
                        return '@';
                    }
                    grid.get_tile(coord)
                        .map_or(OFF_GRID, |tile| self.glyph(tile, now))
                })
                .collect();
            lines.push(line);
        }

        lines.join("\n")
    }

    fn glyph(&self, tile: &Tile, now: Instant) -> char {
        match tile.freshness(now, self.aging_after) {
            Freshness::Unexplored => FOG,
            Freshness::Remembered | Freshness::Pending => terrain_glyph(tile),
            Freshness::Fresh => occupant_glyph(tile.occupant.entity_type)
                .unwrap_or_else(|| terrain_glyph(tile)),
            Freshness::Aging => occupant_glyph(tile.occupant.entity_type)
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or_else(|| terrain_glyph(tile)),
        }
    }
}

fn terrain_glyph(tile: &Tile) -> char {
    match tile.terrain {
        TerrainType::Grass => '.',
        TerrainType::Sand => ':',
        TerrainType::Ice => '=',
        TerrainType::Water if tile.is_bordering_land => ',',
        TerrainType::Water => '~',
        TerrainType::Rock => '^',
        TerrainType::None => '?',
    }
}

fn occupant_glyph(entity_type: EntityType) -> Option<char> {
    match entity_type {
        EntityType::None => None,
        EntityType::Player => Some('P'),
        EntityType::Monster => Some('M'),
        EntityType::Item => Some('I'),
    }
}

/// One-line summary of the local player and move readiness.
pub fn status_line(player: &Player, cooldown_left: Duration, pending: bool) -> String {
    let readiness = if pending {
        "move pending".to_string()
    } else if cooldown_left.is_zero() {
        "ready to move".to_string()
    } else {
        format!("next move in {:.1}s", cooldown_left.as_secs_f32())
    };
    format!(
        "player {} at {} hp {} atk {} | {}",
        player.id, player.coord, player.hp, player.atk, readiness
    )
}

pub const LEGEND: &str =
    "@ you  P player  M monster  I item  . grass  : sand  = ice  ~ water  ^ rock  # unexplored";
