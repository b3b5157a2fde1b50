//! Static arena geometry
//!
//! One fixed map shared by all matches: a symmetric obstacle layout and
//! eight spawn points on a circle around the world centre.

use std::sync::OnceLock;

use super::{MAX_PLAYERS, WORLD_HEIGHT, WORLD_WIDTH};

pub const MAP_ID: &str = "arena_v1";

/// Axis-aligned obstacle, in world coordinates
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

pub const OBSTACLES: [Aabb; 10] = [
    Aabb { x: 180, y: 180, w: 120, h: 40 },
    Aabb { x: 724, y: 180, w: 120, h: 40 },
    Aabb { x: 180, y: 804, w: 120, h: 40 },
    Aabb { x: 724, y: 804, w: 120, h: 40 },
    Aabb { x: 492, y: 220, w: 40, h: 120 },
    Aabb { x: 492, y: 684, w: 40, h: 120 },
    Aabb { x: 220, y: 492, w: 120, h: 40 },
    Aabb { x: 684, y: 492, w: 120, h: 40 },
    Aabb { x: 400, y: 400, w: 60, h: 60 },
    Aabb { x: 564, y: 564, w: 60, h: 60 },
];

const SPAWN_RADIUS: f64 = 360.0;

static SPAWN_POINTS: OnceLock<[(i32, i32); MAX_PLAYERS]> = OnceLock::new();

/// Fixed spawn point for a slot, evenly spaced on the spawn circle.
pub fn spawn_point(slot: usize) -> (i32, i32) {
    let points = SPAWN_POINTS.get_or_init(|| {
        let mut points = [(0, 0); MAX_PLAYERS];
        for (i, point) in points.iter_mut().enumerate() {
            let angle = std::f64::consts::TAU * i as f64 / MAX_PLAYERS as f64;
            let x = (WORLD_WIDTH as f64 / 2.0 + angle.cos() * SPAWN_RADIUS).round() as i32;
            let y = (WORLD_HEIGHT as f64 / 2.0 + angle.sin() * SPAWN_RADIUS).round() as i32;
            *point = (x, y);
        }
        points
    });
    points.get(slot).copied().unwrap_or((WORLD_WIDTH / 2, WORLD_HEIGHT / 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PLAYER_RADIUS;

    #[test]
    fn spawn_points_are_inside_world_bounds() {
        for slot in 0..MAX_PLAYERS {
            let (x, y) = spawn_point(slot);
            assert!(x >= PLAYER_RADIUS && x <= WORLD_WIDTH - PLAYER_RADIUS);
            assert!(y >= PLAYER_RADIUS && y <= WORLD_HEIGHT - PLAYER_RADIUS);
        }
    }

    #[test]
    fn spawn_points_are_distinct() {
        for a in 0..MAX_PLAYERS {
            for b in (a + 1)..MAX_PLAYERS {
                assert_ne!(spawn_point(a), spawn_point(b));
            }
        }
    }

    #[test]
    fn out_of_range_slot_falls_back_to_centre() {
        assert_eq!(spawn_point(42), (WORLD_WIDTH / 2, WORLD_HEIGHT / 2));
    }
}
