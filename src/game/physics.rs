//! Movement and collision
//!
//! Positions are integers and movement is resolved one axis at a time: the X
//! component is applied and reverted on overlap, then the Y component. A
//! diagonal move blocked on one axis still advances on the other, so players
//! slide along walls instead of sticking to them.

use super::map::Aabb;
use super::state::PlayerState;
use super::{PLAYER_RADIUS, PLAYER_SPEED_PER_TICK, WORLD_HEIGHT, WORLD_WIDTH};

/// Collapse an untrusted move direction to 0..=8 (0 = none)
pub fn normalize_move_dir(move_dir: i32) -> u8 {
    if (0..=8).contains(&move_dir) {
        move_dir as u8
    } else {
        0
    }
}

/// Collapse an untrusted aim direction to 0..=15 (16-way compass)
pub fn normalize_aim_dir(aim_dir: i32) -> u8 {
    if (0..=15).contains(&aim_dir) {
        aim_dir as u8
    } else {
        0
    }
}

/// Per-tick displacement for an 8-way compass direction.
/// Diagonals use 3/3 so their length stays close to the axis speed of 4.
pub fn move_vector(move_dir: u8) -> (i32, i32) {
    match move_dir {
        1 => (0, -4),
        2 => (3, -3),
        3 => (4, 0),
        4 => (3, 3),
        5 => (0, 4),
        6 => (-3, 3),
        7 => (-4, 0),
        8 => (-3, -3),
        _ => (0, 0),
    }
}

/// Apply a displacement with axis-separated collision resolution.
pub fn move_with_collision(player: &mut PlayerState, dx: i32, dy: i32, obstacles: &[Aabb]) {
    let ndx = dx.clamp(-PLAYER_SPEED_PER_TICK, PLAYER_SPEED_PER_TICK);
    let ndy = dy.clamp(-PLAYER_SPEED_PER_TICK, PLAYER_SPEED_PER_TICK);

    let old_x = player.x;
    let old_y = player.y;

    player.x = (old_x + ndx).clamp(PLAYER_RADIUS, WORLD_WIDTH - PLAYER_RADIUS);
    if collides_any(player.x, player.y, obstacles) {
        player.x = old_x;
    }

    player.y = (old_y + ndy).clamp(PLAYER_RADIUS, WORLD_HEIGHT - PLAYER_RADIUS);
    if collides_any(player.x, player.y, obstacles) {
        player.y = old_y;
    }
}

/// Point-in-expanded-box test: the player circle overlaps an obstacle iff its
/// centre lies inside the obstacle grown by the player radius on every side.
pub fn collides_any(x: i32, y: i32, obstacles: &[Aabb]) -> bool {
    let r = PLAYER_RADIUS;
    obstacles.iter().any(|o| {
        x >= o.x - r && x <= o.x + o.w + r && y >= o.y - r && y <= o.y + o.h + r
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player_at(x: i32, y: i32) -> PlayerState {
        PlayerState {
            present: true,
            alive: true,
            x,
            y,
            ..PlayerState::default()
        }
    }

    #[test]
    fn out_of_range_directions_become_none() {
        assert_eq!(normalize_move_dir(-1), 0);
        assert_eq!(normalize_move_dir(9), 0);
        assert_eq!(normalize_move_dir(5), 5);
        assert_eq!(normalize_aim_dir(16), 0);
        assert_eq!(normalize_aim_dir(-3), 0);
        assert_eq!(normalize_aim_dir(15), 15);
    }

    #[test]
    fn movement_clamps_to_world_bounds() {
        let mut p = player_at(PLAYER_RADIUS, 500);
        move_with_collision(&mut p, -4, 0, &[]);
        assert_eq!(p.x, PLAYER_RADIUS);

        let mut p = player_at(WORLD_WIDTH - PLAYER_RADIUS, 500);
        move_with_collision(&mut p, 4, 0, &[]);
        assert_eq!(p.x, WORLD_WIDTH - PLAYER_RADIUS);
    }

    #[test]
    fn diagonal_move_slides_along_wall() {
        // Wall directly right of the player; diagonal up-right is blocked on
        // X but must still advance on Y. Expanded wall spans x >= 110.
        let wall = Aabb { x: 120, y: 0, w: 40, h: 1024 };
        let mut p = player_at(108, 500);
        move_with_collision(&mut p, 3, -3, &[wall]);
        assert_eq!(p.x, 108, "x move into wall reverted");
        assert_eq!(p.y, 497, "y move still applied");
    }

    #[test]
    fn blocked_on_both_axes_stays_put() {
        let walls = [
            Aabb { x: 120, y: 0, w: 40, h: 1024 },
            Aabb { x: 0, y: 520, w: 1024, h: 40 },
        ];
        let mut p = player_at(107, 507);
        move_with_collision(&mut p, 4, 4, &walls);
        assert_eq!((p.x, p.y), (107, 507));
    }
}
