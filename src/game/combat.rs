//! Hitscan combat
//!
//! Shots resolve instantly: a ray from the shooter along its aim direction is
//! first cut down to the nearest obstacle intersection (visibility), then the
//! closest alive opponent whose hit circle the ray crosses inside that range
//! takes the damage.

use super::map::Aabb;
use super::state::PlayerState;
use super::{MAX_PLAYERS, PLAYER_RADIUS, RESPAWN_TICKS, SHOT_DAMAGE, SHOT_RANGE};

/// Unit vector for a 16-way compass index
pub fn aim_vector(aim_dir: u8) -> (f64, f64) {
    let angle = std::f64::consts::TAU * aim_dir as f64 / 16.0;
    (angle.cos(), angle.sin())
}

/// Outcome of a resolved shot, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotHit {
    pub target_slot: usize,
    pub killed: bool,
}

/// Resolve one hitscan shot from `shooter_slot`. Mutates the target on a hit
/// (damage, death, shooter score) and reports what happened.
pub(crate) fn resolve_shot(
    players: &mut [PlayerState; MAX_PLAYERS],
    shooter_slot: usize,
    obstacles: &[Aabb],
) -> Option<ShotHit> {
    let shooter = players[shooter_slot];
    if !shooter.present || !shooter.alive {
        return None;
    }

    let (dx, dy) = aim_vector(shooter.aim_dir);
    let ox = shooter.x as f64;
    let oy = shooter.y as f64;

    let visibility = obstacle_limit(ox, oy, dx, dy, SHOT_RANGE, obstacles);
    let (target_slot, _) = nearest_target(players, shooter_slot, ox, oy, dx, dy, visibility)?;

    let target = &mut players[target_slot];
    target.hp = (target.hp - SHOT_DAMAGE).max(0);
    if target.hp > 0 {
        return Some(ShotHit { target_slot, killed: false });
    }

    target.alive = false;
    target.respawn_ticks = RESPAWN_TICKS;
    players[shooter_slot].score = players[shooter_slot].score.saturating_add(1).min(65_535);
    Some(ShotHit { target_slot, killed: true })
}

/// Distance to the nearest obstacle along the ray, capped at `range`
fn obstacle_limit(ox: f64, oy: f64, dx: f64, dy: f64, range: f64, obstacles: &[Aabb]) -> f64 {
    let mut best = range;
    for o in obstacles {
        if let Some(t) = ray_aabb(ox, oy, dx, dy, o) {
            if t >= 0.0 && t < best {
                best = t;
            }
        }
    }
    best
}

/// Closest alive opponent whose hit circle the ray crosses within `max_t`
fn nearest_target(
    players: &[PlayerState; MAX_PLAYERS],
    shooter_slot: usize,
    ox: f64,
    oy: f64,
    dx: f64,
    dy: f64,
    max_t: f64,
) -> Option<(usize, f64)> {
    let limit = SHOT_RANGE.min(max_t);
    let mut best: Option<(usize, f64)> = None;
    for (slot, p) in players.iter().enumerate() {
        if slot == shooter_slot || !p.present || !p.alive {
            continue;
        }
        let Some(t) = ray_circle(ox, oy, dx, dy, p.x as f64, p.y as f64, PLAYER_RADIUS as f64)
        else {
            continue;
        };
        if t < 0.0 || t > limit {
            continue;
        }
        if best.map_or(true, |(_, bt)| t < bt) {
            best = Some((slot, t));
        }
    }
    best
}

/// Slab-method ray vs. AABB intersection. Returns the entry distance, or the
/// exit distance when the origin is inside the box.
fn ray_aabb(ox: f64, oy: f64, dx: f64, dy: f64, aabb: &Aabb) -> Option<f64> {
    let inv_dx = if dx == 0.0 { f64::INFINITY } else { 1.0 / dx };
    let inv_dy = if dy == 0.0 { f64::INFINITY } else { 1.0 / dy };

    let (ax, ay) = (aabb.x as f64, aabb.y as f64);
    let (aw, ah) = (aabb.w as f64, aabb.h as f64);

    let t1 = (ax - ox) * inv_dx;
    let t2 = (ax + aw - ox) * inv_dx;
    let t3 = (ay - oy) * inv_dy;
    let t4 = (ay + ah - oy) * inv_dy;

    let tmin = t1.min(t2).max(t3.min(t4));
    let tmax = t1.max(t2).min(t3.max(t4));

    if tmin.is_nan() || tmax.is_nan() {
        return None;
    }
    if tmax < 0.0 || tmin > tmax {
        return None;
    }
    Some(if tmin >= 0.0 { tmin } else { tmax })
}

/// Ray vs. circle intersection, smallest non-negative root
fn ray_circle(ox: f64, oy: f64, dx: f64, dy: f64, cx: f64, cy: f64, r: f64) -> Option<f64> {
    let fx = ox - cx;
    let fy = oy - cy;

    let a = dx * dx + dy * dy;
    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - r * r;

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();

    let t1 = (-b - s) / (2.0 * a);
    let t2 = (-b + s) / (2.0 * a);

    if t1 >= 0.0 {
        Some(t1)
    } else if t2 >= 0.0 {
        Some(t2)
    } else {
        None
    }
}
