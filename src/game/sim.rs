//! Fixed-tick match simulation
//!
//! `step` is the single state-transition function: one call advances a match
//! exactly one tick. It is total over any well-formed state and any input
//! array, and deterministic — two runs from the same state with the same
//! inputs produce byte-identical snapshots.

use crate::util::time::{ticks_to_millis, SERVER_TICK_HZ};

use super::combat::resolve_shot;
use super::map::{Aabb, OBSTACLES};
use super::physics::{move_vector, move_with_collision, normalize_aim_dir, normalize_move_dir};
use super::state::{spawn_into, MatchState, MatchStatus, PlayerState};
use super::{
    PlayerInput, FIRE_COOLDOWN_TICKS, MATCH_DURATION_MS, MATCH_SCORE_TO_WIN, MAX_PLAYERS,
    WAITING_START_SECS,
};

/// Advance the match by one tick.
///
/// Missing or stale inputs must be passed as the default `PlayerInput`;
/// "no input" is indistinguishable from "no movement, no fire".
pub fn step(state: &mut MatchState, inputs: &[PlayerInput; MAX_PLAYERS]) {
    state.tick += 1;

    match state.status {
        MatchStatus::Waiting => start_if_ready(state),
        MatchStatus::Running => run_tick(state, inputs),
        // Terminal: the tick counter advances so snapshots stay fresh, but
        // nothing simulates and nothing can restart it.
        MatchStatus::Ended => {}
    }
}

/// Start once two players are present, or once a lone player has waited out
/// the start window.
fn start_if_ready(state: &mut MatchState) {
    let present = state.present_count();
    if present >= 2 {
        state.status = MatchStatus::Running;
        state.start_tick = state.tick;
        return;
    }

    let wait_ticks = WAITING_START_SECS * SERVER_TICK_HZ;
    if present >= 1 && state.tick >= wait_ticks {
        state.status = MatchStatus::Running;
        state.start_tick = state.tick;
    }
}

fn run_tick(state: &mut MatchState, inputs: &[PlayerInput; MAX_PLAYERS]) {
    for slot in 0..MAX_PLAYERS {
        step_player(&mut state.players, slot, &inputs[slot], &OBSTACLES);
    }

    let elapsed_ms = ticks_to_millis(state.tick - state.start_tick);
    if elapsed_ms >= MATCH_DURATION_MS {
        state.status = MatchStatus::Ended;
        return;
    }
    for p in &state.players {
        if p.present && p.score >= MATCH_SCORE_TO_WIN {
            state.status = MatchStatus::Ended;
            return;
        }
    }
}

fn step_player(
    players: &mut [PlayerState; MAX_PLAYERS],
    slot: usize,
    input: &PlayerInput,
    obstacles: &[Aabb],
) {
    if !players[slot].present {
        return;
    }

    players[slot].aim_dir = normalize_aim_dir(input.aim_dir);

    if !players[slot].alive {
        if players[slot].respawn_ticks > 0 {
            players[slot].respawn_ticks -= 1;
            return;
        }
        // Countdown done: respawn, but sit out movement and firing this tick.
        spawn_into(&mut players[slot], slot);
        return;
    }

    if players[slot].fire_cooldown_ticks > 0 {
        players[slot].fire_cooldown_ticks -= 1;
    }

    let (dx, dy) = move_vector(normalize_move_dir(input.move_dir));
    if dx != 0 || dy != 0 {
        move_with_collision(&mut players[slot], dx, dy, obstacles);
    }

    if input.fire && players[slot].fire_cooldown_ticks == 0 {
        resolve_shot(players, slot, obstacles);
        players[slot].fire_cooldown_ticks = FIRE_COOLDOWN_TICKS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::encode_snapshot;
    use crate::game::{PLAYER_MAX_HP, SHOT_DAMAGE};

    fn no_inputs() -> [PlayerInput; MAX_PLAYERS] {
        [PlayerInput::default(); MAX_PLAYERS]
    }

    fn input(move_dir: i32, aim_dir: i32, fire: bool) -> PlayerInput {
        PlayerInput {
            move_dir,
            aim_dir,
            fire,
            ..PlayerInput::default()
        }
    }

    #[test]
    fn two_players_start_immediately() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        step(&mut state, &no_inputs());
        assert_eq!(state.status, MatchStatus::Running);
        assert_eq!(state.start_tick, 1);
    }

    #[test]
    fn lone_player_starts_after_wait_window() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0001);

        let wait_ticks = WAITING_START_SECS * SERVER_TICK_HZ;
        for _ in 0..wait_ticks - 1 {
            step(&mut state, &no_inputs());
            assert_eq!(state.status, MatchStatus::Waiting);
        }
        step(&mut state, &no_inputs());
        assert_eq!(state.status, MatchStatus::Running);
        assert_eq!(state.start_tick, wait_ticks);
    }

    #[test]
    fn empty_match_never_starts() {
        let mut state = MatchState::new("m_test");
        for _ in 0..1000 {
            step(&mut state, &no_inputs());
        }
        assert_eq!(state.status, MatchStatus::Waiting);
        assert_eq!(state.tick, 1000);
    }

    #[test]
    fn match_ends_when_duration_elapses() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        step(&mut state, &no_inputs()); // transitions to running at tick 1

        let duration_ticks = (MATCH_DURATION_MS / 1000) as u32 * SERVER_TICK_HZ;
        for _ in 0..duration_ticks - 1 {
            step(&mut state, &no_inputs());
            assert_eq!(state.status, MatchStatus::Running);
        }
        step(&mut state, &no_inputs());
        assert_eq!(state.status, MatchStatus::Ended);
    }

    #[test]
    fn match_ends_on_the_tick_the_winning_score_lands() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        step(&mut state, &no_inputs());

        state.players[0].score = MATCH_SCORE_TO_WIN - 1;
        // Slot 1 is far away and aim_dir 0 points east, away from slot 0's
        // spawn — manufacture a point-blank kill shot instead.
        state.players[0].x = 100;
        state.players[0].y = 100;
        state.players[1].x = 150;
        state.players[1].y = 100;
        state.players[1].hp = SHOT_DAMAGE;
        state.players[0].fire_cooldown_ticks = 0;

        let mut inputs = no_inputs();
        inputs[0] = input(0, 0, true);
        step(&mut state, &inputs);

        assert_eq!(state.players[0].score, MATCH_SCORE_TO_WIN);
        assert_eq!(state.status, MatchStatus::Ended, "ends on the recording tick");
    }

    #[test]
    fn ended_match_only_counts_ticks() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        state.status = MatchStatus::Ended;
        let players_before = state.players;

        let mut inputs = no_inputs();
        inputs[0] = input(3, 4, true);
        for _ in 0..10 {
            step(&mut state, &inputs);
        }

        assert_eq!(state.tick, 10);
        assert_eq!(state.status, MatchStatus::Ended);
        assert_eq!(state.players, players_before);
    }

    #[test]
    fn held_fire_hits_once_per_cooldown_window() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        step(&mut state, &no_inputs());

        state.players[0].x = 100;
        state.players[0].y = 100;
        state.players[1].x = 200;
        state.players[1].y = 100;

        let mut inputs = no_inputs();
        inputs[0] = input(0, 0, true); // hold fire, aim east

        for _ in 0..FIRE_COOLDOWN_TICKS {
            step(&mut state, &inputs);
        }
        assert_eq!(
            state.players[1].hp,
            PLAYER_MAX_HP - SHOT_DAMAGE,
            "exactly one hit inside the first cooldown window"
        );

        step(&mut state, &inputs);
        assert_eq!(
            state.players[1].hp,
            PLAYER_MAX_HP - 2 * SHOT_DAMAGE,
            "next window lands the second hit"
        );
    }

    #[test]
    fn dead_player_counts_down_then_respawns_fresh() {
        let mut state = MatchState::new("m_test");
        state.apply_player_mask(0b0000_0011);
        step(&mut state, &no_inputs());

        state.players[1].alive = false;
        state.players[1].hp = 0;
        state.players[1].respawn_ticks = 2;
        state.players[1].score = 4;

        step(&mut state, &no_inputs());
        assert_eq!(state.players[1].respawn_ticks, 1);
        assert!(!state.players[1].alive);

        step(&mut state, &no_inputs());
        assert_eq!(state.players[1].respawn_ticks, 0);
        assert!(!state.players[1].alive, "the zero tick is consumed by the countdown");

        step(&mut state, &no_inputs());
        assert!(state.players[1].alive);
        assert_eq!(state.players[1].hp, PLAYER_MAX_HP);
        assert_eq!(state.players[1].score, 4, "score survives respawn");
        let spawn = crate::game::map::spawn_point(1);
        assert_eq!((state.players[1].x, state.players[1].y), spawn);
    }

    #[test]
    fn simulation_is_deterministic() {
        let run = || {
            let mut state = MatchState::new("m_test");
            state.apply_player_mask(0xff);

            let mut inputs = no_inputs();
            for (i, slot_input) in inputs.iter_mut().enumerate() {
                *slot_input = input((i as i32 % 8) + 1, (i as i32 * 3) % 16, i % 2 == 0);
            }

            for _ in 0..180 {
                step(&mut state, &inputs);
            }
            encode_snapshot(1, state.tick, &state.players)
        };

        assert_eq!(run(), run());
    }
}
