//! Board state and the rules that move the hostile and resolve shots.
//!
//! Nothing here does I/O or owns a clock. The control loop in
//! [`crate::world`] is the only caller that mutates a [`Board`], and it
//! injects the random source so movement can be replayed in tests.

use log::info;
use rand::Rng;
use shared::DEFAULT_HOSTILE_NAME;

/// The roaming target participants shoot at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostile {
    pub name: String,
    pub x: i64,
    pub y: i64,
}

/// One hostile move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Right,
    Down,
    Up,
}

impl Step {
    /// Two moves in three are horizontal; vertical moves pick a direction
    /// with equal odds.
    pub fn random<R: Rng>(rng: &mut R) -> Step {
        if rng.gen_ratio(1, 3) {
            if rng.gen_bool(0.5) {
                Step::Down
            } else {
                Step::Up
            }
        } else {
            Step::Right
        }
    }
}

/// What a single tick did to the hostile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    /// Position after the move. `x` may equal the board width on escape.
    pub hostile: Hostile,
    pub escaped: bool,
}

#[derive(Debug, Clone)]
pub struct Board {
    width: i64,
    height: i64,
    hostile: Option<Hostile>,
}

impl Board {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: i64::from(width),
            height: i64::from(height),
            hostile: None,
        }
    }

    pub fn hostile(&self) -> Option<&Hostile> {
        self.hostile.as_ref()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        (0..self.width).contains(&x) && (0..self.height).contains(&y)
    }

    /// Spawns a hostile at the origin when none exists and someone is
    /// around to shoot it. Returns true if one was spawned.
    pub fn ensure_hostile(&mut self, has_participants: bool) -> bool {
        if self.hostile.is_some() || !has_participants {
            return false;
        }

        let hostile = Hostile {
            name: DEFAULT_HOSTILE_NAME.to_string(),
            x: 0,
            y: 0,
        };
        info!(
            "New hostile spawned: {} ({}, {})",
            hostile.name, hostile.x, hostile.y
        );
        self.hostile = Some(hostile);
        true
    }

    /// Runs one tick: spawn if needed, then take a random step.
    pub fn advance<R: Rng>(
        &mut self,
        has_participants: bool,
        rng: &mut R,
    ) -> Option<Movement> {
        self.ensure_hostile(has_participants);
        self.step(Step::random(rng))
    }

    /// Applies `step` to the current hostile.
    ///
    /// Vertical steps bounce off the top and bottom edges. A horizontal
    /// step past the right edge is an escape: the move is still reported,
    /// then the hostile is cleared.
    pub fn step(&mut self, step: Step) -> Option<Movement> {
        let height = self.height;
        let hostile = self.hostile.as_mut()?;

        match step {
            Step::Right => hostile.x += 1,
            Step::Down => {
                if hostile.y + 1 < height {
                    hostile.y += 1;
                } else if hostile.y > 0 {
                    hostile.y -= 1;
                }
            }
            Step::Up => {
                if hostile.y > 0 {
                    hostile.y -= 1;
                } else if hostile.y + 1 < height {
                    hostile.y += 1;
                }
            }
        }

        let snapshot = hostile.clone();
        let escaped = snapshot.x >= self.width;
        if escaped {
            info!("{} escaped the board", snapshot.name);
            self.hostile = None;
        }

        Some(Movement {
            hostile: snapshot,
            escaped,
        })
    }

    /// Checks a shot against the hostile's current cell. On a hit the
    /// hostile is removed and its name returned.
    pub fn resolve_shot(&mut self, x: i64, y: i64) -> Option<String> {
        let hit = matches!(&self.hostile, Some(h) if h.x == x && h.y == y);
        if !hit {
            return None;
        }

        let hostile = self.hostile.take()?;
        info!("Hostile killed: {} ({}, {})", hostile.name, hostile.x, hostile.y);
        Some(hostile.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn board_with_hostile(width: u32, height: u32) -> Board {
        let mut board = Board::new(width, height);
        assert!(board.ensure_hostile(true));
        board
    }

    #[test]
    fn test_no_spawn_without_participants() {
        let mut board = Board::new(10, 20);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(!board.ensure_hostile(false));
        assert!(board.advance(false, &mut rng).is_none());
        assert!(board.hostile().is_none());
    }

    #[test]
    fn test_spawn_at_origin_with_default_name() {
        let board = board_with_hostile(10, 20);
        let hostile = board.hostile().unwrap();
        assert_eq!(hostile.name, DEFAULT_HOSTILE_NAME);
        assert_eq!((hostile.x, hostile.y), (0, 0));
    }

    #[test]
    fn test_spawn_is_idempotent() {
        let mut board = board_with_hostile(10, 20);
        board.step(Step::Right);
        assert!(!board.ensure_hostile(true));
        assert_eq!(board.hostile().unwrap().x, 1);
    }

    #[test]
    fn test_vertical_steps_reflect_at_edges() {
        let mut board = board_with_hostile(10, 3);

        // At the top, "up" bounces down.
        let m = board.step(Step::Up).unwrap();
        assert_eq!(m.hostile.y, 1);

        board.step(Step::Down);
        let m = board.step(Step::Down).unwrap();
        assert_eq!(m.hostile.y, 1);
    }

    #[test]
    fn test_single_row_board_never_leaves_row() {
        let mut board = board_with_hostile(10, 1);
        for step in [Step::Up, Step::Down, Step::Up] {
            let m = board.step(step).unwrap();
            assert_eq!(m.hostile.y, 0);
        }
    }

    #[test]
    fn test_escape_past_right_edge() {
        let mut board = board_with_hostile(10, 20);
        for _ in 0..9 {
            let m = board.step(Step::Right).unwrap();
            assert!(!m.escaped);
        }
        assert_eq!(board.hostile().unwrap().x, 9);

        let m = board.step(Step::Right).unwrap();
        assert_eq!(m.hostile.x, 10);
        assert!(m.escaped);
        assert!(board.hostile().is_none());
    }

    #[test]
    fn test_random_walk_stays_in_bounds() {
        for (width, height) in [(1, 1), (3, 2), (10, 20), (50, 5)] {
            let mut board = Board::new(width, height);
            let mut rng = StdRng::seed_from_u64(u64::from(width * 31 + height));

            for _ in 0..500 {
                if let Some(m) = board.advance(true, &mut rng) {
                    if !m.escaped {
                        assert!(board.contains(m.hostile.x, m.hostile.y));
                    }
                }
                if let Some(h) = board.hostile() {
                    assert!(board.contains(h.x, h.y));
                }
            }
        }
    }

    #[test]
    fn test_advance_respawns_after_escape() {
        let mut board = board_with_hostile(1, 5);
        board.step(Step::Right);
        assert!(board.hostile().is_none());

        let mut rng = StdRng::seed_from_u64(1);
        let m = board.advance(true, &mut rng).unwrap();
        // Fresh at the origin, then one step.
        assert_eq!(m.hostile.x + m.hostile.y, 1);
    }

    #[test]
    fn test_step_distribution_favours_horizontal() {
        let mut rng = StdRng::seed_from_u64(42);
        let total = 3000;
        let horizontal = (0..total)
            .filter(|_| Step::random(&mut rng) == Step::Right)
            .count();

        let ratio = horizontal as f64 / total as f64;
        assert!((0.6..0.73).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_resolve_shot_hit_and_miss() {
        let mut board = board_with_hostile(10, 20);

        assert_eq!(board.resolve_shot(1, 0), None);
        assert!(board.hostile().is_some());

        assert_eq!(
            board.resolve_shot(0, 0),
            Some(DEFAULT_HOSTILE_NAME.to_string())
        );
        assert!(board.hostile().is_none());

        // Nothing left to hit.
        assert_eq!(board.resolve_shot(0, 0), None);
    }

    #[test]
    fn test_contains() {
        let board = Board::new(10, 20);
        assert!(board.contains(0, 0));
        assert!(board.contains(9, 19));
        assert!(!board.contains(10, 0));
        assert!(!board.contains(0, 20));
        assert!(!board.contains(-1, 5));
    }
}
