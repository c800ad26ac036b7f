//! Seeded placement of world items.
//!
//! Every participant of a session derives the same chest and health pack
//! layout from the session seed, so the output must depend on nothing but the
//! arguments.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Total candidate draws allowed per generation call.
pub const MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Draws up to `amount` points in `[0, width) x [0, height)` that are pairwise
/// at least `radius` apart.
///
/// Rejection sampling stops after [`MAX_ATTEMPTS`] draws, so a crowded area
/// yields fewer points than requested. An empty or unbounded area yields none.
pub fn generate_positions(
    width: f64,
    height: f64,
    amount: usize,
    radius: f64,
    seed: u64,
) -> Vec<Position> {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Vec::new();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let min_distance_squared = radius * radius;
    let mut accepted: Vec<Position> = Vec::with_capacity(amount);

    for _ in 0..MAX_ATTEMPTS {
        if accepted.len() >= amount {
            break;
        }

        let candidate = Position::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height));

        if accepted
            .iter()
            .all(|point| point.distance_squared(&candidate) >= min_distance_squared)
        {
            accepted.push(candidate);
        }
    }

    accepted
}
