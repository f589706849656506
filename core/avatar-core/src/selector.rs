//! Weighted-random asset selection.
//!
//! A draw in `[1, total_weight]` is matched against the running weight sum in
//! insertion order, so selection frequency is proportional to weight and ties
//! resolve the same way on every run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{EmotionCategory, VideoAsset};

/// Source of integer draws. `draw(total)` must return a value in `[1, total]`;
/// anything outside is clamped.
pub trait DrawSource: Send {
    fn draw(&mut self, total: u32) -> u32;
}

/// Entropy-seeded draws for production use.
pub struct RandomDraw {
    rng: StdRng,
}

impl RandomDraw {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDraw {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawSource for RandomDraw {
    fn draw(&mut self, total: u32) -> u32 {
        self.rng.gen_range(1..=total.max(1))
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedDraw {
    values: Vec<u32>,
    cursor: usize,
}

impl ScriptedDraw {
    pub fn new(values: impl Into<Vec<u32>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
        }
    }
}

impl DrawSource for ScriptedDraw {
    fn draw(&mut self, total: u32) -> u32 {
        if self.values.is_empty() {
            return 1;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        value.min(total)
    }
}

pub struct Selector {
    source: Box<dyn DrawSource>,
}

impl Selector {
    pub fn new(source: impl DrawSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn random() -> Self {
        Self::new(RandomDraw::new())
    }

    pub fn pick<'a>(&mut self, category: &'a EmotionCategory) -> &'a VideoAsset {
        let assets = category.assets();
        if assets.len() == 1 {
            return &assets[0];
        }

        let total = category.total_weight();
        let roll = self.source.draw(total).clamp(1, total);
        let mut cumulative = 0u32;
        for asset in assets {
            cumulative += asset.weight;
            if roll <= cumulative {
                return asset;
            }
        }
        &assets[assets.len() - 1]
    }
}
