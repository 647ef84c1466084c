/// Spawn positions, speeds and motion for gameplay objects.
///
/// Kinematics never depend on whether an object is a correct answer or a
/// distractor: both draw from overlapping speed ranges and the same motion
/// set, so a player cannot tell them apart by movement alone.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::round::{Motion, Round};

/// Slots in the position grid: 0.1, 0.2, ... 0.9.
const GRID_SLOTS: u32 = 9;
const HUMOR_MIN: f64 = 0.7;
const HUMOR_MAX: f64 = 0.9;

#[derive(Debug, Error, PartialEq)]
pub enum SpawnError {
    #[error("speed range for {tier} is inverted: {min} > {max}")]
    InvertedRange { tier: String, min: f64, max: f64 },
    #[error("correct and distractor speed ranges for {0} do not overlap")]
    Disjoint(String),
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Inclusive speed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

impl SpeedRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn overlaps(&self, other: &SpeedRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Uniform sample rounded to two decimals.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        round2(rng.gen_range(self.min..=self.max))
    }
}

/// Level-indexed speed ranges. `levels[0]` applies to level 1; levels past
/// the end use `fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTable {
    pub levels: Vec<SpeedRange>,
    pub fallback: SpeedRange,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            levels: vec![
                SpeedRange::new(0.85, 1.15),
                SpeedRange::new(0.88, 1.18),
                SpeedRange::new(0.90, 1.20),
                SpeedRange::new(0.92, 1.25),
                SpeedRange::new(0.95, 1.30),
            ],
            fallback: SpeedRange::new(0.90, 1.20),
        }
    }
}

impl SpeedTable {
    pub fn range(&self, level: u32) -> SpeedRange {
        level
            .checked_sub(1)
            .and_then(|i| self.levels.get(i as usize))
            .copied()
            .unwrap_or(self.fallback)
    }

    fn tiers(&self) -> impl Iterator<Item = (String, SpeedRange)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("level {}", i + 1), *r))
            .chain(std::iter::once(("fallback".to_string(), self.fallback)))
    }

    fn check(&self) -> Result<(), SpawnError> {
        for (tier, range) in self.tiers() {
            if range.min > range.max {
                return Err(SpawnError::InvertedRange {
                    tier,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }
}

/// Shuffled 9-slot position pool for one round.
#[derive(Debug, Clone, Default)]
pub struct PositionPool {
    available: Vec<f64>,
    issued: Vec<f64>,
}

fn grid() -> Vec<f64> {
    (1..=GRID_SLOTS).map(|i| f64::from(i) / 10.0).collect()
}

fn contains(values: &[f64], x: f64) -> bool {
    values.iter().any(|v| (v - x).abs() < 1e-9)
}

impl PositionPool {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        let mut available = grid();
        available.shuffle(rng);
        Self {
            available,
            issued: Vec::new(),
        }
    }

    /// Next slot. On exhaustion the grid is reshuffled and filtered against
    /// issued values; slots repeat only once every slot has been issued.
    pub fn draw<R: Rng>(&mut self, rng: &mut R) -> f64 {
        if self.available.is_empty() {
            let mut fresh: Vec<f64> = grid()
                .into_iter()
                .filter(|x| !contains(&self.issued, *x))
                .collect();
            if fresh.is_empty() {
                fresh = grid();
            }
            fresh.shuffle(rng);
            self.available = fresh;
        }
        // Refill above guarantees a non-empty pool.
        let slot = self.available.pop().unwrap_or(0.5);
        self.issued.push(slot);
        slot
    }

    /// A position in the tail band `[0.7, 0.9]`, preferring an unissued
    /// grid slot, then any unissued hundredth in the band.
    pub fn draw_tail<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let tail: Vec<usize> = self
            .available
            .iter()
            .enumerate()
            .filter(|(_, x)| **x >= HUMOR_MIN - 1e-9 && **x <= HUMOR_MAX + 1e-9)
            .map(|(i, _)| i)
            .collect();
        let slot = match tail.choose(rng) {
            Some(&i) => self.available.remove(i),
            None => {
                let (lo, hi) = ((HUMOR_MIN * 100.0).round() as u32, (HUMOR_MAX * 100.0).round() as u32);
                let free: Vec<f64> = (lo..=hi)
                    .map(|h| f64::from(h) / 100.0)
                    .filter(|x| !contains(&self.issued, *x))
                    .collect();
                match free.choose(rng) {
                    Some(&x) => x,
                    None => round2(rng.gen_range(HUMOR_MIN..=HUMOR_MAX)),
                }
            }
        };
        self.issued.push(slot);
        slot
    }
}

/// One object's movement parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub spawn_position: f64,
    pub speed: f64,
    pub motion: Option<Motion>,
}

/// Kinematics for a whole round, split by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub correct: Vec<Kinematics>,
    pub distractors: Vec<Kinematics>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpawnAllocator {
    correct: SpeedTable,
    distractor: SpeedTable,
}

impl SpawnAllocator {
    /// Fails if any level's correct and distractor ranges are disjoint.
    pub fn new(correct: SpeedTable, distractor: SpeedTable) -> Result<Self, SpawnError> {
        correct.check()?;
        distractor.check()?;
        let levels = correct.levels.len().max(distractor.levels.len()) as u32;
        for level in 1..=levels {
            if !correct.range(level).overlaps(&distractor.range(level)) {
                return Err(SpawnError::Disjoint(format!("level {level}")));
            }
        }
        if !correct.fallback.overlaps(&distractor.fallback) {
            return Err(SpawnError::Disjoint("fallback".to_string()));
        }
        Ok(Self {
            correct,
            distractor,
        })
    }

    pub fn begin_round<'a, R: Rng>(&'a self, level: u32, rng: &mut R) -> RoundSpawner<'a> {
        RoundSpawner {
            allocator: self,
            level,
            pool: PositionPool::new(rng),
        }
    }

    /// Kinematics for `k_correct` answers and `k_distractor` decoys.
    pub fn allocate<R: Rng>(
        &self,
        k_correct: usize,
        k_distractor: usize,
        level: u32,
        rng: &mut R,
    ) -> Allocation {
        if k_correct + k_distractor == 0 {
            return Allocation::default();
        }
        let mut spawner = self.begin_round(level, rng);
        Allocation {
            correct: (0..k_correct).map(|_| spawner.next_correct(rng)).collect(),
            distractors: (0..k_distractor)
                .map(|_| spawner.next_distractor(rng))
                .collect(),
        }
    }

    /// Re-sample every object's kinematics in place. With `drop_behavior`
    /// a distractor may lose its behavior entirely. Returns the number of
    /// objects touched.
    pub fn remediate<R: Rng>(&self, round: &mut Round, drop_behavior: bool, rng: &mut R) -> usize {
        let mut spawner = self.begin_round(round.level, rng);
        for correct in &mut round.correct {
            let k = spawner.next_correct(rng);
            correct.spawn_position = k.spawn_position;
            correct.speed = k.speed;
            correct.pattern = k.motion;
        }
        for distractor in &mut round.distractors {
            let k = spawner.next_distractor(rng);
            distractor.spawn_position = k.spawn_position;
            distractor.speed = k.speed;
            distractor.behavior = if drop_behavior && rng.gen_ratio(1, 5) {
                None
            } else {
                k.motion
            };
        }
        round.correct.len() + round.distractors.len()
    }
}

/// Per-round allocation state: one position pool shared by every object.
pub struct RoundSpawner<'a> {
    allocator: &'a SpawnAllocator,
    level: u32,
    pool: PositionPool,
}

fn any_motion<R: Rng>(rng: &mut R) -> Option<Motion> {
    Motion::ALL.choose(rng).cloned()
}

impl RoundSpawner<'_> {
    pub fn next_correct<R: Rng>(&mut self, rng: &mut R) -> Kinematics {
        Kinematics {
            spawn_position: self.pool.draw(rng),
            speed: self.allocator.correct.range(self.level).sample(rng),
            motion: any_motion(rng),
        }
    }

    pub fn next_distractor<R: Rng>(&mut self, rng: &mut R) -> Kinematics {
        Kinematics {
            spawn_position: self.pool.draw(rng),
            speed: self.allocator.distractor.range(self.level).sample(rng),
            motion: any_motion(rng),
        }
    }

    /// The humorous decoy: a distractor placed in the tail band.
    pub fn next_humor<R: Rng>(&mut self, rng: &mut R) -> Kinematics {
        Kinematics {
            spawn_position: self.pool.draw_tail(rng),
            speed: self.allocator.distractor.range(self.level).sample(rng),
            motion: any_motion(rng),
        }
    }
}
