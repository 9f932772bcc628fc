use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-frame blink signal.
///
/// No detector in the pipeline reports eye closure, so blinks are sampled
/// from a fixed per-frame probability. Implementations are swappable so a
/// real eye-closure signal can replace the sampler without touching the
/// estimator.
pub trait BlinkSource: Send {
    /// Returns `true` when the current frame counts as one blink.
    fn sample(&mut self) -> bool;
}

pub struct RandomBlinkSource {
    rng: StdRng,
    probability: f64,
}

impl RandomBlinkSource {
    pub fn new(probability: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Deterministic sampler for replays and tests.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl BlinkSource for RandomBlinkSource {
    fn sample(&mut self) -> bool {
        self.rng.gen_bool(self.probability)
    }
}
