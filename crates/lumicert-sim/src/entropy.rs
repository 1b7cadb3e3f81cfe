//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Explicit random source threaded through the simulation."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;

use lumicert_common::ValueRange;
use rand::prelude::*;

/// Random source used by every sampling step of the simulation.
pub trait Entropy {
    /// Uniform draw in `[0, 1)`.
    fn fraction(&mut self) -> f64;

    /// Uniform draw in `[min, max)`.
    fn between(&mut self, range: ValueRange) -> f64;

    /// Uniform draw in `[min, max]`.
    fn within(&mut self, range: ValueRange) -> f64;

    /// Bernoulli trial: one `fraction` draw compared against `probability`.
    fn chance(&mut self, probability: f64) -> bool {
        self.fraction() < probability
    }
}

/// [`Entropy`] backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RngEntropy<R = StdRng> {
    rng: R,
}

impl RngEntropy<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_os() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Seeded when `seed` is set, OS entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_os(),
        }
    }
}

impl<R: Rng> RngEntropy<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Entropy for RngEntropy<R> {
    fn fraction(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn between(&mut self, range: ValueRange) -> f64 {
        // gen_range panics on an empty half-open range
        if range.min < range.max {
            self.rng.gen_range(range.min..range.max)
        } else {
            range.min
        }
    }

    fn within(&mut self, range: ValueRange) -> f64 {
        if range.min <= range.max {
            self.rng.gen_range(range.min..=range.max)
        } else {
            range.min
        }
    }
}

/// Deterministic [`Entropy`] replaying a script of unit fractions.
///
/// Every draw consumes one fraction `t`: `fraction` returns `t` directly,
/// range draws return `min + t * (max - min)`. Once the script is exhausted
/// the fallback fraction is used for all further draws.
#[derive(Debug, Clone)]
pub struct ScriptedEntropy {
    script: VecDeque<f64>,
    fallback: f64,
    consumed: usize,
}

impl ScriptedEntropy {
    pub fn new(script: impl IntoIterator<Item = f64>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: 0.5,
            consumed: 0,
        }
    }

    /// Entropy that always yields `fraction`.
    pub fn constant(fraction: f64) -> Self {
        Self::new([]).with_fallback(fraction)
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    /// Append further fractions to the script.
    pub fn extend(&mut self, fractions: impl IntoIterator<Item = f64>) {
        self.script.extend(fractions);
    }

    /// Number of draws taken so far, scripted or fallback.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Scripted fractions not yet drawn.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn next(&mut self) -> f64 {
        self.consumed += 1;
        let t = self.script.pop_front().unwrap_or(self.fallback);
        t.clamp(0.0, 1.0)
    }
}

fn largest_below(value: f64) -> f64 {
    if value > 0.0 {
        f64::from_bits(value.to_bits() - 1)
    } else if value < 0.0 {
        f64::from_bits(value.to_bits() + 1)
    } else {
        -f64::from_bits(1)
    }
}

impl Entropy for ScriptedEntropy {
    fn fraction(&mut self) -> f64 {
        self.next()
    }

    fn between(&mut self, range: ValueRange) -> f64 {
        let t = self.next();
        let value = range.min + t * (range.max - range.min);
        if value >= range.max && range.min < range.max {
            largest_below(range.max)
        } else {
            value
        }
    }

    fn within(&mut self, range: ValueRange) -> f64 {
        let t = self.next();
        range.min + t * (range.max - range.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: ValueRange = ValueRange::new(10.0, 30.0);

    #[test]
    fn seeded_entropy_is_reproducible() {
        let mut a = RngEntropy::seeded(42);
        let mut b = RngEntropy::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.fraction(), b.fraction());
            assert_eq!(a.between(RANGE), b.between(RANGE));
        }
    }

    #[test]
    fn rng_draws_stay_in_bounds() {
        let mut entropy = RngEntropy::seeded(7);
        for _ in 0..1_000 {
            let fraction = entropy.fraction();
            assert!((0.0..1.0).contains(&fraction));
            assert!(RANGE.contains(entropy.between(RANGE)));
            let closed = entropy.within(ValueRange::new(11.5, 12.5));
            assert!((11.5..=12.5).contains(&closed));
        }
    }

    #[test]
    fn degenerate_ranges_do_not_panic() {
        let mut entropy = RngEntropy::seeded(1);
        assert_eq!(entropy.between(ValueRange::new(5.0, 5.0)), 5.0);
        assert_eq!(entropy.within(ValueRange::new(5.0, 5.0)), 5.0);
    }

    #[test]
    fn scripted_entropy_maps_fractions_onto_ranges() {
        let mut entropy = ScriptedEntropy::new([0.25, 0.5, 0.01]).with_fallback(0.9);
        assert_eq!(entropy.between(RANGE), 15.0);
        assert_eq!(entropy.within(RANGE), 20.0);
        assert!(entropy.chance(0.02));
        assert_eq!(entropy.remaining(), 0);
        assert_eq!(entropy.fraction(), 0.9);
        assert_eq!(entropy.consumed(), 4);
    }

    #[test]
    fn scripted_between_never_reaches_upper_bound() {
        let mut entropy = ScriptedEntropy::constant(1.0);
        assert!(RANGE.contains(entropy.between(RANGE)));
    }
}
