//! Weight initialization helpers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Xavier/Glorot uniform initialization.
///
/// Samples `len` values from `U[-limit, limit]` with
/// `limit = sqrt(6 / (fan_in + fan_out))`.
pub fn glorot_uniform<R: Rng + ?Sized>(
    len: usize,
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Vec<f32> {
    let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
    (0..len).map(|_| rng.gen_range(-limit..=limit)).collect()
}

/// Derive an independent, reproducible RNG from a parent RNG.
///
/// Layers with stochastic forward passes own one of these so that their
/// sampling does not depend on how other layers consume the parent stream.
pub fn seeded_rng<R: Rng + ?Sized>(parent: &mut R) -> StdRng {
    StdRng::seed_from_u64(parent.gen())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glorot_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let weights = glorot_uniform(100 * 50, 100, 50, &mut rng);
        let limit = (6.0f32 / 150.0).sqrt();
        assert_eq!(weights.len(), 5000);
        for &w in &weights {
            assert!(w >= -limit && w <= limit, "Weight {} outside Xavier range", w);
        }
    }

    #[test]
    fn test_glorot_deterministic() {
        let mut rng1 = StdRng::seed_from_u64(12345);
        let mut rng2 = StdRng::seed_from_u64(12345);
        assert_eq!(
            glorot_uniform(30, 5, 6, &mut rng1),
            glorot_uniform(30, 5, 6, &mut rng2)
        );
    }
}
