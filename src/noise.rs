//! Cached additive-noise realization.
//!
//! A `NoiseCache` holds the last noise vector drawn for a session together
//! with the `(mean, variance)` pair it was drawn from. Dragging amplitude,
//! frequency or phase must keep showing the same realization, so the cache is
//! only refreshed when the noise-defining pair (or the sample count) changes.

use crate::error::{Result, SignalError};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Noise-defining parameters a cached vector was drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseKey {
    pub mean: f64,
    pub variance: f64,
}

impl NoiseKey {
    pub fn new(mean: f64, variance: f64) -> Self {
        Self { mean, variance }
    }

    /// Both components within `tolerance` of each other. A tolerance of 0
    /// is exact equality.
    pub fn matches(&self, other: &NoiseKey, tolerance: f64) -> bool {
        if tolerance == 0.0 {
            self == other
        } else {
            (self.mean - other.mean).abs() <= tolerance
                && (self.variance - other.variance).abs() <= tolerance
        }
    }
}

#[derive(Debug, Clone)]
struct CachedNoise {
    key: NoiseKey,
    samples: Vec<f64>,
}

/// Lazily created, session-owned noise vector.
#[derive(Debug, Clone, Default)]
pub struct NoiseCache {
    entry: Option<CachedNoise>,
    tolerance: f64,
}

impl NoiseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat keys whose components differ by at most `tolerance` as equal.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn key(&self) -> Option<NoiseKey> {
        self.entry.as_ref().map(|e| e.key)
    }

    pub fn samples(&self) -> Option<&[f64]> {
        self.entry.as_ref().map(|e| e.samples.as_slice())
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Whether a request for `len` samples under `key` can reuse the stored vector.
    pub fn is_hit(&self, key: &NoiseKey, len: usize) -> bool {
        match &self.entry {
            Some(e) => e.samples.len() == len && e.key.matches(key, self.tolerance),
            None => false,
        }
    }

    /// Return the cached vector for `key`, drawing and storing a fresh one
    /// from Normal(mean, √variance) on a miss. The boolean is `true` when the
    /// stored vector was reused; no random numbers are drawn in that case.
    pub fn get_or_draw<R: Rng + ?Sized>(
        &mut self,
        key: NoiseKey,
        len: usize,
        rng: &mut R,
    ) -> Result<(&[f64], bool)> {
        if self.is_hit(&key, len) {
            return Ok((self.samples().unwrap_or_default(), true));
        }

        if !key.variance.is_finite() || key.variance < 0.0 {
            return Err(SignalError::parameter(
                "noise_variance",
                key.variance,
                "must be finite and not negative",
            ));
        }
        let normal = Normal::new(key.mean, key.variance.sqrt())
            .map_err(|_| SignalError::parameter("noise_mean", key.mean, "must be finite"))?;
        let samples: Vec<f64> = (0..len).map(|_| normal.sample(rng)).collect();

        debug!(
            "Noise cache miss: drew {} samples (μ={}, σ²={})",
            len, key.mean, key.variance
        );
        let entry = self.entry.insert(CachedNoise { key, samples });
        Ok((entry.samples.as_slice(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_request_draws() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(1);
        let (samples, hit) = cache.get_or_draw(NoiseKey::new(0.0, 0.1), 64, &mut rng).unwrap();
        assert!(!hit);
        assert_eq!(samples.len(), 64);
        assert_eq!(cache.key(), Some(NoiseKey::new(0.0, 0.1)));
    }

    #[test]
    fn test_same_key_reuses_vector() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(2);
        let first = cache
            .get_or_draw(NoiseKey::new(0.0, 0.1), 32, &mut rng)
            .unwrap()
            .0
            .to_vec();
        let (second, hit) = cache.get_or_draw(NoiseKey::new(0.0, 0.1), 32, &mut rng).unwrap();
        assert!(hit);
        assert_eq!(first, second);
    }

    #[test]
    fn test_variance_change_redraws() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(3);
        let first = cache
            .get_or_draw(NoiseKey::new(0.0, 0.1), 32, &mut rng)
            .unwrap()
            .0
            .to_vec();
        let (second, hit) = cache.get_or_draw(NoiseKey::new(0.0, 0.2), 32, &mut rng).unwrap();
        assert!(!hit);
        assert_ne!(first, second);
    }

    #[test]
    fn test_length_change_redraws() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(4);
        cache.get_or_draw(NoiseKey::new(0.0, 0.1), 32, &mut rng).unwrap();
        let (samples, hit) = cache.get_or_draw(NoiseKey::new(0.0, 0.1), 48, &mut rng).unwrap();
        assert!(!hit);
        assert_eq!(samples.len(), 48);
    }

    #[test]
    fn test_exact_match_by_default() {
        let cache = NoiseCache::new();
        let a = NoiseKey::new(0.0, 0.1);
        let b = NoiseKey::new(0.0, 0.1 + 1e-12);
        assert!(!a.matches(&b, cache.tolerance()));
    }

    #[test]
    fn test_tolerance_absorbs_rounding() {
        let mut cache = NoiseCache::new().with_tolerance(1e-9);
        let mut rng = StdRng::seed_from_u64(5);
        cache.get_or_draw(NoiseKey::new(0.0, 0.1), 16, &mut rng).unwrap();
        assert!(cache.is_hit(&NoiseKey::new(0.0, 0.1 + 1e-12), 16));
        assert!(!cache.is_hit(&NoiseKey::new(0.0, 0.1 + 1e-6), 16));
    }

    #[test]
    fn test_negative_variance_fails_without_touching_cache() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(6);
        cache.get_or_draw(NoiseKey::new(0.0, 0.1), 16, &mut rng).unwrap();
        let before = cache.samples().unwrap().to_vec();
        assert!(cache.get_or_draw(NoiseKey::new(0.0, -0.5), 16, &mut rng).is_err());
        assert_eq!(cache.samples().unwrap(), before.as_slice());
        assert_eq!(cache.key(), Some(NoiseKey::new(0.0, 0.1)));
    }

    #[test]
    fn test_sample_statistics() {
        let mut cache = NoiseCache::new();
        let mut rng = StdRng::seed_from_u64(7);
        let (samples, _) = cache.get_or_draw(NoiseKey::new(0.5, 0.25), 20_000, &mut rng).unwrap();
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        assert!((mean - 0.5).abs() < 0.02, "mean {}", mean);
        assert!((var - 0.25).abs() < 0.02, "variance {}", var);
    }
}
