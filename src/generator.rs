use crate::dsp;
use crate::error::Result;
use crate::noise::{NoiseCache, NoiseKey};
use crate::types::{NoiseStatus, SampleGrid, SignalParameters};
use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Curves produced by one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub pure: Vec<f64>,
    /// `pure + noise` when noise is shown, otherwise a copy of `pure`
    pub observed: Vec<f64>,
    pub noise: NoiseStatus,
}

/// Synthesizes the pure harmonic over a fixed grid and adds a cached noise
/// realization on top.
///
/// The generator owns its `NoiseCache` and random source. One generator
/// serves exactly one session: sharing it would let one user's slider
/// changes reshuffle the noise another user is looking at.
pub struct SignalGenerator {
    grid: SampleGrid,
    times: Vec<f64>,
    cache: NoiseCache,
    rng: StdRng,
}

impl SignalGenerator {
    /// Generator with an entropy-seeded random source.
    pub fn new(grid: SampleGrid) -> Self {
        Self::with_rng(grid, StdRng::from_entropy())
    }

    /// Generator whose noise draws are reproducible.
    pub fn with_seed(grid: SampleGrid, seed: u64) -> Self {
        Self::with_rng(grid, StdRng::seed_from_u64(seed))
    }

    fn with_rng(grid: SampleGrid, rng: StdRng) -> Self {
        Self {
            times: grid.times(),
            grid,
            cache: NoiseCache::new(),
            rng,
        }
    }

    /// Reuse cached noise when `(mean, variance)` moved by at most `tolerance`.
    pub fn with_noise_tolerance(mut self, tolerance: f64) -> Self {
        self.cache = self.cache.with_tolerance(tolerance);
        self
    }

    pub fn grid(&self) -> &SampleGrid {
        &self.grid
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Noise-free waveform; never touches the cache.
    pub fn pure(&self, params: &SignalParameters) -> Vec<f64> {
        dsp::sample_sine(&self.times, params.amplitude, params.frequency, params.phase)
    }

    /// Pure and observed curves for `params`.
    ///
    /// With `show_noise` the cached noise vector is reused unless the noise
    /// mean/variance changed since it was drawn; amplitude, frequency and
    /// phase never invalidate it. Without `show_noise` the cache is left alone.
    pub fn generate(&mut self, params: &SignalParameters, show_noise: bool) -> Result<Signals> {
        params.validate()?;
        let pure = self.pure(params);

        if !show_noise {
            return Ok(Signals {
                observed: pure.clone(),
                pure,
                noise: NoiseStatus::Disabled,
            });
        }

        let key = NoiseKey::new(params.noise_mean, params.noise_variance);
        let (noise, reused) = self.cache.get_or_draw(key, self.grid.len(), &mut self.rng)?;
        let observed = dsp::add(&pure, noise);
        trace!("generate {} (noise {})", params, if reused { "reused" } else { "drawn" });

        Ok(Signals {
            pure,
            observed,
            noise: if reused {
                NoiseStatus::Reused
            } else {
                NoiseStatus::Regenerated
            },
        })
    }

    pub fn cached_noise(&self) -> Option<&[f64]> {
        self.cache.samples()
    }

    pub fn cached_key(&self) -> Option<NoiseKey> {
        self.cache.key()
    }

    /// Drop the stored realization; the next noisy generation draws afresh.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
