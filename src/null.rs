use crate::error::{IscError, Result};
use crate::isc::IscComputer;
use crate::store::TimeSeriesStore;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Null-model used to generate surrogate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullMethod {
    /// Randomize the Fourier phase of each series, preserving its power
    /// spectrum.
    PhaseRandomization,
    /// Rotate each subject's series by a random offset, shared across
    /// that subject's spatial units.
    CircularShift,
}

/// Per-unit ISC values of the null draws, draw-major.
///
/// Ephemeral: produced for one aggregation and discarded afterwards.
#[derive(Debug)]
pub struct NullDistribution {
    draws: Vec<Vec<f64>>,
}

impl NullDistribution {
    pub fn from_draws(draws: Vec<Vec<f64>>) -> Self {
        Self { draws }
    }

    pub fn draws(&self) -> &[Vec<f64>] {
        &self.draws
    }

    pub fn n_draws(&self) -> usize {
        self.draws.len()
    }
}

/// Generates a null distribution of ISC values from surrogate data.
pub struct NullDistributionGenerator {
    method: NullMethod,
    n_draws: usize,
    min_samples: usize,
    seed: u64,
}

impl NullDistributionGenerator {
    pub fn new(method: NullMethod, n_draws: usize, min_samples: usize, seed: u64) -> Self {
        Self {
            method,
            n_draws,
            min_samples,
            seed,
        }
    }

    /// Recompute the ISC of `n_draws` surrogate datasets.
    ///
    /// Draw `k` uses a `ChaCha12Rng` seeded with the configured seed on
    /// stream `k`, so the distribution is reproducible and independent of
    /// how rayon schedules the draws.
    ///
    /// # Errors
    /// [`IscError::InsufficientSamples`] if the series are shorter than
    /// the configured minimum; any error of the underlying ISC
    /// computation.
    pub fn generate(
        &self,
        store: &TimeSeriesStore,
        computer: &IscComputer,
    ) -> Result<NullDistribution> {
        if store.n_samples() < self.min_samples {
            return Err(IscError::InsufficientSamples {
                actual: store.n_samples(),
                minimum: self.min_samples,
            });
        }

        let n_done = AtomicUsize::new(0);
        let log_every = (self.n_draws / 10).max(1);

        let draws = (0..self.n_draws)
            .into_par_iter()
            .map(|i_draw| {
                let mut rng = ChaCha12Rng::seed_from_u64(self.seed);
                rng.set_stream(i_draw as u64);

                let surrogate = store.with_series(self.surrogate_series(store, &mut rng));
                let result = computer.compute(&surrogate)?;

                let n_done = n_done.fetch_add(1, Ordering::Relaxed) + 1;
                if n_done % log_every == 0 {
                    let progress = 100.0 * n_done as f64 / self.n_draws as f64;
                    log::info!("completed {progress:06.2}% of null draws");
                }

                Ok(result.into_values())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NullDistribution::from_draws(draws))
    }

    fn surrogate_series(&self, store: &TimeSeriesStore, rng: &mut ChaCha12Rng) -> Vec<Vec<Vec<f64>>> {
        match self.method {
            NullMethod::PhaseRandomization => phase_randomize(store, rng),
            NullMethod::CircularShift => circular_shift(store, rng),
        }
    }
}

/// Phase-randomized surrogate of every subject/unit series.
///
/// Fresh uniform phases on the positive frequencies with Hermitian
/// symmetry; the DC bin is untouched and an even-length Nyquist bin keeps
/// its magnitude, so the surrogate is real with the source's power
/// spectrum and mean.
fn phase_randomize(store: &TimeSeriesStore, rng: &mut ChaCha12Rng) -> Vec<Vec<Vec<f64>>> {
    let n = store.n_samples();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    (0..store.n_units())
        .map(|i_unit| {
            store
                .series_for(i_unit)
                .iter()
                .map(|series| {
                    let mut spec: Vec<Complex<f64>> =
                        series.iter().map(|&re| Complex { re, im: 0.0 }).collect();
                    fft.process(&mut spec);

                    let mag: Vec<f64> = spec.iter().map(|c| c.norm()).collect();
                    for k in 1..n.div_ceil(2) {
                        let theta = rng.random::<f64>() * TAU;
                        spec[k] = Complex {
                            re: mag[k] * theta.cos(),
                            im: mag[k] * theta.sin(),
                        };
                        spec[n - k] = spec[k].conj();
                    }
                    if n % 2 == 0 {
                        spec[n / 2] = Complex {
                            re: mag[n / 2],
                            im: 0.0,
                        };
                    }

                    ifft.process(&mut spec);
                    spec.iter().map(|c| c.re / n as f64).collect()
                })
                .collect()
        })
        .collect()
}

/// Circular-shift surrogate: one random rotation per subject, applied to
/// all of that subject's units.
fn circular_shift(store: &TimeSeriesStore, rng: &mut ChaCha12Rng) -> Vec<Vec<Vec<f64>>> {
    let n = store.n_samples();
    let offsets: Vec<usize> = (0..store.n_subjects())
        .map(|_| rng.random_range(1..n))
        .collect();

    (0..store.n_units())
        .map(|i_unit| {
            store
                .series_for(i_unit)
                .iter()
                .zip(&offsets)
                .map(|(series, &offset)| {
                    let mut shifted = series.clone();
                    shifted.rotate_left(offset);
                    shifted
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SubjectData;
    use crate::isc::Method;
    use std::collections::BTreeMap;

    fn store_of(series_per_subject: &[Vec<f64>]) -> TimeSeriesStore {
        let records: Vec<SubjectData> = series_per_subject
            .iter()
            .enumerate()
            .map(|(i, series)| {
                let mut map = BTreeMap::new();
                map.insert("unit".to_string(), series.clone());
                SubjectData::new(format!("sub-{i:02}"), map)
            })
            .collect();
        TimeSeriesStore::from_subjects(&records, &[]).unwrap()
    }

    fn ramp(n: usize, slope: f64) -> Vec<f64> {
        (0..n).map(|t| slope * t as f64 + (t as f64 * 0.7).sin()).collect()
    }

    #[test]
    fn phase_surrogate_preserves_mean_and_variance() {
        let store = store_of(&[ramp(128, 0.1), ramp(128, -0.3)]);
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let surrogate = phase_randomize(&store, &mut rng);

        let source = &store.series_for(0)[0];
        let result = &surrogate[0][0];

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let var = |v: &[f64]| {
            let m = mean(v);
            v.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / v.len() as f64
        };

        assert!((mean(source) - mean(result)).abs() < 1e-9);
        assert!((var(source) - var(result)).abs() < 1e-9 * var(source).max(1.0));
        // And it is not the identity transform.
        assert!(source.iter().zip(result).any(|(a, b)| (a - b).abs() > 1e-6));
    }

    #[test]
    fn circular_shift_is_a_rotation() {
        let store = store_of(&[ramp(32, 1.0), ramp(32, 2.0)]);
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let surrogate = circular_shift(&store, &mut rng);

        for i_subject in 0..2 {
            let source = &store.series_for(0)[i_subject];
            let shifted = &surrogate[0][i_subject];

            let mut sorted_a = source.clone();
            let mut sorted_b = shifted.clone();
            sorted_a.sort_by(|a, b| a.total_cmp(b));
            sorted_b.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(sorted_a, sorted_b);
            assert_ne!(source, shifted);
        }
    }

    #[test]
    fn draws_are_deterministic_for_a_seed() {
        let store = store_of(&[ramp(64, 0.5), ramp(64, -0.5), ramp(64, 1.5)]);
        let computer = IscComputer::new(Method::LeaveOneOut);
        let generator =
            NullDistributionGenerator::new(NullMethod::PhaseRandomization, 20, 16, 1234);

        let a = generator.generate(&store, &computer).unwrap();
        let b = generator.generate(&store, &computer).unwrap();
        assert_eq!(a.draws(), b.draws());
    }

    #[test]
    fn short_series_are_rejected() {
        let store = store_of(&[ramp(8, 0.5), ramp(8, -0.5)]);
        let computer = IscComputer::new(Method::LeaveOneOut);
        let generator = NullDistributionGenerator::new(NullMethod::CircularShift, 10, 16, 0);

        let err = generator.generate(&store, &computer).unwrap_err();
        assert!(matches!(
            err,
            IscError::InsufficientSamples {
                actual: 8,
                minimum: 16,
            }
        ));
    }
}
