use crate::error::{IscError, Result};
use crate::store::TimeSeriesStore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// ISC estimation method.
///
/// The set is closed: leave-one-out correlates each subject against the
/// average of the others, pairwise correlates every subject pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    LeaveOneOut,
    Pairwise { aggregation: PairAggregation },
}

/// How pairwise correlations are collapsed into one value per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairAggregation {
    Mean,
    Median,
}

/// Per-unit ISC values, one scalar per spatial unit.
///
/// `samples` keeps the raw per-subject (leave-one-out) or per-pair
/// (pairwise) correlations behind each scalar. Immutable once produced.
#[derive(Debug)]
pub struct IscResult {
    units: Vec<String>,
    values: Vec<f64>,
    samples: Vec<Vec<f64>>,
}

impl IscResult {
    pub fn new(units: Vec<String>, values: Vec<f64>, samples: Vec<Vec<f64>>) -> Self {
        Self {
            units,
            values,
            samples,
        }
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    pub fn n_units(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Computes ISC values over a [`TimeSeriesStore`].
pub struct IscComputer {
    method: Method,
}

impl IscComputer {
    pub fn new(method: Method) -> Self {
        Self { method }
    }

    /// Compute one ISC value per spatial unit.
    ///
    /// Units are independent and processed in parallel. A zero-variance
    /// series (including a degenerate leave-one-out average) aborts the
    /// whole computation with [`IscError::DegenerateSeries`]; partial
    /// results are never returned.
    pub fn compute(&self, store: &TimeSeriesStore) -> Result<IscResult> {
        let per_unit = (0..store.n_units())
            .into_par_iter()
            .map(|i_unit| self.compute_unit(store, i_unit))
            .collect::<Result<Vec<_>>>()?;

        let (values, samples) = per_unit.into_iter().unzip();
        Ok(IscResult::new(store.units().to_vec(), values, samples))
    }

    fn compute_unit(&self, store: &TimeSeriesStore, i_unit: usize) -> Result<(f64, Vec<f64>)> {
        let unit = &store.units()[i_unit];
        let series = store.series_for(i_unit);

        let samples = match self.method {
            Method::LeaveOneOut => leave_one_out(unit, series)?,
            Method::Pairwise { .. } => pairwise(unit, series)?,
        };

        let value = match self.method {
            Method::LeaveOneOut | Method::Pairwise { aggregation: PairAggregation::Mean } => {
                mean(&samples)
            }
            Method::Pairwise { aggregation: PairAggregation::Median } => median(&samples),
        };

        Ok((value, samples))
    }
}

/// Correlate each subject against the element-wise average of the others.
fn leave_one_out(unit: &str, series: &[Vec<f64>]) -> Result<Vec<f64>> {
    let n_subjects = series.len();
    let n_samples = series.first().map_or(0, Vec::len);

    let mut total = vec![0.0; n_samples];
    for subject in series {
        for (sum, &val) in total.iter_mut().zip(subject) {
            *sum += val;
        }
    }

    let mut samples = Vec::with_capacity(n_subjects);
    for subject in series {
        let others: Vec<f64> = total
            .iter()
            .zip(subject)
            .map(|(&sum, &val)| (sum - val) / (n_subjects - 1) as f64)
            .collect();
        samples.push(pearson(unit, subject, &others)?);
    }

    Ok(samples)
}

/// Correlate every unordered subject pair.
fn pairwise(unit: &str, series: &[Vec<f64>]) -> Result<Vec<f64>> {
    let n_subjects = series.len();
    let mut samples = Vec::with_capacity(n_subjects * (n_subjects - 1) / 2);

    for i in 0..n_subjects {
        for j in (i + 1)..n_subjects {
            samples.push(pearson(unit, &series[i], &series[j])?);
        }
    }

    Ok(samples)
}

/// Pearson correlation of two equal-length series.
fn pearson(unit: &str, x: &[f64], y: &[f64]) -> Result<f64> {
    let n = x.len();
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        let da = a - mean_x;
        let db = b - mean_y;
        num += da * db;
        var_x += da * da;
        var_y += db * db;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return Err(IscError::DegenerateSeries {
            unit: unit.to_owned(),
        });
    }

    Ok(num / (var_x.sqrt() * var_y.sqrt()))
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn median(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }

    let mut sorted = vals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pearson_of_identical_series_is_one() {
        let x = vec![0.1, 0.9, -0.4, 2.0, 1.3];
        let r = pearson("a", &x, &x).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_of_opposed_series_is_minus_one() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| -v).collect();
        let r = pearson("a", &x, &y).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_rejects_constant_series() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![5.0, 5.0, 5.0];
        let err = pearson("roi-7", &x, &y).unwrap_err();
        match err {
            IscError::DegenerateSeries { unit } => assert_eq!(unit, "roi-7"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&[0.4, 0.1, 0.3, 0.2]), 0.25);
        assert_eq!(median(&[0.3, 0.1, 0.2]), 0.2);
    }
}
