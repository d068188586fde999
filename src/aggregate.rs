use crate::error::{IscError, Result};
use crate::isc::IscResult;
use crate::null::NullDistribution;
use crate::stats::Accumulator;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufWriter, path::Path};

/// Multiple-comparisons correction applied across spatial units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    None,
    Bonferroni,
    /// Benjamini-Hochberg false discovery rate.
    Fdr,
}

/// Significance verdict of one spatial unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSignificance {
    pub unit: String,
    pub observed: f64,
    pub p_value: f64,
    pub significant: bool,
    pub null_mean: f64,
    pub null_std_dev: f64,
}

/// Terminal artifact of an analysis run, one entry per spatial unit in
/// store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignificanceMap {
    entries: Vec<UnitSignificance>,
}

impl SignificanceMap {
    pub fn entries(&self) -> &[UnitSignificance] {
        &self.entries
    }

    pub fn n_significant(&self) -> usize {
        self.entries.iter().filter(|e| e.significant).count()
    }

    /// Write the map as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> anyhow::Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).context("failed to serialize map")?;
        Ok(())
    }
}

/// Combines observed ISC values and a null distribution into a
/// [`SignificanceMap`].
pub struct ResultAggregator {
    correction: Correction,
    alpha: f64,
}

impl ResultAggregator {
    pub fn new(correction: Correction, alpha: f64) -> Self {
        Self { correction, alpha }
    }

    /// Compute per-unit empirical p-values and apply the correction.
    ///
    /// The p-value is the bias-corrected permutation estimate
    /// `(count of null values >= observed + 1) / (n draws + 1)`, so it is
    /// always in (0, 1].
    ///
    /// # Errors
    /// [`IscError::EmptyNull`] if the distribution has no draws.
    pub fn aggregate(
        &self,
        observed: &IscResult,
        null: &NullDistribution,
    ) -> Result<SignificanceMap> {
        if null.n_draws() == 0 {
            return Err(IscError::EmptyNull);
        }

        let n_units = observed.n_units();
        let mut exceed_counts = vec![0usize; n_units];
        let mut summaries: Vec<Accumulator> = (0..n_units).map(|_| Accumulator::new()).collect();

        for draw in null.draws() {
            for (i_unit, &val) in draw.iter().enumerate() {
                if val >= observed.values()[i_unit] {
                    exceed_counts[i_unit] += 1;
                }
                summaries[i_unit].add(val);
            }
        }

        let p_values: Vec<f64> = exceed_counts
            .iter()
            .map(|&count| (count + 1) as f64 / (null.n_draws() + 1) as f64)
            .collect();
        let significant = self.apply_correction(&p_values);

        let entries = observed
            .units()
            .iter()
            .enumerate()
            .map(|(i_unit, unit)| UnitSignificance {
                unit: unit.clone(),
                observed: observed.values()[i_unit],
                p_value: p_values[i_unit],
                significant: significant[i_unit],
                null_mean: summaries[i_unit].mean(),
                null_std_dev: summaries[i_unit].std_dev(),
            })
            .collect();

        Ok(SignificanceMap { entries })
    }

    fn apply_correction(&self, p_values: &[f64]) -> Vec<bool> {
        let n_units = p_values.len();
        match self.correction {
            Correction::None => p_values.iter().map(|&p| p <= self.alpha).collect(),
            Correction::Bonferroni => {
                let threshold = self.alpha / n_units as f64;
                p_values.iter().map(|&p| p <= threshold).collect()
            }
            Correction::Fdr => benjamini_hochberg(p_values, self.alpha),
        }
    }
}

/// Benjamini-Hochberg step-up: find the largest rank k (1-based, p-values
/// ascending) with p <= k * alpha / m and flag everything at or below
/// that p-value.
fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> Vec<bool> {
    let n_units = p_values.len();

    let mut order: Vec<usize> = (0..n_units).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut cutoff = None;
    for (rank, &i_unit) in order.iter().enumerate() {
        let threshold = (rank + 1) as f64 * alpha / n_units as f64;
        if p_values[i_unit] <= threshold {
            cutoff = Some(p_values[i_unit]);
        }
    }

    match cutoff {
        Some(cutoff) => p_values.iter().map(|&p| p <= cutoff).collect(),
        None => vec![false; n_units],
    }
}
