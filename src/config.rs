use crate::aggregate::Correction;
use crate::isc::{Method, PairAggregation};
use crate::null::NullMethod;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Analysis configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dataset selection.
    #[serde(default)]
    pub data: DataConfig,
    /// ISC estimation method.
    pub algorithm: AlgorithmConfig,
    /// Null-distribution generation.
    pub null: NullConfig,
    /// Multiple-comparisons correction.
    pub correction: CorrectionConfig,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Subject ids to analyze, in order; empty selects every subject
    /// found, sorted by id.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Spatial-unit ids to analyze, in order; empty selects all units of
    /// the first subject.
    #[serde(default)]
    pub units: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub method: MethodKind,
    /// Collapse rule for pairwise correlations; ignored by leave-one-out.
    #[serde(default = "default_pair_aggregation")]
    pub pair_aggregation: PairAggregation,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    LeaveOneOut,
    Pairwise,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NullConfig {
    pub method: NullMethod,
    #[serde(default = "default_n_draws")]
    pub n_draws: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    pub seed: u64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub method: Correction,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_pair_aggregation() -> PairAggregation {
    PairAggregation::Mean
}

fn default_n_draws() -> usize {
    1000
}

fn default_min_samples() -> usize {
    16
}

fn default_alpha() -> f64 {
    0.05
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config =
            toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.data.subjects.iter().any(String::is_empty) {
            bail!("subject ids must be non-empty");
        }
        if self.data.units.iter().any(String::is_empty) {
            bail!("spatial-unit ids must be non-empty");
        }

        check_num(self.null.n_draws, 1..1_000_000).context("invalid number of null draws")?;
        check_num(self.null.min_samples, 4..100_000).context("invalid minimum sample count")?;

        let alpha = self.correction.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            bail!("alpha must be in the open interval (0, 1), but is {alpha}");
        }

        Ok(())
    }

    /// ISC method selected by the `[algorithm]` section.
    pub fn method(&self) -> Method {
        match self.algorithm.method {
            MethodKind::LeaveOneOut => Method::LeaveOneOut,
            MethodKind::Pairwise => Method::Pairwise {
                aggregation: self.algorithm.pair_aggregation,
            },
        }
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
