use crate::aggregate::ResultAggregator;
use crate::config::Config;
use crate::data::SubjectData;
use crate::isc::IscComputer;
use crate::null::NullDistributionGenerator;
use crate::store::TimeSeriesStore;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Orchestrates one analysis directory.
///
/// The directory holds `config.toml`, the per-subject records under
/// `subjects/`, and receives `significance.json` as the run's output.
pub struct Manager {
    analysis_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(analysis_dir: P) -> Result<Self> {
        let analysis_dir = analysis_dir.as_ref().to_path_buf();

        let cfg = Config::from_file(analysis_dir.join("config.toml"))
            .context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { analysis_dir, cfg })
    }

    /// Run the full pipeline: load, compute observed ISC, generate the
    /// null distribution, aggregate, and write the significance map.
    pub fn run_analysis(&self) -> Result<()> {
        let store = self.load_store().context("failed to load store")?;
        log::info!(
            "loaded {} subjects, {} spatial units, {} samples",
            store.n_subjects(),
            store.n_units(),
            store.n_samples()
        );

        let computer = IscComputer::new(self.cfg.method());
        let observed = computer
            .compute(&store)
            .context("failed to compute observed ISC")?;

        let generator = NullDistributionGenerator::new(
            self.cfg.null.method,
            self.cfg.null.n_draws,
            self.cfg.null.min_samples,
            self.cfg.null.seed,
        );
        let null = generator
            .generate(&store, &computer)
            .context("failed to generate null distribution")?;

        let aggregator =
            ResultAggregator::new(self.cfg.correction.method, self.cfg.correction.alpha);
        let map = aggregator
            .aggregate(&observed, &null)
            .context("failed to aggregate results")?;

        let significance_file = self.significance_file();
        map.save(&significance_file)
            .with_context(|| format!("failed to save {significance_file:?}"))?;

        log::info!(
            "flagged {} of {} spatial units as significant",
            map.n_significant(),
            map.entries().len()
        );

        Ok(())
    }

    /// Remove the significance map written by a previous run.
    pub fn clean_analysis(&self) -> Result<()> {
        let significance_file = self.significance_file();
        if significance_file.exists() {
            fs::remove_file(&significance_file)
                .with_context(|| format!("failed to remove {significance_file:?}"))?;
            log::info!("removed {significance_file:?}");
        }
        Ok(())
    }

    fn load_store(&self) -> Result<TimeSeriesStore> {
        let mut records = BTreeMap::new();
        for file in self.subject_files().context("failed to list subject files")? {
            let record = SubjectData::from_file(&file)
                .with_context(|| format!("failed to load {file:?}"))?;
            if let Some(previous) = records.insert(record.id().to_owned(), record) {
                bail!("duplicate subject id {}", previous.id());
            }
        }

        let selected: Vec<SubjectData> = if self.cfg.data.subjects.is_empty() {
            records.into_values().collect()
        } else {
            self.cfg
                .data
                .subjects
                .iter()
                .map(|id| {
                    records
                        .remove(id)
                        .with_context(|| format!("subject {id} not found"))
                })
                .collect::<Result<_>>()?
        };

        if selected.len() < 2 {
            bail!("need at least 2 subjects, found {}", selected.len());
        }

        let store = TimeSeriesStore::from_subjects(&selected, &self.cfg.data.units)
            .context("failed to align subjects")?;
        Ok(store)
    }

    fn subject_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.analysis_dir.join("subjects").join("*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let files = glob(pattern)
            .context("failed to glob subject files")?
            .filter_map(Result::ok)
            .collect();
        Ok(files)
    }

    fn significance_file(&self) -> PathBuf {
        self.analysis_dir.join("significance.json")
    }
}
