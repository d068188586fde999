use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Extracted time series of a single subject.
///
/// Maps each spatial-unit identifier (a region or voxel label) to the
/// subject's time series at that unit. Records are produced by the data
/// acquisition step and stored one file per subject, MessagePack-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectData {
    id: String,
    series: BTreeMap<String, Vec<f64>>,
}

impl SubjectData {
    pub fn new(id: impl Into<String>, series: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            id: id.into(),
            series,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the time series at a spatial unit, if the subject carries it.
    pub fn series(&self, unit: &str) -> Option<&[f64]> {
        self.series.get(unit).map(Vec::as_slice)
    }

    /// Spatial-unit identifiers of this subject, in sorted order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Load a [`SubjectData`] record from a MessagePack file.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let record = decode::from_read(&mut reader).context("failed to deserialize subject")?;
        Ok(record)
    }

    /// Write this record as a MessagePack file.
    pub fn to_file<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, self).context("failed to serialize subject")?;
        Ok(())
    }
}
