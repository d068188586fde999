use crate::data::SubjectData;
use crate::error::{IscError, Result};

/// Aligned per-subject, per-unit time series.
///
/// The store is the read-only input of every downstream computation:
/// subjects and spatial units keep a fixed order, all series share one
/// temporal axis, and alignment is enforced once at construction.
#[derive(Debug)]
pub struct TimeSeriesStore {
    subjects: Vec<String>,
    units: Vec<String>,
    n_samples: usize,
    // Unit-major: series[unit][subject] is one time series.
    series: Vec<Vec<Vec<f64>>>,
}

impl TimeSeriesStore {
    /// Build a store from per-subject records.
    ///
    /// `requested_units` selects and orders the spatial units; when empty,
    /// all units of the first record are used. Every subject must carry
    /// every selected unit, and all series must have the temporal length
    /// of the first subject's first selected unit.
    ///
    /// # Errors
    /// [`IscError::MissingData`] if a subject lacks a selected unit,
    /// [`IscError::Alignment`] if temporal lengths differ.
    pub fn from_subjects(records: &[SubjectData], requested_units: &[String]) -> Result<Self> {
        let units: Vec<String> = if requested_units.is_empty() {
            match records.first() {
                Some(first) => first.units().map(str::to_owned).collect(),
                None => Vec::new(),
            }
        } else {
            requested_units.to_vec()
        };

        let mut n_samples = None;
        let mut series = vec![Vec::with_capacity(records.len()); units.len()];

        for record in records {
            for (i_unit, unit) in units.iter().enumerate() {
                let vals = record.series(unit).ok_or_else(|| IscError::MissingData {
                    subject: record.id().to_owned(),
                    unit: unit.clone(),
                })?;

                let expected = *n_samples.get_or_insert(vals.len());
                if vals.len() != expected {
                    return Err(IscError::Alignment {
                        subject: record.id().to_owned(),
                        expected,
                        actual: vals.len(),
                    });
                }

                series[i_unit].push(vals.to_vec());
            }
        }

        Ok(Self {
            subjects: records.iter().map(|r| r.id().to_owned()).collect(),
            units,
            n_samples: n_samples.unwrap_or(0),
            series,
        })
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn n_units(&self) -> usize {
        self.units.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Per-subject time series at a spatial unit, in subject order.
    pub fn series_for(&self, i_unit: usize) -> &[Vec<f64>] {
        &self.series[i_unit]
    }

    /// Clone of this store with the series tensor replaced.
    ///
    /// Used by the null generator to wrap surrogate data; the replacement
    /// must have the same shape as the original.
    pub(crate) fn with_series(&self, series: Vec<Vec<Vec<f64>>>) -> Self {
        debug_assert_eq!(series.len(), self.n_units());
        Self {
            subjects: self.subjects.clone(),
            units: self.units.clone(),
            n_samples: self.n_samples,
            series,
        }
    }
}
