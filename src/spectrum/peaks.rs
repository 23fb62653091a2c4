use std::ops::Index;
use std::slice;

use serde::{Deserialize, Serialize};

/// A single m/z-intensity pair, optionally annotated with the charge and
/// resolution the instrument reported for it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub charge: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolution: Option<f64>,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self {
            mz,
            intensity,
            charge: None,
            resolution: None,
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/**
A sequence of [`Peak`] that is always sorted in ascending m/z order.

The ordering is established on construction and there is no way to mutate
the list that would break it, so consumers may rely on it.
*/
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PeakList {
    peaks: Vec<Peak>,
}

impl PeakList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a [`PeakList`], sorting the peaks by m/z. The sort is stable, so
    /// peaks with equal m/z keep the order the source gave them in.
    pub fn new(mut peaks: Vec<Peak>) -> Self {
        if !peaks.windows(2).all(|w| w[0].mz <= w[1].mz) {
            peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        }
        Self { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn as_slice(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn into_inner(self) -> Vec<Peak> {
        self.peaks
    }

    /// The most intense peak. Ties go to the lowest m/z.
    pub fn base_peak(&self) -> Option<&Peak> {
        self.peaks.iter().fold(None, |best: Option<&Peak>, p| match best {
            Some(b) if b.intensity >= p.intensity => Some(b),
            _ => Some(p),
        })
    }

    pub fn total_ion_current(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    pub fn lowest_mz(&self) -> Option<f64> {
        self.peaks.first().map(|p| p.mz)
    }

    pub fn highest_mz(&self) -> Option<f64> {
        self.peaks.last().map(|p| p.mz)
    }

    pub fn mzs(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.mz).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.intensity).collect()
    }

    /// The charge of each peak, or `None` if no peak carries a charge. Peaks
    /// without a charge are reported as `0` when others have one.
    pub fn charges(&self) -> Option<Vec<i32>> {
        if self.peaks.iter().any(|p| p.charge.is_some()) {
            Some(self.peaks.iter().map(|p| p.charge.unwrap_or_default()).collect())
        } else {
            None
        }
    }
}

impl From<Vec<Peak>> for PeakList {
    fn from(value: Vec<Peak>) -> Self {
        Self::new(value)
    }
}

impl FromIterator<Peak> for PeakList {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for PeakList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let peaks = Vec::<Peak>::deserialize(deserializer)?;
        Ok(Self::new(peaks))
    }
}

impl Index<usize> for PeakList {
    type Output = Peak;

    fn index(&self, index: usize) -> &Self::Output {
        &self.peaks[index]
    }
}

impl<'a> IntoIterator for &'a PeakList {
    type Item = &'a Peak;
    type IntoIter = slice::Iter<'a, Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}
