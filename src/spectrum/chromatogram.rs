use serde::{Deserialize, Serialize};

/// The kind of trace a [`Chromatogram`] records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChromatogramType {
    #[default]
    TotalIonCurrent,
    BasePeak,
}

impl ChromatogramType {
    pub fn id(&self) -> &'static str {
        match self {
            Self::TotalIonCurrent => "TIC",
            Self::BasePeak => "BPC",
        }
    }
}

/// A time-ordered intensity trace over the whole acquisition.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chromatogram {
    #[serde(default)]
    pub chromatogram_type: ChromatogramType,
    /// Retention times in seconds
    pub time: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Chromatogram {
    pub fn new(chromatogram_type: ChromatogramType, time: Vec<f64>, intensity: Vec<f64>) -> Self {
        Self {
            chromatogram_type,
            time,
            intensity,
        }
    }

    pub fn id(&self) -> &'static str {
        self.chromatogram_type.id()
    }

    pub fn push(&mut self, time: f64, intensity: f64) {
        self.time.push(time);
        self.intensity.push(intensity);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.intensity.iter().copied())
    }
}

impl FromIterator<(f64, f64)> for Chromatogram {
    fn from_iter<T: IntoIterator<Item = (f64, f64)>>(iter: T) -> Self {
        let (time, intensity) = iter.into_iter().unzip();
        Self::new(ChromatogramType::TotalIonCurrent, time, intensity)
    }
}
