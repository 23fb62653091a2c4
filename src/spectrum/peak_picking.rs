//! Centroiding of profile traces for sources without a vendor peak picker.
//!
//! Vendor backends centroid with their own algorithms. Everything else goes
//! through [`mzsignal`]'s peak picker.
use mzsignal::peak_picker::{PeakFitType, PeakPicker, PeakPickerError};
use mzsignal::FittedPeak;

use super::peaks::{Peak, PeakList};

impl From<FittedPeak> for Peak {
    fn from(value: FittedPeak) -> Self {
        Peak::new(value.mz, value.intensity as f64)
    }
}

/// The thresholds handed to [`PeakPicker`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroider {
    /// Apexes below this intensity are discarded
    pub intensity_threshold: f32,
    pub signal_to_noise_threshold: f32,
}

impl Default for Centroider {
    fn default() -> Self {
        Self {
            intensity_threshold: 1.0,
            signal_to_noise_threshold: 1.0,
        }
    }
}

impl Centroider {
    pub fn new(intensity_threshold: f32, signal_to_noise_threshold: f32) -> Self {
        Self {
            intensity_threshold,
            signal_to_noise_threshold,
        }
    }

    pub fn peak_picker(&self) -> PeakPicker {
        PeakPicker {
            fit_type: PeakFitType::Quadratic,
            intensity_threshold: self.intensity_threshold,
            signal_to_noise_threshold: self.signal_to_noise_threshold,
            ..Default::default()
        }
    }

    /// Pick peaks from a profile trace sorted by m/z.
    pub fn pick(&self, trace: &PeakList) -> Result<PeakList, PeakPickerError> {
        if trace.is_empty() {
            return Ok(PeakList::empty());
        }
        let mzs = trace.mzs();
        let intensities: Vec<f32> = trace.iter().map(|p| p.intensity as f32).collect();
        let mut acc = Vec::new();
        self.peak_picker().discover_peaks(&mzs, &intensities, &mut acc)?;
        log::trace!("Picked {} peaks from {} profile points", acc.len(), trace.len());
        Ok(acc.into_iter().map(Peak::from).collect())
    }
}
