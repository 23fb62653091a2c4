use super::peaks::{Peak, PeakList};
use super::scan_properties::{Precursor, ScanId, SpectrumMetadata};

/**
A spectrum ready to be written: the scan's metadata paired with the peak
list that will be emitted for it.

A [`Spectrum`] is owned by whichever pipeline stage is handling it and is
dropped once written.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub metadata: SpectrumMetadata,
    pub peaks: PeakList,
}

impl Spectrum {
    pub fn new(metadata: SpectrumMetadata, peaks: PeakList) -> Self {
        Self { metadata, peaks }
    }

    pub fn scan_id(&self) -> ScanId {
        self.metadata.scan_id
    }

    pub fn ms_level(&self) -> u8 {
        self.metadata.ms_level
    }

    pub fn is_centroided(&self) -> bool {
        self.metadata.is_centroided
    }

    pub fn precursor(&self) -> Option<&Precursor> {
        self.metadata.precursor.as_ref()
    }

    pub fn base_peak(&self) -> Option<&Peak> {
        self.peaks.base_peak()
    }

    pub fn total_ion_current(&self) -> f64 {
        self.peaks.total_ion_current()
    }

    /// The number of points in each of the spectrum's arrays
    pub fn array_length(&self) -> usize {
        self.peaks.len()
    }
}
