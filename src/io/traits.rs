use std::io;

use chrono::{DateTime, FixedOffset};
use mzsignal::peak_picker::PeakPickerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spectrum::{Chromatogram, NativeIdFormat, Peak, ScanId, Spectrum, SpectrumMetadata};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read from the acquisition source: {0}")]
    SourceReadFailure(String),
    #[error("Scan {0} is not present in the acquisition")]
    ScanNotFound(ScanId),
    #[error("An IO error occurred while reading the acquisition: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
    #[error("An error occurred while peak picking: {0:?}")]
    PeakPicking(
        #[from]
        #[source]
        PeakPickerError,
    ),
}

/// Whether a source should hand back peaks as stored or centroid profile data first
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeakMode {
    #[default]
    AsAcquired,
    Centroid,
}

/// Describes the acquisition as a whole, used to fill in document-level metadata
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionDescription {
    /// The name of the file the data was read from
    pub source_name: String,
    /// The directory containing the source file, as a `file://` URI
    #[serde(default)]
    pub source_location: String,
    /// SHA-1 hex digest of the source file when it was read from disk
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub instrument_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub native_id_format: NativeIdFormat,
    /// Whether the source is a Thermo RAW file
    #[serde(default)]
    pub thermo_raw: bool,
}

/**
An opened acquisition that scans can be read from.

Scans are numbered from 1 to [`AcquisitionSource::scan_count`]. Implementations
are not expected to tolerate use from more than one thread at a time, so every
read takes `&mut self`.
*/
pub trait AcquisitionSource {
    fn scan_count(&self) -> usize;

    fn description(&self) -> AcquisitionDescription;

    fn metadata(&mut self, scan_id: ScanId) -> Result<SpectrumMetadata, SourceError>;

    /// Read a scan's peaks. With [`PeakMode::Centroid`], profile scans are
    /// centroided by the source's own algorithm. Centroided scans are returned
    /// unchanged in either mode.
    fn peaks(&mut self, scan_id: ScanId, mode: PeakMode) -> Result<Vec<Peak>, SourceError>;

    /// The acquisition-wide total ion current trace, times in seconds
    fn chromatogram(&mut self) -> Result<Chromatogram, SourceError>;

    fn contains(&self, scan_id: ScanId) -> bool {
        scan_id >= 1 && (scan_id as usize) <= self.scan_count()
    }

    /// All scan ids in ascending order
    fn scan_ids(&self) -> std::ops::RangeInclusive<ScanId> {
        1..=(self.scan_count() as ScanId)
    }
}

impl<T: AcquisitionSource + ?Sized> AcquisitionSource for Box<T> {
    fn scan_count(&self) -> usize {
        (**self).scan_count()
    }

    fn description(&self) -> AcquisitionDescription {
        (**self).description()
    }

    fn metadata(&mut self, scan_id: ScanId) -> Result<SpectrumMetadata, SourceError> {
        (**self).metadata(scan_id)
    }

    fn peaks(&mut self, scan_id: ScanId, mode: PeakMode) -> Result<Vec<Peak>, SourceError> {
        (**self).peaks(scan_id, mode)
    }

    fn chromatogram(&mut self) -> Result<Chromatogram, SourceError> {
        (**self).chromatogram()
    }

    fn contains(&self, scan_id: ScanId) -> bool {
        (**self).contains(scan_id)
    }
}

/**
Common operations for writing spectra and chromatograms to an output format.

Spectra must be written in the order they should appear in the document.
Formats that cannot represent chromatograms accept and ignore them.
*/
pub trait SpectrumWriter {
    /// Write a single spectrum, returning the number of spectra written,
    /// which is `0` if the format does not store this kind of spectrum.
    fn write(&mut self, spectrum: &Spectrum) -> io::Result<usize>;

    fn write_chromatogram(&mut self, chromatogram: &Chromatogram) -> io::Result<usize>;

    /// Declare how many spectra will be written before the first is written.
    /// Formats that record the count up front require this.
    fn set_spectrum_count(&mut self, _count: u64) {}

    fn set_chromatogram_count(&mut self, _count: u64) {}

    fn flush(&mut self) -> io::Result<()>;

    /// Finish the document. Nothing may be written afterwards.
    fn close(&mut self) -> io::Result<()>;
}
