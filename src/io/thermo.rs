//! An [`AcquisitionSource`] for Thermo RAW files.
//!
//! Depends upon the [`thermorawfilereader`] crate which manages the self-hosted `dotnet`
//! runtime.
//!
//! ```no_run
//! use mzexport::io::{AcquisitionSource, ThermoRawFile};
//!
//! # fn main() -> Result<(), mzexport::io::SourceError> {
//! let mut source = ThermoRawFile::open_path("./test/data/small.RAW")?;
//! assert_eq!(source.scan_count(), 48);
//! let meta = source.metadata(1)?;
//! assert_eq!(meta.ms_level, 1);
//! #    Ok(())
//! # }
//! ```
//! # Licensing
//! By using this library, you agree to the [RawFileReader License](https://github.com/thermofisherlsms/RawFileReader/blob/main/License.doc)
//!
use std::fs;
use std::path::{Path, PathBuf};

use chrono::DateTime;

use thermorawfilereader::schema::{DissociationMethod as ThermoDissociation, Polarity, PrecursorT, SpectrumMode};
use thermorawfilereader::RawFileReader;

use crate::io::traits::{AcquisitionDescription, AcquisitionSource, PeakMode, SourceError};
use crate::io::utils::checksum_file;
use crate::spectrum::{
    Activation, Chromatogram, ChromatogramType, DissociationMethod, IsolationWindow, NativeIdFormat, Peak,
    Precursor, ScanId, ScanPolarity, SpectrumMetadata,
};

/// Check to see if a buffer contains the header of a Thermo RAW file
///
/// Thermo RAW files start with a UTF-16 header with "Finnigan" at
/// codepoints 1-9.
pub fn is_thermo_raw_prefix(buffer: &[u8]) -> bool {
    if buffer.len() < 18 {
        return false;
    }
    let view: Vec<u16> = buffer[2..18]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&view) == "Finnigan"
}

fn convert_precursor(vprec: &PrecursorT) -> Precursor {
    let mut precursor = Precursor::new(vprec.mz()).with_intensity(vprec.intensity() as f64);
    if vprec.charge() != 0 {
        precursor = precursor.with_charge(vprec.charge());
    }

    let vact = vprec.activation();
    let method = match vact.dissociation_method() {
        ThermoDissociation::HCD => DissociationMethod::HCD,
        ThermoDissociation::ETD | ThermoDissociation::ETHCD | ThermoDissociation::ETCID => {
            DissociationMethod::ETD
        }
        ThermoDissociation::ECD | ThermoDissociation::ECCID | ThermoDissociation::ECHCD => {
            DissociationMethod::ECD
        }
        _ => DissociationMethod::CID,
    };
    precursor = precursor.with_activation(Activation {
        method: Some(method),
        energy: Some(vact.collision_energy() as f64),
    });

    let vwin = vprec.isolation_window();
    precursor = precursor.with_isolation_window(IsolationWindow::new(
        vwin.target() as f64,
        vwin.lower() as f64,
        vwin.upper() as f64,
    ));

    if vprec.parent_index() >= 0 {
        precursor = precursor.with_parent_scan(vprec.parent_index() as ScanId + 1);
    }
    precursor
}

/**
A Thermo RAW file opened for reading.

Scan numbers map onto the reader's zero-based spectrum indices. Retention
times are reported by the vendor library in minutes and converted to seconds.
*/
pub struct ThermoRawFile {
    pub path: PathBuf,
    handle: RawFileReader,
    description: AcquisitionDescription,
}

impl ThermoRawFile {
    /// Open a RAW file. This checksums the whole file, which may be slow.
    pub fn open_path<P: Into<PathBuf>>(path: P) -> Result<Self, SourceError> {
        let path: PathBuf = path.into();
        let handle = RawFileReader::open(&path)?;
        let description = Self::make_description(&path, &handle)?;
        Ok(Self {
            path,
            handle,
            description,
        })
    }

    fn make_description(path: &Path, handle: &RawFileReader) -> Result<AcquisitionDescription, SourceError> {
        let thermo_file_description = handle.file_description();
        let start_time = thermo_file_description
            .creation_date()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        let instrument_model = handle.instrument_model().model().map(|s| s.to_string());
        let source_location = fs::canonicalize(path)?
            .parent()
            .map(|p| format!("file://{}", p.display()))
            .unwrap_or_default();

        Ok(AcquisitionDescription {
            source_name: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            source_location,
            source_checksum: Some(checksum_file(path)?),
            instrument_model,
            start_time,
            native_id_format: NativeIdFormat::Thermo,
            thermo_raw: true,
        })
    }

    fn index_of(&self, scan_id: ScanId) -> Result<usize, SourceError> {
        if self.contains(scan_id) {
            Ok(scan_id as usize - 1)
        } else {
            Err(SourceError::ScanNotFound(scan_id))
        }
    }
}

impl AcquisitionSource for ThermoRawFile {
    fn scan_count(&self) -> usize {
        self.handle.len()
    }

    fn description(&self) -> AcquisitionDescription {
        self.description.clone()
    }

    fn metadata(&mut self, scan_id: ScanId) -> Result<SpectrumMetadata, SourceError> {
        let index = self.index_of(scan_id)?;
        self.handle.set_signal_loading(false);
        let raw = self
            .handle
            .get(index)
            .ok_or_else(|| SourceError::SourceReadFailure(format!("Failed to read scan {scan_id}")))?;
        let view = raw.view();

        let mut meta = SpectrumMetadata::new(
            scan_id,
            view.ms_level(),
            view.time() * 60.0,
            matches!(view.mode(), SpectrumMode::Centroid),
        );
        meta.polarity = match view.polarity() {
            Polarity::Negative => ScanPolarity::Negative,
            Polarity::Positive => ScanPolarity::Positive,
            _ => ScanPolarity::Unknown,
        };
        meta.filter_string = view.filter_string().map(|s| s.to_string());
        if let Some(vprec) = view.precursor() {
            meta.precursor = Some(convert_precursor(vprec));
        }
        Ok(meta)
    }

    fn peaks(&mut self, scan_id: ScanId, mode: PeakMode) -> Result<Vec<Peak>, SourceError> {
        let index = self.index_of(scan_id)?;
        self.handle.set_signal_loading(true);
        self.handle.set_centroid_spectra(mode == PeakMode::Centroid);
        let raw = self
            .handle
            .get(index)
            .ok_or_else(|| SourceError::SourceReadFailure(format!("Failed to read scan {scan_id}")))?;
        let view = raw.view();

        let mut peaks = Vec::new();
        if let Some(data) = view.data() {
            if let (Some(mz), Some(intensity)) = (data.mz(), data.intensity()) {
                peaks.extend(
                    mz.iter()
                        .zip(intensity)
                        .map(|(mz_i, intensity_i)| Peak::new(mz_i, intensity_i as f64)),
                );
            }
        }
        Ok(peaks)
    }

    fn chromatogram(&mut self) -> Result<Chromatogram, SourceError> {
        let mut chromatogram = Chromatogram::new(ChromatogramType::TotalIonCurrent, Vec::new(), Vec::new());
        for scan_id in self.scan_ids() {
            let time = self.metadata(scan_id)?.retention_time;
            let tic: f64 = self
                .peaks(scan_id, PeakMode::AsAcquired)?
                .iter()
                .map(|p| p.intensity)
                .sum();
            chromatogram.push(time, tic);
        }
        Ok(chromatogram)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prefix() {
        let mut buffer = vec![0x01, 0xa1];
        for c in "Finnigan".encode_utf16() {
            buffer.extend(c.to_le_bytes());
        }
        assert!(is_thermo_raw_prefix(&buffer));
        assert!(!is_thermo_raw_prefix(b"BEGIN IONS\nTITLE=x\n"));
    }
}
