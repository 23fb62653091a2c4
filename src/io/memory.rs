/*!
An acquisition held entirely in memory, readable from and writable to JSON.

This backs the converter when no vendor runtime is available and provides
the deterministic fixture used throughout the tests.
*/
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::io::traits::{AcquisitionDescription, AcquisitionSource, PeakMode, SourceError};
use crate::io::utils::checksum_file;
use crate::spectrum::{
    Centroider, Chromatogram, ChromatogramType, Peak, PeakList, ScanId, SpectrumMetadata,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryScan {
    pub metadata: SpectrumMetadata,
    pub peaks: Vec<Peak>,
}

impl MemoryScan {
    pub fn new(metadata: SpectrumMetadata, peaks: Vec<Peak>) -> Self {
        Self { metadata, peaks }
    }
}

/// An [`AcquisitionSource`] over scans already in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryAcquisition {
    #[serde(default)]
    pub description: AcquisitionDescription,
    pub scans: Vec<MemoryScan>,
    /// When absent, the total ion current is computed from the scans
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chromatogram: Option<Chromatogram>,
    #[serde(skip)]
    pub centroider: Centroider,
}

impl MemoryAcquisition {
    /// Build an acquisition from scans numbered consecutively from 1.
    pub fn new(description: AcquisitionDescription, scans: Vec<MemoryScan>) -> Result<Self, SourceError> {
        let this = Self {
            description,
            scans,
            chromatogram: None,
            centroider: Centroider::default(),
        };
        this.check_numbering()?;
        Ok(this)
    }

    fn check_numbering(&self) -> Result<(), SourceError> {
        for (i, scan) in self.scans.iter().enumerate() {
            let expected = i as ScanId + 1;
            if scan.metadata.scan_id != expected {
                return Err(SourceError::SourceReadFailure(format!(
                    "Scan at position {i} has scan number {}, expected {expected}",
                    scan.metadata.scan_id
                )));
            }
        }
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let this: Self = serde_json::from_reader(reader)
            .map_err(|e| SourceError::SourceReadFailure(e.to_string()))?;
        this.check_numbering()?;
        Ok(this)
    }

    /// Read an acquisition from a JSON file, describing the file itself as the source
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let handle = io::BufReader::new(fs::File::open(path)?);
        let mut this = Self::from_reader(handle)?;
        if let Some(name) = path.file_name() {
            this.description.source_name = name.to_string_lossy().to_string();
        }
        let location = fs::canonicalize(path)?
            .parent()
            .map(|p| format!("file://{}", p.display()))
            .unwrap_or_default();
        this.description.source_location = location;
        this.description.source_checksum = Some(checksum_file(path)?);
        log::debug!("Loaded {} scans from {}", this.scans.len(), path.display());
        Ok(this)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    fn get(&self, scan_id: ScanId) -> Result<&MemoryScan, SourceError> {
        if !self.contains(scan_id) {
            return Err(SourceError::ScanNotFound(scan_id));
        }
        Ok(&self.scans[scan_id as usize - 1])
    }
}

impl AcquisitionSource for MemoryAcquisition {
    fn scan_count(&self) -> usize {
        self.scans.len()
    }

    fn description(&self) -> AcquisitionDescription {
        self.description.clone()
    }

    fn metadata(&mut self, scan_id: ScanId) -> Result<SpectrumMetadata, SourceError> {
        Ok(self.get(scan_id)?.metadata.clone())
    }

    fn peaks(&mut self, scan_id: ScanId, mode: PeakMode) -> Result<Vec<Peak>, SourceError> {
        let scan = self.get(scan_id)?;
        if mode == PeakMode::Centroid && !scan.metadata.is_centroided {
            let profile = PeakList::new(scan.peaks.clone());
            Ok(self.centroider.pick(&profile)?.into_inner())
        } else {
            Ok(scan.peaks.clone())
        }
    }

    fn chromatogram(&mut self) -> Result<Chromatogram, SourceError> {
        if let Some(chromatogram) = &self.chromatogram {
            return Ok(chromatogram.clone());
        }
        let mut chromatogram = Chromatogram::new(ChromatogramType::TotalIonCurrent, Vec::new(), Vec::new());
        for scan in self.scans.iter() {
            let tic: f64 = scan.peaks.iter().map(|p| p.intensity).sum();
            chromatogram.push(scan.metadata.retention_time, tic);
        }
        Ok(chromatogram)
    }
}

/// Deterministic acquisitions shaped like a small data-dependent run.
#[doc(hidden)]
pub mod test_fixtures {
    use chrono::DateTime;

    use super::*;
    use crate::spectrum::{
        Activation, DissociationMethod, IsolationWindow, NativeIdFormat, Precursor, ScanPolarity,
    };

    pub const FIXTURE_SCAN_COUNT: usize = 48;
    pub const FIXTURE_MS1_COUNT: usize = 14;
    pub const FIXTURE_MSN_COUNT: usize = 34;

    fn profile_peaks(cycle: usize) -> Vec<Peak> {
        let centers = [
            400.0 + cycle as f64 * 5.0,
            612.3 + cycle as f64 * 2.5,
            845.7,
        ];
        (0..600)
            .map(|i| {
                let mz = 350.0 + i as f64 * 1.0;
                let intensity: f64 = centers
                    .iter()
                    .enumerate()
                    .map(|(j, c)| {
                        let height = 1e5 / (j as f64 + 1.0);
                        height * (-((mz - c).powi(2)) / 2.0).exp()
                    })
                    .sum();
                Peak::new(mz, intensity)
            })
            .collect()
    }

    fn centroid_peaks(scan_id: ScanId, precursor_mz: f64) -> Vec<Peak> {
        (0..25)
            .map(|i| {
                let mz = 120.0 + i as f64 * ((precursor_mz - 120.0) / 25.0);
                let intensity = 100.0 + ((scan_id as usize * 37 + i * 91) % 1000) as f64;
                let peak = Peak::new(mz, intensity);
                if i % 5 == 0 {
                    peak.with_charge(1)
                } else {
                    peak
                }
            })
            .collect()
    }

    /// 48 scans: 14 profile MS1 survey scans, each followed by two or three
    /// centroided MS2 scans, for 34 MS2 scans in total.
    pub fn small_acquisition() -> MemoryAcquisition {
        let mut scans = Vec::with_capacity(FIXTURE_SCAN_COUNT);
        let mut time = 0.0;
        for cycle in 0..FIXTURE_MS1_COUNT {
            let parent = scans.len() as ScanId + 1;
            time += 1.5;
            let ms1 = SpectrumMetadata::new(parent, 1, time, false)
                .with_polarity(ScanPolarity::Positive)
                .with_filter_string("FTMS + p NSI Full ms [350.00-950.00]");
            scans.push(MemoryScan::new(ms1, profile_peaks(cycle)));

            let n_msn = if cycle < 6 { 3 } else { 2 };
            for k in 0..n_msn {
                let scan_id = scans.len() as ScanId + 1;
                time += 0.5;
                let precursor_mz = 400.0 + cycle as f64 * 5.0 + k as f64 * 212.3;
                let precursor = Precursor::new(precursor_mz)
                    .with_charge(2)
                    .with_intensity(5e4)
                    .with_isolation_window(IsolationWindow::around(precursor_mz, 2.0))
                    .with_activation(Activation {
                        method: Some(DissociationMethod::HCD),
                        energy: Some(30.0),
                    })
                    .with_parent_scan(parent);
                let msn = SpectrumMetadata::new(scan_id, 2, time, true)
                    .with_polarity(ScanPolarity::Positive)
                    .with_filter_string(format!(
                        "FTMS + c NSI d Full ms2 {precursor_mz:.2}@hcd30.00 [120.00-{precursor_mz:.2}]"
                    ))
                    .with_precursor(precursor);
                scans.push(MemoryScan::new(msn, centroid_peaks(scan_id, precursor_mz)));
            }
        }

        let description = AcquisitionDescription {
            source_name: "small.RAW".to_string(),
            source_location: "file:///data".to_string(),
            source_checksum: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
            instrument_model: Some("Orbitrap Exploris 480".to_string()),
            start_time: DateTime::parse_from_rfc3339("2024-03-01T10:15:00+00:00").ok(),
            native_id_format: NativeIdFormat::Thermo,
            thermo_raw: true,
        };

        MemoryAcquisition {
            description,
            scans,
            chromatogram: None,
            centroider: Centroider::default(),
        }
    }

    /// `n` centroided MS1 scans, one second apart
    pub fn numbered_acquisition(n: usize) -> MemoryAcquisition {
        let scans = (1..=n as ScanId)
            .map(|scan_id| {
                let meta = SpectrumMetadata::new(scan_id, 1, scan_id as f64, true);
                let peaks = vec![
                    Peak::new(100.0 + scan_id as f64, 10.0),
                    Peak::new(200.0 + scan_id as f64, 20.0),
                ];
                MemoryScan::new(meta, peaks)
            })
            .collect();
        MemoryAcquisition {
            description: AcquisitionDescription {
                source_name: "numbered.json".to_string(),
                native_id_format: NativeIdFormat::ScanNumberOnly,
                ..Default::default()
            },
            scans,
            chromatogram: None,
            centroider: Centroider::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn test_fixture_shape() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        assert_eq!(source.scan_count(), FIXTURE_SCAN_COUNT);
        let mut ms1 = 0;
        let mut msn = 0;
        for scan_id in source.scan_ids() {
            match source.metadata(scan_id)?.ms_level {
                1 => ms1 += 1,
                _ => msn += 1,
            }
        }
        assert_eq!(ms1, FIXTURE_MS1_COUNT);
        assert_eq!(msn, FIXTURE_MSN_COUNT);
        assert_eq!(source.chromatogram()?.len(), FIXTURE_SCAN_COUNT);
        Ok(())
    }

    #[test]
    fn test_peak_modes() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let profile = source.peaks(1, PeakMode::AsAcquired)?;
        let centroid = source.peaks(1, PeakMode::Centroid)?;
        assert_eq!(profile.len(), 600);
        assert_eq!(centroid.len(), 3);

        let msn_raw = source.peaks(2, PeakMode::AsAcquired)?;
        let msn_centroid = source.peaks(2, PeakMode::Centroid)?;
        assert_eq!(msn_raw, msn_centroid);

        assert!(matches!(
            source.peaks(49, PeakMode::AsAcquired),
            Err(SourceError::ScanNotFound(49))
        ));
        assert!(!source.contains(0));
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<(), SourceError> {
        let source = numbered_acquisition(3);
        let mut buffer = Vec::new();
        source
            .to_writer(&mut buffer)
            .map_err(|e| SourceError::SourceReadFailure(e.to_string()))?;
        let dup = MemoryAcquisition::from_reader(buffer.as_slice())?;
        assert_eq!(dup.scans, source.scans);
        assert_eq!(dup.description, source.description);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("numbered.json");
        fs::write(&path, &buffer)?;
        let opened = MemoryAcquisition::open_path(&path)?;
        assert_eq!(opened.description.source_name, "numbered.json");
        assert!(opened.description.source_location.starts_with("file://"));
        assert_eq!(opened.description.source_checksum.map(|s| s.len()), Some(40));
        Ok(())
    }

    #[test]
    fn test_rejects_gaps() {
        let mut source = numbered_acquisition(3);
        source.scans.remove(1);
        let mut buffer = Vec::new();
        source.to_writer(&mut buffer).unwrap();
        assert!(matches!(
            MemoryAcquisition::from_reader(buffer.as_slice()),
            Err(SourceError::SourceReadFailure(_))
        ));
    }
}
