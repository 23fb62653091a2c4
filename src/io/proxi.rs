/*!
Extract a selection of scans as [PROXI](https://www.psidev.info/proxi) spectrum
records and write them out as a single JSON array.

Scan ids that are not present in the acquisition are left out of the results
without raising an error, so a query for `1-100` against a 48 scan file
returns 48 records.
*/
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::traits::{AcquisitionSource, SourceError};
use crate::params::{ControlledVocabulary, ParamCow, ParamLike};
use crate::selection::{FilterPipeline, ScanSet};
use crate::spectrum::{ScanId, ScanPolarity, Spectrum};
use crate::transform::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "READABLE")]
    Readable,
    #[serde(rename = "PEAK UNAVAILABLE")]
    PeakUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PROXIValue {
    Int(i64),
    Float(f64),
    String(String),
    #[default]
    Empty,
}

impl PROXIValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for PROXIValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for PROXIValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for PROXIValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PROXIParam {
    /// The term's CURIE, e.g. `MS:1000511`
    pub accession: String,
    pub name: String,
    #[serde(skip_serializing_if = "PROXIValue::is_empty", default)]
    pub value: PROXIValue,
}

impl PROXIParam {
    pub fn new<V: Into<PROXIValue>>(param: ParamCow<'static>, value: V) -> Self {
        Self {
            accession: param.curie().unwrap_or_default(),
            name: param.name().to_string(),
            value: value.into(),
        }
    }
}

impl From<ParamCow<'static>> for PROXIParam {
    fn from(param: ParamCow<'static>) -> Self {
        Self::new(param, PROXIValue::Empty)
    }
}

const MS1_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("MS1 spectrum", 1000579);
const MSN_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("MSn spectrum", 1000580);
const SCAN_NUMBER: ParamCow = ControlledVocabulary::MS.const_param_ident("scan number", 1003057);
const MS_LEVEL: ParamCow = ControlledVocabulary::MS.const_param_ident("ms level", 1000511);
const POSITIVE_SCAN: ParamCow = ControlledVocabulary::MS.const_param_ident("positive scan", 1000130);
const NEGATIVE_SCAN: ParamCow = ControlledVocabulary::MS.const_param_ident("negative scan", 1000129);
const PROFILE_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("profile spectrum", 1000128);
const CENTROID_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("centroid spectrum", 1000127);
const SCAN_START_TIME: ParamCow = ControlledVocabulary::MS.const_param_ident("scan start time", 1000016);
const ISOLATION_TARGET: ParamCow =
    ControlledVocabulary::MS.const_param_ident("isolation window target m/z", 1000827);
const ISOLATION_LOWER: ParamCow =
    ControlledVocabulary::MS.const_param_ident("isolation window lower offset", 1000828);
const ISOLATION_UPPER: ParamCow =
    ControlledVocabulary::MS.const_param_ident("isolation window upper offset", 1000829);
const SELECTED_ION_MZ: ParamCow = ControlledVocabulary::MS.const_param_ident("selected ion m/z", 1000744);
const CHARGE_STATE: ParamCow = ControlledVocabulary::MS.const_param_ident("charge state", 1000041);
const PEAK_INTENSITY: ParamCow = ControlledVocabulary::MS.const_param_ident("peak intensity", 1000042);

/// A reduced, serialization-only view of a [`Spectrum`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PROXISpectrum {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<Status>,
    pub attributes: Vec<PROXIParam>,
    #[serde(default)]
    pub mzs: Vec<f64>,
    #[serde(default)]
    pub intensities: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub charges: Option<Vec<i32>>,
}

impl PROXISpectrum {
    pub fn add_attribute<P: Into<PROXIParam>>(&mut self, param: P) {
        self.attributes.push(param.into())
    }

    /// The scan number recorded in the attributes
    pub fn scan_number(&self) -> Option<ScanId> {
        self.attributes
            .iter()
            .find(|p| p.accession == "MS:1003057")
            .and_then(|p| p.value.as_i64())
            .and_then(|v| ScanId::try_from(v).ok())
    }
}

impl From<&Spectrum> for PROXISpectrum {
    fn from(spectrum: &Spectrum) -> Self {
        let meta = &spectrum.metadata;
        let mut this = PROXISpectrum {
            status: Some(Status::Readable),
            mzs: spectrum.peaks.mzs(),
            intensities: spectrum.peaks.iter().map(|p| p.intensity as f32).collect(),
            charges: spectrum.peaks.charges(),
            ..Default::default()
        };

        if meta.ms_level == 1 {
            this.add_attribute(MS1_SPECTRUM);
        } else {
            this.add_attribute(MSN_SPECTRUM);
        }
        this.add_attribute(PROXIParam::new(SCAN_NUMBER, meta.scan_id as i64));
        this.add_attribute(PROXIParam::new(MS_LEVEL, meta.ms_level as i64));
        match meta.polarity {
            ScanPolarity::Positive => this.add_attribute(POSITIVE_SCAN),
            ScanPolarity::Negative => this.add_attribute(NEGATIVE_SCAN),
            ScanPolarity::Unknown => {}
        }
        if meta.is_centroided {
            this.add_attribute(CENTROID_SPECTRUM);
        } else {
            this.add_attribute(PROFILE_SPECTRUM);
        }
        this.add_attribute(PROXIParam::new(SCAN_START_TIME, meta.retention_time));

        if let Some(precursor) = &meta.precursor {
            if let Some(iw) = &precursor.isolation_window {
                this.add_attribute(PROXIParam::new(ISOLATION_TARGET, iw.target));
                this.add_attribute(PROXIParam::new(ISOLATION_LOWER, iw.lower_offset()));
                this.add_attribute(PROXIParam::new(ISOLATION_UPPER, iw.upper_offset()));
            }
            this.add_attribute(PROXIParam::new(SELECTED_ION_MZ, precursor.mz));
            if let Some(charge) = precursor.charge {
                this.add_attribute(PROXIParam::new(CHARGE_STATE, charge as i64));
            }
            if let Some(intensity) = precursor.intensity {
                this.add_attribute(PROXIParam::new(PEAK_INTENSITY, intensity));
            }
        }
        this
    }
}

/// Read each requested scan present in `source` in ascending scan order.
/// Requested scans the acquisition does not contain are skipped.
pub fn retrieve<S: AcquisitionSource + ?Sized>(
    source: &mut S,
    scans: &ScanSet,
) -> Result<Vec<PROXISpectrum>, SourceError> {
    let filters = FilterPipeline::default();
    let mut results = Vec::with_capacity(scans.len());
    for scan_id in scans.iter().copied() {
        if !source.contains(scan_id) {
            log::debug!("Scan {scan_id} is not in the acquisition, skipping it");
            continue;
        }
        let metadata = source.metadata(scan_id)?;
        let spectrum = transform(source, metadata, &filters)?;
        results.push(PROXISpectrum::from(&spectrum));
    }
    log::info!("Retrieved {} of {} requested scans", results.len(), scans.len());
    Ok(results)
}

pub fn write_json<W: Write>(spectra: &[PROXISpectrum], writer: W) -> serde_json::Result<()> {
    let mut writer = io::BufWriter::new(writer);
    serde_json::to_writer(&mut writer, spectra)?;
    writer.flush().map_err(serde_json::Error::io)
}

/// What to extract and where to put it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConfig {
    pub raw_path: PathBuf,
    /// The scan id specification, e.g. `1,5-7`
    pub scans: String,
    pub output_file: Option<PathBuf>,
    pub stdout: bool,
}

impl QueryConfig {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(raw_path: P, scans: S) -> Self {
        Self {
            raw_path: raw_path.into(),
            scans: scans.into(),
            ..Default::default()
        }
    }

    /**
    The JSON file the results are written to when not writing to standard
    output: the stem of the explicit output file, or of the raw file when none
    was given, with a `.JSON` extension, in that file's directory.
    */
    pub fn output_path(&self) -> PathBuf {
        let base: &Path = self.output_file.as_deref().unwrap_or(&self.raw_path);
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = format!("{stem}.JSON");
        match base.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/**
Run a query against an opened acquisition, writing the results to the
configured destination and returning them.

The scan specification is parsed before anything is read or written.
*/
pub fn run_query<S: AcquisitionSource + ?Sized>(
    config: &QueryConfig,
    source: &mut S,
) -> Result<Vec<PROXISpectrum>, crate::io::convert::ConversionError> {
    let scans = ScanSet::parse(&config.scans)?;
    let results = retrieve(source, &scans)?;
    if config.stdout {
        write_json(&results, io::stdout().lock())?;
    } else {
        let path = config.output_path();
        log::info!("Writing {} spectra to {}", results.len(), path.display());
        write_json(&results, fs::File::create(&path)?)?;
    }
    Ok(results)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::memory::test_fixtures::*;

    #[test_log::test]
    fn test_retrieve_skips_missing() -> Result<(), SourceError> {
        let mut source = numbered_acquisition(10);
        let scans = ScanSet::parse("1,5-7,12").unwrap();
        let results = retrieve(&mut source, &scans)?;
        let found: Vec<_> = results.iter().filter_map(|s| s.scan_number()).collect();
        assert_eq!(found, vec![1, 5, 6, 7]);
        assert_eq!(results[1].mzs, vec![105.0, 205.0]);
        Ok(())
    }

    #[test]
    fn test_attributes() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let results = retrieve(&mut source, &ScanSet::parse("1-2").unwrap())?;
        let ms1 = &results[0];
        assert!(ms1.attributes.iter().any(|p| p.name == "MS1 spectrum"));
        assert!(ms1.attributes.iter().any(|p| p.name == "centroid spectrum"));
        assert_eq!(ms1.charges, None);

        let msn = &results[1];
        let charge = msn
            .attributes
            .iter()
            .find(|p| p.accession == "MS:1000041")
            .unwrap();
        assert_eq!(charge.value, PROXIValue::Int(2));
        assert!(msn.attributes.iter().any(|p| p.accession == "MS:1000827"));
        assert!(msn.charges.is_some());
        Ok(())
    }

    #[test]
    fn test_json_shape() {
        let mut source = numbered_acquisition(2);
        let results = retrieve(&mut source, &ScanSet::parse("2").unwrap()).unwrap();
        let mut buffer = Vec::new();
        write_json(&results, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("[{\"status\":\"READABLE\",\"attributes\":["));
        assert!(text.contains(r#"{"accession":"MS:1003057","name":"scan number","value":2}"#));
        assert!(text.contains(r#"{"accession":"MS:1000579","name":"MS1 spectrum"}"#));
        let dup: Vec<PROXISpectrum> = serde_json::from_str(&text).unwrap();
        assert_eq!(dup, results);
    }

    #[test]
    fn test_output_path() {
        let mut config = QueryConfig::new("/data/run01.raw", "1");
        assert_eq!(config.output_path(), PathBuf::from("/data/run01.JSON"));
        config.output_file = Some(PathBuf::from("/tmp/out/results.json"));
        assert_eq!(config.output_path(), PathBuf::from("/tmp/out/results.JSON"));
    }

    #[test]
    fn test_run_query_to_file() -> Result<(), crate::io::convert::ConversionError> {
        let dir = tempfile::tempdir()?;
        let mut config = QueryConfig::new(dir.path().join("numbered.raw"), "3-4");
        let mut source = numbered_acquisition(5);
        let results = run_query(&config, &mut source)?;
        assert_eq!(results.len(), 2);
        let written: Vec<PROXISpectrum> =
            serde_json::from_reader(fs::File::open(dir.path().join("numbered.JSON"))?)?;
        assert_eq!(written, results);

        config.scans = "3;4".to_string();
        assert!(matches!(
            run_query(&config, &mut source),
            Err(crate::io::convert::ConversionError::InvalidScanSpecification(_))
        ));
        Ok(())
    }
}
