use std::io::{self, prelude::*, BufWriter};

use crate::io::traits::SpectrumWriter;
use crate::spectrum::{Chromatogram, NativeIdFormat, Precursor, Spectrum};

const BUFFER_SIZE: usize = 1 << 14;

/**
Writes centroided MSn spectra as MGF `BEGIN IONS`/`END IONS` blocks.

MS1 spectra are skipped. Each block is written completely before the call
returns, so nothing beyond the current spectrum is ever buffered in memory.
*/
pub struct MGFWriter<W: io::Write> {
    pub handle: BufWriter<W>,
    run_id: Option<String>,
    source_name: Option<String>,
    native_id_format: NativeIdFormat,
    spectra_written: usize,
}

impl<W: io::Write> MGFWriter<W> {
    pub fn new(file: W) -> MGFWriter<W> {
        MGFWriter {
            handle: BufWriter::with_capacity(BUFFER_SIZE, file),
            run_id: None,
            source_name: None,
            native_id_format: NativeIdFormat::default(),
            spectra_written: 0,
        }
    }

    /// Name spectra after the source file in their titles
    pub fn with_source_name<S: Into<String>>(mut self, source_name: S) -> Self {
        let source_name: String = source_name.into();
        let run_id = match source_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => source_name.clone(),
        };
        self.run_id = Some(run_id);
        self.source_name = Some(source_name);
        self
    }

    pub fn with_native_id_format(mut self, native_id_format: NativeIdFormat) -> Self {
        self.native_id_format = native_id_format;
        self
    }

    pub fn spectra_written(&self) -> usize {
        self.spectra_written
    }

    pub fn into_inner(self) -> BufWriter<W> {
        self.handle
    }

    /// Format a spectrum title in the style of the Trans-Proteomic Pipeline
    pub fn make_title(&self, spectrum: &Spectrum) -> String {
        let idx = spectrum.scan_id();
        let charge = spectrum
            .precursor()
            .and_then(|p| p.charge)
            .unwrap_or_default();
        let run_id = self.run_id.as_deref().unwrap_or("run");
        let id = self.native_id_format.native_id(idx);
        match &self.source_name {
            Some(source_name) => format!(
                "{run_id}.{idx}.{idx}.{charge} SourceFile:\"{source_name}\", NativeID:\"{id}\""
            ),
            None => format!("{run_id}.{idx}.{idx}.{charge} NativeID:\"{id}\""),
        }
    }

    /// Write a spectrum header `KEY=value`
    pub fn write_kv(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.handle.write_all(key.as_bytes())?;
        self.handle.write_all(b"=")?;
        self.handle.write_all(value.as_bytes())?;
        self.handle.write_all(b"\n")?;
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> io::Result<()> {
        self.handle.write_all(b"PEPMASS=")?;
        self.handle.write_all(precursor.mz.to_string().as_bytes())?;
        if let Some(intensity) = precursor.intensity {
            self.handle.write_all(b" ")?;
            self.handle.write_all(intensity.to_string().as_bytes())?;
        }
        self.handle.write_all(b"\n")?;
        if let Some(charge) = precursor.charge {
            let sign = if charge < 0 { '-' } else { '+' };
            self.write_kv("CHARGE", &format!("{}{sign}", charge.abs()))?;
        }
        if let Some(parent) = precursor.parent_scan {
            self.write_kv("PRECURSORSCAN", &parent.to_string())?;
        }
        Ok(())
    }

    /// Write the header of a spectrum, everything after `BEGIN IONS` and
    /// before the peak list.
    pub fn write_header(&mut self, spectrum: &Spectrum) -> io::Result<()> {
        let title = self.make_title(spectrum);
        self.write_kv("TITLE", &title)?;
        self.write_kv("RTINSECONDS", &spectrum.metadata.retention_time.to_string())?;
        if let Some(precursor) = spectrum.precursor() {
            self.write_precursor(precursor)?;
        }
        self.write_kv("SCANS", &spectrum.scan_id().to_string())?;
        Ok(())
    }

    /// Write the peak list of a spectrum, everything until `END IONS`
    pub fn write_peaks(&mut self, spectrum: &Spectrum) -> io::Result<()> {
        if spectrum.peaks.is_empty() {
            log::warn!(
                "Writing scan {} to MGF without any peaks",
                spectrum.scan_id()
            );
        }
        for peak in spectrum.peaks.iter() {
            self.handle.write_all(peak.mz.to_string().as_bytes())?;
            self.handle.write_all(b" ")?;
            self.handle.write_all(peak.intensity.to_string().as_bytes())?;
            if let Some(charge) = peak.charge {
                self.handle.write_all(b" ")?;
                self.handle.write_all(charge.to_string().as_bytes())?;
            }
            self.handle.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Write a spectrum from start to finish. Spectra where `ms_level() == 1` are skipped.
    pub fn write_spectrum(&mut self, spectrum: &Spectrum) -> io::Result<usize> {
        if spectrum.ms_level() < 2 {
            log::trace!("Skipping writing MS1 spectrum {} to MGF", spectrum.scan_id());
            return Ok(0);
        }
        self.handle.write_all(b"BEGIN IONS\n")?;
        self.write_header(spectrum)?;
        self.write_peaks(spectrum)?;
        self.handle.write_all(b"END IONS\n")?;
        self.spectra_written += 1;
        Ok(1)
    }
}

impl<W: io::Write> SpectrumWriter for MGFWriter<W> {
    fn write(&mut self, spectrum: &Spectrum) -> io::Result<usize> {
        self.write_spectrum(spectrum)
    }

    fn write_chromatogram(&mut self, _chromatogram: &Chromatogram) -> io::Result<usize> {
        Ok(0)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.handle.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::memory::test_fixtures::*;
    use crate::io::traits::AcquisitionSource;
    use crate::selection::FilterConfig;
    use crate::spectrum::{Peak, PeakList, SpectrumMetadata};
    use crate::transform::{select, SpectrumStream};

    #[test_log::test]
    fn test_write_fixture() -> io::Result<()> {
        let mut source = small_acquisition();
        let filters = FilterConfig::new().build();
        let selected = select(&mut source, &filters).map_err(io::Error::other)?;
        let mut writer = MGFWriter::new(Vec::new())
            .with_source_name(source.description().source_name);
        for spectrum in SpectrumStream::new(&mut source, &filters, selected) {
            writer.write(&spectrum.map_err(io::Error::other)?)?;
        }
        writer.close()?;
        assert_eq!(writer.spectra_written(), FIXTURE_MSN_COUNT);

        let buffer = writer.into_inner().into_inner().map_err(|e| e.into_error())?;
        let text = String::from_utf8_lossy(&buffer);
        assert_eq!(text.matches("BEGIN IONS").count(), FIXTURE_MSN_COUNT);
        assert_eq!(text.matches("END IONS").count(), FIXTURE_MSN_COUNT);
        assert!(text.starts_with("BEGIN IONS\nTITLE=small.2.2.2 SourceFile:\"small.RAW\""));
        assert!(text.contains("CHARGE=2+\n"));
        assert!(text.contains("PRECURSORSCAN=1\n"));
        assert!(text.contains("SCANS=2\n"));
        Ok(())
    }

    #[test]
    fn test_writes_profile_points() -> io::Result<()> {
        let meta = SpectrumMetadata::new(3, 2, 10.0, false);
        let points: Vec<Peak> = (0..5).map(|i| Peak::new(100.0 + i as f64 * 0.5, 1.0 + i as f64)).collect();
        let spectrum = Spectrum::new(meta, PeakList::new(points));
        let mut writer = MGFWriter::new(Vec::new());
        assert_eq!(writer.write(&spectrum)?, 1);
        writer.flush()?;
        let text = String::from_utf8_lossy(writer.handle.get_ref()).to_string();
        assert!(text.contains("SCANS=3\n100 1\n100.5 2\n101 3\n101.5 4\n102 5\nEND IONS\n"), "{text}");
        Ok(())
    }

    #[test]
    fn test_header_without_precursor_details() -> io::Result<()> {
        let meta = SpectrumMetadata::new(7, 2, 12.5, true)
            .with_precursor(crate::spectrum::Precursor::new(500.25).with_charge(-3));
        let spectrum = Spectrum::new(meta, PeakList::new(vec![Peak::new(150.5, 20.0).with_charge(1)]));
        let mut writer = MGFWriter::new(Vec::new()).with_native_id_format(NativeIdFormat::ScanNumberOnly);
        writer.write(&spectrum)?;
        writer.flush()?;
        let text = String::from_utf8_lossy(writer.handle.get_ref()).to_string();
        assert_eq!(
            text,
            "BEGIN IONS\nTITLE=run.7.7.-3 NativeID:\"scan=7\"\nRTINSECONDS=12.5\nPEPMASS=500.25\nCHARGE=3-\nSCANS=7\n150.5 20 1\nEND IONS\n"
        );
        Ok(())
    }
}
