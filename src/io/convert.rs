/*!
The conversion driver: select scans from an [`AcquisitionSource`], transform
them, and serialize them to MGF or (indexed) mzML, optionally gzip compressed.

A run either writes a complete document or fails. When writing to a file, a
failed run removes whatever part of the file had been written.
*/
use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::sync_channel;
use std::thread;

use thiserror::Error;

use crate::io::compression::{is_gzipped_extension, OutputSink};
use crate::io::mgf::MGFWriter;
use crate::io::mzml::MzMLWriterType;
use crate::io::traits::{AcquisitionSource, SourceError, SpectrumWriter};
use crate::selection::{FilterConfig, FilterPipeline, ScanSetError};
use crate::spectrum::{BinaryCompressionType, Chromatogram, SpectrumMetadata};
use crate::transform::{select, should_centroid, SpectrumStream};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Invalid scan specification: {0}")]
    InvalidScanSpecification(#[from] ScanSetError),
    #[error("{0}")]
    SourceReadFailure(#[from] SourceError),
    #[error("Failed to write output: {0}")]
    WriteFailure(#[from] io::Error),
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    MGF,
    MzML,
    #[default]
    IndexedMzML,
}

impl OutputFormat {
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::MGF => "mgf",
            Self::MzML | Self::IndexedMzML => "mzML",
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Where the converted document goes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Exactly this file, after the extension rules of [`output_file_name`]
    File(PathBuf),
    /// A file in this directory named after the acquisition
    Directory(PathBuf),
    #[default]
    Stdout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    pub format: OutputFormat,
    pub gzip: bool,
    pub output: OutputTarget,
    pub filters: FilterConfig,
    /// The compression applied to mzML binary data arrays
    pub data_compression: BinaryCompressionType,
    /// How many transformed spectra may wait for the writer thread. With `0`
    /// everything happens on the calling thread.
    pub read_ahead: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::IndexedMzML,
            gzip: false,
            output: OutputTarget::Stdout,
            filters: FilterConfig::default(),
            data_compression: BinaryCompressionType::Zlib,
            read_ahead: 0,
        }
    }
}

impl ConversionConfig {
    pub fn new(format: OutputFormat, output: OutputTarget) -> Self {
        Self {
            format,
            output,
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_read_ahead(mut self, read_ahead: usize) -> Self {
        self.read_ahead = read_ahead;
        self
    }

    /// Reject configurations that can never produce a valid document.
    pub fn validate(&self) -> Result<(), ConversionError> {
        self.filters
            .validate()
            .map_err(ConversionError::UnsupportedConfiguration)?;
        if self.gzip && self.output == OutputTarget::Stdout {
            return Err(ConversionError::UnsupportedConfiguration(
                "gzip compression requires writing to a file".to_string(),
            ));
        }
        Ok(())
    }

    /// The file this configuration writes to for an acquisition named
    /// `source_name`, or `None` for standard output
    pub fn output_path(&self, source_name: &str) -> Option<PathBuf> {
        match &self.output {
            OutputTarget::File(path) => Some(output_file_name(path, self.format, self.gzip)),
            OutputTarget::Directory(dir) => Some(output_in_directory(
                dir,
                Path::new(source_name),
                self.format,
                self.gzip,
            )),
            OutputTarget::Stdout => None,
        }
    }
}

/**
Normalize an explicitly requested output file name.

A trailing `.gz` is removed, the format's extension is appended unless the
name already ends with it (ignoring case), and `.gz` is put back when
compressing.
*/
pub fn output_file_name(path: &Path, format: OutputFormat, gzip: bool) -> PathBuf {
    let (_, path) = is_gzipped_extension(path.to_path_buf());
    let extension = format.extension();
    let has_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or_default();
    let mut name: OsString = path.into_os_string();
    if !has_extension {
        name.push(".");
        name.push(extension);
    }
    if gzip {
        name.push(".gz");
    }
    PathBuf::from(name)
}

/// The output file for `input` inside `dir`: the input's stem with the format's extension
pub fn output_in_directory(dir: &Path, input: &Path, format: OutputFormat, gzip: bool) -> PathBuf {
    let mut name: OsString = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".");
    name.push(format.extension());
    if gzip {
        name.push(".gz");
    }
    dir.join(name)
}

/// What a finished conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    /// The number of scans that passed the filters
    pub spectra_selected: usize,
    /// The number of spectra the format actually stored
    pub spectra_written: usize,
    pub output: Option<PathBuf>,
}

/// Run a whole conversion of `source` according to `config`.
pub fn convert<S: AcquisitionSource + ?Sized>(
    source: &mut S,
    config: &ConversionConfig,
) -> Result<ConversionSummary, ConversionError> {
    config.validate()?;
    let filters = config.filters.build();
    let selected = select(source, &filters)?;
    let spectra_selected = selected.len();
    let output = config.output_path(&source.description().source_name);

    let spectra_written = match &output {
        Some(path) => {
            log::info!("Writing {} to {}", config.format, path.display());
            let result = OutputSink::create(path, config.gzip)
                .map_err(ConversionError::from)
                .and_then(|sink| write_document(source, config, &filters, selected, sink))
                .and_then(|(written, sink)| {
                    sink.finish()?;
                    Ok(written)
                });
            if result.is_err() && path.exists() {
                log::warn!("Removing partially written file {}", path.display());
                if let Err(e) = fs::remove_file(path) {
                    log::error!("Failed to remove {}: {e}", path.display());
                }
            }
            result?
        }
        None => {
            let (written, sink) =
                write_document(source, config, &filters, selected, OutputSink::stdout())?;
            sink.finish()?;
            written
        }
    };

    log::info!("Wrote {spectra_written} of {spectra_selected} selected spectra");
    Ok(ConversionSummary {
        spectra_selected,
        spectra_written,
        output,
    })
}

/**
Convert every file directly inside `dir` whose extension is one of
`extensions` (ignoring case), in file name order, into the configured output
directory. `open` turns each path into an acquisition.

Stops at the first failure.
*/
pub fn convert_directory<S, F>(
    dir: &Path,
    extensions: &[&str],
    config: &ConversionConfig,
    mut open: F,
) -> Result<Vec<ConversionSummary>, ConversionError>
where
    S: AcquisitionSource,
    F: FnMut(&Path) -> Result<S, ConversionError>,
{
    if !matches!(config.output, OutputTarget::Directory(_)) {
        return Err(ConversionError::UnsupportedConfiguration(
            "converting a directory of inputs requires an output directory".to_string(),
        ));
    }
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let accepted = path.is_file()
            && path
                .extension()
                .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                .unwrap_or_default();
        if accepted {
            inputs.push(path);
        }
    }
    inputs.sort();
    log::info!("Found {} inputs in {}", inputs.len(), dir.display());

    let mut summaries = Vec::with_capacity(inputs.len());
    for path in inputs {
        let mut source = open(&path)?;
        summaries.push(convert(&mut source, config)?);
    }
    Ok(summaries)
}

/// Serialize the selected spectra into `sink` in the configured format,
/// handing the sink back once the document is complete
fn write_document<S: AcquisitionSource + ?Sized, W: Write + Send>(
    source: &mut S,
    config: &ConversionConfig,
    filters: &FilterPipeline,
    selected: Vec<SpectrumMetadata>,
    sink: W,
) -> Result<(usize, W), ConversionError> {
    let description = source.description();
    match config.format {
        OutputFormat::MGF => {
            let mut writer = MGFWriter::new(sink)
                .with_source_name(description.source_name.as_str())
                .with_native_id_format(description.native_id_format);
            let written = write_spectra(source, filters, selected, None, &mut writer, config.read_ahead)?;
            let sink = writer.into_inner().into_inner().map_err(|e| e.into_error())?;
            Ok((written, sink))
        }
        OutputFormat::MzML | OutputFormat::IndexedMzML => {
            let chromatogram = source.chromatogram()?;
            let mut writer =
                MzMLWriterType::new_with_index(sink, config.format == OutputFormat::IndexedMzML)
                    .with_description(description);
            writer.data_array_compression = config.data_compression;
            writer.peak_picking_applied = selected.iter().any(|m| should_centroid(m, filters));
            writer.file_contents = (
                selected.iter().any(|m| m.ms_level == 1),
                selected.iter().any(|m| m.ms_level > 1),
            );
            let written = write_spectra(
                source,
                filters,
                selected,
                Some(chromatogram),
                &mut writer,
                config.read_ahead,
            )?;
            let sink = writer.into_inner().map_err(io::Error::from)?;
            Ok((written, sink))
        }
    }
}

/**
Stream every selected spectrum into `writer` in order, followed by the
chromatogram if there is one, and close the writer.

With a non-zero `read_ahead`, the writer runs on its own thread and up to
that many spectra may be waiting for it. The source is only ever read from
the calling thread.
*/
fn write_spectra<S: AcquisitionSource + ?Sized, W: SpectrumWriter + Send>(
    source: &mut S,
    filters: &FilterPipeline,
    selected: Vec<SpectrumMetadata>,
    chromatogram: Option<Chromatogram>,
    writer: &mut W,
    read_ahead: usize,
) -> Result<usize, ConversionError> {
    writer.set_spectrum_count(selected.len() as u64);
    writer.set_chromatogram_count(chromatogram.is_some() as u64);
    let stream = SpectrumStream::new(source, filters, selected);

    let written = if read_ahead == 0 {
        let mut written = 0;
        for spectrum in stream {
            written += writer.write(&spectrum?)?;
        }
        written
    } else {
        let (send, recv) = sync_channel(read_ahead);
        let thread_writer = &mut *writer;
        thread::scope(|scope| -> Result<usize, ConversionError> {
            let writer_handle = scope.spawn(move || -> io::Result<usize> {
                let mut written = 0;
                for spectrum in recv.iter() {
                    written += thread_writer.write(&spectrum)?;
                }
                Ok(written)
            });

            let mut read_result = Ok(());
            for spectrum in stream {
                match spectrum {
                    Ok(spectrum) => {
                        // The writer hung up, so it failed and its error is reported below
                        if send.send(spectrum).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        read_result = Err(e);
                        break;
                    }
                }
            }
            drop(send);

            let written = writer_handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "The writer thread panicked"))?;
            read_result?;
            Ok(written?)
        })?
    };

    if let Some(chromatogram) = chromatogram {
        writer.write_chromatogram(&chromatogram)?;
    }
    writer.close()?;
    Ok(written)
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::io::memory::test_fixtures::*;
    use crate::io::memory::MemoryAcquisition;
    use crate::io::traits::{AcquisitionDescription, PeakMode};
    use crate::selection::ScanSet;
    use crate::spectrum::{Peak, ScanId};

    fn read_text(path: &Path) -> io::Result<String> {
        let mut text = String::new();
        fs::File::open(path)?.read_to_string(&mut text)?;
        Ok(text)
    }

    fn offsets_of(document: &str) -> Vec<(String, usize)> {
        document
            .split("<offset idRef=\"")
            .skip(1)
            .map(|chunk| {
                let (id_ref, rest) = chunk.split_once('"').unwrap();
                let start = rest.find('>').unwrap() + 1;
                let end = rest.find("</offset>").unwrap();
                (id_ref.to_string(), rest[start..end].parse().unwrap())
            })
            .collect()
    }

    #[test_log::test]
    fn test_mgf_conversion() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let config = ConversionConfig::new(OutputFormat::MGF, OutputTarget::Directory(dir.path().into()));
        let mut source = small_acquisition();
        let summary = convert(&mut source, &config)?;
        assert_eq!(summary.spectra_selected, FIXTURE_SCAN_COUNT);
        assert_eq!(summary.spectra_written, FIXTURE_MSN_COUNT);

        let path = summary.output.unwrap();
        assert_eq!(path, dir.path().join("small.mgf"));
        let text = read_text(&path)?;
        assert_eq!(text.matches("BEGIN IONS").count(), FIXTURE_MSN_COUNT);
        assert_eq!(text.matches("END IONS").count(), FIXTURE_MSN_COUNT);
        Ok(())
    }

    #[test_log::test]
    fn test_ms1_filtered_indexed_mzml() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let config = ConversionConfig::new(
            OutputFormat::IndexedMzML,
            OutputTarget::File(dir.path().join("ms1")),
        )
        .with_filters(FilterConfig::new().with_ms_levels([1]));
        let mut source = small_acquisition();
        let summary = convert(&mut source, &config)?;
        assert_eq!(summary.spectra_written, FIXTURE_MS1_COUNT);

        let path = summary.output.unwrap();
        assert_eq!(path, dir.path().join("ms1.mzML"));
        let text = read_text(&path)?;
        assert!(text.contains(&format!("<spectrumList count=\"{FIXTURE_MS1_COUNT}\"")));
        assert!(text.contains("<chromatogramList count=\"1\""));
        assert!(text.contains(&format!("defaultArrayLength=\"{FIXTURE_SCAN_COUNT}\"")));
        Ok(())
    }

    #[test_log::test]
    fn test_gzip_offsets_refer_to_uncompressed_document() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let config = ConversionConfig::new(
            OutputFormat::IndexedMzML,
            OutputTarget::File(dir.path().join("small.mzML.gz")),
        )
        .with_gzip(true);
        let mut source = small_acquisition();
        let summary = convert(&mut source, &config)?;
        let path = summary.output.unwrap();
        assert_eq!(path, dir.path().join("small.mzML.gz"));

        let mut document = String::new();
        GzDecoder::new(fs::File::open(&path)?).read_to_string(&mut document)?;

        let offsets = offsets_of(&document);
        assert_eq!(offsets.len(), FIXTURE_SCAN_COUNT + 1);
        for (id_ref, offset) in offsets {
            let tail = &document[offset..];
            assert!(
                tail.starts_with("<spectrum ") || tail.starts_with("<chromatogram "),
                "{id_ref} points at {}",
                &tail[..20.min(tail.len())]
            );
            let start_tag = &tail[..tail.find('>').unwrap()];
            assert!(start_tag.contains(&format!("id=\"{id_ref}\"")));
        }

        let (_, rest) = document.split_once("<indexListOffset>").unwrap();
        let (offset, _) = rest.split_once('<').unwrap();
        let offset: usize = offset.parse().unwrap();
        assert!(document[offset..].starts_with("<indexList "));
        Ok(())
    }

    #[test]
    fn test_read_ahead_is_identical() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let sequential = ConversionConfig::new(
            OutputFormat::IndexedMzML,
            OutputTarget::File(dir.path().join("sequential.mzML")),
        );
        let threaded = ConversionConfig::new(
            OutputFormat::IndexedMzML,
            OutputTarget::File(dir.path().join("threaded.mzML")),
        )
        .with_read_ahead(4);

        let a = convert(&mut small_acquisition(), &sequential)?;
        let b = convert(&mut small_acquisition(), &threaded)?;
        assert_eq!(a.spectra_written, b.spectra_written);
        assert_eq!(
            fs::read(a.output.unwrap())?,
            fs::read(b.output.unwrap())?
        );
        Ok(())
    }

    #[test]
    fn test_profile_override_keeps_profile() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let config = ConversionConfig::new(
            OutputFormat::MzML,
            OutputTarget::File(dir.path().join("profile.mzML")),
        )
        .with_filters(
            FilterConfig::new()
                .with_scans(ScanSet::parse("1").unwrap())
                .with_no_peak_picking_scans(ScanSet::parse("1").unwrap()),
        );
        let summary = convert(&mut small_acquisition(), &config)?;
        let text = read_text(&summary.output.unwrap())?;
        assert!(text.contains("name=\"profile spectrum\""));
        assert!(!text.contains("<indexedmzML"));
        Ok(())
    }

    fn mgf_peak_lines(text: &str) -> usize {
        text.lines()
            .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
            .count()
    }

    #[test_log::test]
    fn test_mgf_keeps_profile_when_requested() -> Result<(), ConversionError> {
        let dir = tempfile::tempdir()?;
        let mut source = small_acquisition();
        let profile = source.scans[0].peaks.clone();
        source.scans[1].metadata.is_centroided = false;
        source.scans[1].peaks = profile.clone();

        let picked = ConversionConfig::new(
            OutputFormat::MGF,
            OutputTarget::File(dir.path().join("picked.mgf")),
        )
        .with_filters(FilterConfig::new().with_scans(ScanSet::parse("2-3").unwrap()));
        let summary = convert(&mut source.clone(), &picked)?;
        let text = read_text(&summary.output.unwrap())?;
        assert_eq!(mgf_peak_lines(&text), 3 + 25);

        let kept = picked
            .clone()
            .with_filters(
                FilterConfig::new()
                    .with_scans(ScanSet::parse("2-3").unwrap())
                    .with_no_peak_picking_scans(ScanSet::parse("2-3").unwrap()),
            );
        let summary = convert(&mut source, &kept)?;
        assert_eq!(summary.spectra_written, 2);
        let text = read_text(&summary.output.unwrap())?;
        assert_eq!(mgf_peak_lines(&text), profile.len() + 25);
        Ok(())
    }

    /// Fails once the scan past `fail_at` is read
    struct FailingAcquisition {
        inner: MemoryAcquisition,
        fail_at: ScanId,
    }

    impl AcquisitionSource for FailingAcquisition {
        fn scan_count(&self) -> usize {
            self.inner.scan_count()
        }

        fn description(&self) -> AcquisitionDescription {
            self.inner.description()
        }

        fn metadata(&mut self, scan_id: ScanId) -> Result<SpectrumMetadata, SourceError> {
            self.inner.metadata(scan_id)
        }

        fn peaks(&mut self, scan_id: ScanId, mode: PeakMode) -> Result<Vec<Peak>, SourceError> {
            if scan_id > self.fail_at {
                Err(SourceError::SourceReadFailure(format!("scan {scan_id} is corrupt")))
            } else {
                self.inner.peaks(scan_id, mode)
            }
        }

        fn chromatogram(&mut self) -> Result<Chromatogram, SourceError> {
            self.inner.chromatogram()
        }
    }

    #[test_log::test]
    fn test_failure_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        for read_ahead in [0, 2] {
            let config = ConversionConfig::new(
                OutputFormat::IndexedMzML,
                OutputTarget::File(dir.path().join("broken.mzML")),
            )
            .with_read_ahead(read_ahead);
            let mut source = FailingAcquisition {
                inner: small_acquisition(),
                fail_at: 20,
            };
            let result = convert(&mut source, &config);
            assert!(matches!(result, Err(ConversionError::SourceReadFailure(_))));
            assert!(!dir.path().join("broken.mzML").exists());
        }
    }

    #[test_log::test]
    fn test_convert_directory() -> Result<(), ConversionError> {
        let input_dir = tempfile::tempdir()?;
        let output_dir = tempfile::tempdir()?;
        for name in ["small1.json", "small2.JSON"] {
            small_acquisition().to_writer(fs::File::create(input_dir.path().join(name))?)?;
        }
        fs::write(input_dir.path().join("notes.txt"), "not an acquisition")?;

        let config = ConversionConfig::new(
            OutputFormat::MGF,
            OutputTarget::Directory(output_dir.path().into()),
        );
        let summaries = convert_directory(input_dir.path(), &["json"], &config, |path| {
            Ok(MemoryAcquisition::open_path(path)?)
        })?;
        assert_eq!(summaries.len(), 2);
        for (summary, name) in summaries.iter().zip(["small1.mgf", "small2.mgf"]) {
            assert_eq!(summary.output.as_deref(), Some(output_dir.path().join(name).as_path()));
            let text = read_text(&output_dir.path().join(name))?;
            assert_eq!(text.matches("BEGIN IONS").count(), FIXTURE_MSN_COUNT);
        }

        let config = ConversionConfig::new(OutputFormat::MGF, OutputTarget::Stdout);
        assert!(matches!(
            convert_directory(input_dir.path(), &["json"], &config, |path| {
                Ok(MemoryAcquisition::open_path(path)?)
            }),
            Err(ConversionError::UnsupportedConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validation() {
        let config = ConversionConfig::new(OutputFormat::MGF, OutputTarget::Stdout).with_filters(
            FilterConfig::new().with_no_peak_picking_levels([2]),
        );
        assert!(config.validate().is_ok());

        let config = ConversionConfig::new(OutputFormat::MzML, OutputTarget::Stdout)
            .with_filters(FilterConfig::new().with_ms_levels([]));
        assert!(matches!(
            config.validate(),
            Err(ConversionError::UnsupportedConfiguration(_))
        ));

        let config = ConversionConfig::new(OutputFormat::MzML, OutputTarget::Stdout).with_gzip(true);
        assert!(config.validate().is_err());

        let config = ConversionConfig::new(OutputFormat::MzML, OutputTarget::Stdout)
            .with_filters(FilterConfig::new().with_no_peak_picking_levels([1]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_file_names() {
        let name = |p: &str, format, gzip| output_file_name(Path::new(p), format, gzip);
        assert_eq!(name("out/run", OutputFormat::MzML, false), PathBuf::from("out/run.mzML"));
        assert_eq!(name("out/run.MZML", OutputFormat::MzML, false), PathBuf::from("out/run.MZML"));
        assert_eq!(name("out/run.mzML.gz", OutputFormat::MzML, false), PathBuf::from("out/run.mzML"));
        assert_eq!(name("out/run.mzML", OutputFormat::IndexedMzML, true), PathBuf::from("out/run.mzML.gz"));
        assert_eq!(name("out/run.txt", OutputFormat::MGF, false), PathBuf::from("out/run.txt.mgf"));

        assert_eq!(
            output_in_directory(Path::new("out"), Path::new("data/run01.raw"), OutputFormat::MGF, true),
            PathBuf::from("out/run01.mgf.gz")
        );
    }
}
