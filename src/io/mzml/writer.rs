use std::fmt::Debug;
use std::io::{self, BufWriter, Write};

use log::warn;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;

use crate::io::offset_index::{ElementType, OffsetIndex};
use crate::io::traits::{AcquisitionDescription, SpectrumWriter};
use crate::io::utils::ChecksumStream;
use crate::params::{ControlledVocabulary, ParamCow, ParamLike, Unit};
use crate::spectrum::{
    encode_array, Activation, BinaryCompressionType, BinaryDataArrayType, Chromatogram,
    ChromatogramType, IsolationWindow, Precursor, ScanPolarity, Spectrum,
};

const BUFFER_SIZE: usize = 10000;

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value: &str = $value.as_ref();
        $elt.push_attribute(($name, value));
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

const INSTRUMENT_CONFIGURATION_ID: &str = "IC1";
const SOURCE_FILE_ID: &str = "RAW1";
const SOFTWARE_ID: &str = "mzexport";
const DATA_PROCESSING_ID: &str = "mzexport_processing";

const MS1_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("MS1 spectrum", 1000579);
const MSN_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("MSn spectrum", 1000580);
const NEGATIVE_SCAN: ParamCow = ControlledVocabulary::MS.const_param_ident("negative scan", 1000129);
const POSITIVE_SCAN: ParamCow = ControlledVocabulary::MS.const_param_ident("positive scan", 1000130);
const PROFILE_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("profile spectrum", 1000128);
const CENTROID_SPECTRUM: ParamCow = ControlledVocabulary::MS.const_param_ident("centroid spectrum", 1000127);
const NO_COMBINATION: ParamCow = ControlledVocabulary::MS.const_param_ident("no combination", 1000795);
const TIC_CHROMATOGRAM: ParamCow =
    ControlledVocabulary::MS.const_param_ident("total ion current chromatogram", 1000235);
const BPC_CHROMATOGRAM: ParamCow =
    ControlledVocabulary::MS.const_param_ident("basepeak chromatogram", 1000628);
const THERMO_RAW_FORMAT: ParamCow = ControlledVocabulary::MS.const_param_ident("Thermo RAW format", 1000563);
const THERMO_INSTRUMENT_MODEL: ParamCow =
    ControlledVocabulary::MS.const_param_ident("Thermo Fisher Scientific instrument model", 1000483);
const INSTRUMENT_MODEL: ParamCow = ControlledVocabulary::MS.const_param_ident("instrument model", 1000031);
const CONVERSION_TO_MZML: ParamCow = ControlledVocabulary::MS.const_param_ident("Conversion to mzML", 1000544);
const PEAK_PICKING: ParamCow = ControlledVocabulary::MS.const_param_ident("peak picking", 1000035);

const MZ_ARRAY: ParamCow = ControlledVocabulary::MS.const_param_ident("m/z array", 1000514);
const INTENSITY_ARRAY: ParamCow = ControlledVocabulary::MS.const_param_ident("intensity array", 1000515);
const CHARGE_ARRAY: ParamCow = ControlledVocabulary::MS.const_param_ident("charge array", 1000516);
const TIME_ARRAY: ParamCow = ControlledVocabulary::MS.const_param_ident("time array", 1000595);

fn with_unit(mut param: ParamCow<'static>, unit: Unit) -> ParamCow<'static> {
    param.unit = unit;
    param
}

#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error occurred: {0}")]
    XMLError(#[from] XMLError),
    #[error("Cannot transition the writer from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: MzMLWriterState,
        to_state: MzMLWriterState,
    },
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
    #[error("The writer cannot do that while in state {0:?}")]
    InvalidActionError(MzMLWriterState),
    #[error("The document declared {expected} {element} elements but {written} were written")]
    CountMismatch {
        element: ElementType,
        expected: u64,
        written: u64,
    },
    #[error("The writer has already failed and cannot write anything further")]
    Failed,
}

impl From<MzMLWriterError> for io::Error {
    fn from(value: MzMLWriterError) -> Self {
        match value {
            MzMLWriterError::IOError(e) => e,
            err => io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
        }
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

struct InnerXMLWriter<W: io::Write> {
    pub handle: Writer<ChecksumStream<BufWriter<W>>>,
}

impl<W: Write> Debug for InnerXMLWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerXMLWriter")
            .field("handle", &"...")
            .finish()
    }
}

impl<W: io::Write> InnerXMLWriter<W> {
    const INDENT_SIZE: u64 = 2;

    pub fn new(file: W) -> InnerXMLWriter<W> {
        let handle = ChecksumStream::new(BufWriter::with_capacity(BUFFER_SIZE, file));
        Self {
            handle: Writer::new_with_indent(handle, b' ', Self::INDENT_SIZE as usize),
        }
    }

    pub fn digest(&self) -> String {
        self.handle.get_ref().compute()
    }

    /// The number of bytes written so far
    pub fn position(&self) -> u64 {
        self.handle.get_ref().bytes_written()
    }

    /// Where the next start tag at `depth` will begin, accounting for the
    /// line break and indentation written ahead of it
    pub fn next_tag_position(&self, depth: u64) -> u64 {
        self.position() + 1 + depth * Self::INDENT_SIZE
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.get_mut().flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
    }

    pub fn write_param<P: ParamLike>(&mut self, param: &P) -> WriterResult {
        let mut elt = match param.curie() {
            Some(accession) => {
                let mut elt = bstart!("cvParam");
                if let Some(cv_ref) = param.controlled_vocabulary() {
                    attrib!("cvRef", cv_ref.prefix(), elt);
                }
                attrib!("accession", accession, elt);
                elt
            }
            None => bstart!("userParam"),
        };

        attrib!("name", param.name(), elt);
        attrib!("value", param.value(), elt);
        match param.unit() {
            Unit::Unknown => {}
            unit => {
                let (unit_acc, unit_name) = unit.for_param();
                let prefix = unit_acc.split(':').next().unwrap_or("UO");
                attrib!("unitCvRef", prefix, elt);
                attrib!("unitAccession", unit_acc, elt);
                attrib!("unitName", unit_name, elt);
            }
        }
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    pub fn write_event(&mut self, event: Event) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }

    pub fn write_text(&mut self, text: &str) -> WriterResult {
        self.handle.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }
}

/**
The different states that [`MzMLWriterType`] can enter while
writing an mzML document. This is only necessary for the module
consumer when determining where something may have gone wrong.

Once a write fails, the writer enters [`MzMLWriterState::Failed`] and
refuses to write anything else.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum MzMLWriterState {
    Start,
    DocumentOpen,
    Header,
    Run,
    SpectrumList,
    SpectrumListClosed,
    ChromatogramList,
    ChromatogramListClosed,
    RunClosed,
    MzMLClosed,
    IndexList,
    IndexListClosed,
    End,
    Failed,
}

/**
An mzML writer that streams [`Spectrum`] and [`Chromatogram`] elements out
as they are given, optionally wrapped in `<indexedmzML>`.

Nothing is buffered beyond the element being written. Because the
`<spectrumList>` count attribute is written before the first spectrum, the
number of spectra must be declared with [`MzMLWriterType::set_spectrum_count`]
up front, and the writer checks that exactly that many were written when the
list is closed.

Byte offsets recorded for the index are positions in the document as
serialized by this writer, before any compression applied to `W`.
*/
#[derive(Debug)]
pub struct MzMLWriterType<W: Write> {
    /// The total number of spectra this mzML document will contain.
    /// This value will appear in the `spectrumList` element's count attribute
    pub spectrum_count: u64,
    /// The number of `spectrum` elements written so far.
    pub spectrum_counter: u64,

    /// The total number of chromatograms this mzML document will contain.
    pub chromatogram_count: u64,
    /// The number of chromatograms written so far
    pub chromatogram_counter: u64,

    /// The compression type to use when generating binary data arrays.
    pub data_array_compression: BinaryCompressionType,

    /// Describes the acquisition the spectra were read from
    pub description: AcquisitionDescription,
    /// Whether any spectrum will be centroided during conversion, recorded in
    /// the data processing list
    pub peak_picking_applied: bool,
    /// Whether the document contains MS1 and MSn spectra respectively
    pub file_contents: (bool, bool),

    pub state: MzMLWriterState,
    pub spectrum_index: OffsetIndex,
    pub chromatogram_index: OffsetIndex,

    indexed: bool,
    handle: InnerXMLWriter<W>,
    ms_cv: ControlledVocabulary,
}

impl<W: Write> MzMLWriterType<W> {
    const PSIMS_VERSION: &'static str = "4.1.57";
    const UNIT_VERSION: &'static str = "releases/2020-03-10";

    /// Wrap a new [`std::io::Write`]-able type, constructing a writer for an indexed document
    pub fn new(file: W) -> MzMLWriterType<W> {
        Self::new_with_index(file, true)
    }

    pub fn new_with_index(file: W, indexed: bool) -> MzMLWriterType<W> {
        MzMLWriterType {
            handle: InnerXMLWriter::new(file),
            description: AcquisitionDescription::default(),
            peak_picking_applied: false,
            file_contents: (true, true),
            spectrum_index: OffsetIndex::new(ElementType::Spectrum),
            chromatogram_index: OffsetIndex::new(ElementType::Chromatogram),
            state: MzMLWriterState::Start,
            spectrum_count: 0,
            spectrum_counter: 0,
            chromatogram_count: 0,
            chromatogram_counter: 0,
            ms_cv: ControlledVocabulary::MS,
            data_array_compression: BinaryCompressionType::Zlib,
            indexed,
        }
    }

    pub fn with_description(mut self, description: AcquisitionDescription) -> Self {
        self.description = description;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// The depth of `<spectrum>` and `<chromatogram>` elements in the document
    fn element_depth(&self) -> u64 {
        if self.indexed {
            4
        } else {
            3
        }
    }

    fn transition_err(&self, to_state: MzMLWriterState) -> WriterResult {
        Err(MzMLWriterError::StateTransitionError {
            from_state: self.state,
            to_state,
        })
    }

    fn check_usable(&self) -> WriterResult {
        if self.state == MzMLWriterState::Failed {
            Err(MzMLWriterError::Failed)
        } else {
            Ok(())
        }
    }

    fn guard(&mut self, result: WriterResult) -> WriterResult {
        if let Err(e) = &result {
            log::error!("mzML writer failed in state {:?}: {e}", self.state);
            self.state = MzMLWriterState::Failed;
        }
        result
    }

    fn run_id(&self) -> String {
        let name = &self.description.source_name;
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => name.as_str(),
        };
        if stem.is_empty() {
            "run".to_string()
        } else {
            stem.to_string()
        }
    }

    fn make_psi_ms_cv(&self) -> BytesStart<'static> {
        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "MS"));
        cv.push_attribute(("fullName", "Proteomics Standards Initiative Mass Spectrometry Ontology"));
        cv.push_attribute(("version", Self::PSIMS_VERSION));
        cv.push_attribute(("URI", "https://raw.githubusercontent.com/HUPO-PSI/psi-ms-CV/master/psi-ms.obo"));
        cv
    }

    fn make_unit_cv(&self) -> BytesStart<'static> {
        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "UO"));
        cv.push_attribute(("fullName", "Unit Ontology"));
        cv.push_attribute(("version", Self::UNIT_VERSION));
        cv.push_attribute(("URI", "http://ontologies.berkeleybop.org/uo.obo"));
        cv
    }

    fn write_cv_list(&mut self) -> WriterResult {
        let mut cv_list = bstart!("cvList");
        cv_list.push_attribute(("count", "2"));
        start_event!(self, cv_list);

        let cv = self.make_psi_ms_cv();
        self.handle.write_event(Event::Empty(cv))?;

        let cv = self.make_unit_cv();
        self.handle.write_event(Event::Empty(cv))?;

        self.handle.write_event(Event::End(BytesEnd::new("cvList")))?;
        Ok(())
    }

    fn start_document(&mut self) -> WriterResult {
        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        if self.indexed {
            let mut indexed = bstart!("indexedmzML");
            indexed.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
            indexed.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
            indexed.push_attribute((
                "xsi:schemaLocation",
                "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.2_idx.xsd",
            ));
            self.handle.write_event(Event::Start(indexed))?;
        }

        let mut mzml = bstart!("mzML");
        mzml.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
        mzml.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        mzml.push_attribute((
            "xsi:schemaLocation",
            "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.0.xsd",
        ));
        mzml.push_attribute(("version", "1.1.0"));
        self.handle.write_event(Event::Start(mzml))?;

        self.state = MzMLWriterState::DocumentOpen;
        Ok(())
    }

    fn write_header(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::DocumentOpen {
            self.start_document()?;
        } else {
            return self.transition_err(MzMLWriterState::Header);
        }
        self.write_cv_list()?;
        self.write_file_description()?;
        self.write_software_list()?;
        self.write_instrument_configuration()?;
        self.write_data_processing()?;

        self.state = MzMLWriterState::Header;
        Ok(())
    }

    fn write_file_description(&mut self) -> WriterResult {
        let fd = bstart!("fileDescription");
        start_event!(self, fd);

        let fc_tag = bstart!("fileContents");
        start_event!(self, fc_tag);
        let (has_ms1, has_msn) = self.file_contents;
        if has_ms1 {
            self.handle.write_param(&MS1_SPECTRUM)?;
        }
        if has_msn {
            self.handle.write_param(&MSN_SPECTRUM)?;
        }
        end_event!(self, fc_tag);

        if !self.description.source_name.is_empty() {
            let mut outer = bstart!("sourceFileList");
            attrib!("count", "1", outer);
            start_event!(self, outer);

            let mut tag = bstart!("sourceFile");
            attrib!("id", SOURCE_FILE_ID, tag);
            attrib!("name", self.description.source_name, tag);
            attrib!("location", self.description.source_location, tag);
            start_event!(self, tag);
            self.handle
                .write_param(&self.description.native_id_format.as_param())?;
            if self.description.thermo_raw {
                self.handle.write_param(&THERMO_RAW_FORMAT)?;
            }
            if let Some(checksum) = &self.description.source_checksum {
                let param = self.ms_cv.param_val(1000569, "SHA-1", checksum);
                self.handle.write_param(&param)?;
            }
            end_event!(self, tag);
            end_event!(self, outer);
        }

        end_event!(self, fd);
        Ok(())
    }

    fn write_software_list(&mut self) -> WriterResult {
        let mut outer = bstart!("softwareList");
        attrib!("count", "1", outer);
        start_event!(self, outer);
        let mut tag = bstart!("software");
        attrib!("id", SOFTWARE_ID, tag);
        attrib!("version", env!("CARGO_PKG_VERSION"), tag);
        start_event!(self, tag);
        let param = self
            .ms_cv
            .param_val(1000799, "custom unreleased software tool", SOFTWARE_ID);
        self.handle.write_param(&param)?;
        end_event!(self, tag);
        end_event!(self, outer);
        Ok(())
    }

    fn write_instrument_configuration(&mut self) -> WriterResult {
        let mut outer = bstart!("instrumentConfigurationList");
        attrib!("count", "1", outer);
        start_event!(self, outer);

        let mut tag = bstart!("instrumentConfiguration");
        attrib!("id", INSTRUMENT_CONFIGURATION_ID, tag);
        start_event!(self, tag);
        if self.description.thermo_raw {
            self.handle.write_param(&THERMO_INSTRUMENT_MODEL)?;
        } else {
            self.handle.write_param(&INSTRUMENT_MODEL)?;
        }
        if let Some(model) = self.description.instrument_model.clone() {
            let param = crate::params::Param::new_key_value("instrument model", model);
            self.handle.write_param(&param)?;
        }
        let mut sw = bstart!("softwareRef");
        attrib!("ref", SOFTWARE_ID, sw);
        self.handle.write_event(Event::Empty(sw))?;
        end_event!(self, tag);
        end_event!(self, outer);
        Ok(())
    }

    fn write_data_processing(&mut self) -> WriterResult {
        let mut outer = bstart!("dataProcessingList");
        attrib!("count", "1", outer);
        start_event!(self, outer);
        let mut tag = bstart!("dataProcessing");
        attrib!("id", DATA_PROCESSING_ID, tag);
        start_event!(self, tag);

        let mut mtag = bstart!("processingMethod");
        attrib!("order", "0", mtag);
        attrib!("softwareRef", SOFTWARE_ID, mtag);
        start_event!(self, mtag);
        self.handle.write_param(&CONVERSION_TO_MZML)?;
        if self.peak_picking_applied {
            self.handle.write_param(&PEAK_PICKING)?;
        }
        end_event!(self, mtag);

        end_event!(self, tag);
        end_event!(self, outer);
        Ok(())
    }

    fn start_run(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::Run {
            self.write_header()?;
        } else {
            return self.transition_err(MzMLWriterState::Run);
        }
        let mut run = bstart!("run");
        let run_id = self.run_id();
        attrib!("id", run_id, run);
        attrib!("defaultInstrumentConfigurationRef", INSTRUMENT_CONFIGURATION_ID, run);
        if !self.description.source_name.is_empty() {
            attrib!("defaultSourceFileRef", SOURCE_FILE_ID, run);
        }
        if let Some(start_time) = self.description.start_time {
            let timestamp = start_time.to_rfc3339();
            attrib!("startTimeStamp", timestamp, run);
        }
        start_event!(self, run);
        self.state = MzMLWriterState::Run;
        Ok(())
    }

    fn start_spectrum_list(&mut self) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => return Ok(()),
            state if state < MzMLWriterState::Run => {
                self.start_run()?;
            }
            MzMLWriterState::Run => {}
            _ => {
                return self.transition_err(MzMLWriterState::SpectrumList);
            }
        }
        let mut list = bstart!("spectrumList");
        let count = self.spectrum_count.to_string();
        attrib!("count", count, list);
        attrib!("defaultDataProcessingRef", DATA_PROCESSING_ID, list);
        start_event!(self, list);
        self.state = MzMLWriterState::SpectrumList;
        Ok(())
    }

    fn close_spectrum_list(&mut self) -> WriterResult {
        if self.state != MzMLWriterState::SpectrumList {
            return self.transition_err(MzMLWriterState::SpectrumListClosed);
        }
        if self.spectrum_counter != self.spectrum_count {
            return Err(MzMLWriterError::CountMismatch {
                element: ElementType::Spectrum,
                expected: self.spectrum_count,
                written: self.spectrum_counter,
            });
        }
        let tag = bstart!("spectrumList");
        end_event!(self, tag);
        self.state = MzMLWriterState::SpectrumListClosed;
        Ok(())
    }

    fn start_chromatogram_list(&mut self) -> WriterResult {
        match self.state {
            MzMLWriterState::ChromatogramList => return Ok(()),
            state if state <= MzMLWriterState::SpectrumList => {
                self.start_spectrum_list()?;
                self.close_spectrum_list()?;
            }
            MzMLWriterState::SpectrumListClosed => {}
            _ => return self.transition_err(MzMLWriterState::ChromatogramList),
        }
        let mut list = bstart!("chromatogramList");
        let count = self.chromatogram_count.to_string();
        attrib!("count", count, list);
        attrib!("defaultDataProcessingRef", DATA_PROCESSING_ID, list);
        start_event!(self, list);
        self.state = MzMLWriterState::ChromatogramList;
        Ok(())
    }

    fn close_chromatogram_list(&mut self) -> WriterResult {
        if self.state != MzMLWriterState::ChromatogramList {
            return self.transition_err(MzMLWriterState::ChromatogramListClosed);
        }
        if self.chromatogram_counter != self.chromatogram_count {
            return Err(MzMLWriterError::CountMismatch {
                element: ElementType::Chromatogram,
                expected: self.chromatogram_count,
                written: self.chromatogram_counter,
            });
        }
        let tag = bstart!("chromatogramList");
        end_event!(self, tag);
        self.state = MzMLWriterState::ChromatogramListClosed;
        Ok(())
    }

    fn close_run(&mut self) -> WriterResult {
        if self.state <= MzMLWriterState::SpectrumList {
            self.start_spectrum_list()?;
            self.close_spectrum_list()?;
        }
        if self.state == MzMLWriterState::SpectrumListClosed && self.chromatogram_count > 0 {
            // Declared chromatograms that were never written fail the count check
            self.start_chromatogram_list()?;
        }
        if self.state == MzMLWriterState::ChromatogramList {
            self.close_chromatogram_list()?;
        }
        if self.state > MzMLWriterState::ChromatogramListClosed {
            return self.transition_err(MzMLWriterState::RunClosed);
        }
        let tag = bstart!("run");
        end_event!(self, tag);
        self.state = MzMLWriterState::RunClosed;
        Ok(())
    }

    fn close_mzml(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::RunClosed {
            self.close_run()?;
        }
        let tag = bstart!("mzML");
        end_event!(self, tag);
        self.state = MzMLWriterState::MzMLClosed;
        Ok(())
    }

    fn close_indexed_mzml(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::MzMLClosed {
            self.close_mzml()?;
        }
        self.write_index_list()?;
        let tag = bstart!("indexedmzML");
        end_event!(self, tag);
        Ok(())
    }

    /**
    Finish the document. For an indexed document this writes out the offset
    indices and file checksum at the tail of the document. The underlying
    stream is flushed, and nothing further may be written.
    */
    pub fn close(&mut self) -> WriterResult {
        self.check_usable()?;
        if self.state == MzMLWriterState::End {
            return Ok(());
        }
        let result = if self.indexed {
            self.close_indexed_mzml()
        } else {
            self.close_mzml()
        };
        let result = result.and_then(|_| Ok(self.handle.flush()?));
        self.guard(result)?;
        self.state = MzMLWriterState::End;
        Ok(())
    }

    fn write_scan_list(&mut self, spectrum: &Spectrum) -> WriterResult {
        let mut scan_list_tag = bstart!("scanList");
        attrib!("count", "1", scan_list_tag);
        start_event!(self, scan_list_tag);
        self.handle.write_param(&NO_COMBINATION)?;

        let mut scan_tag = bstart!("scan");
        attrib!("instrumentConfigurationRef", INSTRUMENT_CONFIGURATION_ID, scan_tag);
        start_event!(self, scan_tag);
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000016, "scan start time", spectrum.metadata.retention_time)
                .with_unit(Unit::Second),
        )?;
        if let Some(filter) = &spectrum.metadata.filter_string {
            self.handle
                .write_param(&self.ms_cv.param_val(1000512, "filter string", filter))?;
        }
        end_event!(self, scan_tag);
        end_event!(self, scan_list_tag);
        Ok(())
    }

    fn write_isolation_window(&mut self, iw: &IsolationWindow) -> WriterResult {
        let iw_tag = bstart!("isolationWindow");
        start_event!(self, iw_tag);
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000827, "isolation window target m/z", iw.target)
                .with_unit(Unit::MZ),
        )?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000828, "isolation window lower offset", iw.lower_offset())
                .with_unit(Unit::MZ),
        )?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000829, "isolation window upper offset", iw.upper_offset())
                .with_unit(Unit::MZ),
        )?;
        end_event!(self, iw_tag);
        Ok(())
    }

    fn write_selected_ions(&mut self, precursor: &Precursor) -> WriterResult {
        let mut outer = bstart!("selectedIonList");
        attrib!("count", "1", outer);
        start_event!(self, outer);
        let tag = bstart!("selectedIon");
        start_event!(self, tag);

        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000744, "selected ion m/z", precursor.mz)
                .with_unit(Unit::MZ),
        )?;
        if let Some(charge) = precursor.charge {
            self.handle
                .write_param(&self.ms_cv.param_val(1000041, "charge state", charge))?;
        }
        if let Some(intensity) = precursor.intensity {
            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val(1000042, "peak intensity", intensity)
                    .with_unit(Unit::DetectorCounts),
            )?;
        }
        end_event!(self, tag);
        end_event!(self, outer);
        Ok(())
    }

    fn write_activation(&mut self, activation: Option<&Activation>) -> WriterResult {
        let tag = bstart!("activation");
        start_event!(self, tag);
        if let Some(act) = activation {
            if let Some(method) = act.method {
                self.handle.write_param(&method.as_param())?;
            }
            if let Some(energy) = act.energy {
                self.handle.write_param(
                    &self
                        .ms_cv
                        .param_val(1000045, "collision energy", energy)
                        .with_unit(Unit::Electronvolt),
                )?;
            }
        }
        end_event!(self, tag);
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> WriterResult {
        let mut precursor_list_tag = bstart!("precursorList");
        attrib!("count", "1", precursor_list_tag);
        start_event!(self, precursor_list_tag);

        let mut precursor_tag = bstart!("precursor");
        if let Some(parent) = precursor.parent_scan {
            let parent_id = self.description.native_id_format.native_id(parent);
            attrib!("spectrumRef", parent_id, precursor_tag);
        }
        start_event!(self, precursor_tag);

        if let Some(iw) = &precursor.isolation_window {
            self.write_isolation_window(iw)?;
        }
        self.write_selected_ions(precursor)?;
        self.write_activation(precursor.activation.as_ref())?;
        end_event!(self, precursor_tag);
        end_event!(self, precursor_list_tag);
        Ok(())
    }

    fn write_binary_data_array<T: crate::spectrum::bindata::ArrayValue>(
        &mut self,
        values: &[T],
        dtype: BinaryDataArrayType,
        name: ParamCow<'static>,
    ) -> WriterResult {
        let encoded = encode_array(values, dtype, self.data_array_compression)?;
        let mut outer = bstart!("binaryDataArray");
        let encoded_len = encoded.len().to_string();
        attrib!("encodedLength", encoded_len, outer);
        start_event!(self, outer);

        self.handle.write_param(&dtype.as_param())?;
        self.handle
            .write_param(&self.data_array_compression.as_param())?;
        self.handle.write_param(&name)?;

        let bin = bstart!("binary");
        start_event!(self, bin);
        self.handle.write_text(&encoded)?;
        end_event!(self, bin);
        end_event!(self, outer);
        Ok(())
    }

    fn write_spectrum_arrays(&mut self, spectrum: &Spectrum) -> WriterResult {
        let charges = spectrum.peaks.charges();
        let count = if charges.is_some() { "3" } else { "2" };
        let mut outer = bstart!("binaryDataArrayList");
        attrib!("count", count, outer);
        start_event!(self, outer);
        self.write_binary_data_array(
            &spectrum.peaks.mzs(),
            BinaryDataArrayType::Float64,
            with_unit(MZ_ARRAY, Unit::MZ),
        )?;
        self.write_binary_data_array(
            &spectrum.peaks.intensities(),
            BinaryDataArrayType::Float32,
            with_unit(INTENSITY_ARRAY, Unit::DetectorCounts),
        )?;
        if let Some(charges) = charges {
            self.write_binary_data_array(&charges, BinaryDataArrayType::Int32, CHARGE_ARRAY)?;
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_spectrum_params(&mut self, spectrum: &Spectrum) -> WriterResult {
        let ms_level = spectrum.ms_level();
        if ms_level == 1 {
            self.handle.write_param(&MS1_SPECTRUM)?;
        } else {
            self.handle.write_param(&MSN_SPECTRUM)?;
        }
        self.handle
            .write_param(&self.ms_cv.param_val(1000511, "ms level", ms_level))?;

        if spectrum.is_centroided() {
            self.handle.write_param(&CENTROID_SPECTRUM)?;
        } else {
            self.handle.write_param(&PROFILE_SPECTRUM)?;
        }

        match spectrum.metadata.polarity {
            ScanPolarity::Negative => self.handle.write_param(&NEGATIVE_SCAN)?,
            ScanPolarity::Positive => self.handle.write_param(&POSITIVE_SCAN)?,
            ScanPolarity::Unknown => {
                warn!(
                    "Could not determine scan polarity for scan {}, omitting it",
                    spectrum.scan_id()
                );
            }
        }

        if let Some(base_peak) = spectrum.base_peak() {
            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val(1000504, "base peak m/z", base_peak.mz)
                    .with_unit(Unit::MZ),
            )?;
            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val(1000505, "base peak intensity", base_peak.intensity)
                    .with_unit(Unit::DetectorCounts),
            )?;
        }
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(1000285, "total ion current", spectrum.total_ion_current()),
        )?;
        if let (Some(low), Some(high)) = (spectrum.peaks.lowest_mz(), spectrum.peaks.highest_mz()) {
            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val(1000528, "lowest observed m/z", low)
                    .with_unit(Unit::MZ),
            )?;
            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val(1000527, "highest observed m/z", high)
                    .with_unit(Unit::MZ),
            )?;
        }
        Ok(())
    }

    fn write_spectrum_inner(&mut self, spectrum: &Spectrum) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => {}
            state if state < MzMLWriterState::SpectrumList => {
                self.start_spectrum_list()?;
            }
            _ => {
                // Cannot write spectrum, currently in state which happens
                // after spectra may be written
                return Err(MzMLWriterError::InvalidActionError(self.state));
            }
        }
        if self.spectrum_counter >= self.spectrum_count {
            return Err(MzMLWriterError::CountMismatch {
                element: ElementType::Spectrum,
                expected: self.spectrum_count,
                written: self.spectrum_counter + 1,
            });
        }

        let id = self.description.native_id_format.native_id(spectrum.scan_id());
        let pos = self.handle.next_tag_position(self.element_depth());
        self.spectrum_index.insert(id.as_str(), pos);

        let mut outer = bstart!("spectrum");
        let index = self.spectrum_counter.to_string();
        attrib!("index", index, outer);
        attrib!("id", id, outer);
        let default_array_len = spectrum.array_length().to_string();
        attrib!("defaultArrayLength", default_array_len, outer);
        start_event!(self, outer);
        self.spectrum_counter += 1;

        self.write_spectrum_params(spectrum)?;
        self.write_scan_list(spectrum)?;
        if let Some(precursor) = spectrum.precursor() {
            self.write_precursor(precursor)?;
        }
        self.write_spectrum_arrays(spectrum)?;

        end_event!(self, outer);
        Ok(())
    }

    /**
    Write a [`Spectrum`] out to the mzML file.

    ## Side-Effects
    If the writer has not already started writing the spectra, this will cause all the metadata
    to be written out and the `<spectrumList>` element will be opened, preventing no new metadata
    from being written to this stream. Furthermore, this writes the spectrum count out, so the value
    may no longer be changed.
    */
    pub fn write_spectrum(&mut self, spectrum: &Spectrum) -> WriterResult {
        self.check_usable()?;
        let result = self.write_spectrum_inner(spectrum);
        self.guard(result)
    }

    fn write_chromatogram_inner(&mut self, chromatogram: &Chromatogram) -> WriterResult {
        match self.state {
            MzMLWriterState::ChromatogramList => {}
            state if state < MzMLWriterState::ChromatogramList => {
                self.start_chromatogram_list()?;
            }
            _ => return Err(MzMLWriterError::InvalidActionError(self.state)),
        }
        if self.chromatogram_counter >= self.chromatogram_count {
            return Err(MzMLWriterError::CountMismatch {
                element: ElementType::Chromatogram,
                expected: self.chromatogram_count,
                written: self.chromatogram_counter + 1,
            });
        }

        let id = chromatogram.id();
        let pos = self.handle.next_tag_position(self.element_depth());
        self.chromatogram_index.insert(id, pos);

        let mut outer = bstart!("chromatogram");
        let index = self.chromatogram_counter.to_string();
        attrib!("index", index, outer);
        attrib!("id", id, outer);
        let default_array_len = chromatogram.len().to_string();
        attrib!("defaultArrayLength", default_array_len, outer);
        start_event!(self, outer);
        self.chromatogram_counter += 1;

        match chromatogram.chromatogram_type {
            ChromatogramType::TotalIonCurrent => self.handle.write_param(&TIC_CHROMATOGRAM)?,
            ChromatogramType::BasePeak => self.handle.write_param(&BPC_CHROMATOGRAM)?,
        }

        let mut arrays = bstart!("binaryDataArrayList");
        attrib!("count", "2", arrays);
        start_event!(self, arrays);
        self.write_binary_data_array(
            &chromatogram.time,
            BinaryDataArrayType::Float64,
            with_unit(TIME_ARRAY, Unit::Second),
        )?;
        self.write_binary_data_array(
            &chromatogram.intensity,
            BinaryDataArrayType::Float32,
            with_unit(INTENSITY_ARRAY, Unit::DetectorCounts),
        )?;
        end_event!(self, arrays);

        end_event!(self, outer);
        Ok(())
    }

    /// Write a [`Chromatogram`], closing the spectrum list first if it is still open
    pub fn write_chromatogram(&mut self, chromatogram: &Chromatogram) -> WriterResult {
        self.check_usable()?;
        let result = self.write_chromatogram_inner(chromatogram);
        self.guard(result)
    }

    fn write_index(&mut self, index: &OffsetIndex) -> WriterResult {
        let mut outer = bstart!("index");
        attrib!("name", index.name(), outer);
        start_event!(self, outer);
        for (id, offset) in index.iter() {
            let mut tag = bstart!("offset");
            attrib!("idRef", id, tag);
            start_event!(self, tag);
            let content = offset.to_string();
            self.handle.write_text(&content)?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_index_list(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::MzMLClosed {
            self.close_mzml()?;
        } else if self.state != MzMLWriterState::MzMLClosed {
            return self.transition_err(MzMLWriterState::IndexList);
        }
        self.state = MzMLWriterState::IndexList;

        let offset = self.handle.next_tag_position(1);
        let spectrum_index = std::mem::replace(
            &mut self.spectrum_index,
            OffsetIndex::new(ElementType::Spectrum),
        );
        let chromatogram_index = std::mem::replace(
            &mut self.chromatogram_index,
            OffsetIndex::new(ElementType::Chromatogram),
        );

        let mut outer = bstart!("indexList");
        attrib!("count", "2", outer);
        start_event!(self, outer);
        self.write_index(&spectrum_index)?;
        self.write_index(&chromatogram_index)?;
        end_event!(self, outer);
        self.spectrum_index = spectrum_index;
        self.chromatogram_index = chromatogram_index;

        let tag = bstart!("indexListOffset");
        start_event!(self, tag);
        let content = offset.to_string();
        self.handle.write_text(&content)?;
        end_event!(self, tag);

        let tag = bstart!("fileChecksum");
        start_event!(self, tag);
        let content = self.handle.digest();
        self.handle.write_text(&content)?;
        end_event!(self, tag);
        self.state = MzMLWriterState::IndexListClosed;
        Ok(())
    }

    /// Set the mzML writer's spectrum count.
    pub fn set_spectrum_count(&mut self, spectrum_count: u64) {
        if self.state >= MzMLWriterState::SpectrumList {
            warn!("The spectrum count was set after the spectrum list was written, ignoring it");
            return;
        }
        self.spectrum_count = spectrum_count;
    }

    pub fn set_chromatogram_count(&mut self, chromatogram_count: u64) {
        if self.state >= MzMLWriterState::ChromatogramList {
            warn!("The chromatogram count was set after the chromatogram list was written, ignoring it");
            return;
        }
        self.chromatogram_count = chromatogram_count;
    }

    /// Every element written so far and where it starts in the uncompressed document
    pub fn index_entries(&self) -> Vec<crate::io::offset_index::OutputIndexEntry> {
        self.spectrum_index
            .entries()
            .chain(self.chromatogram_index.entries())
            .collect()
    }

    /// Close the document if needed and return the wrapped stream
    pub fn into_inner(mut self) -> Result<W, MzMLWriterError> {
        self.close()?;
        Ok(self.handle.into_inner()?)
    }
}

impl<W: Write> SpectrumWriter for MzMLWriterType<W> {
    fn write(&mut self, spectrum: &Spectrum) -> io::Result<usize> {
        self.write_spectrum(spectrum)?;
        Ok(1)
    }

    fn write_chromatogram(&mut self, chromatogram: &Chromatogram) -> io::Result<usize> {
        MzMLWriterType::write_chromatogram(self, chromatogram)?;
        Ok(1)
    }

    fn set_spectrum_count(&mut self, count: u64) {
        MzMLWriterType::set_spectrum_count(self, count)
    }

    fn set_chromatogram_count(&mut self, count: u64) {
        MzMLWriterType::set_chromatogram_count(self, count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        MzMLWriterType::close(self)?;
        Ok(())
    }
}

/// A convenient alias for [`MzMLWriterType`]
pub type MzMLWriter<W> = MzMLWriterType<W>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::memory::test_fixtures::*;
    use crate::io::traits::AcquisitionSource;
    use crate::selection::FilterConfig;
    use crate::spectrum::{Peak, PeakList, SpectrumMetadata};
    use crate::transform::{select, SpectrumStream};
    use sha1::{Digest, Sha1};

    fn write_fixture(config: &FilterConfig, indexed: bool) -> Result<Vec<u8>, MzMLWriterError> {
        let mut source = small_acquisition();
        let filters = config.build();
        let selected = select(&mut source, &filters).map_err(io::Error::other)?;
        let mut writer =
            MzMLWriterType::new_with_index(Vec::new(), indexed).with_description(source.description());
        writer.peak_picking_applied = true;
        writer.set_spectrum_count(selected.len() as u64);
        writer.set_chromatogram_count(1);
        let chromatogram = source.chromatogram().map_err(io::Error::other)?;
        for spectrum in SpectrumStream::new(&mut source, &filters, selected) {
            writer.write_spectrum(&spectrum.map_err(io::Error::other)?)?;
        }
        writer.write_chromatogram(&chromatogram)?;
        writer.into_inner()
    }

    fn text_between<'a>(doc: &'a str, start: &str, end: &str) -> Vec<&'a str> {
        doc.match_indices(start)
            .filter_map(|(i, _)| {
                let rest = &doc[i + start.len()..];
                rest.find(end).map(|j| &rest[..j])
            })
            .collect()
    }

    #[test_log::test]
    fn test_count_reflects_filters() -> Result<(), MzMLWriterError> {
        let buffer = write_fixture(&FilterConfig::new().with_ms_levels([1]), false)?;
        let doc = String::from_utf8_lossy(&buffer);
        assert!(doc.contains(r#"<spectrumList count="14""#));
        assert_eq!(doc.matches("<spectrum ").count(), FIXTURE_MS1_COUNT);
        assert!(doc.contains(r#"<chromatogramList count="1""#));
        assert!(doc.contains(r#"<chromatogram index="0" id="TIC" defaultArrayLength="48">"#));
        assert!(!doc.contains("<indexList"));
        assert!(doc.starts_with("<?xml"));
        assert!(doc.trim_end().ends_with("</mzML>"));
        Ok(())
    }

    #[test_log::test]
    fn test_index_offsets() -> Result<(), MzMLWriterError> {
        let buffer = write_fixture(&FilterConfig::new(), true)?;
        let doc = String::from_utf8_lossy(&buffer).to_string();
        assert!(doc.contains(r#"<indexList count="2">"#));
        assert!(doc.contains(r#"<index name="spectrum">"#));
        assert!(doc.contains(r#"<index name="chromatogram">"#));

        let refs = text_between(&doc, "<offset idRef=\"", "</offset>");
        assert_eq!(refs.len(), FIXTURE_SCAN_COUNT + 1);
        for entry in refs {
            let (id, offset) = entry.split_once("\">").unwrap();
            let offset: usize = offset.parse().unwrap();
            let tail = &doc[offset..];
            if id == "TIC" {
                assert!(tail.starts_with("<chromatogram "), "{id} -> {}", &tail[..40]);
            } else {
                assert!(tail.starts_with("<spectrum "), "{id} -> {}", &tail[..40]);
            }
            let header = &tail[..tail.find('>').unwrap()];
            assert!(header.contains(&format!("id=\"{id}\"")));
        }

        let list_offset: usize = text_between(&doc, "<indexListOffset>", "</indexListOffset>")[0]
            .parse()
            .unwrap();
        assert!(doc[list_offset..].starts_with("<indexList "));
        Ok(())
    }

    #[test]
    fn test_index_list_without_chromatograms() -> Result<(), MzMLWriterError> {
        let mut writer = MzMLWriterType::new_with_index(Vec::new(), true);
        writer.set_spectrum_count(1);
        let spectrum = Spectrum::new(
            SpectrumMetadata::new(1, 1, 1.0, true),
            PeakList::new(vec![Peak::new(100.0, 1.0)]),
        );
        writer.write_spectrum(&spectrum)?;
        let buffer = writer.into_inner()?;
        let doc = String::from_utf8_lossy(&buffer).to_string();
        assert!(doc.contains(r#"<indexList count="2">"#));
        assert!(doc.contains(r#"<index name="spectrum">"#));
        assert!(doc.contains(r#"<index name="chromatogram">"#));
        assert_eq!(doc.matches("<offset ").count(), 1);
        Ok(())
    }

    #[test]
    fn test_checksum() -> Result<(), MzMLWriterError> {
        let buffer = write_fixture(&FilterConfig::new().with_ms_levels([2]), true)?;
        let doc = String::from_utf8_lossy(&buffer).to_string();
        let tag = "<fileChecksum>";
        let end = doc.find(tag).unwrap() + tag.len();
        let expected = base16ct::lower::encode_string(&Sha1::digest(&buffer[..end]));
        let found = text_between(&doc, tag, "</fileChecksum>")[0];
        assert_eq!(found, expected);
        Ok(())
    }

    #[test]
    fn test_idempotent() -> Result<(), MzMLWriterError> {
        let config = FilterConfig::new();
        let a = write_fixture(&config, true)?;
        let b = write_fixture(&config, true)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_spectrum_content() -> Result<(), MzMLWriterError> {
        let buffer = write_fixture(&FilterConfig::new().with_scans("1-2".parse().unwrap()), true)?;
        let doc = String::from_utf8_lossy(&buffer);
        assert!(doc.contains(r#"id="controllerType=0 controllerNumber=1 scan=1" defaultArrayLength="3""#));
        assert!(!doc.contains(r#"accession="MS:1000128""#));
        assert!(doc.contains(r#"name="peak picking""#));
        assert!(doc.contains(r#"<precursor spectrumRef="controllerType=0 controllerNumber=1 scan=1">"#));
        assert!(doc.contains(r#"name="charge array""#));
        assert!(doc.contains(r#"name="beam-type collision-induced dissociation""#));
        assert!(doc.contains(r#"unitAccession="UO:0000010" unitName="second""#));
        assert!(doc.contains(r#"startTimeStamp="2024-03-01T10:15:00+00:00""#));
        assert!(doc.contains(r#"<cvParam cvRef="MS" accession="MS:1000569" name="SHA-1""#));
        Ok(())
    }

    #[test]
    fn test_count_mismatch_fails_writer() {
        let mut writer = MzMLWriterType::new(Vec::new());
        writer.set_spectrum_count(2);
        let spectrum = Spectrum::new(
            SpectrumMetadata::new(1, 1, 1.0, true),
            PeakList::new(vec![Peak::new(100.0, 1.0)]),
        );
        writer.write_spectrum(&spectrum).unwrap();
        let err = writer.close().unwrap_err();
        assert!(matches!(
            err,
            MzMLWriterError::CountMismatch {
                expected: 2,
                written: 1,
                ..
            }
        ));
        assert_eq!(writer.state, MzMLWriterState::Failed);
        assert!(matches!(writer.write_spectrum(&spectrum), Err(MzMLWriterError::Failed)));
    }

    #[test]
    fn test_no_writes_after_close() -> Result<(), MzMLWriterError> {
        let mut writer = MzMLWriterType::new_with_index(Vec::new(), false);
        writer.close()?;
        assert_eq!(writer.state, MzMLWriterState::End);
        let spectrum = Spectrum::new(SpectrumMetadata::new(1, 1, 1.0, true), PeakList::empty());
        assert!(matches!(
            writer.write_spectrum(&spectrum),
            Err(MzMLWriterError::InvalidActionError(MzMLWriterState::End))
        ));
        Ok(())
    }
}
