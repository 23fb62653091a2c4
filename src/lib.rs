//! `mzexport` converts mass spectrometry acquisitions into MGF, mzML and
//! indexed mzML documents, and extracts selected scans as PROXI spectrum
//! records.
//!
//! An acquisition is anything implementing [`io::AcquisitionSource`]. The
//! [`selection`] module decides which of its scans are written, [`transform`]
//! turns each selected scan into a [`spectrum::Spectrum`], and the writers in
//! [`io`] serialize them.
//!
//! ```
//! use mzexport::io::{convert, ConversionConfig, OutputFormat, OutputTarget};
//! use mzexport::io::memory::test_fixtures::small_acquisition;
//! use mzexport::selection::FilterConfig;
//!
//! # fn main() -> Result<(), mzexport::io::ConversionError> {
//! let dir = tempfile::tempdir()?;
//! let config = ConversionConfig::new(OutputFormat::IndexedMzML, OutputTarget::Directory(dir.path().into()))
//!     .with_filters(FilterConfig::new().with_ms_levels([1]));
//! let summary = convert(&mut small_acquisition(), &config)?;
//! assert_eq!(summary.spectra_written, 14);
//! #    Ok(())
//! # }
//! ```
pub mod io;
pub mod params;
pub mod selection;
pub mod spectrum;
pub mod transform;

pub use crate::io::{convert, AcquisitionSource, ConversionConfig, MGFWriter, MzMLWriter, SpectrumWriter};
pub use crate::selection::{FilterConfig, FilterPipeline, ScanSet};
pub use crate::spectrum::{Chromatogram, Peak, PeakList, Spectrum, SpectrumMetadata};
