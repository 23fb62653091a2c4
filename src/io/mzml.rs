//! Implements a writer for the PSI-MS mzML and indexedmzML XML file formats
//! for representing raw and processed mass spectra.

pub mod writer;

pub use crate::io::mzml::writer::{
    MzMLWriter, MzMLWriterError, MzMLWriterState, MzMLWriterType, WriterResult,
};
