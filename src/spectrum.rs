//! The in-memory spectrum data model assembled from an acquisition source.
pub mod bindata;
pub mod chromatogram;
pub mod peak_picking;
pub mod peaks;
pub mod scan_properties;
pub mod spectrum_types;

pub use crate::spectrum::bindata::{encode_array, BinaryCompressionType, BinaryDataArrayType};
pub use crate::spectrum::chromatogram::{Chromatogram, ChromatogramType};
pub use crate::spectrum::peak_picking::Centroider;
pub use crate::spectrum::peaks::{Peak, PeakList};
pub use crate::spectrum::scan_properties::*;
pub use crate::spectrum::spectrum_types::Spectrum;
