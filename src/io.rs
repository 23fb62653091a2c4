//! Reading acquisitions and writing the formats they are converted to.
pub mod convert;
pub mod memory;
pub mod mgf;
pub mod mzml;
mod offset_index;
pub mod proxi;
#[cfg(feature = "thermo")]
pub mod thermo;
pub mod traits;
mod utils;

pub(crate) mod compression;

pub use crate::io::compression::{is_gzipped, is_gzipped_extension, OutputSink};
pub use crate::io::convert::{
    convert, convert_directory, output_file_name, output_in_directory, ConversionConfig, ConversionError, ConversionSummary,
    OutputFormat, OutputTarget,
};
pub use crate::io::memory::{MemoryAcquisition, MemoryScan};
pub use crate::io::mgf::MGFWriter;
pub use crate::io::mzml::{MzMLWriter, MzMLWriterError, MzMLWriterType};
pub use crate::io::offset_index::{ElementType, OffsetIndex, OutputIndexEntry};
pub use crate::io::proxi::{retrieve, run_query, PROXISpectrum, QueryConfig};
#[cfg(feature = "thermo")]
pub use crate::io::thermo::{is_thermo_raw_prefix, ThermoRawFile};
pub use crate::io::traits::{
    AcquisitionDescription, AcquisitionSource, PeakMode, SourceError, SpectrumWriter,
};
pub use crate::io::utils::{checksum_file, ChecksumStream};
