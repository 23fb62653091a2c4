//! Choosing which scans are written and whether their peaks are centroided.
pub mod filter;
pub mod scan_set;

pub use crate::selection::filter::{
    FilterConfig, FilterPipeline, MSLevelFilter, PeakPickingOverride, ScanNumberFilter,
    SpectrumPredicate,
};
pub use crate::selection::scan_set::{ScanSet, ScanSetError};
