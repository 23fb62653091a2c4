/*!
Per-scan inclusion and peak-picking decisions.

Each filter is an independent [`SpectrumPredicate`]. A [`FilterPipeline`]
emits a scan only when every predicate accepts it, and keeps a scan's profile
data when any [`PeakPickingOverride`] claims it.
*/
use std::collections::BTreeSet;
use std::fmt::Debug;

use crate::selection::scan_set::ScanSet;
use crate::spectrum::{ScanId, SpectrumMetadata};

/// A test applied to a scan's metadata before it is read in full
pub trait SpectrumPredicate: Debug + Send + Sync {
    fn accepts(&self, metadata: &SpectrumMetadata) -> bool;
}

/// Accept scans whose MS level is in the allowed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MSLevelFilter {
    pub levels: BTreeSet<u8>,
}

impl SpectrumPredicate for MSLevelFilter {
    fn accepts(&self, metadata: &SpectrumMetadata) -> bool {
        self.levels.contains(&metadata.ms_level)
    }
}

/// Accept scans whose scan number is in the allowed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNumberFilter {
    pub scans: ScanSet,
}

impl SpectrumPredicate for ScanNumberFilter {
    fn accepts(&self, metadata: &SpectrumMetadata) -> bool {
        self.scans.contains(metadata.scan_id)
    }
}

/// A rule that keeps a scan's profile data rather than centroiding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeakPickingOverride {
    Scans(ScanSet),
    MSLevels(BTreeSet<u8>),
}

impl SpectrumPredicate for PeakPickingOverride {
    fn accepts(&self, metadata: &SpectrumMetadata) -> bool {
        match self {
            Self::Scans(scans) => scans.contains(metadata.scan_id),
            Self::MSLevels(levels) => levels.contains(&metadata.ms_level),
        }
    }
}

/**
The user-facing description of which scans to write and how.

Every field left as `None` places no restriction. A [`FilterConfig`] is built
once before a run and does not change while the run is in progress.
*/
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub ms_levels: Option<BTreeSet<u8>>,
    pub scans: Option<ScanSet>,
    pub no_peak_picking_scans: Option<ScanSet>,
    pub no_peak_picking_levels: Option<BTreeSet<u8>>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ms_levels<I: IntoIterator<Item = u8>>(mut self, levels: I) -> Self {
        self.ms_levels = Some(levels.into_iter().collect());
        self
    }

    pub fn with_scans(mut self, scans: ScanSet) -> Self {
        self.scans = Some(scans);
        self
    }

    pub fn with_no_peak_picking_scans(mut self, scans: ScanSet) -> Self {
        self.no_peak_picking_scans = Some(scans);
        self
    }

    pub fn with_no_peak_picking_levels<I: IntoIterator<Item = u8>>(mut self, levels: I) -> Self {
        self.no_peak_picking_levels = Some(levels.into_iter().collect());
        self
    }

    /// Check the configuration for combinations that can never produce output.
    pub fn validate(&self) -> Result<(), String> {
        for (label, levels) in [
            ("MS level filter", &self.ms_levels),
            ("no peak picking MS levels", &self.no_peak_picking_levels),
        ] {
            if let Some(levels) = levels {
                if levels.is_empty() {
                    return Err(format!("The {label} is empty"));
                }
                if levels.contains(&0) {
                    return Err(format!("The {label} contains MS level 0"));
                }
            }
        }
        Ok(())
    }

    pub fn build(&self) -> FilterPipeline {
        let mut pipeline = FilterPipeline::default();
        if let Some(levels) = &self.ms_levels {
            pipeline.add_filter(MSLevelFilter {
                levels: levels.clone(),
            });
        }
        if let Some(scans) = &self.scans {
            pipeline.add_filter(ScanNumberFilter {
                scans: scans.clone(),
            });
        }
        if let Some(scans) = &self.no_peak_picking_scans {
            pipeline.add_override(PeakPickingOverride::Scans(scans.clone()));
        }
        if let Some(levels) = &self.no_peak_picking_levels {
            pipeline.add_override(PeakPickingOverride::MSLevels(levels.clone()));
        }
        pipeline
    }
}

/// The composed predicates of a [`FilterConfig`]
#[derive(Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn SpectrumPredicate>>,
    overrides: Vec<PeakPickingOverride>,
}

impl FilterPipeline {
    pub fn add_filter<P: SpectrumPredicate + 'static>(&mut self, filter: P) {
        self.filters.push(Box::new(filter));
    }

    pub fn add_override(&mut self, rule: PeakPickingOverride) {
        self.overrides.push(rule);
    }

    pub fn should_emit(&self, metadata: &SpectrumMetadata) -> bool {
        let keep = self.filters.iter().all(|f| f.accepts(metadata));
        if !keep {
            log::debug!("Scan {} rejected by filters", metadata.scan_id);
        }
        keep
    }

    /// `true` when the scan must keep its profile data instead of being centroided
    pub fn centroid_override(&self, metadata: &SpectrumMetadata) -> bool {
        self.overrides.iter().any(|o| o.accepts(metadata))
    }

    /// Shorthand for [`FilterPipeline::centroid_override`] when only the scan id is known
    pub fn centroid_override_scan(&self, scan_id: ScanId) -> bool {
        self.overrides.iter().any(|o| match o {
            PeakPickingOverride::Scans(scans) => scans.contains(scan_id),
            PeakPickingOverride::MSLevels(_) => false,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.overrides.is_empty()
    }
}

impl From<&FilterConfig> for FilterPipeline {
    fn from(value: &FilterConfig) -> Self {
        value.build()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn meta(scan_id: ScanId, ms_level: u8) -> SpectrumMetadata {
        SpectrumMetadata::new(scan_id, ms_level, scan_id as f64, ms_level > 1)
    }

    #[test]
    fn test_no_filters_accepts_all() {
        let pipeline = FilterConfig::new().build();
        assert!(pipeline.is_empty());
        assert!(pipeline.should_emit(&meta(1, 1)));
        assert!(pipeline.should_emit(&meta(2, 3)));
        assert!(!pipeline.centroid_override(&meta(1, 1)));
    }

    #[test_log::test]
    fn test_filters_are_conjunctive() {
        let config = FilterConfig::new()
            .with_ms_levels([2])
            .with_scans(ScanSet::parse("1-5").unwrap());
        let pipeline = FilterPipeline::from(&config);
        assert!(pipeline.should_emit(&meta(3, 2)));
        assert!(!pipeline.should_emit(&meta(3, 1)));
        assert!(!pipeline.should_emit(&meta(6, 2)));
    }

    #[test]
    fn test_overrides_are_disjunctive() {
        let config = FilterConfig::new()
            .with_no_peak_picking_scans(ScanSet::parse("4").unwrap())
            .with_no_peak_picking_levels([1]);
        let pipeline = config.build();
        assert!(pipeline.centroid_override(&meta(4, 2)));
        assert!(pipeline.centroid_override(&meta(7, 1)));
        assert!(!pipeline.centroid_override(&meta(7, 2)));
        assert!(pipeline.centroid_override_scan(4));
        assert!(!pipeline.centroid_override_scan(7));
        // Overrides never affect inclusion
        assert!(pipeline.should_emit(&meta(7, 2)));
    }

    #[test]
    fn test_validate() {
        assert!(FilterConfig::new().validate().is_ok());
        assert!(FilterConfig::new().with_ms_levels([1, 2]).validate().is_ok());
        assert!(FilterConfig::new().with_ms_levels([]).validate().is_err());
        assert!(FilterConfig::new().with_ms_levels([0, 1]).validate().is_err());
        assert!(FilterConfig::new().with_no_peak_picking_levels([0]).validate().is_err());
    }
}
