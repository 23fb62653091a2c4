/*!
Turning scans read from an [`AcquisitionSource`] into the [`Spectrum`]s that
get written.

Selection happens on metadata alone, so the number of spectra a run will emit
is known before any peak data is read.
*/
use crate::io::traits::{AcquisitionSource, PeakMode, SourceError};
use crate::selection::FilterPipeline;
use crate::spectrum::{PeakList, Spectrum, SpectrumMetadata};

/// Whether a scan's peaks should be centroided before they are written
pub fn should_centroid(metadata: &SpectrumMetadata, filters: &FilterPipeline) -> bool {
    !metadata.is_centroided && !filters.centroid_override(metadata)
}

/**
Read the peaks for `metadata` and build the [`Spectrum`] to emit.

Profile scans are centroided by the source unless a peak-picking override
claims them. Peaks come back exactly as the source produced them apart from
being ordered by m/z.
*/
pub fn transform<S: AcquisitionSource + ?Sized>(
    source: &mut S,
    mut metadata: SpectrumMetadata,
    filters: &FilterPipeline,
) -> Result<Spectrum, SourceError> {
    let centroid = should_centroid(&metadata, filters);
    let mode = if centroid {
        PeakMode::Centroid
    } else {
        PeakMode::AsAcquired
    };
    if !metadata.is_centroided && !centroid {
        log::debug!("Keeping profile data for scan {}", metadata.scan_id);
    }
    let peaks = PeakList::new(source.peaks(metadata.scan_id, mode)?);
    metadata.is_centroided |= centroid;
    Ok(Spectrum::new(metadata, peaks))
}

/// Read every scan's metadata in ascending order and keep those the filters emit
pub fn select<S: AcquisitionSource + ?Sized>(
    source: &mut S,
    filters: &FilterPipeline,
) -> Result<Vec<SpectrumMetadata>, SourceError> {
    let mut selected = Vec::new();
    for scan_id in source.scan_ids() {
        let metadata = source.metadata(scan_id)?;
        if filters.should_emit(&metadata) {
            selected.push(metadata);
        }
    }
    log::info!(
        "Selected {} of {} scans",
        selected.len(),
        source.scan_count()
    );
    Ok(selected)
}

/// An iterator producing the transformed spectrum for each selected scan in order
pub struct SpectrumStream<'a, S: AcquisitionSource + ?Sized> {
    source: &'a mut S,
    filters: &'a FilterPipeline,
    selected: std::vec::IntoIter<SpectrumMetadata>,
}

impl<'a, S: AcquisitionSource + ?Sized> SpectrumStream<'a, S> {
    pub fn new(source: &'a mut S, filters: &'a FilterPipeline, selected: Vec<SpectrumMetadata>) -> Self {
        Self {
            source,
            filters,
            selected: selected.into_iter(),
        }
    }
}

impl<S: AcquisitionSource + ?Sized> Iterator for SpectrumStream<'_, S> {
    type Item = Result<Spectrum, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let metadata = self.selected.next()?;
        Some(transform(&mut *self.source, metadata, self.filters))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.selected.size_hint()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::memory::test_fixtures::*;
    use crate::selection::{FilterConfig, ScanSet};

    #[test_log::test]
    fn test_profile_scans_are_centroided() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let filters = FilterConfig::new().build();
        let meta = source.metadata(1)?;
        assert!(!meta.is_centroided);
        let spectrum = transform(&mut source, meta.clone(), &filters)?;
        assert!(spectrum.is_centroided());
        assert_eq!(spectrum.array_length(), 3);
        assert_eq!(spectrum.metadata.retention_time, meta.retention_time);
        assert_eq!(spectrum.base_peak().map(|p| p.mz.round()), Some(400.0));
        Ok(())
    }

    #[test_log::test]
    fn test_override_keeps_profile() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let filters = FilterConfig::new()
            .with_no_peak_picking_scans(ScanSet::parse("1").unwrap())
            .build();
        let meta = source.metadata(1)?;
        let spectrum = transform(&mut source, meta, &filters)?;
        assert!(!spectrum.is_centroided());
        assert_eq!(spectrum.array_length(), 600);
        Ok(())
    }

    #[test]
    fn test_centroid_passthrough() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let filters = FilterConfig::new().with_no_peak_picking_levels([2]).build();
        let meta = source.metadata(2)?;
        let raw = source.peaks(2, PeakMode::AsAcquired)?;
        let spectrum = transform(&mut source, meta.clone(), &filters)?;
        assert!(spectrum.is_centroided());
        assert_eq!(spectrum.peaks.as_slice(), raw.as_slice());
        assert_eq!(spectrum.precursor(), meta.precursor.as_ref());
        Ok(())
    }

    #[test]
    fn test_select_and_stream() -> Result<(), SourceError> {
        let mut source = small_acquisition();
        let filters = FilterConfig::new().with_ms_levels([1]).build();
        let selected = select(&mut source, &filters)?;
        assert_eq!(selected.len(), FIXTURE_MS1_COUNT);
        let spectra: Vec<Spectrum> =
            SpectrumStream::new(&mut source, &filters, selected).collect::<Result<_, _>>()?;
        assert_eq!(spectra.len(), FIXTURE_MS1_COUNT);
        assert!(spectra.windows(2).all(|w| w[0].scan_id() < w[1].scan_id()));
        assert!(spectra.iter().all(|s| s.ms_level() == 1 && s.is_centroided()));
        Ok(())
    }
}
