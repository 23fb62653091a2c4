use serde::{Deserialize, Serialize};

use crate::params::{ControlledVocabulary, ParamCow};

/// The 1-based scan number of a spectrum within an acquisition
pub type ScanId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPolarity {
    #[default]
    Unknown,
    Positive,
    Negative,
}

/// How a spectrum's native identifier is formatted in the written output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeIdFormat {
    /// `controllerType=0 controllerNumber=1 scan=N`
    #[default]
    Thermo,
    /// `scan=N`
    ScanNumberOnly,
}

impl NativeIdFormat {
    pub fn native_id(&self, scan_id: ScanId) -> String {
        match self {
            Self::Thermo => format!("controllerType=0 controllerNumber=1 scan={scan_id}"),
            Self::ScanNumberOnly => format!("scan={scan_id}"),
        }
    }

    pub const fn as_param(&self) -> ParamCow<'static> {
        match self {
            Self::Thermo => ControlledVocabulary::MS.const_param_ident("Thermo nativeID format", 1000768),
            Self::ScanNumberOnly => {
                ControlledVocabulary::MS.const_param_ident("scan number only nativeID format", 1000776)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// The interval around the precursor ion that was isolated, stored with explicit bounds
pub struct IsolationWindow {
    pub target: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl IsolationWindow {
    pub fn new(target: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            target,
            lower_bound,
            upper_bound,
        }
    }

    pub fn around(target: f64, width: f64) -> Self {
        Self::new(target, target - width / 2.0, target + width / 2.0)
    }

    pub fn lower_offset(&self) -> f64 {
        self.target - self.lower_bound
    }

    pub fn upper_offset(&self) -> f64 {
        self.upper_bound - self.target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DissociationMethod {
    CID,
    HCD,
    ETD,
    ECD,
}

impl DissociationMethod {
    pub const fn as_param(&self) -> ParamCow<'static> {
        match self {
            Self::CID => ControlledVocabulary::MS.const_param_ident("collision-induced dissociation", 1000133),
            Self::HCD => ControlledVocabulary::MS
                .const_param_ident("beam-type collision-induced dissociation", 1000422),
            Self::ETD => ControlledVocabulary::MS.const_param_ident("electron transfer dissociation", 1000598),
            Self::ECD => ControlledVocabulary::MS.const_param_ident("electron capture dissociation", 1000250),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<DissociationMethod>,
    /// Collision energy in electronvolts
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub energy: Option<f64>,
}

/// The selected ion an MSn spectrum was produced from. Anything the source
/// did not report stays `None` and is left out of the written output.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub mz: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub charge: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub isolation_window: Option<IsolationWindow>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub activation: Option<Activation>,
    /// The scan number of the spectrum the precursor was selected from
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_scan: Option<ScanId>,
}

impl Precursor {
    pub fn new(mz: f64) -> Self {
        Self {
            mz,
            ..Default::default()
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_isolation_window(mut self, window: IsolationWindow) -> Self {
        self.isolation_window = Some(window);
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_parent_scan(mut self, scan_id: ScanId) -> Self {
        self.parent_scan = Some(scan_id);
        self
    }
}

/**
Describes a single scan as read from the acquisition source. This is
never modified after it has been read.
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    pub scan_id: ScanId,
    pub ms_level: u8,
    /// Scan start time in seconds
    pub retention_time: f64,
    pub is_centroided: bool,
    #[serde(default)]
    pub polarity: ScanPolarity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filter_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub precursor: Option<Precursor>,
}

impl SpectrumMetadata {
    pub fn new(scan_id: ScanId, ms_level: u8, retention_time: f64, is_centroided: bool) -> Self {
        Self {
            scan_id,
            ms_level,
            retention_time,
            is_centroided,
            polarity: ScanPolarity::Unknown,
            filter_string: None,
            precursor: None,
        }
    }

    pub fn with_precursor(mut self, precursor: Precursor) -> Self {
        self.precursor = Some(precursor);
        self
    }

    pub fn with_polarity(mut self, polarity: ScanPolarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_filter_string<S: Into<String>>(mut self, filter: S) -> Self {
        self.filter_string = Some(filter.into());
        self
    }

    /// Retention time in minutes
    pub fn start_time_minutes(&self) -> f64 {
        self.retention_time / 60.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_native_ids() {
        assert_eq!(
            NativeIdFormat::Thermo.native_id(12),
            "controllerType=0 controllerNumber=1 scan=12"
        );
        assert_eq!(NativeIdFormat::ScanNumberOnly.native_id(12), "scan=12");
    }

    #[test]
    fn test_isolation_window_offsets() {
        let iw = IsolationWindow::around(500.0, 2.0);
        assert_eq!(iw.lower_bound, 499.0);
        assert_eq!(iw.lower_offset(), 1.0);
        assert_eq!(iw.upper_offset(), 1.0);
    }

    #[test]
    fn test_metadata_serde_omits_absent() {
        let meta = SpectrumMetadata::new(3, 2, 12.5, true).with_precursor(Precursor::new(445.12).with_charge(2));
        let text = serde_json::to_string(&meta).unwrap();
        assert!(!text.contains("intensity"));
        assert!(!text.contains("filter_string"));
        let dup: SpectrumMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(dup, meta);
    }
}
