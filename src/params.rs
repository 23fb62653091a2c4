//! Controlled vocabulary parameters used to annotate written spectra and
//! PROXI records.
use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// The controlled vocabularies this crate emits terms from.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";

impl ControlledVocabulary {
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::MS => MS_CV,
            Self::UO => UO_CV,
        }
    }

    /// Create a [`ParamCow`] with no value from static strings, suitable for `const` items
    pub const fn const_param_ident(&self, name: &'static str, accession: u32) -> ParamCow<'static> {
        ParamCow {
            name: Cow::Borrowed(name),
            value: Cow::Borrowed(""),
            accession: Some(accession),
            controlled_vocabulary: Some(*self),
            unit: Unit::Unknown,
        }
    }

    pub fn param<S: Into<String>>(&self, accession: u32, name: S) -> Param {
        Param {
            name: name.into(),
            value: String::new(),
            accession: Some(accession),
            controlled_vocabulary: Some(*self),
            unit: Unit::Unknown,
        }
    }

    pub fn param_val<S: Into<String>, V: ToString>(&self, accession: u32, name: S, value: V) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }
}

impl Display for ControlledVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown controlled vocabulary {0}")]
pub struct ControlledVocabularyResolutionError(String);

impl FromStr for ControlledVocabulary {
    type Err = ControlledVocabularyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Err(ControlledVocabularyResolutionError(s.to_string())),
        }
    }
}

/// Format a CV prefix and accession number as a CURIE, e.g. `MS:1000511`
pub fn format_curie(cv: ControlledVocabulary, accession: u32) -> String {
    format!("{}:{:07}", cv.prefix(), accession)
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    MZ,
    Minute,
    Second,
    DetectorCounts,
    Electronvolt,
    #[default]
    Unknown,
}

impl Unit {
    /// The accession and name of the unit term
    pub fn for_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),
            Self::MZ => ("MS:1000040", "m/z"),
            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),
            Self::Electronvolt => ("UO:0000266", "electronvolt"),
            Self::Unknown => ("", ""),
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,
            "MS:1000040" => Self::MZ,
            "MS:1000131" => Self::DetectorCounts,
            "UO:0000266" => Self::Electronvolt,
            _ => Self::Unknown,
        }
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<u32>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;
    fn unit(&self) -> Unit;

    fn is_controlled(&self) -> bool {
        self.accession().is_some() && self.controlled_vocabulary().is_some()
    }

    fn curie(&self) -> Option<String> {
        match (self.controlled_vocabulary(), self.accession()) {
            (Some(cv), Some(acc)) => Some(format_curie(cv, acc)),
            _ => None,
        }
    }
}

/// A borrowing parameter, mostly used for compile-time constant terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamCow<'a> {
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl ParamLike for ParamCow<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

impl<'a> From<ParamCow<'a>> for Param {
    fn from(value: ParamCow<'a>) -> Self {
        Param {
            name: value.name.into_owned(),
            value: value.value.into_owned(),
            accession: value.accession,
            controlled_vocabulary: value.controlled_vocabulary,
            unit: value.unit,
        }
    }
}

/// An owned controlled or user parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new_key_value<K: Into<String>, V: Into<String>>(name: K, value: V) -> Param {
        Param {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Param {
        self.unit = unit;
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}
