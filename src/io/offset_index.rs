use std::fmt::Display;

use indexmap::map::Iter;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The kind of element an index group points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Spectrum,
    Chromatogram,
}

impl ElementType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spectrum => "spectrum",
            Self::Chromatogram => "chromatogram",
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The location of one written element within the uncompressed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIndexEntry {
    pub element_type: ElementType,
    pub element_id: String,
    /// Offset from the start of the document to the element's opening `<`
    pub byte_offset: u64,
}

/**
An ordered mapping from element ID to the byte offset it was written at.

Entries are kept in the order they were recorded, which is the order the
elements appear in the document. A wrapper around [`indexmap::IndexMap`].
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    pub element_type: ElementType,
    pub offsets: IndexMap<Box<str>, u64>,
}

impl OffsetIndex {
    pub fn new(element_type: ElementType) -> OffsetIndex {
        OffsetIndex {
            element_type,
            offsets: IndexMap::new(),
        }
    }

    /// The `name` attribute of this index's `<index>` group
    pub fn name(&self) -> &'static str {
        self.element_type.name()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Record `key` at `offset`, returning the previous offset if the key was already present
    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, key: T, offset: u64) -> Option<u64> {
        self.offsets.insert(key.into(), offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Box<str>, u64> {
        self.offsets.iter()
    }

    /// The recorded locations as standalone entries, in document order
    pub fn entries(&self) -> impl Iterator<Item = OutputIndexEntry> + '_ {
        self.offsets.iter().map(|(k, v)| OutputIndexEntry {
            element_type: self.element_type,
            element_id: k.to_string(),
            byte_offset: *v,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_preserves_insertion_order() {
        let mut index = OffsetIndex::new(ElementType::Spectrum);
        index.insert("scan=2", 100);
        index.insert("scan=1", 250);
        assert_eq!(index.insert("scan=2", 300), Some(100));
        assert_eq!(index.name(), "spectrum");
        let entries: Vec<_> = index.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].element_id, "scan=2");
        assert_eq!(entries[0].byte_offset, 300);
        assert_eq!(entries[1].element_type, ElementType::Spectrum);
        assert_eq!(index.get("scan=1"), Some(250));
    }
}
