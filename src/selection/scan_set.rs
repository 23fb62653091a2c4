use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::spectrum::ScanId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanSetError {
    #[error("Invalid scan id specification: {0}")]
    InvalidFormat(String),
    #[error("The scan id specification is empty")]
    EmptySpecification,
}

/**
A set of scan numbers parsed from a textual specification like `1-3,5,10-12`.

Tokens are separated by commas and are either a single scan number or an
inclusive `start-end` range. A range whose start is greater than its end
contributes nothing rather than failing. Duplicate ids collapse and iteration
is always in ascending order regardless of the order they were written in.
*/
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSet {
    scans: BTreeSet<ScanId>,
}

fn parse_bound(text: &str, token: &str) -> Result<ScanId, ScanSetError> {
    text.trim()
        .parse::<ScanId>()
        .map_err(|e| ScanSetError::InvalidFormat(format!("{token:?} is not a valid scan id or range: {e}")))
}

impl ScanSet {
    pub fn parse(text: &str) -> Result<Self, ScanSetError> {
        if text.is_empty() {
            return Err(ScanSetError::EmptySpecification);
        }
        if let Some(c) = text
            .chars()
            .find(|c| !(c.is_ascii_digit() || matches!(c, ',' | '-' | ' ')))
        {
            return Err(ScanSetError::InvalidFormat(format!(
                "{c:?} is not permitted, only digits, ',', '-' and ' ' are allowed"
            )));
        }

        let mut scans = BTreeSet::new();
        for token in text.split(',') {
            if token.is_empty() {
                return Err(ScanSetError::InvalidFormat(
                    "empty scan id between commas".to_string(),
                ));
            }
            let bounds: Vec<&str> = token.split('-').collect();
            match bounds.as_slice() {
                [single] => {
                    scans.insert(parse_bound(single, token)?);
                }
                [start, end] => {
                    let start = parse_bound(start, token)?;
                    let end = parse_bound(end, token)?;
                    scans.extend(start..=end);
                }
                _ => {
                    return Err(ScanSetError::InvalidFormat(format!(
                        "{token:?} has more than one '-'"
                    )))
                }
            }
        }
        Ok(Self { scans })
    }

    pub fn contains(&self, scan_id: ScanId) -> bool {
        self.scans.contains(&scan_id)
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, ScanId> {
        self.scans.iter()
    }
}

impl FromStr for ScanSet {
    type Err = ScanSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<ScanId> for ScanSet {
    fn from_iter<T: IntoIterator<Item = ScanId>>(iter: T) -> Self {
        Self {
            scans: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ScanSet {
    type Item = &'a ScanId;
    type IntoIter = btree_set::Iter<'a, ScanId>;

    fn into_iter(self) -> Self::IntoIter {
        self.scans.iter()
    }
}

impl Display for ScanSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        let mut iter = self.scans.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while end.checked_add(1).is_some_and(|next| iter.peek() == Some(&next)) {
                end += 1;
                iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ids(set: &ScanSet) -> Vec<ScanId> {
        set.iter().copied().collect()
    }

    #[test]
    fn test_parse_ranges() -> Result<(), ScanSetError> {
        let set = ScanSet::parse("1-3,5")?;
        assert_eq!(ids(&set), vec![1, 2, 3, 5]);

        let set: ScanSet = "10, 2 - 4,3".parse()?;
        assert_eq!(ids(&set), vec![2, 3, 4, 10]);
        assert!(set.contains(10));
        assert!(!set.contains(5));
        Ok(())
    }

    #[test]
    fn test_reversed_range_is_empty() -> Result<(), ScanSetError> {
        assert!(ScanSet::parse("5-3")?.is_empty());
        assert_eq!(ids(&ScanSet::parse("5-3,7")?), vec![7]);
        Ok(())
    }

    #[test]
    fn test_invalid_characters() {
        for text in ["1;2", "a", "1-3,x", "1.5", "+3"] {
            assert!(
                matches!(ScanSet::parse(text), Err(ScanSetError::InvalidFormat(_))),
                "{text} should have been rejected"
            );
        }
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(ScanSet::parse(""), Err(ScanSetError::EmptySpecification));
        for text in ["1-2-3", "1,,2", "1,", "-3", "4-", " ", "99999999999"] {
            assert!(
                matches!(ScanSet::parse(text), Err(ScanSetError::InvalidFormat(_))),
                "{text} should have been rejected"
            );
        }
    }

    #[test]
    fn test_display_compacts_ranges() -> Result<(), ScanSetError> {
        let set = ScanSet::parse("7,1-3,5,6")?;
        assert_eq!(set.to_string(), "1-3,5-7");
        assert_eq!(ScanSet::parse(&set.to_string())?, set);

        assert_eq!(ScanSet::parse("4294967295")?.to_string(), "4294967295");
        assert_eq!(
            ScanSet::parse("4294967295,4294967293-4294967294")?.to_string(),
            "4294967293-4294967295"
        );
        Ok(())
    }
}
