//! Quality-control filter categories of the chunked scan.
//!
//! The scan marks each read pair with the categories it failed. A run excludes
//! a set of categories, passed to the scan as a single bitmask where category
//! `k` occupies bit `k - 1`.

use crate::error::{MatrixError, Result};
use std::fmt;
use std::str::FromStr;

/// Named read-pair filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterCategory {
    SelfCircle = 1,
    DanglingEnd = 2,
    Error = 3,
    ExtraDanglingEnd = 4,
    TooCloseFromRes = 5,
    TooShort = 6,
    TooLarge = 7,
    OverRepresented = 8,
    Duplicated = 9,
    RandomBreaks = 10,
    TransChromosomic = 11,
}

impl FilterCategory {
    pub const ALL: [FilterCategory; 11] = [
        FilterCategory::SelfCircle,
        FilterCategory::DanglingEnd,
        FilterCategory::Error,
        FilterCategory::ExtraDanglingEnd,
        FilterCategory::TooCloseFromRes,
        FilterCategory::TooShort,
        FilterCategory::TooLarge,
        FilterCategory::OverRepresented,
        FilterCategory::Duplicated,
        FilterCategory::RandomBreaks,
        FilterCategory::TransChromosomic,
    ];

    /// Category number, 1 through 11.
    #[inline]
    pub fn number(&self) -> u32 {
        *self as u32
    }

    pub fn from_number(n: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.number() == n)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SelfCircle => "self-circle",
            Self::DanglingEnd => "dangling-end",
            Self::Error => "error",
            Self::ExtraDanglingEnd => "extra-dangling-end",
            Self::TooCloseFromRes => "too-close-from-res",
            Self::TooShort => "too-short",
            Self::TooLarge => "too-large",
            Self::OverRepresented => "over-represented",
            Self::Duplicated => "duplicated",
            Self::RandomBreaks => "random-breaks",
            Self::TransChromosomic => "trans-chromosomic",
        }
    }

    #[inline]
    fn bit(&self) -> u32 {
        1 << (self.number() - 1)
    }
}

impl FromStr for FilterCategory {
    type Err = MatrixError;

    /// Accepts a category number or its name (`_` and `-` are interchangeable).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Self::from_number(n)
                .ok_or_else(|| MatrixError::Config(format!("Unknown filter number: {}", n)));
        }
        let normalized = s.to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| MatrixError::Config(format!("Unknown filter category: '{}'", s)))
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Union of excluded filter categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterMask(u32);

impl FilterMask {
    pub fn from_categories<I: IntoIterator<Item = FilterCategory>>(categories: I) -> Self {
        Self(categories.into_iter().fold(0, |mask, c| mask | c.bit()))
    }

    /// Parse a comma-separated list of names or numbers, or a bare integer mask
    /// prefixed with `mask:`.
    pub fn parse_list(s: &str) -> Result<Self> {
        if let Some(bits) = s.trim().strip_prefix("mask:") {
            return bits
                .parse()
                .map(Self)
                .map_err(|_| MatrixError::Config(format!("Invalid filter mask: '{}'", bits)));
        }
        let categories = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<FilterCategory>>>()?;
        Ok(Self::from_categories(categories))
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn excludes(&self, category: FilterCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn categories(&self) -> impl Iterator<Item = FilterCategory> + '_ {
        FilterCategory::ALL.iter().copied().filter(|c| self.excludes(*c))
    }
}

impl Default for FilterMask {
    /// Everything except "too close from RES" and trans-chromosomic pairs.
    fn default() -> Self {
        Self::from_categories([
            FilterCategory::SelfCircle,
            FilterCategory::DanglingEnd,
            FilterCategory::Error,
            FilterCategory::ExtraDanglingEnd,
            FilterCategory::TooShort,
            FilterCategory::TooLarge,
            FilterCategory::OverRepresented,
            FilterCategory::Duplicated,
            FilterCategory::RandomBreaks,
        ])
    }
}

impl fmt::Display for FilterMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.categories().map(|c| c.name()).collect();
        write!(f, "{} ({})", self.0, names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mask() {
        // bits for 1,2,3,4,6,7,8,9,10
        assert_eq!(FilterMask::default().bits(), 0b11_1110_1111);
        assert!(!FilterMask::default().excludes(FilterCategory::TooCloseFromRes));
        assert!(!FilterMask::default().excludes(FilterCategory::TransChromosomic));
    }

    #[test]
    fn test_parse_names_and_numbers() {
        let mask = FilterMask::parse_list("self-circle, 2,too_short").unwrap();
        assert_eq!(mask.bits(), 1 | 2 | 32);
        let cats: Vec<_> = mask.categories().collect();
        assert_eq!(
            cats,
            vec![
                FilterCategory::SelfCircle,
                FilterCategory::DanglingEnd,
                FilterCategory::TooShort
            ]
        );
    }

    #[test]
    fn test_parse_raw_mask() {
        assert_eq!(FilterMask::parse_list("mask:783").unwrap().bits(), 783);
        assert!(FilterMask::parse_list("mask:x").is_err());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(FilterMask::parse_list("12").is_err());
        assert!(FilterMask::parse_list("chimeric").is_err());
        assert_eq!(FilterMask::parse_list("").unwrap().bits(), 0);
    }

    #[test]
    fn test_mask_dedups() {
        let mask = FilterMask::from_categories([FilterCategory::Error, FilterCategory::Error]);
        assert_eq!(mask.bits(), 4);
    }
}
