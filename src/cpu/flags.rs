//! Condition flags set by `CP` and read by conditional `JP`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The six condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    pub z: bool,
    pub eq: bool,
    pub gt: bool,
    pub lt: bool,
    pub gte: bool,
    pub lte: bool,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every flag.
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Set all six flags from a comparison result.
    ///
    /// `None` (a float comparison involving NaN) clears every flag.
    pub fn set_from_ordering(&mut self, ordering: Option<Ordering>) {
        self.reset_all();
        let Some(ordering) = ordering else {
            return;
        };

        self.eq = ordering == Ordering::Equal;
        self.z = self.eq;
        self.gt = ordering == Ordering::Greater;
        self.lt = ordering == Ordering::Less;
        self.gte = self.gt || self.eq;
        self.lte = self.lt || self.eq;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            ("Z", self.z),
            ("EQ", self.eq),
            ("GT", self.gt),
            ("LT", self.lt),
            ("GTE", self.gte),
            ("LTE", self.lte),
        ];
        let mut first = true;
        for (name, set) in names {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if set {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}", name.to_lowercase())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal() {
        let mut flags = Flags::new();
        flags.set_from_ordering(Some(Ordering::Equal));
        assert!(flags.z && flags.eq && flags.gte && flags.lte);
        assert!(!flags.gt && !flags.lt);
    }

    #[test]
    fn test_greater_then_less() {
        let mut flags = Flags::new();
        flags.set_from_ordering(Some(Ordering::Greater));
        assert!(flags.gt && flags.gte);
        assert!(!flags.lt && !flags.lte && !flags.eq && !flags.z);

        flags.set_from_ordering(Some(Ordering::Less));
        assert!(flags.lt && flags.lte);
        assert!(!flags.gt && !flags.gte);
    }

    #[test]
    fn test_unordered_clears() {
        let mut flags = Flags::new();
        flags.set_from_ordering(Some(Ordering::Equal));
        flags.set_from_ordering(None);
        assert_eq!(flags, Flags::default());
    }

    #[test]
    fn test_display() {
        let mut flags = Flags::new();
        flags.set_from_ordering(Some(Ordering::Less));
        assert_eq!(flags.to_string(), "z eq gt LT gte LTE");
    }
}
