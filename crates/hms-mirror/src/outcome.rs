//! Issue categories and the aggregate outcome code.
//!
//! Each category owns one bit. A table records the categories it raised,
//! and a run's outcome code is the union over every table and database.
//! Zero means a clean run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Category of a raised issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// Table shape not supported by the configured strategy.
    StrategyRejected,
    /// A strategy step failed or timed out.
    StepFailed,
    /// LEFT or RIGHT metadata could not be fetched.
    MetadataFetch,
    /// Target database could not be created.
    DatabaseCreation,
    /// Source table list could not be read.
    CollectingTables,
    /// Table task ended abnormally.
    TaskAborted,
}

impl IssueCode {
    pub const ALL: [IssueCode; 6] = [
        IssueCode::StrategyRejected,
        IssueCode::StepFailed,
        IssueCode::MetadataFetch,
        IssueCode::DatabaseCreation,
        IssueCode::CollectingTables,
        IssueCode::TaskAborted,
    ];

    pub fn bit(self) -> u64 {
        1 << (self as u32)
    }

    pub fn description(self) -> &'static str {
        match self {
            IssueCode::StrategyRejected => "table rejected by strategy selection",
            IssueCode::StepFailed => "strategy step failed",
            IssueCode::MetadataFetch => "issue collecting table definitions",
            IssueCode::DatabaseCreation => "issue creating target database",
            IssueCode::CollectingTables => "issue collecting tables",
            IssueCode::TaskAborted => "table task aborted",
        }
    }
}

/// Set of issue categories, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeCode(u64);

impl OutcomeCode {
    pub const CLEAN: OutcomeCode = OutcomeCode(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, code: IssueCode) {
        self.0 |= code.bit();
    }

    pub fn contains(self, code: IssueCode) -> bool {
        self.0 & code.bit() != 0
    }

    /// Categories present, in declaration order.
    pub fn codes(self) -> Vec<IssueCode> {
        IssueCode::ALL.into_iter().filter(|c| self.contains(*c)).collect()
    }
}

impl From<IssueCode> for OutcomeCode {
    fn from(code: IssueCode) -> Self {
        OutcomeCode(code.bit())
    }
}

impl BitOr for OutcomeCode {
    type Output = OutcomeCode;

    fn bitor(self, rhs: Self) -> Self::Output {
        OutcomeCode(self.0 | rhs.0)
    }
}

impl BitOrAssign for OutcomeCode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_categories() {
        let mut code = OutcomeCode::CLEAN;
        assert!(code.is_clean());
        code.insert(IssueCode::StepFailed);
        code |= OutcomeCode::from(IssueCode::StrategyRejected);
        code |= OutcomeCode::from(IssueCode::StepFailed);

        assert!(!code.is_clean());
        assert_eq!(code.bits(), 0b11);
        assert_eq!(code.codes(), vec![IssueCode::StrategyRejected, IssueCode::StepFailed]);
    }

    #[test]
    fn test_bits_are_distinct() {
        let total = IssueCode::ALL
            .iter()
            .fold(OutcomeCode::CLEAN, |acc, c| acc | OutcomeCode::from(*c));
        assert_eq!(total.bits().count_ones() as usize, IssueCode::ALL.len());
    }
}
