//! Calendar-month bucket used by the budget accountant's counter keys
//! (`cost:<key>:<yyyy>:<mm>`) and the reconciler's summary rows.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Self {
        debug_assert!((1..=12).contains(&month));
        Self { year, month }
    }

    /// Key suffix used by the counter store: `<yyyy>:<mm>`.
    pub fn counter_suffix(self) -> String {
        format!("{:04}:{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_suffix_is_zero_padded() {
        assert_eq!(YearMonth::new(2026, 1).counter_suffix(), "2026:01");
        assert_eq!(YearMonth::new(2026, 12).counter_suffix(), "2026:12");
    }
}
