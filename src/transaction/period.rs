//! The reporting periods transactions can be filtered by.

use serde::{Deserialize, Serialize};
use time::{Date, Duration};

/// A window of days ending today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Since the start of today.
    Today,
    /// Since the same day last week.
    Week,
    /// Since the first day of this month.
    Month,
    /// No date filter.
    #[default]
    All,
}

impl Period {
    /// The name used in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::All => "all",
        }
    }

    /// Parse a period from a query string value.
    ///
    /// Absent and unknown periods mean [Period::All]; unknown values are logged.
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("all") => Period::All,
            Some("today") => Period::Today,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            Some(other) => {
                tracing::warn!("Unknown period {other:?}, showing all transactions");
                Period::All
            }
        }
    }

    /// The first day included in the period, or `None` if every day is included.
    ///
    /// `today` should be the current date in the local timezone.
    pub fn start_date(self, today: Date) -> Option<Date> {
        match self {
            Period::Today => Some(today),
            Period::Week => Some(today.saturating_sub(Duration::days(7))),
            Period::Month => Some(today.replace_day(1).unwrap_or(today)),
            Period::All => None,
        }
    }
}
