//! The trailing one-month date window that a run exports.

use chrono::{Months, NaiveDate, Utc};
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Prefix of the generated spreadsheet file name.
const FILE_PREFIX: &str = "planilha";

/// The extension of the generated spreadsheet file.
const FILE_EXTENSION: &str = "xlsx";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The `(start, end)` pair of calendar dates that bounds an export. `start` is always one calendar
/// month before `end`, so `start <= end`.
///
/// When the day of `end` does not exist in the previous month, `start` is clamped to the last day
/// of that month: a window ending on 2024-03-31 starts on 2024-02-29, and one ending on 2023-03-31
/// starts on 2023-02-28.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// The window that ends on `end` and starts one calendar month earlier.
    pub fn trailing_month(end: NaiveDate) -> Self {
        // Only fails at the very start of chrono's representable range.
        let start = end.checked_sub_months(Months::new(1)).unwrap_or(end);
        Self { start, end }
    }

    /// The window that ends today (UTC).
    pub fn current() -> Self {
        Self::trailing_month(today())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// The name of the spreadsheet file for this window, e.g.
    /// `planilha2024-01-01a2024-02-01.xlsx`. Runs for the same window produce the same name.
    pub fn file_name(&self) -> String {
        format!(
            "{FILE_PREFIX}{}a{}.{FILE_EXTENSION}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// The current calendar date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
