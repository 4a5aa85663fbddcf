use std::fmt::{self, Formatter};

use jiff::{ToSpan, Zoned};

use crate::interval::IntervalTzLike;

#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Hash)]
pub struct HourTz {
    start: Zoned,
}

impl IntervalTzLike for HourTz {
    fn start(&self) -> Zoned {
        self.start.clone()
    }
    fn end(&self) -> Zoned {
        self.start.saturating_add(1.hours())
    }
}

impl HourTz {
    /// Return the hour that contains this datetime.  Truncation is done on
    /// the instant, so the two 03:00 hours of a fall-back day stay distinct.
    pub fn containing(dt: &Zoned) -> HourTz {
        let into_hour = dt.timestamp().as_second().rem_euclid(3600);
        let start = dt
            .saturating_sub(into_hour.seconds())
            .saturating_sub(i64::from(dt.subsec_nanosecond()).nanoseconds());
        HourTz { start }
    }

    /// Hour of day in local time, 0-23.
    pub fn hour(&self) -> i8 {
        self.start.hour()
    }

    /// Local start of the hour with its UTC offset, e.g. `2025-03-30T04:00:00+03:00`
    pub fn iso_start(&self) -> String {
        self.start.strftime("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }

    pub fn next(&self) -> HourTz {
        HourTz { start: self.end() }
    }
}

impl fmt::Display for HourTz {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let out = format!(
            "[{}, {})",
            self.start.strftime("%Y-%m-%dT%H:%M:%S%:z"),
            self.end().strftime("%Y-%m-%dT%H:%M:%S%:z")
        );
        f.write_str(&out)
    }
}
