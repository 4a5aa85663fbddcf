use std::error::Error;
use std::fmt;

use jiff::{civil::Date, tz::TimeZone, ToSpan, Zoned};

use crate::interval::{hour_tz::HourTz, IntervalTzLike};

/// A delivery day in a given market time zone.  Depending on DST
/// it has 23, 24 or 25 hours.
#[derive(Clone, Debug, PartialEq)]
pub struct DateTz(Zoned);

impl PartialOrd for DateTz {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl DateTz {
    pub fn new(date: Date, tz: &str) -> Result<DateTz, Box<dyn Error>> {
        let start = date.to_zoned(TimeZone::get(tz)?)?;
        Ok(DateTz(start))
    }

    pub fn containing(zoned: &Zoned) -> Result<DateTz, Box<dyn Error>> {
        Ok(DateTz(zoned.start_of_day()?))
    }

    pub fn date(&self) -> Date {
        self.0.date()
    }

    pub fn year(&self) -> i16 {
        self.0.year()
    }

    pub fn next(&self) -> DateTz {
        DateTz(self.0.saturating_add(1.day()))
    }

    pub fn previous(&self) -> DateTz {
        DateTz(self.0.saturating_sub(1.day()))
    }

    /// Inclusive of the end date.
    pub fn up_to(&self, end: &DateTz) -> Result<Vec<DateTz>, Box<dyn Error>> {
        if self > end {
            return Err(format!("start date {} is after end date {}", self, end).into());
        }
        let mut res: Vec<DateTz> = Vec::new();
        let mut current = self.clone();
        while current.date() <= end.date() {
            res.push(current.clone());
            current = current.next();
        }
        Ok(res)
    }

    /// The hours of this day, in local time.
    pub fn hours(&self) -> Vec<HourTz> {
        let end = self.end();
        let mut out: Vec<HourTz> = Vec::new();
        let mut current = self.start();
        while current < end {
            out.push(HourTz::containing(&current));
            current = current.saturating_add(1.hour());
        }
        out
    }

    /// The `(periodStart, periodEnd)` of this day as `YYYYMMDDHHmm` in UTC,
    /// the format used by the ENTSO-E Transparency API.
    pub fn utc_period(&self) -> (String, String) {
        let fmt = "%Y%m%d%H%M";
        (
            self.start()
                .with_time_zone(TimeZone::UTC)
                .strftime(fmt)
                .to_string(),
            self.end()
                .with_time_zone(TimeZone::UTC)
                .strftime(fmt)
                .to_string(),
        )
    }
}

/// Delivery days of an update run: `from..=to` when both are given,
/// otherwise yesterday and today in the market time zone.
pub fn update_window(
    from: Option<Date>,
    to: Option<Date>,
    tz: &str,
) -> Result<Vec<Date>, Box<dyn Error>> {
    let (start, end) = match (from, to) {
        (Some(from), Some(to)) => (DateTz::new(from, tz)?, DateTz::new(to, tz)?),
        (None, None) => {
            let today = DateTz::containing(&Zoned::now().with_time_zone(TimeZone::get(tz)?))?;
            (today.previous(), today)
        }
        _ => return Err("--from and --to must be given together".into()),
    };
    Ok(start.up_to(&end)?.iter().map(|e| e.date()).collect())
}

impl IntervalTzLike for DateTz {
    fn start(&self) -> Zoned {
        self.0.clone()
    }
    fn end(&self) -> Zoned {
        self.0.saturating_add(1.day())
    }
}

impl fmt::Display for DateTz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.date())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::{civil::date, Zoned};

    use crate::interval::{
        date_tz::{update_window, DateTz},
        IntervalTzLike, BUCHAREST, PRAGUE,
    };

    #[test]
    fn test_date() -> Result<(), Box<dyn Error>> {
        let day = DateTz::new(date(2022, 1, 1), PRAGUE)?;
        assert_eq!(day.next(), DateTz::new(date(2022, 1, 2), PRAGUE)?);
        assert_eq!(day.previous(), DateTz::new(date(2021, 12, 31), PRAGUE)?);
        assert_eq!(day.to_string(), "2022-01-01");
        Ok(())
    }

    #[test]
    fn hours_in_dst_days() -> Result<(), Box<dyn Error>> {
        assert_eq!(DateTz::new(date(2025, 3, 30), PRAGUE)?.hours().len(), 23);
        assert_eq!(DateTz::new(date(2025, 6, 1), PRAGUE)?.hours().len(), 24);
        assert_eq!(DateTz::new(date(2025, 10, 26), BUCHAREST)?.hours().len(), 25);
        Ok(())
    }

    #[test]
    fn utc_period() -> Result<(), Box<dyn Error>> {
        let winter = DateTz::new(date(2025, 1, 15), PRAGUE)?;
        assert_eq!(
            winter.utc_period(),
            ("202501142300".to_string(), "202501152300".to_string())
        );
        let summer = DateTz::new(date(2025, 7, 1), PRAGUE)?;
        assert_eq!(
            summer.utc_period(),
            ("202506302200".to_string(), "202507012200".to_string())
        );
        // spring forward, only 23 hours
        let spring = DateTz::new(date(2025, 3, 30), BUCHAREST)?;
        assert_eq!(
            spring.utc_period(),
            ("202503292200".to_string(), "202503302100".to_string())
        );
        Ok(())
    }

    #[test]
    fn up_to() -> Result<(), Box<dyn Error>> {
        let start = DateTz::new(date(2024, 12, 30), PRAGUE)?;
        let end = DateTz::new(date(2025, 1, 2), PRAGUE)?;
        let days = start.up_to(&end)?;
        assert_eq!(days.len(), 4);
        assert_eq!(days[3], end);
        assert!(end.up_to(&start).is_err());
        let dt: Zoned = "2024-12-30T23:59:00[Europe/Prague]".parse()?;
        assert!(days[0].contains(&dt));
        assert!(!days[1].contains(&dt));
        Ok(())
    }

    #[test]
    fn window_of_an_update_run() -> Result<(), Box<dyn Error>> {
        let days = update_window(Some(date(2025, 2, 27)), Some(date(2025, 3, 1)), PRAGUE)?;
        assert_eq!(days, vec![date(2025, 2, 27), date(2025, 2, 28), date(2025, 3, 1)]);
        let days = update_window(None, None, BUCHAREST)?;
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].tomorrow()?, days[1]);
        assert!(update_window(Some(date(2025, 1, 1)), None, PRAGUE).is_err());
        assert!(update_window(Some(date(2025, 1, 2)), Some(date(2025, 1, 1)), PRAGUE).is_err());
        Ok(())
    }
}
