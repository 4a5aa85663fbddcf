pub mod date_tz;
pub mod hour_tz;

use jiff::{tz::TimeZone, Zoned};

/// Market time zone of the Czech bidding zone (CET/CEST).
pub const PRAGUE: &str = "Europe/Prague";

/// Market time zone of the Romanian bidding zone (EET/EEST).
pub const BUCHAREST: &str = "Europe/Bucharest";

pub trait IntervalTzLike {
    fn start(&self) -> Zoned;
    fn end(&self) -> Zoned;
    fn contains(&self, dt: &Zoned) -> bool {
        dt >= &self.start() && dt < &self.end()
    }
    fn time_zone(&self) -> TimeZone {
        self.start().time_zone().clone()
    }
}
