use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jiff::{civil::Date, SignedDuration, Timestamp};
use log::info;
use quick_xml::de::from_str;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::entsoe::lib_entsoe::{parse_resolution, EntsoeClient, Period, RO_BIDDING_ZONE};
use crate::db::lib_archive::{
    append_rows, existing_dates, throttle, year_file, ArchiveRow, UpdateSummary,
};
use crate::interval::{date_tz::DateTz, hour_tz::HourTz, IntervalTzLike, BUCHAREST};
use crate::utils::stats::fmt_dp;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub date: Date,
    pub hour: HourTz,
    pub price: Option<Decimal>,
}

impl ArchiveRow for PriceRow {
    fn header() -> &'static [&'static str] {
        &["date", "hour", "interval_start", "price_eur_mwh"]
    }

    fn date(&self) -> Date {
        self.date
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.hour.hour().to_string(),
            self.hour.iso_start(),
            self.price.map(|e| fmt_dp(e, 2)).unwrap_or_default(),
        ]
    }
}

/// One row per local hour of the day, without a price.
pub fn placeholder_rows(day: &DateTz) -> Vec<PriceRow> {
    day.hours()
        .into_iter()
        .map(|hour| PriceRow {
            date: day.date(),
            hour,
            price: None,
        })
        .collect()
}

/// Parse an A44 document (day-ahead prices) into hourly rows for the day.
///
/// Points are placed in time from the period start and the resolution, so
/// hours follow the local EET/EEST clock, 23 or 25 of them on DST days.
/// For curve type A03 a missing position repeats the previous price.
/// Quarter-hour prices are averaged over the hour, an hourly price takes
/// precedence over the average.
///
pub fn parse_prices(xml: &str, day: &DateTz) -> Result<Vec<PriceRow>, Box<dyn Error>> {
    let doc: PriceDocument = from_str(xml)?;
    let tz = day.time_zone();
    let mut hourly: BTreeMap<Timestamp, Decimal> = BTreeMap::new();
    let mut sub_hourly: BTreeMap<Timestamp, Vec<Decimal>> = BTreeMap::new();

    for ts in doc.time_series {
        let fill = ts.curve_type.as_deref().map(str::trim) == Some("A03");
        for period in &ts.periods {
            if period.points.is_empty() {
                continue;
            }
            let step = parse_resolution(&period.resolution)?;
            let (start, end) = period
                .time_interval
                .as_ref()
                .ok_or("Period without a timeInterval")?
                .parse()?;
            let slots = end.duration_since(start).as_secs() / step.as_secs();

            let mut points: BTreeMap<i64, Decimal> = BTreeMap::new();
            for point in &period.points {
                if let Ok(price) = Decimal::from_str(point.price.trim()) {
                    points.insert(point.position, price);
                }
            }
            let points = if fill { fill_curve(&points, slots) } else { points };

            for (position, price) in points {
                if position < 1 {
                    continue;
                }
                let instant = start.checked_add(SignedDuration::from_secs(
                    step.as_secs() * (position - 1),
                ))?;
                let hour = HourTz::containing(&instant.to_zoned(tz.clone()));
                let key = hour.start().timestamp();
                if step >= SignedDuration::from_hours(1) {
                    hourly.insert(key, price);
                } else {
                    sub_hourly.entry(key).or_default().push(price);
                }
            }
        }
    }

    let mut rows = Vec::new();
    for hour in day.hours() {
        let key = hour.start().timestamp();
        let price = match hourly.get(&key) {
            Some(price) => Some(*price),
            None => sub_hourly
                .get(&key)
                .filter(|e| !e.is_empty())
                .map(|e| e.iter().sum::<Decimal>() / Decimal::from(e.len())),
        };
        if let Some(price) = price {
            rows.push(PriceRow {
                date: day.date(),
                hour,
                price: Some(price),
            });
        }
    }
    Ok(rows)
}

/// Expand a curve where only changes are published (curve type A03).
fn fill_curve(points: &BTreeMap<i64, Decimal>, slots: i64) -> BTreeMap<i64, Decimal> {
    let mut out = BTreeMap::new();
    let mut current: Option<Decimal> = None;
    for position in 1..=slots {
        if let Some(price) = points.get(&position) {
            current = Some(*price);
        }
        if let Some(price) = current {
            out.insert(position, price);
        }
    }
    out
}

#[derive(Clone)]
pub struct RoDamArchive {
    pub base_dir: String,
    pub delay: Duration,
}

impl RoDamArchive {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.base_dir)
    }

    /// Get the A44 document for a delivery day, `None` if there is no data.
    pub fn fetch_document(
        &self,
        client: &EntsoeClient,
        day: &DateTz,
    ) -> Result<Option<String>, Box<dyn Error>> {
        let (period_start, period_end) = day.utc_period();
        client.get_document(&[
            ("documentType", "A44".to_string()),
            ("processType", "A01".to_string()),
            ("in_Domain", RO_BIDDING_ZONE.to_string()),
            ("out_Domain", RO_BIDDING_ZONE.to_string()),
            ("periodStart", period_start),
            ("periodEnd", period_end),
        ])
    }

    pub fn update_days(
        &self,
        client: &EntsoeClient,
        days: &[Date],
    ) -> Result<UpdateSummary, Box<dyn Error>> {
        let mut summary = UpdateSummary {
            total: days.len(),
            ..Default::default()
        };
        let mut existing: HashMap<i16, HashSet<Date>> = HashMap::new();

        for (i, day) in days.iter().enumerate() {
            let year = day.year();
            let path = year_file(&self.dir(), year);
            if !existing.contains_key(&year) {
                existing.insert(year, existing_dates(&path)?);
            }
            if existing.get(&year).is_some_and(|e| e.contains(day)) {
                info!("  [{}/{}] {} [SKIP]", i + 1, days.len(), day);
                summary.skipped += 1;
                continue;
            }

            let day_tz = DateTz::new(*day, BUCHAREST)?;
            let rows = match self.fetch_document(client, &day_tz)? {
                None => {
                    let rows = placeholder_rows(&day_tz);
                    info!(
                        "  [{}/{}] {} [NO DATA] -> {} NaN rows",
                        i + 1,
                        days.len(),
                        day,
                        rows.len()
                    );
                    rows
                }
                Some(xml) => {
                    let rows = parse_prices(&xml, &day_tz)?;
                    if rows.is_empty() {
                        let rows = placeholder_rows(&day_tz);
                        info!(
                            "  [{}/{}] {} [EMPTY] -> {} NaN rows",
                            i + 1,
                            days.len(),
                            day,
                            rows.len()
                        );
                        rows
                    } else {
                        info!(
                            "  [{}/{}] {} [OK] {} rows",
                            i + 1,
                            days.len(),
                            day,
                            rows.len()
                        );
                        rows
                    }
                }
            };
            append_rows(&path, &rows)?;
            existing.entry(year).or_default().insert(*day);
            summary.fetched += 1;
            throttle(self.delay, i, days.len());
        }
        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct PriceDocument {
    #[serde(rename = "TimeSeries", default)]
    time_series: Vec<PriceSeries>,
}

#[derive(Debug, Deserialize)]
struct PriceSeries {
    #[serde(rename = "curveType", default)]
    curve_type: Option<String>,
    #[serde(rename = "Period", default)]
    periods: Vec<Period<PricePoint>>,
}

#[derive(Debug, Deserialize)]
struct PricePoint {
    position: i64,
    #[serde(rename = "price.amount")]
    price: String,
}
