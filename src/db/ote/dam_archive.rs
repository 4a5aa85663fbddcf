use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use jiff::civil::{date, Date};
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;

use crate::db::lib_archive::{
    append_rows, existing_dates, http_client, throttle, year_file, ArchiveRow, FetchError,
    UpdateSummary,
};

/// First delivery day of the 15 minute day-ahead market.
pub const QH_MARKET_START: Date = date(2025, 10, 1);

pub const OTE_CHART_DATA_URL: &str =
    "https://www.ote-cr.cz/en/short-term-markets/electricity/day-ahead-market/@@chart-data";

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRow {
    pub date: Date,
    pub hour: u8,
    pub price: Option<f64>,
    pub volume: Option<f64>,
}

impl ArchiveRow for HourlyRow {
    fn header() -> &'static [&'static str] {
        &["date", "hour", "price_eur_mwh", "volume_mwh"]
    }

    fn date(&self) -> Date {
        self.date
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.hour.to_string(),
            fmt_opt(self.price),
            fmt_opt(self.volume),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QhRow {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
    pub price: Option<f64>,
    pub volume: Option<f64>,
}

impl ArchiveRow for QhRow {
    fn header() -> &'static [&'static str] {
        &["date", "hour", "minute", "price_eur_mwh", "volume_mwh"]
    }

    fn date(&self) -> Date {
        self.date
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.hour.to_string(),
            self.minute.to_string(),
            fmt_opt(self.price),
            fmt_opt(self.volume),
        ]
    }
}

/// Whole numbers keep one decimal, e.g. `1003.0`, as in the existing files.
fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(e) if e.is_finite() && e.fract() == 0.0 => format!("{:.1}", e),
        Some(e) => e.to_string(),
        None => String::new(),
    }
}

/// Rows parsed from one chart-data response.  `qh` is empty before the
/// quarter-hour market started.
#[derive(Debug, Default)]
pub struct DayData {
    pub qh: Vec<QhRow>,
    pub hourly: Vec<HourlyRow>,
}

#[derive(Clone)]
pub struct OteDamArchive {
    pub base_dir: String,
    pub base_url: String,
    pub delay: Duration,
}

impl OteDamArchive {
    pub fn hourly_dir(&self) -> PathBuf {
        PathBuf::from(&self.base_dir).join("hourly")
    }

    pub fn qh_dir(&self) -> PathBuf {
        PathBuf::from(&self.base_dir).join("qh")
    }

    pub fn url(&self, day: &Date) -> String {
        format!(
            "{}?report_date={}&time_resolution=60",
            self.base_url,
            day.strftime("%Y-%m-%d")
        )
    }

    /// Get the raw chart-data json for a delivery day.
    pub fn fetch(&self, client: &Client, day: &Date) -> Result<String, Box<dyn Error>> {
        let response = client
            .get(self.url(day))
            .header(ACCEPT, "application/json")
            .send()?;
        if !response.status().is_success() {
            return Err(Box::new(FetchError::UnexpectedStatus {
                service: "OTE".to_string(),
                status: response.status().as_u16(),
            }));
        }
        Ok(response.text()?)
    }

    /// Fetch and append the days that are not in the archive yet.
    ///
    /// A day is complete when its hourly rows are present and, from
    /// [`QH_MARKET_START`] on, its quarter-hour rows too.
    pub fn update_days(&self, days: &[Date]) -> Result<UpdateSummary, Box<dyn Error>> {
        let client = http_client()?;
        let mut summary = UpdateSummary {
            total: days.len(),
            ..Default::default()
        };
        let mut hourly_existing: HashMap<i16, HashSet<Date>> = HashMap::new();
        let mut qh_existing: HashMap<i16, HashSet<Date>> = HashMap::new();

        for (i, day) in days.iter().enumerate() {
            let year = day.year();
            let hourly_path = year_file(&self.hourly_dir(), year);
            let qh_path = year_file(&self.qh_dir(), year);
            if !hourly_existing.contains_key(&year) {
                hourly_existing.insert(year, existing_dates(&hourly_path)?);
            }
            if !qh_existing.contains_key(&year) {
                qh_existing.insert(year, existing_dates(&qh_path)?);
            }
            let hourly_done = hourly_existing.get(&year).is_some_and(|e| e.contains(day));
            let qh_done = qh_existing.get(&year).is_some_and(|e| e.contains(day));

            info!("[{}/{}] Processing {}...", i + 1, days.len(), day);
            if hourly_done && (qh_done || *day < QH_MARKET_START) {
                info!("  [SKIP] {} already in CSVs.", day);
                summary.skipped += 1;
                continue;
            }

            let body = self.fetch(&client, day)?;
            let Some(data) = parse_day(&body, *day)? else {
                summary.skipped += 1;
                continue;
            };

            let mut wrote = false;
            if !data.qh.is_empty() && !qh_done {
                append_rows(&qh_path, &data.qh)?;
                qh_existing.entry(year).or_default().insert(*day);
                wrote = true;
            }
            if !data.hourly.is_empty() && !hourly_done {
                append_rows(&hourly_path, &data.hourly)?;
                hourly_existing.entry(year).or_default().insert(*day);
                wrote = true;
            }

            if wrote {
                info!(
                    "  [OK] {}: {} QH rows, {} hourly rows.",
                    day,
                    data.qh.len(),
                    data.hourly.len()
                );
                summary.fetched += 1;
                throttle(self.delay, i, days.len());
            } else {
                info!("  [SKIP] {} already in CSVs.", day);
                summary.skipped += 1;
            }
        }
        Ok(summary)
    }
}

/// Parse the chart-data json.
///
/// Before 2025-10-01 there are 2 series with 24 hourly points (volume, price).
/// After that there are 3 series with 96 quarter-hour points (volume, 15 min
/// price, 60 min reference price).  Hourly volumes are the sum of the four
/// quarter-hour volumes.
///
/// Return `None` if the day is not published yet.
pub fn parse_day(body: &str, day: Date) -> Result<Option<DayData>, Box<dyn Error>> {
    let doc: Document = serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
        service: "OTE".to_string(),
        date: day,
        reason: e.to_string(),
    })?;
    let series = doc.data.data_line;
    match series.as_slice() {
        [volume, qh_price, h_price, ..] => {
            let n = volume.point.len().min(qh_price.point.len());
            if n < 96 {
                warn!(
                    "Incomplete QH data for {}: vol={}, qh_price={}, h_price={} points",
                    day,
                    volume.point.len(),
                    qh_price.point.len(),
                    h_price.point.len()
                );
            }
            let qh = (0..n.min(96))
                .map(|i| QhRow {
                    date: day,
                    hour: (i / 4) as u8,
                    minute: ((i % 4) * 15) as u8,
                    price: qh_price.y(i),
                    volume: volume.y(i),
                })
                .collect();
            let hourly = (0..24)
                .map(|h| {
                    let quarters: Vec<f64> =
                        (4 * h..4 * h + 4).filter_map(|i| volume.y(i)).collect();
                    let volume = if quarters.is_empty() {
                        None
                    } else {
                        Some((quarters.iter().sum::<f64>() * 100.0).round() / 100.0)
                    };
                    HourlyRow {
                        date: day,
                        hour: h as u8,
                        price: h_price.y(4 * h),
                        volume,
                    }
                })
                .collect();
            Ok(Some(DayData { qh, hourly }))
        }
        [volume, price] => {
            let n = volume.point.len().min(price.point.len());
            if n < 24 {
                warn!(
                    "Incomplete hourly data for {}: vol={}, price={} points",
                    day,
                    volume.point.len(),
                    price.point.len()
                );
            }
            let hourly = (0..n.min(24))
                .map(|h| HourlyRow {
                    date: day,
                    hour: h as u8,
                    price: price.y(h),
                    volume: volume.y(h),
                })
                .collect();
            Ok(Some(DayData {
                qh: vec![],
                hourly,
            }))
        }
        _ => {
            warn!(
                "Expected at least 2 series, got {} for {}, not published yet?",
                series.len(),
                day
            );
            Ok(None)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    data: Data,
}

#[derive(Debug, Deserialize)]
struct Data {
    #[serde(rename = "dataLine")]
    data_line: Vec<DataLine>,
}

#[derive(Debug, Deserialize)]
struct DataLine {
    #[serde(default)]
    point: Vec<Point>,
}

impl DataLine {
    fn y(&self, i: usize) -> Option<f64> {
        self.point.get(i).and_then(|e| e.y)
    }
}

#[derive(Debug, Deserialize)]
struct Point {
    #[serde(default)]
    y: Option<f64>,
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs, time::Duration};

    use httpmock::prelude::*;
    use jiff::civil::date;
    use serde_json::{json, Value};

    use crate::db::lib_archive::existing_dates;

    use super::*;

    fn series(values: Vec<f64>) -> Value {
        let points: Vec<Value> = values
            .iter()
            .enumerate()
            .map(|(i, y)| json!({"x": (i + 1).to_string(), "y": y}))
            .collect();
        json!({"title": "series", "point": points})
    }

    fn hourly_body() -> String {
        let volume = (0..24).map(|h| 1000.0 + h as f64).collect();
        let price = (0..24).map(|h| 50.0 + h as f64 / 2.0).collect();
        json!({"data": {"dataLine": [series(volume), series(price)]}}).to_string()
    }

    fn qh_body() -> String {
        let volume = (0..96).map(|_| 250.25).collect();
        let qh_price = (0..96).map(|i| i as f64).collect();
        let h_price = (0..96).map(|i| 100.0 + (i / 4) as f64).collect();
        json!({"data": {"dataLine": [series(volume), series(qh_price), series(h_price)]}})
            .to_string()
    }

    fn archive(base_dir: &str, base_url: String) -> OteDamArchive {
        OteDamArchive {
            base_dir: base_dir.to_string(),
            base_url,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn parse_hourly_format() -> Result<(), Box<dyn Error>> {
        let data = parse_day(&hourly_body(), date(2025, 2, 3))?.unwrap();
        assert!(data.qh.is_empty());
        assert_eq!(data.hourly.len(), 24);
        assert_eq!(
            data.hourly[3],
            HourlyRow {
                date: date(2025, 2, 3),
                hour: 3,
                price: Some(51.5),
                volume: Some(1003.0),
            }
        );
        assert_eq!(
            data.hourly[3].to_record(),
            vec!["2025-02-03", "3", "51.5", "1003.0"]
        );
        Ok(())
    }

    #[test]
    fn parse_quarter_hour_format() -> Result<(), Box<dyn Error>> {
        let data = parse_day(&qh_body(), date(2025, 10, 5))?.unwrap();
        assert_eq!(data.qh.len(), 96);
        assert_eq!(data.hourly.len(), 24);
        let last = &data.qh[95];
        assert_eq!((last.hour, last.minute), (23, 45));
        assert_eq!(last.price, Some(95.0));
        assert_eq!(data.hourly[2].price, Some(102.0));
        assert_eq!(data.hourly[2].volume, Some(1001.0));
        assert!(data
            .hourly
            .iter()
            .all(|e| e.price.is_some() && e.volume.is_some()));
        Ok(())
    }

    #[test]
    fn parse_unpublished_day() -> Result<(), Box<dyn Error>> {
        let body = json!({"data": {"dataLine": []}}).to_string();
        assert!(parse_day(&body, date(2025, 2, 3))?.is_none());
        Ok(())
    }

    #[test]
    fn parse_malformed() {
        assert!(parse_day("{\"graph\": {}}", date(2025, 2, 3)).is_err());
        assert!(parse_day("<html></html>", date(2025, 2, 3)).is_err());
    }

    #[test]
    fn update_days_is_idempotent() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start();
        let old = server.mock(|when, then| {
            when.method(GET)
                .path("/chart-data")
                .query_param("report_date", "2025-09-30");
            then.status(200).body(hourly_body());
        });
        let new = server.mock(|when, then| {
            when.method(GET)
                .path("/chart-data")
                .query_param("report_date", "2025-10-01");
            then.status(200).body(qh_body());
        });
        let dir = tempfile::tempdir()?;
        let archive = archive(
            dir.path().to_str().unwrap(),
            server.url("/chart-data"),
        );
        let days = vec![date(2025, 9, 30), date(2025, 10, 1)];

        let summary = archive.update_days(&days)?;
        assert_eq!((summary.fetched, summary.skipped), (2, 0));
        let hourly = fs::read_to_string(archive.hourly_dir().join("2025.csv"))?;
        assert_eq!(hourly.lines().count(), 1 + 48);
        let qh = fs::read_to_string(archive.qh_dir().join("2025.csv"))?;
        assert_eq!(qh.lines().count(), 1 + 96);
        assert!(qh.starts_with("date,hour,minute,price_eur_mwh,volume_mwh\n"));

        let summary = archive.update_days(&days)?;
        assert_eq!((summary.fetched, summary.skipped), (0, 2));
        old.assert_hits(1);
        new.assert_hits(1);
        assert_eq!(
            existing_dates(&archive.hourly_dir().join("2025.csv"))?.len(),
            2
        );
        Ok(())
    }

    #[test]
    fn format_values() {
        assert_eq!(fmt_opt(Some(1003.0)), "1003.0");
        assert_eq!(fmt_opt(Some(-12.0)), "-12.0");
        assert_eq!(fmt_opt(Some(51.25)), "51.25");
        assert_eq!(fmt_opt(None), "");
    }

    #[test]
    fn update_days_adds_missing_quarter_hours() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/chart-data")
                .query_param("report_date", "2025-10-02");
            then.status(200).body(qh_body());
        });
        let dir = tempfile::tempdir()?;
        let archive = archive(dir.path().to_str().unwrap(), server.url("/chart-data"));
        let day = date(2025, 10, 2);
        let hourly_path = archive.hourly_dir().join("2025.csv");
        let data = parse_day(&qh_body(), day)?.unwrap();
        append_rows(&hourly_path, &data.hourly)?;
        let hourly_before = fs::read_to_string(&hourly_path)?;

        let summary = archive.update_days(&[day])?;
        assert_eq!((summary.fetched, summary.skipped), (1, 0));
        mock.assert_hits(1);
        assert_eq!(fs::read_to_string(&hourly_path)?, hourly_before);
        let qh = fs::read_to_string(archive.qh_dir().join("2025.csv"))?;
        assert_eq!(qh.lines().count(), 1 + 96);

        let summary = archive.update_days(&[day])?;
        assert_eq!((summary.fetched, summary.skipped), (0, 1));
        mock.assert_hits(1);
        Ok(())
    }

    #[test]
    fn update_days_fails_on_server_error() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/chart-data");
            then.status(503);
        });
        let dir = tempfile::tempdir()?;
        let archive = archive(
            dir.path().to_str().unwrap(),
            server.url("/chart-data"),
        );
        assert!(archive.update_days(&[date(2025, 1, 1)]).is_err());
        assert!(!archive.hourly_dir().join("2025.csv").exists());
        Ok(())
    }

    #[ignore]
    #[test]
    fn fetch_live() -> Result<(), Box<dyn Error>> {
        let archive = crate::db::prod_db::ProdDb::ote_dam();
        let body = archive.fetch(&http_client()?, &date(2025, 11, 3))?;
        let data = parse_day(&body, date(2025, 11, 3))?.unwrap();
        assert_eq!(data.qh.len(), 96);
        assert_eq!(data.hourly.len(), 24);
        Ok(())
    }
}
