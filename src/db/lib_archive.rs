use std::{
    collections::HashSet,
    error::Error,
    fmt::Display,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    time::Duration,
};

use jiff::civil::Date;
use log::info;
use reqwest::blocking::Client;
use thiserror::Error;

pub const USER_AGENT: &str = "AlgoEnergy-DataCollector/1.0";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no ENTSO-E API key, use --api-key or set ENTSOE_API_KEY")]
    MissingApiKey,
    #[error("{service} returned HTTP {status}")]
    UnexpectedStatus { service: String, status: u16 },
    #[error("malformed {service} response for {date}: {reason}")]
    MalformedResponse {
        service: String,
        date: Date,
        reason: String,
    },
}

/// A flat row of one of the year-partitioned CSV datasets.
pub trait ArchiveRow {
    /// The CSV header of the dataset this row belongs to.
    fn header() -> &'static [&'static str];
    /// Delivery date, always the first column.
    fn date(&self) -> Date;
    fn to_record(&self) -> Vec<String>;
}

/// Counts reported at the end of an update run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub total: usize,
}

impl Display for UpdateSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fetched: {}, Skipped: {}, Total: {}",
            self.fetched, self.skipped, self.total
        )
    }
}

pub fn http_client() -> Result<Client, Box<dyn Error>> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Path of the file holding one delivery year, e.g. `data/hourly/2025.csv`
pub fn year_file(dir: &Path, year: i16) -> PathBuf {
    dir.join(format!("{}.csv", year))
}

/// Delivery dates already present in the file.  A missing file has none.
pub fn existing_dates(path: &Path) -> Result<HashSet<Date>, Box<dyn Error>> {
    let mut dates = HashSet::new();
    if !path.exists() {
        return Ok(dates);
    }
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    for record in rdr.records() {
        let record = record?;
        if let Some(field) = record.get(0) {
            if !field.is_empty() {
                dates.insert(field.parse::<Date>()?);
            }
        }
    }
    Ok(dates)
}

/// Append rows to a year file, creating it with a header if needed.
///
/// Files stay sorted by delivery date: when the rows are older than the last
/// date in the file (a backfill), the file is rewritten with the rows merged
/// in.  Rows of the same date keep their relative order.
pub fn append_rows<R: ArchiveRow>(path: &Path, rows: &[R]) -> Result<(), Box<dyn Error>> {
    let Some(first_new) = rows.iter().map(|e| e.date()).min() else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let has_content = path.exists() && fs::metadata(path)?.len() > 0;
    if !has_content {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(R::header())?;
        for row in rows {
            wtr.write_record(row.to_record())?;
        }
        wtr.flush()?;
        return Ok(());
    }

    let last_existing = existing_dates(path)?.into_iter().max();
    match last_existing {
        Some(last) if last > first_new => merge_rows(path, rows),
        _ => {
            let file = OpenOptions::new().append(true).open(path)?;
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            for row in rows {
                wtr.write_record(row.to_record())?;
            }
            wtr.flush()?;
            Ok(())
        }
    }
}

fn merge_rows<R: ArchiveRow>(path: &Path, rows: &[R]) -> Result<(), Box<dyn Error>> {
    info!("backfilling {}, rewriting in date order", path.display());
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records: Vec<Vec<String>> = Vec::new();
    for record in rdr.records() {
        records.push(record?.iter().map(String::from).collect());
    }
    records.extend(rows.iter().map(|e| e.to_record()));
    // ISO dates sort chronologically as strings
    records.sort_by(|a, b| a.first().cmp(&b.first()));

    let tmp = path.with_extension("csv.tmp");
    {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(&tmp)?;
        wtr.write_record(R::header())?;
        for record in &records {
            wtr.write_record(record)?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Pause between two API calls, but not after the last one.
pub fn throttle(delay: Duration, i: usize, total: usize) {
    if !delay.is_zero() && i + 1 < total {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs};

    use jiff::civil::{date, Date};

    use super::*;

    struct TestRow {
        date: Date,
        value: i32,
    }

    impl ArchiveRow for TestRow {
        fn header() -> &'static [&'static str] {
            &["date", "value"]
        }
        fn date(&self) -> Date {
            self.date
        }
        fn to_record(&self) -> Vec<String> {
            vec![self.date.to_string(), self.value.to_string()]
        }
    }

    fn rows(day: Date, n: i32) -> Vec<TestRow> {
        (0..n).map(|value| TestRow { date: day, value }).collect()
    }

    #[test]
    fn append_creates_file_with_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = year_file(&dir.path().join("hourly"), 2025);
        append_rows(&path, &rows(date(2025, 1, 1), 2))?;
        append_rows(&path, &rows(date(2025, 1, 2), 1))?;
        let content = fs::read_to_string(&path)?;
        assert_eq!(
            content,
            "date,value\n2025-01-01,0\n2025-01-01,1\n2025-01-02,0\n"
        );
        let dates = existing_dates(&path)?;
        assert_eq!(dates.len(), 2);
        assert!(dates.contains(&date(2025, 1, 2)));
        Ok(())
    }

    #[test]
    fn append_to_empty_file_writes_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("2025.csv");
        fs::write(&path, "")?;
        append_rows(&path, &rows(date(2025, 3, 1), 1))?;
        assert_eq!(fs::read_to_string(&path)?, "date,value\n2025-03-01,0\n");
        Ok(())
    }

    #[test]
    fn backfill_keeps_file_sorted() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("2025.csv");
        append_rows(&path, &rows(date(2025, 1, 1), 1))?;
        append_rows(&path, &rows(date(2025, 1, 3), 2))?;
        append_rows(&path, &rows(date(2025, 1, 2), 2))?;
        let content = fs::read_to_string(&path)?;
        assert_eq!(
            content,
            "date,value\n2025-01-01,0\n2025-01-02,0\n2025-01-02,1\n2025-01-03,0\n2025-01-03,1\n"
        );
        assert!(!dir.path().join("2025.csv.tmp").exists());
        Ok(())
    }

    #[test]
    fn missing_file_has_no_dates() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        assert!(existing_dates(&dir.path().join("1999.csv"))?.is_empty());
        Ok(())
    }

    #[test]
    fn summary_display() {
        let summary = UpdateSummary {
            fetched: 2,
            skipped: 1,
            total: 3,
        };
        assert_eq!(summary.to_string(), "Fetched: 2, Skipped: 1, Total: 3");
    }
}
