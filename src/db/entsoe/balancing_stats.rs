use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::entsoe::balancing_archive::{BalancingArchive, Product};
use crate::utils::stats::{fmt_dp, PriceSummary};

/// One non-placeholder row of a daily balancing file.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    pub block: u8,
    pub block_start: String,
    pub direction: String,
    pub max_price: Decimal,
    pub p50: Decimal,
    pub total_volume: Decimal,
}

/// Statistics of the daily rows of one (block, direction) over all days.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub product: Product,
    pub block: u8,
    pub block_start: String,
    pub direction: String,
    /// daily median prices, with `max` the largest daily max price
    pub summary: PriceSummary,
    pub avg_volume: Decimal,
}

impl StatsRow {
    pub fn header() -> &'static [&'static str] {
        &[
            "product",
            "block",
            "block_start",
            "direction",
            "count",
            "max_price",
            "p10",
            "p25",
            "p50",
            "p75",
            "p90",
            "avg_volume",
        ]
    }

    pub fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.product.to_string(),
            self.block.to_string(),
            self.block_start.clone(),
            self.direction.clone(),
            self.summary.count.to_string(),
        ];
        record.extend(self.summary.price_fields());
        record.push(fmt_dp(self.avg_volume, 1));
        record
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    block: u8,
    block_start: String,
    direction: String,
    count: Option<String>,
    max_price: Option<String>,
    p50: Option<String>,
    total_volume: Option<String>,
}

impl RawRow {
    /// Placeholder rows have a zero count and no prices.
    fn into_daily(self) -> Result<Option<DailyRow>, Box<dyn Error>> {
        let count = self.count.as_deref().unwrap_or("").trim();
        let p50 = self.p50.as_deref().unwrap_or("").trim();
        if count.is_empty() || count == "0" || p50.is_empty() {
            return Ok(None);
        }
        let max_price = match self.max_price.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => Decimal::from_str(e)?,
            _ => return Ok(None),
        };
        let total_volume = match self.total_volume.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => Decimal::from_str(e)?,
            _ => Decimal::ZERO,
        };
        Ok(Some(DailyRow {
            block: self.block,
            block_start: self.block_start,
            direction: self.direction,
            max_price,
            p50: Decimal::from_str(p50)?,
            total_volume,
        }))
    }
}

/// Read the daily rows from all the year files in a directory.
pub fn read_daily_rows(dir: &Path) -> Result<Vec<DailyRow>, Box<dyn Error>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|e| e.extension().is_some_and(|ext| ext == "csv"))
        .sorted()
        .collect();

    let mut rows = Vec::new();
    for path in paths {
        let mut rdr = csv::Reader::from_path(&path)?;
        for record in rdr.deserialize() {
            let raw: RawRow = record?;
            if let Some(row) = raw.into_daily()? {
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

/// Aggregate the daily rows per block and direction.
pub fn compute_stats(product: Product, rows: &[DailyRow]) -> Vec<StatsRow> {
    rows.iter()
        .map(|e| ((e.block, e.block_start.clone(), e.direction.clone()), e))
        .into_group_map()
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .filter_map(|((block, block_start, direction), group)| {
            let mut summary = PriceSummary::from_values(group.iter().map(|e| e.p50).collect())?;
            summary.max = group.iter().map(|e| e.max_price).max()?;
            let total: Decimal = group.iter().map(|e| e.total_volume).sum();
            Some(StatsRow {
                product,
                block,
                block_start,
                direction,
                summary,
                avg_volume: total / Decimal::from(group.len()),
            })
        })
        .collect()
}

/// Write the statistics of an archive to `{out_dir}/{product}_stats.csv`.
/// Return `None` if the archive has no data yet.
pub fn write_stats(
    archive: &BalancingArchive,
    out_dir: &Path,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    let rows = read_daily_rows(&archive.dir())?;
    if rows.is_empty() {
        warn!("No {} data in {}", archive.product, archive.dir().display());
        return Ok(None);
    }
    let stats = compute_stats(archive.product, &rows);

    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}_stats.csv", archive.product));
    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record(StatsRow::header())?;
    for row in &stats {
        wtr.write_record(row.to_record())?;
    }
    wtr.flush()?;
    info!(
        "{}: {} daily rows -> {} stats rows in {}",
        archive.product,
        rows.len(),
        stats.len(),
        path.display()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs, time::Duration};

    use rust_decimal_macros::dec;

    use super::*;

    const DAILY: &str = "\
date,block,block_start,direction,count,max_price,p10,p25,p50,p75,p90,total_volume
2025-01-15,0,00:00,down,2,4.00,1.30,1.75,2.50,3.25,3.70,13.0
2025-01-15,0,00:00,up,2,6.50,5.60,5.75,6.00,6.25,6.40,40.0
2025-01-15,1,04:00,up,1,7.00,7.00,7.00,7.00,7.00,7.00,20.0
2025-01-16,0,00:00,down,0,,,,,,,0
2025-01-16,0,00:00,up,3,9.00,6.00,6.50,8.00,8.50,8.80,20.0
";

    fn archive(dir: &Path) -> BalancingArchive {
        BalancingArchive {
            base_dir: dir.join("afrr").to_str().unwrap().to_string(),
            product: Product::Afrr,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn read_skips_placeholders() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = archive(dir.path());
        fs::create_dir_all(archive.dir())?;
        fs::write(archive.dir().join("2025.csv"), DAILY)?;
        fs::write(archive.dir().join("notes.txt"), "not a csv")?;
        let rows = read_daily_rows(&archive.dir())?;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].p50, dec!(8.00));
        Ok(())
    }

    #[test]
    fn stats_per_block_and_direction() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = archive(dir.path());
        fs::create_dir_all(archive.dir())?;
        fs::write(archive.dir().join("2025.csv"), DAILY)?;
        let stats = compute_stats(Product::Afrr, &read_daily_rows(&archive.dir())?);
        assert_eq!(stats.len(), 3);
        assert_eq!(
            stats[1].to_record(),
            vec![
                "afrr", "0", "00:00", "up", "2", "9.00", "6.20", "6.50", "7.00", "7.50", "7.80",
                "30.0"
            ]
        );
        assert_eq!(stats[0].summary.count, 1);
        assert_eq!(stats[2].block_start, "04:00");
        Ok(())
    }

    #[test]
    fn write_stats_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = archive(dir.path());
        assert_eq!(write_stats(&archive, dir.path())?, None);

        fs::create_dir_all(archive.dir())?;
        fs::write(archive.dir().join("2025.csv"), DAILY)?;
        let path = write_stats(&archive, dir.path())?.ok_or("no stats file")?;
        assert_eq!(path, dir.path().join("afrr_stats.csv"));
        let content = fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "product,block,block_start,direction,count,max_price,p10,p25,p50,p75,p90,avg_volume"
        );
        assert_eq!(lines[1], "afrr,0,00:00,down,1,4.00,2.50,2.50,2.50,2.50,2.50,13.0");
        Ok(())
    }
}
