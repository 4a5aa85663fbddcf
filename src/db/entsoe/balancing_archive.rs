use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jiff::civil::Date;
use log::info;
use quick_xml::de::from_str;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::entsoe::lib_entsoe::{EntsoeClient, Period, CZ_AREA};
use crate::db::lib_archive::{
    append_rows, existing_dates, throttle, year_file, ArchiveRow, UpdateSummary,
};
use crate::interval::{date_tz::DateTz, PRAGUE};
use crate::utils::stats::{fmt_dp, PriceSummary};

/// Number of 4 hour blocks in a delivery day.
pub const BLOCKS: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Copy, Hash)]
pub enum Product {
    // automatic frequency restoration reserve
    Afrr,
    // manual frequency restoration reserve
    Mfrr,
}

impl Product {
    /// ENTSO-E process type of the procured capacity
    pub fn process_type(&self) -> &'static str {
        match self {
            Product::Afrr => "A51",
            Product::Mfrr => "A47",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Product::Afrr => write!(f, "afrr"),
            Product::Mfrr => write!(f, "mfrr"),
        }
    }
}

impl FromStr for Product {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "afrr" => Ok(Product::Afrr),
            "mfrr" => Ok(Product::Mfrr),
            _ => Err(format!("Failed parsing {} as a balancing product", s)),
        }
    }
}

/// Statistics of the accepted bids for one block and direction of a day.
/// A row without a `summary` marks a day the platform has no data for.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancingRow {
    pub date: Date,
    pub block: u8,
    pub direction: String,
    pub summary: Option<PriceSummary>,
    pub total_volume: Decimal,
}

impl BalancingRow {
    pub fn block_start(&self) -> String {
        format!("{:02}:00", 4 * self.block)
    }
}

impl ArchiveRow for BalancingRow {
    fn header() -> &'static [&'static str] {
        &[
            "date",
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
            "total_volume",
        ]
    }

    fn date(&self) -> Date {
        self.date
    }

    fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.date.to_string(),
            self.block.to_string(),
            self.block_start(),
            self.direction.clone(),
        ];
        match &self.summary {
            Some(summary) => {
                record.push(summary.count.to_string());
                record.extend(summary.price_fields());
                record.push(fmt_dp(self.total_volume, 1));
            }
            None => {
                record.push("0".to_string());
                record.extend(std::iter::repeat(String::new()).take(6));
                record.push("0".to_string());
            }
        }
        record
    }
}

/// All blocks in both directions, with no prices.
pub fn placeholder_rows(day: Date) -> Vec<BalancingRow> {
    let mut rows = Vec::new();
    for block in 0..BLOCKS {
        for direction in ["down", "up"] {
            rows.push(BalancingRow {
                date: day,
                block,
                direction: direction.to_string(),
                summary: None,
                total_volume: Decimal::ZERO,
            });
        }
    }
    rows
}

fn direction_name(code: &str) -> String {
    match code {
        "A01" => "up".to_string(),
        "A02" => "down".to_string(),
        "A03" => "both".to_string(),
        _ => code.to_lowercase(),
    }
}

/// Parse an A15 document (procured balancing capacity).
///
/// Each `TimeSeries` is one accepted bid.  Bids are grouped by 4 hour block
/// and direction.  Periods with a `PT4H` resolution map positions 1-6 to
/// blocks 0-5.  Hourly periods count only when all positions fall on a block
/// boundary, or when there is a single point for the whole day (block 0).
/// Specific products, i.e. without a standard market product type, are left out.
///
pub fn parse_bids(xml: &str, day: Date) -> Result<Vec<BalancingRow>, Box<dyn Error>> {
    let doc: BalancingDocument = from_str(xml)?;
    let mut bids: BTreeMap<(u8, String), Vec<(Decimal, Decimal)>> = BTreeMap::new();

    for ts in doc.time_series {
        if ts.original_product.is_some() && ts.standard_product.is_none() {
            continue;
        }
        let direction = direction_name(ts.direction.as_deref().unwrap_or("").trim());

        for period in &ts.periods {
            let mut points: Vec<(i64, Decimal, Decimal)> = period
                .points
                .iter()
                .map(|e| (e.position, to_decimal(&e.quantity), to_decimal(&e.price)))
                .collect();
            if period.resolution.is_empty() || points.is_empty() {
                continue;
            }
            points.sort_by_key(|e| e.0);

            let on_block_boundary = points.iter().all(|e| e.0 >= 1 && (e.0 - 1) % 4 == 0);
            let block_of: fn(i64) -> i64 = match period.resolution.trim() {
                "PT4H" => |pos| pos - 1,
                "PT60M" if on_block_boundary => |pos| (pos - 1) / 4,
                "PT60M" if points.len() == 1 => |_| 0,
                _ => continue,
            };

            for (position, quantity, price) in points {
                if quantity.is_zero() && price.is_zero() {
                    continue;
                }
                let Ok(block) = u8::try_from(block_of(position)) else {
                    continue;
                };
                bids.entry((block, direction.clone()))
                    .or_default()
                    .push((price, quantity));
            }
        }
    }

    let mut rows = Vec::new();
    for ((block, direction), entries) in bids {
        let total_volume: Decimal = entries.iter().map(|e| e.1).sum();
        let summary = PriceSummary::from_values(entries.into_iter().map(|e| e.0).collect());
        if summary.is_none() {
            continue;
        }
        rows.push(BalancingRow {
            date: day,
            block,
            direction,
            summary,
            total_volume,
        });
    }
    Ok(rows)
}

fn to_decimal(value: &Option<String>) -> Decimal {
    value
        .as_deref()
        .and_then(|e| Decimal::from_str(e.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

#[derive(Clone)]
pub struct BalancingArchive {
    pub base_dir: String,
    pub product: Product,
    pub delay: Duration,
}

impl BalancingArchive {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.base_dir)
    }

    /// Get the A15 document for a delivery day, `None` if there is no data.
    pub fn fetch_document(
        &self,
        client: &EntsoeClient,
        day: &DateTz,
    ) -> Result<Option<String>, Box<dyn Error>> {
        let (period_start, period_end) = day.utc_period();
        client.get_document(&[
            ("documentType", "A15".to_string()),
            ("area_Domain", CZ_AREA.to_string()),
            ("processType", self.product.process_type().to_string()),
            ("Type_MarketAgreement.Type", "A01".to_string()),
            ("periodStart", period_start),
            ("periodEnd", period_end),
        ])
    }

    /// Fetch and append the days not in the archive yet.  Days without data
    /// get placeholder rows so they are not fetched again.
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

            let rows = match self.fetch_document(client, &DateTz::new(*day, PRAGUE)?)? {
                None => {
                    info!(
                        "  [{}/{}] {} [NO DATA] -> 12 NaN rows",
                        i + 1,
                        days.len(),
                        day
                    );
                    placeholder_rows(*day)
                }
                Some(xml) => {
                    let rows = parse_bids(&xml, *day)?;
                    if rows.is_empty() {
                        info!(
                            "  [{}/{}] {} [NO BIDS] -> 12 NaN rows",
                            i + 1,
                            days.len(),
                            day
                        );
                        placeholder_rows(*day)
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
struct BalancingDocument {
    #[serde(rename = "TimeSeries", default)]
    time_series: Vec<BidSeries>,
}

#[derive(Debug, Deserialize)]
struct BidSeries {
    #[serde(rename = "flowDirection.direction", default)]
    direction: Option<String>,
    #[serde(rename = "standard_MarketProduct.marketProductType", default)]
    standard_product: Option<String>,
    #[serde(rename = "original_MarketProduct.marketProductType", default)]
    original_product: Option<String>,
    #[serde(rename = "Period", default)]
    periods: Vec<Period<BidPoint>>,
}

#[derive(Debug, Deserialize)]
struct BidPoint {
    position: i64,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(rename = "procurement_Price.amount", default)]
    price: Option<String>,
}
