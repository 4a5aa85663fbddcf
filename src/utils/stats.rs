use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// The p-th percentile (0-100) of an ascending slice, interpolating
/// linearly between the two closest ranks.  Zero for an empty slice.
pub fn percentile(sorted: &[Decimal], p: u32) -> Decimal {
    let n = sorted.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    let k = Decimal::from(p) * Decimal::from(n - 1) / Decimal::ONE_HUNDRED;
    let lo = k.floor().to_usize().unwrap_or(0).min(n - 1);
    let hi = k.ceil().to_usize().unwrap_or(0).min(n - 1);
    let (a, b) = (sorted[lo], sorted[hi]);
    if lo == hi {
        return a;
    }
    a + (k - k.floor()) * (b - a)
}

/// Format a value rounded to `dp` decimal places (half to even), padding
/// with zeros, e.g. `12.5` -> `"12.50"`.
pub fn fmt_dp(value: Decimal, dp: u32) -> String {
    format!("{:.*}", dp as usize, value.round_dp(dp))
}

/// Distribution of a set of prices, as reported in the balancing files.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSummary {
    pub count: usize,
    pub max: Decimal,
    pub p10: Decimal,
    pub p25: Decimal,
    pub p50: Decimal,
    pub p75: Decimal,
    pub p90: Decimal,
}

impl PriceSummary {
    /// Return `None` if there are no values.
    pub fn from_values(mut values: Vec<Decimal>) -> Option<PriceSummary> {
        values.sort();
        let max = *values.last()?;
        Some(PriceSummary {
            count: values.len(),
            max,
            p10: percentile(&values, 10),
            p25: percentile(&values, 25),
            p50: percentile(&values, 50),
            p75: percentile(&values, 75),
            p90: percentile(&values, 90),
        })
    }

    /// The `max_price,p10,p25,p50,p75,p90` columns, 2 decimals each.
    pub fn price_fields(&self) -> Vec<String> {
        [self.max, self.p10, self.p25, self.p50, self.p75, self.p90]
            .into_iter()
            .map(|e| fmt_dp(e, 2))
            .collect()
    }
}
