use std::{env, path::PathBuf, time::Duration};

use crate::db::{
    entsoe::{
        balancing_archive::{BalancingArchive, Product},
        ro_dam_archive::RoDamArchive,
    },
    ote::dam_archive::{OteDamArchive, OTE_CHART_DATA_URL},
};

pub struct ProdDb {}

impl ProdDb {
    /// Root of all the datasets, `DATA_DIR` or `data` if not set.
    pub fn data_dir() -> PathBuf {
        match env::var("DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => PathBuf::from("data"),
        }
    }

    pub fn ote_dam() -> OteDamArchive {
        OteDamArchive {
            base_dir: ProdDb::data_dir().to_string_lossy().to_string(),
            base_url: OTE_CHART_DATA_URL.to_string(),
            delay: Duration::from_millis(1500),
        }
    }

    pub fn entsoe_balancing(product: Product) -> BalancingArchive {
        BalancingArchive {
            base_dir: ProdDb::entsoe_dir()
                .join(product.to_string())
                .to_string_lossy()
                .to_string(),
            product,
            delay: Duration::from_secs(2),
        }
    }

    pub fn entsoe_afrr() -> BalancingArchive {
        ProdDb::entsoe_balancing(Product::Afrr)
    }

    pub fn entsoe_mfrr() -> BalancingArchive {
        ProdDb::entsoe_balancing(Product::Mfrr)
    }

    /// Where the ENTSO-E datasets and their statistics live.
    pub fn entsoe_dir() -> PathBuf {
        ProdDb::data_dir().join("entsoe")
    }

    pub fn ro_dam() -> RoDamArchive {
        RoDamArchive {
            base_dir: ProdDb::data_dir()
                .join("ro")
                .join("hourly")
                .to_string_lossy()
                .to_string(),
            delay: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_locations() {
        let root = ProdDb::data_dir();
        assert_eq!(PathBuf::from(ProdDb::ote_dam().base_dir), root);
        assert_eq!(ProdDb::ote_dam().hourly_dir(), root.join("hourly"));
        assert_eq!(ProdDb::entsoe_mfrr().dir(), root.join("entsoe").join("mfrr"));
        assert_eq!(ProdDb::entsoe_afrr().product, Product::Afrr);
        assert_eq!(ProdDb::ro_dam().dir(), root.join("ro").join("hourly"));
    }
}
