use std::{error::Error, path::Path};

use clap::Parser;
use jiff::civil::Date;
use log::{error, info, warn};
use volta::{
    db::{
        entsoe::{
            balancing_archive::Product,
            lib_entsoe::{EntsoeClient, ENTSOE_API_URL},
        },
        prod_db::ProdDb,
    },
    interval::{date_tz::update_window, PRAGUE},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// First delivery date to backfill, YYYY-MM-DD
    #[arg(long)]
    from: Option<Date>,

    /// Last delivery date to backfill, YYYY-MM-DD
    #[arg(long)]
    to: Option<Date>,

    /// ENTSO-E API key, defaults to the ENTSOE_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,

    /// Only update one product, afrr or mfrr
    #[arg(long)]
    product: Option<Product>,
}

/// Run this job every day.  The CZ balancing capacity auctions for a
/// delivery day are published on the day before.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())) {
        warn!("No .env/{}.env file loaded: {}", args.env, e);
    }

    let client = match EntsoeClient::new(ENTSOE_API_URL, args.api_key) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    };
    let days = update_window(args.from, args.to, PRAGUE)?;
    let products = match args.product {
        Some(product) => vec![product],
        None => vec![Product::Afrr, Product::Mfrr],
    };

    for product in products {
        let archive = ProdDb::entsoe_balancing(product);
        info!(
            "Updating {} balancing bids from {} to {} in {}",
            product,
            days[0],
            days[days.len() - 1],
            archive.base_dir
        );
        match archive.update_days(&client, &days) {
            Ok(summary) => info!("{} done. {}", product, summary),
            Err(e) => {
                error!("{} update failed: {}", product, e);
                return Err(e);
            }
        }
    }

    Ok(())
}
