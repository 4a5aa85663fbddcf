use std::{error::Error, path::Path};

use clap::Parser;
use jiff::civil::Date;
use log::{error, info, warn};
use volta::{
    db::{
        entsoe::lib_entsoe::{EntsoeClient, ENTSOE_API_URL},
        prod_db::ProdDb,
    },
    interval::{date_tz::update_window, BUCHAREST},
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
}

/// Run this job every day after 14:00[Europe/Bucharest].
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
    let days = update_window(args.from, args.to, BUCHAREST)?;
    let archive = ProdDb::ro_dam();
    info!(
        "Updating RO day-ahead prices from {} to {} in {}",
        days[0],
        days[days.len() - 1],
        archive.base_dir
    );
    match archive.update_days(&client, &days) {
        Ok(summary) => info!("Done. {}", summary),
        Err(e) => {
            error!("RO day-ahead update failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
