use std::{error::Error, path::Path};

use clap::Parser;
use jiff::civil::Date;
use log::{error, info, warn};
use volta::{
    db::prod_db::ProdDb,
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
}

/// Run this job every day after 13:00[Europe/Prague], when the day-ahead
/// auction results for tomorrow are published.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())) {
        warn!("No .env/{}.env file loaded: {}", args.env, e);
    }

    let days = update_window(args.from, args.to, PRAGUE)?;
    let archive = ProdDb::ote_dam();
    info!(
        "Updating OTE day-ahead prices from {} to {} in {}",
        days[0],
        days[days.len() - 1],
        archive.base_dir
    );
    match archive.update_days(&days) {
        Ok(summary) => info!("Done. {}", summary),
        Err(e) => {
            error!("OTE update failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
