use std::{error::Error, path::Path};

use clap::Parser;
use log::{info, warn};
use volta::db::{
    entsoe::{balancing_archive::Product, balancing_stats::write_stats},
    prod_db::ProdDb,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

/// Summarize the daily aFRR and mFRR files into one statistics file per
/// product.  Run after `update_entsoe_balancing`.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())) {
        warn!("No .env/{}.env file loaded: {}", args.env, e);
    }

    let out_dir = ProdDb::entsoe_dir();
    for product in [Product::Afrr, Product::Mfrr] {
        let archive = ProdDb::entsoe_balancing(product);
        if let Some(path) = write_stats(&archive, &out_dir)? {
            info!("Wrote {}", path.display());
        }
    }

    Ok(())
}
