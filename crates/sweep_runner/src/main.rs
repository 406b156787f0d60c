//! Command-line entry point for the region sweep.
//! Reads configuration from the environment (and `.env`), runs the sweep and
//! announces new listings on Telegram.

mod runner;
mod settings;

use runner::SweepManager;
use settings::RunnerSettings;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting region sweep runner...");

    let settings = match RunnerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("❌ Invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = SweepManager::new(settings).run().await {
        log::error!("❌ Region sweep failed: {:#}", e);
        log::error!("💡 Check CITY_CODES_PATH, SEARCH_CITY and SEEN_PATH");
        std::process::exit(1);
    }
}
