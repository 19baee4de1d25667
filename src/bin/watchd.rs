//! watchd - hazard watch daemon
//!
//! This daemon:
//! 1. Loads configuration (HAZARD_CONFIG file plus HAZARD_* overrides)
//! 2. Opens the camera directory, detection log and alert records
//! 3. Builds the detector and the alert dispatcher
//! 4. Serves `/video_feed/{id}`; each viewer drives its own detection session

use anyhow::Result;
use std::sync::mpsc;

use hazard_watch::{
    api::{ApiConfig, ApiServer},
    WatchdConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = WatchdConfig::load()?;
    log::info!(
        "watchd {} starting: db={} detector={} dispatcher={} sample_rate={}",
        env!("CARGO_PKG_VERSION"),
        config.db_path,
        config.detector.backend,
        config.alerts.dispatcher,
        config.sample_rate
    );

    let services = hazard_watch::open_services(&config)?;
    match services.cameras.camera_feeds() {
        Ok(feeds) if feeds.is_empty() => {
            log::warn!("no active cameras in {}; run seed_cameras first", config.db_path)
        }
        Ok(feeds) => log::info!("{} active cameras", feeds.len()),
        Err(e) => log::warn!("camera listing failed: {:#}", e),
    }

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(api_config, services.cameras, services.pipeline).spawn()?;
    log::info!("video feeds at http://{}/video_feed/{{id}}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("watchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
