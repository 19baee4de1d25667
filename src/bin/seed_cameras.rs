//! seed_cameras - register regions, sub-regions and cameras from a JSON file
//!
//! The file holds a list of cameras:
//!
//! ```json
//! [{"name": "Gate 1", "stream_address": "rtsp://10.0.0.5/live",
//!   "region": "North", "sub_region": "Gate"}]
//! ```
//!
//! Seeding is skipped when the directory already has cameras unless `--force` is given.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use hazard_watch::storage::{NewCamera, SqliteCameraDirectory};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the hazard watch database.
    #[arg(long, env = "HAZARD_DB_PATH", default_value = "hazard_watch.db")]
    db_path: String,
    /// JSON file with the cameras to register.
    #[arg(long)]
    cameras: PathBuf,
    /// Register even when cameras already exist.
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.cameras)
        .with_context(|| format!("read {}", args.cameras.display()))?;
    let cameras: Vec<NewCamera> = serde_json::from_str(&raw)
        .with_context(|| format!("parse camera list {}", args.cameras.display()))?;
    if cameras.is_empty() {
        return Err(anyhow!("{} lists no cameras", args.cameras.display()));
    }

    let directory = SqliteCameraDirectory::open(&args.db_path)?;
    let existing = directory.camera_count()?;
    if existing > 0 && !args.force {
        log::info!(
            "{} already has {} cameras; skipping (use --force to add anyway)",
            args.db_path,
            existing
        );
        return Ok(());
    }

    for camera in &cameras {
        let id = directory.register(camera)?;
        log::info!(
            "registered camera id={} name={} region={}/{}",
            id,
            camera.name,
            camera.region,
            camera.sub_region
        );
    }
    log::info!("seeded {} cameras into {}", cameras.len(), args.db_path);
    Ok(())
}
