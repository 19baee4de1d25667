//! Synthetic `stub://` frame source.
//!
//! Addresses look like `stub://lobby?frames=120&fps=10&width=320&height=240`:
//! - `frames`: number of frames before a clean end of stream (omit for endless)
//! - `fps`: pacing; `0` disables sleeping between frames
//! - `width` / `height`: frame dimensions
//! - `unavailable=1`: every open attempt fails, as an unreachable camera would
//!
//! The generated picture is a moving gradient whose "scene" shifts every 50 frames, enough
//! for the annotator and encoder to have something real to work on.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::FrameSource;
use crate::frame::Frame;

const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub frames: Option<u64>,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub unavailable: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: None,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            unavailable: false,
        }
    }
}

impl SyntheticConfig {
    pub fn from_address(address: &str) -> Result<Self> {
        let url = Url::parse(address).context("parse stub address")?;
        if url.scheme() != "stub" {
            return Err(anyhow!("not a stub:// address: {}", address));
        }
        let mut cfg = SyntheticConfig {
            name: url.host_str().unwrap_or("synthetic").to_string(),
            ..SyntheticConfig::default()
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => cfg.frames = Some(parse_param(&key, &value)?),
                "fps" => cfg.fps = parse_param(&key, &value)?,
                "width" => cfg.width = parse_param(&key, &value)?,
                "height" => cfg.height = parse_param(&key, &value)?,
                "unavailable" => cfg.unavailable = value == "1" || value == "true",
                other => log::debug!("stub source ignoring unknown parameter {}", other),
            }
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(anyhow!("stub source dimensions must be non-zero"));
        }
        Ok(cfg)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter {} has invalid value '{}'", key, value))
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
    last_emit: Option<Instant>,
    open: bool,
}

impl SyntheticSource {
    pub fn open(config: SyntheticConfig) -> Result<Self> {
        if config.unavailable {
            return Err(anyhow!("stub://{} is configured as unavailable", config.name));
        }
        log::info!("synthetic source opened: stub://{}", config.name);
        Ok(Self {
            config,
            frame_count: 0,
            scene_state: 0,
            last_emit: None,
            open: true,
        })
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.config.fps as u64);
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let width = self.config.width as usize;
        let mut pixels = vec![0u8; width * self.config.height as usize * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % width) as u64;
            let y = (i / width) as u64;
            px[0] = ((x + self.frame_count) % 256) as u8;
            px[1] = ((y + self.scene_state as u64 * 40) % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("stub://{} read after close", self.config.name));
        }
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.open {
            log::debug!(
                "synthetic source closed: stub://{} after {} frames",
                self.config.name,
                self.frame_count
            );
            self.open = false;
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.close();
    }
}
