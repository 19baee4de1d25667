use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::alert::DEFAULT_SUBJECT;
use crate::detect::ConfidenceThresholds;
use crate::ingest::reconnect::{
    DEFAULT_MAX_OPEN_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_STALENESS,
};
use crate::ingest::sampler::DEFAULT_SAMPLE_RATE;
use crate::ingest::RetryPolicy;
use crate::render::{DEFAULT_JPEG_QUALITY, DEFAULT_PLACEHOLDER_HEIGHT, DEFAULT_PLACEHOLDER_WIDTH};

const DEFAULT_DB_PATH: &str = "hazard_watch.db";
const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DETECTOR: &str = "null";
const DEFAULT_DISPATCHER: &str = "log";
const DEFAULT_MQTT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_TOPIC: &str = "hazard/alerts";
const DEFAULT_YTDLP: &str = "yt-dlp";

const DETECTOR_BACKENDS: &[&str] = &["null", "http"];
const DISPATCHERS: &[&str] = &["log", "mqtt", "webhook"];

#[derive(Debug, Deserialize, Default)]
struct WatchdConfigFile {
    db_path: Option<String>,
    api: Option<ApiConfigFile>,
    sampling: Option<SamplingConfigFile>,
    source: Option<SourceConfigFile>,
    thresholds: Option<ConfidenceThresholds>,
    detector: Option<DetectorConfigFile>,
    alerts: Option<AlertConfigFile>,
    render: Option<RenderConfigFile>,
    resolver: Option<ResolverConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    rate: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    max_open_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    staleness_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    url: Option<String>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    dispatcher: Option<String>,
    recipients: Option<Vec<String>>,
    subject: Option<String>,
    mqtt_broker_addr: Option<String>,
    mqtt_topic: Option<String>,
    webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    jpeg_quality: Option<u8>,
    placeholder_width: Option<u32>,
    placeholder_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ResolverConfigFile {
    program: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchdConfig {
    pub db_path: String,
    pub api_addr: String,
    /// Process one frame in every `sample_rate`.
    pub sample_rate: u32,
    pub source: SourceSettings,
    pub thresholds: ConfidenceThresholds,
    pub detector: DetectorConfig,
    pub alerts: AlertSettings,
    pub render: RenderSettings,
    pub resolver_program: String,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub max_open_attempts: u32,
    pub retry_delay: Duration,
    pub staleness: Duration,
}

impl SourceSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_open_attempts: self.max_open_attempts,
            retry_delay: self.retry_delay,
            staleness: self.staleness,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// `null` or `http`.
    pub backend: String,
    pub url: Option<String>,
    /// Class id -> label, in model order.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// `log`, `mqtt` or `webhook`.
    pub dispatcher: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub mqtt_broker_addr: String,
    pub mqtt_topic: String,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub jpeg_quality: u8,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
}

impl WatchdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HAZARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchdConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let render = file.render.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            sample_rate: file
                .sampling
                .and_then(|sampling| sampling.rate)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
            source: SourceSettings {
                max_open_attempts: source
                    .max_open_attempts
                    .unwrap_or(DEFAULT_MAX_OPEN_ATTEMPTS),
                retry_delay: source
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RETRY_DELAY),
                staleness: source
                    .staleness_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_STALENESS),
            },
            thresholds: file.thresholds.unwrap_or_default(),
            detector: DetectorConfig {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                url: detector.url,
                labels: detector
                    .labels
                    .unwrap_or_else(|| vec!["fire".to_string(), "smoke".to_string()]),
            },
            alerts: AlertSettings {
                dispatcher: alerts
                    .dispatcher
                    .unwrap_or_else(|| DEFAULT_DISPATCHER.to_string()),
                recipients: alerts.recipients.unwrap_or_default(),
                subject: alerts
                    .subject
                    .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                mqtt_broker_addr: alerts
                    .mqtt_broker_addr
                    .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
                mqtt_topic: alerts
                    .mqtt_topic
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC.to_string()),
                webhook_url: alerts.webhook_url,
            },
            render: RenderSettings {
                jpeg_quality: render.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                placeholder_width: render
                    .placeholder_width
                    .unwrap_or(DEFAULT_PLACEHOLDER_WIDTH),
                placeholder_height: render
                    .placeholder_height
                    .unwrap_or(DEFAULT_PLACEHOLDER_HEIGHT),
            },
            resolver_program: file
                .resolver
                .and_then(|resolver| resolver.program)
                .unwrap_or_else(|| DEFAULT_YTDLP.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("HAZARD_DB_PATH") {
            self.db_path = path;
        }
        if let Some(addr) = non_empty_env("HAZARD_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(rate) = non_empty_env("HAZARD_SAMPLE_RATE") {
            self.sample_rate = rate
                .parse()
                .map_err(|_| anyhow!("HAZARD_SAMPLE_RATE must be a positive integer"))?;
        }
        if let Some(secs) = non_empty_env("HAZARD_STALENESS_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("HAZARD_STALENESS_SECS must be an integer number of seconds")
            })?;
            self.source.staleness = Duration::from_secs(secs);
        }
        if let Some(thresholds) = non_empty_env("HAZARD_THRESHOLDS") {
            self.thresholds = thresholds
                .parse()
                .map_err(|e| anyhow!("HAZARD_THRESHOLDS: {}", e))?;
        }
        if let Some(backend) = non_empty_env("HAZARD_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(url) = non_empty_env("HAZARD_DETECTOR_URL") {
            self.detector.url = Some(url);
        }
        if let Some(dispatcher) = non_empty_env("HAZARD_ALERT_DISPATCHER") {
            self.alerts.dispatcher = dispatcher;
        }
        if let Ok(recipients) = std::env::var("HAZARD_ALERT_RECIPIENTS") {
            let parsed = split_csv(&recipients);
            if !parsed.is_empty() {
                self.alerts.recipients = parsed;
            }
        }
        if let Some(addr) = non_empty_env("MQTT_BROKER_ADDR") {
            self.alerts.mqtt_broker_addr = addr;
        }
        if let Some(url) = non_empty_env("HAZARD_WEBHOOK_URL") {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(program) = non_empty_env("HAZARD_YTDLP") {
            self.resolver_program = program;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(anyhow!("sampling rate must be at least 1"));
        }
        if self.source.max_open_attempts == 0 {
            return Err(anyhow!("source.max_open_attempts must be at least 1"));
        }
        if self.source.staleness.is_zero() {
            return Err(anyhow!("source staleness must be greater than zero"));
        }
        self.thresholds.validate()?;
        if self.thresholds.is_empty() {
            log::warn!("no confidence thresholds configured; every detection will be rejected");
        }
        if !(1..=100).contains(&self.render.jpeg_quality) {
            return Err(anyhow!("render.jpeg_quality must be within 1..=100"));
        }
        if self.render.placeholder_width == 0 || self.render.placeholder_height == 0 {
            return Err(anyhow!("placeholder dimensions must be non-zero"));
        }

        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if !DETECTOR_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                self.detector.backend,
                DETECTOR_BACKENDS.join(", ")
            ));
        }
        if self.detector.backend == "http" && self.detector.url.is_none() {
            return Err(anyhow!("http detector requires detector.url"));
        }

        self.alerts.dispatcher = self.alerts.dispatcher.trim().to_lowercase();
        if !DISPATCHERS.contains(&self.alerts.dispatcher.as_str()) {
            return Err(anyhow!(
                "unknown alert dispatcher '{}' (expected one of {})",
                self.alerts.dispatcher,
                DISPATCHERS.join(", ")
            ));
        }
        if self.alerts.dispatcher == "webhook" && self.alerts.webhook_url.is_none() {
            return Err(anyhow!("webhook dispatcher requires alerts.webhook_url"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: WatchdConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
