//! Notification delivery backends.
//!
//! Dispatch is synchronous and best-effort: the deduper logs a failure and never retries.
//!
//! No backend sends mail. `Notification::recipients` travels in the log line and the MQTT and
//! webhook JSON payloads; a relay on the far side of a broker or webhook does the e-mail delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use serde::Serialize;

use super::AlertKey;

/// One rendered alert, handed to an [`AlertDispatcher`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    /// Addresses the alert is meant for. Carried in the payload; no dispatcher mails them.
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub key: AlertKey,
    pub camera_name: String,
    pub alert_type: String,
    pub detected_at: DateTime<Local>,
}

pub trait AlertDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn dispatch(&self, notification: &Notification) -> Result<()>;
}

/// Writes alerts to the log only.
#[derive(Clone, Debug, Default)]
pub struct LogDispatcher;

impl AlertDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn dispatch(&self, notification: &Notification) -> Result<()> {
        log::warn!(
            "ALERT {} key={} type={} recipients=[{}]",
            notification.subject,
            notification.key,
            notification.alert_type,
            notification.recipients.join(", ")
        );
        log::info!("alert body:\n{}", notification.body);
        Ok(())
    }
}

/// POSTs the notification as JSON.
pub struct WebhookDispatcher {
    url: String,
    agent: ureq::Agent,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).with_context(|| format!("invalid webhook url {}", url))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Ok(Self { url, agent })
    }
}

impl AlertDispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn dispatch(&self, notification: &Notification) -> Result<()> {
        self.agent
            .post(&self.url)
            .send_json(notification)
            .with_context(|| format!("post alert to {}", self.url))?;
        Ok(())
    }
}

/// Publishes the notification as JSON with QoS 1.
pub struct MqttDispatcher {
    client: Client,
    topic: String,
    stop: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttDispatcher {
    pub fn connect(broker_addr: &str, topic: &str, client_id: &str) -> Result<Self> {
        let (host, port) = split_host_port(broker_addr)?;
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);

        let (client, connection) = Client::new(options, 10);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_event_loop(connection, stop.clone());
        log::info!("mqtt alert dispatcher using {} topic={}", broker_addr, topic);
        Ok(Self {
            client,
            topic: topic.to_string(),
            stop,
            connection_handle: Some(handle),
        })
    }
}

fn spawn_event_loop(mut connection: Connection, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("mqtt connection error: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    })
}

impl AlertDispatcher for MqttDispatcher {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn dispatch(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .context("queue mqtt alert")?;
        Ok(())
    }
}

impl Drop for MqttDispatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect() {
            log::debug!("mqtt disconnect: {}", e);
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let addr = addr
        .trim()
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
