//! Open-retry, single-reconnect and staleness handling around one capture handle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{FeedEnd, FeedItem, FrameFeed, FrameSource, SourceOpener};
use crate::error::PipelineError;

pub const DEFAULT_MAX_OPEN_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total open attempts before giving up (not retries).
    pub max_open_attempts: u32,
    /// Fixed delay between failed open attempts.
    pub retry_delay: Duration,
    /// Longest tolerated gap since the last delivered frame.
    pub staleness: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_open_attempts: DEFAULT_MAX_OPEN_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            staleness: DEFAULT_STALENESS,
        }
    }
}

/// A `FrameSource` plus the recovery rules of a live session.
///
/// - `open` tries `max_open_attempts` times, `retry_delay` apart.
/// - A failed read triggers exactly one full re-open. If that fails, or the re-opened
///   handle fails before delivering a frame, the feed ends.
/// - If no frame has been delivered for `staleness`, the feed ends with `Timeout`.
///
/// The underlying handle is closed on every terminal path and on drop.
pub struct ReconnectingSource {
    opener: Arc<dyn SourceOpener>,
    address: String,
    policy: RetryPolicy,
    source: Option<Box<dyn FrameSource>>,
    last_frame_at: Instant,
    delivered: u64,
    reconnects: u32,
    /// Set by a re-open, cleared by the next delivered frame.
    reconnected: bool,
}

impl ReconnectingSource {
    pub fn open(
        opener: Arc<dyn SourceOpener>,
        address: &str,
        policy: RetryPolicy,
    ) -> Result<Self, PipelineError> {
        let attempts = policy.max_open_attempts.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match opener.open(address) {
                Ok(source) => {
                    log::info!("source open address={} attempt={}", address, attempt);
                    return Ok(Self {
                        opener,
                        address: address.to_string(),
                        policy,
                        source: Some(source),
                        last_frame_at: Instant::now(),
                        delivered: 0,
                        reconnects: 0,
                        reconnected: false,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "source open failed address={} attempt={}/{}: {:#}",
                        address,
                        attempt,
                        attempts,
                        e
                    );
                    last_reason = format!("{:#}", e);
                    if attempt < attempts {
                        std::thread::sleep(policy.retry_delay);
                    }
                }
            }
        }
        Err(PipelineError::ConnectFailed {
            address: address.to_string(),
            attempts,
            reason: last_reason,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            log::debug!(
                "source closed address={} delivered={}",
                self.address,
                self.delivered
            );
        }
    }

    fn reopen(&mut self) -> bool {
        self.close();
        self.reconnects += 1;
        self.reconnected = true;
        match self.opener.open(&self.address) {
            Ok(source) => {
                log::info!("source reconnected address={}", self.address);
                self.source = Some(source);
                true
            }
            Err(e) => {
                log::warn!("source reconnect failed address={}: {:#}", self.address, e);
                false
            }
        }
    }

    fn end(&mut self, end: FeedEnd) -> FeedItem {
        self.close();
        FeedItem::End(end)
    }
}

impl FrameFeed for ReconnectingSource {
    fn next_item(&mut self) -> FeedItem {
        loop {
            let waited = self.last_frame_at.elapsed();
            if waited >= self.policy.staleness {
                log::warn!(
                    "source stale address={} waited={}s",
                    self.address,
                    waited.as_secs()
                );
                return self.end(FeedEnd::Timeout { waited });
            }
            let Some(source) = self.source.as_mut() else {
                return FeedItem::End(FeedEnd::EndOfStream);
            };
            match source.read(self.policy.staleness - waited) {
                Ok(Some(mut frame)) => {
                    self.delivered += 1;
                    self.reconnected = false;
                    self.last_frame_at = Instant::now();
                    frame.sequence = self.delivered;
                    return FeedItem::Frame(frame);
                }
                Ok(None) => {
                    log::info!("source end of stream address={}", self.address);
                    return self.end(FeedEnd::EndOfStream);
                }
                Err(e) => {
                    log::warn!("source read failed address={}: {:#}", self.address, e);
                    let waited = self.last_frame_at.elapsed();
                    if waited >= self.policy.staleness {
                        return self.end(FeedEnd::Timeout { waited });
                    }
                    if self.reconnected {
                        log::warn!(
                            "source failed again after reconnect address={}",
                            self.address
                        );
                        return self.end(FeedEnd::EndOfStream);
                    }
                    if !self.reopen() {
                        return self.end(FeedEnd::EndOfStream);
                    }
                }
            }
        }
    }
}

impl Drop for ReconnectingSource {
    fn drop(&mut self) {
        self.close();
    }
}
