use anyhow::{anyhow, Result};

use super::{FeedEnd, FeedItem, FrameFeed};
use crate::frame::Frame;

pub const DEFAULT_SAMPLE_RATE: u32 = 4;

/// Forwards every K-th frame of the wrapped feed (1-indexed: frames K, 2K, ...).
///
/// Frames in between are read and dropped immediately, never buffered.
pub struct FrameSampler<F: FrameFeed> {
    inner: F,
    rate: u64,
    read: u64,
    forwarded: u64,
}

impl<F: FrameFeed> FrameSampler<F> {
    pub fn new(inner: F, rate: u32) -> Result<Self> {
        if rate == 0 {
            return Err(anyhow!("sample rate must be at least 1"));
        }
        Ok(Self {
            inner,
            rate: rate as u64,
            read: 0,
            forwarded: 0,
        })
    }

    /// Next forwarded frame, or why the feed ended.
    pub fn next_frame(&mut self) -> Result<Frame, FeedEnd> {
        loop {
            match self.inner.next_item() {
                FeedItem::Frame(frame) => {
                    self.read += 1;
                    if self.read % self.rate == 0 {
                        self.forwarded += 1;
                        return Ok(frame);
                    }
                }
                FeedItem::End(end) => return Err(end),
            }
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.read
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }
}

impl<F: FrameFeed> FrameFeed for FrameSampler<F> {
    fn next_item(&mut self) -> FeedItem {
        match self.next_frame() {
            Ok(frame) => FeedItem::Frame(frame),
            Err(end) => FeedItem::End(end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted {
        total: u64,
        emitted: u64,
    }

    impl FrameFeed for Counted {
        fn next_item(&mut self) -> FeedItem {
            if self.emitted == self.total {
                return FeedItem::End(FeedEnd::EndOfStream);
            }
            self.emitted += 1;
            match Frame::filled(1, 1, self.emitted, [0, 0, 0]) {
                Ok(frame) => FeedItem::Frame(frame),
                Err(_) => FeedItem::End(FeedEnd::EndOfStream),
            }
        }
    }

    fn forwarded(total: u64, rate: u32) -> Vec<u64> {
        let mut sampler = FrameSampler::new(Counted { total, emitted: 0 }, rate).unwrap();
        let mut seen = Vec::new();
        while let Ok(frame) = sampler.next_frame() {
            seen.push(frame.sequence);
        }
        assert_eq!(sampler.frames_read(), total);
        seen
    }

    #[test]
    fn nine_frames_at_rate_four_forwards_fourth_and_eighth() {
        assert_eq!(forwarded(9, 4), vec![4, 8]);
    }

    #[test]
    fn forwards_floor_of_total_over_rate() {
        for (total, rate) in [(0, 4), (3, 4), (4, 4), (17, 4), (10, 1), (12, 5)] {
            let seen = forwarded(total, rate);
            assert_eq!(seen.len() as u64, total / rate as u64);
            assert!(seen.iter().all(|i| i % rate as u64 == 0));
        }
    }

    #[test]
    fn rate_zero_is_rejected() {
        assert!(FrameSampler::new(Counted { total: 1, emitted: 0 }, 0).is_err());
    }

    #[test]
    fn end_reason_passes_through() {
        struct Stale;
        impl FrameFeed for Stale {
            fn next_item(&mut self) -> FeedItem {
                FeedItem::End(FeedEnd::Timeout {
                    waited: std::time::Duration::from_secs(10),
                })
            }
        }
        let mut sampler = FrameSampler::new(Stale, 4).unwrap();
        assert!(matches!(
            sampler.next_frame(),
            Err(FeedEnd::Timeout { .. })
        ));
    }
}
