//! Stream address classification and resolution.
//!
//! Cameras are registered either with a direct playable address (RTSP, HTTP, a device path)
//! or with a page URL on a video hosting site. The latter has to be turned into a direct
//! media URL before it can be opened; failure to do so is terminal for the session.

use std::process::Command;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::error::PipelineError;

/// Where a camera's stream address points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamAddress {
    /// Playable as-is.
    Direct(String),
    /// Needs a resolver pass first.
    Resolvable(String),
}

fn hosted_video_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(https?://)?([a-z0-9-]+\.)*(youtube\.com|youtu\.be)(/|\?|$)").unwrap()
    })
}

impl StreamAddress {
    pub fn classify(address: &str) -> Self {
        let trimmed = address.trim();
        if hosted_video_pattern().is_match(trimmed) {
            StreamAddress::Resolvable(trimmed.to_string())
        } else {
            StreamAddress::Direct(trimmed.to_string())
        }
    }

    /// Produce a direct address, resolving if required.
    pub fn into_direct(self, resolver: &dyn UrlResolver) -> Result<String, PipelineError> {
        match self {
            StreamAddress::Direct(address) => Ok(address),
            StreamAddress::Resolvable(address) => {
                resolver
                    .resolve(&address)
                    .map_err(|e| PipelineError::ResolutionFailed {
                        address: address.clone(),
                        reason: format!("{:#}", e),
                    })
            }
        }
    }
}

/// Turns a hosting-site page URL into a direct media URL.
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, address: &str) -> Result<String>;
}

/// Resolver backed by the `yt-dlp` executable (`yt-dlp -g`).
#[derive(Clone, Debug)]
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl UrlResolver for YtDlpResolver {
    fn resolve(&self, address: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["--quiet", "--no-warnings", "-g", "-f", "best[ext=mp4]/best"])
            .arg(address)
            .output()
            .with_context(|| format!("run {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }
        first_url_line(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| anyhow!("{} printed no media url", self.program))
    }
}

fn first_url_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.contains("://"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Result<String, String>);

    impl UrlResolver for FixedResolver {
        fn resolve(&self, _address: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn classifies_hosting_urls_as_resolvable() {
        for url in [
            "https://www.youtube.com/watch?v=abc123",
            "http://youtube.com/live/xyz",
            "https://youtu.be/abc123",
            "m.youtube.com/watch?v=1",
        ] {
            assert!(
                matches!(StreamAddress::classify(url), StreamAddress::Resolvable(_)),
                "{url} should be resolvable"
            );
        }
    }

    #[test]
    fn classifies_camera_addresses_as_direct() {
        for url in [
            "rtsp://192.168.1.20:554/stream1",
            "http://10.0.0.9:81/stream",
            "/dev/video0",
            "stub://lobby",
            "https://notyoutube.com.example/video",
        ] {
            assert_eq!(
                StreamAddress::classify(url),
                StreamAddress::Direct(url.to_string())
            );
        }
    }

    #[test]
    fn resolution_failure_is_typed() {
        let resolver = FixedResolver(Err("video unavailable".to_string()));
        let err = StreamAddress::classify("https://youtu.be/gone")
            .into_direct(&resolver)
            .unwrap_err();
        match err {
            PipelineError::ResolutionFailed { address, reason } => {
                assert_eq!(address, "https://youtu.be/gone");
                assert!(reason.contains("video unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn direct_addresses_skip_the_resolver() {
        let resolver = FixedResolver(Err("must not be called".to_string()));
        let direct = StreamAddress::classify("rtsp://cam/1")
            .into_direct(&resolver)
            .unwrap();
        assert_eq!(direct, "rtsp://cam/1");
    }

    #[test]
    fn picks_first_url_from_resolver_output() {
        let out = "\nhttps://media.example/video.mp4\nhttps://media.example/audio.m4a\n";
        assert_eq!(
            first_url_line(out).as_deref(),
            Some("https://media.example/video.mp4")
        );
        assert_eq!(first_url_line("ERROR: nope"), None);
    }
}
