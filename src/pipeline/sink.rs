use std::io::{self, Write};
use std::sync::mpsc::SyncSender;

/// Multipart boundary token used on the viewer stream.
pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Destination for encoded frames. An error means the consumer went away.
pub trait FrameSink {
    fn send(&mut self, jpeg: &[u8]) -> io::Result<()>;
}

/// Collects frames in memory.
impl FrameSink for Vec<Vec<u8>> {
    fn send(&mut self, jpeg: &[u8]) -> io::Result<()> {
        self.push(jpeg.to_vec());
        Ok(())
    }
}

/// Writes each frame as one `image/jpeg` part of a `multipart/x-mixed-replace` body.
pub struct MultipartWriter<W: Write> {
    inner: W,
    parts: u64,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, parts: 0 }
    }

    pub fn parts_written(&self) -> u64 {
        self.parts
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> FrameSink for MultipartWriter<W> {
    fn send(&mut self, jpeg: &[u8]) -> io::Result<()> {
        write!(
            self.inner,
            "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
            BOUNDARY
        )?;
        self.inner.write_all(jpeg)?;
        self.inner.write_all(b"\r\n")?;
        self.inner.flush()?;
        self.parts += 1;
        Ok(())
    }
}

/// Feeds a `FrameStream`. Fails once the receiving side is dropped.
pub struct ChannelSink {
    tx: SyncSender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn send(&mut self, jpeg: &[u8]) -> io::Result<()> {
        self.tx
            .send(jpeg.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame stream dropped"))
    }
}
