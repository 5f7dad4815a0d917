//! Stdin/stdout framing for the native messaging host.
//!
//! Two framings are supported:
//! - `native`: the browser's native messaging format, a 4-byte little-endian
//!   length prefix followed by UTF-8 JSON.
//! - `lines`: one JSON document per line, for scripting and debugging.
//!
//! [`FrameReader::next_frame`] is cancel-safe: partially read input is kept in
//! the reader, so it can sit in a `tokio::select!` next to timers.

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame the browser may send.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;
/// Largest frame the browser accepts from a host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Wire framing of stdin and stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Newline-delimited JSON.
    Lines,
    /// Length-prefixed JSON.
    #[default]
    Native,
}

/// Framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame exceeds the size limit for its direction. Inbound frames
    /// that are too large are skipped and the stream stays usable.
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },
    /// The input ended inside a frame.
    #[error("input ended inside a frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

/// Reads frames from a buffered input.
pub struct FrameReader<R> {
    inner: R,
    framing: Framing,
    pending: Vec<u8>,
    /// Bytes of an oversized frame still to discard.
    skip: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub const fn new(inner: R, framing: Framing) -> Self {
        Self {
            inner,
            framing,
            pending: Vec::new(),
            skip: 0,
        }
    }

    /// Returns the next frame's payload, or `None` at a clean end of input.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        match self.framing {
            Framing::Lines => self.next_line().await,
            Framing::Native => self.next_native().await,
        }
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            let chunk = self.inner.fill_buf().await?;
            if chunk.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                // Last line without a trailing newline.
                let line = std::mem::take(&mut self.pending);
                if is_blank(&line) {
                    return Ok(None);
                }
                return Ok(Some(line));
            }

            if let Some(pos) = chunk.iter().position(|b| *b == b'\n') {
                self.pending.extend_from_slice(&chunk[..pos]);
                self.inner.consume(pos + 1);
                let line = std::mem::take(&mut self.pending);
                if !is_blank(&line) {
                    return Ok(Some(line));
                }
            } else {
                let len = chunk.len();
                self.pending.extend_from_slice(chunk);
                self.inner.consume(len);
            }
        }
    }

    async fn next_native(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        while self.skip > 0 {
            let chunk = self.inner.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(None);
            }
            let n = chunk.len().min(self.skip);
            self.inner.consume(n);
            self.skip -= n;
        }

        if !self.fill(HEADER_LEN).await? {
            return self.end_of_input();
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.pending[..HEADER_LEN]);
        let len = usize::try_from(u32::from_le_bytes(header)).unwrap_or(usize::MAX);

        if len > MAX_INBOUND_FRAME {
            self.pending.clear();
            self.skip = len;
            return Err(FrameError::TooLarge {
                len,
                limit: MAX_INBOUND_FRAME,
            });
        }

        if !self.fill(HEADER_LEN + len).await? {
            return self.end_of_input();
        }
        let frame = self.pending.split_off(HEADER_LEN);
        self.pending.clear();
        Ok(Some(frame))
    }

    /// Buffers until `pending` holds `want` bytes. Returns false at end of input.
    async fn fill(&mut self, want: usize) -> Result<bool, FrameError> {
        while self.pending.len() < want {
            let chunk = self.inner.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(false);
            }
            let n = chunk.len().min(want - self.pending.len());
            self.pending.extend_from_slice(&chunk[..n]);
            self.inner.consume(n);
        }
        Ok(true)
    }

    fn end_of_input(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.pending.is_empty() {
            Ok(None)
        } else {
            let buffered = self.pending.len();
            self.pending.clear();
            Err(FrameError::Truncated { buffered })
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Writes JSON frames to an output.
pub struct FrameWriter<W> {
    inner: W,
    framing: Framing,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub const fn new(inner: W, framing: Framing) -> Self {
        Self { inner, framing }
    }

    /// Serializes `value` as one frame and flushes it.
    pub async fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(value)?;
        match self.framing {
            Framing::Lines => {
                self.inner.write_all(&payload).await?;
                self.inner.write_all(b"\n").await?;
            }
            Framing::Native => {
                let too_large = FrameError::TooLarge {
                    len: payload.len(),
                    limit: MAX_OUTBOUND_FRAME,
                };
                if payload.len() > MAX_OUTBOUND_FRAME {
                    return Err(too_large);
                }
                let len = u32::try_from(payload.len()).map_err(|_| too_large)?;
                self.inner.write_all(&len.to_le_bytes()).await?;
                self.inner.write_all(&payload).await?;
            }
        }
        self.inner.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
