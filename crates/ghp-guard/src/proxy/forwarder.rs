//! One-way byte forwarding with optional validation.
//!
//! [`forward`] reads a chunk from the source, logs it, validates it when the
//! direction is controller→upstream, and writes the original bytes to the
//! destination. It returns a [`ForwardEnd`] describing why it stopped.
//!
//! A blocked message is never forwarded. The forwarder does not write the
//! rejection reply itself because it holds no controller write handle in
//! that direction; the session sends it once the race is decided.
//!
//! An optional stop signal ends the loop at the next read, never inside a
//! write, so a chunk is either delivered whole or not at all.

use crate::config::{Framing, GuardConfig};
use crate::event_log::EventLog;
use ghp_guard_core::{
    decode_ascii, render_for_log, EtxFrameDecoder, RejectReason, ValidationOutcome, Validator,
    DEFAULT_CHUNK_SIZE,
};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::debug;

/// Which way a forwarder moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// PLC → GHP. Validated.
    ControllerToUpstream,
    /// GHP → PLC. Passed through.
    UpstreamToController,
}

impl Direction {
    /// Prefix of the event log line for each chunk.
    pub fn label(self) -> &'static str {
        match self {
            Direction::ControllerToUpstream => "PLC → Proxy",
            Direction::UpstreamToController => "GHP → Proxy",
        }
    }

    pub fn validates(self) -> bool {
        matches!(self, Direction::ControllerToUpstream)
    }
}

/// Why a forwarder stopped.
#[derive(Debug)]
pub enum ForwardEnd {
    /// Source reached EOF.
    SourceClosed,
    /// Reading the source failed (includes the peer resetting).
    ReadFailed(io::Error),
    /// Writing to the destination failed.
    WriteFailed(io::Error),
    /// A controller message was blocked; nothing of it was forwarded.
    Rejected(RejectReason),
    /// The stop signal fired between chunks.
    Stopped,
}

/// Per-relay knobs shared by every session.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub chunk_size: usize,
    pub framing: Framing,
    pub max_frame_len: usize,
    pub validator: Validator,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            framing: Framing::Chunk,
            max_frame_len: 65536,
            validator: Validator::default(),
        }
    }
}

impl From<&GuardConfig> for RelaySettings {
    fn from(config: &GuardConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            framing: config.framing,
            max_frame_len: config.max_frame_len,
            validator: Validator::new(config.max_tokens),
        }
    }
}

/// Forward bytes from `source` to `destination` until EOF, an I/O failure,
/// a rejection, or `stop` being notified.
///
/// Strictly sequential: a chunk is written in full before the next read.
/// `stop` is only checked while waiting for the source.
pub async fn forward<R, W>(
    source: &mut R,
    destination: &mut W,
    direction: Direction,
    settings: &RelaySettings,
    log: &dyn EventLog,
    stop: Option<&Notify>,
) -> ForwardEnd
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; settings.chunk_size.max(1)];
    let mut decoder = (direction.validates() && settings.framing == Framing::Etx)
        .then(|| EtxFrameDecoder::new(settings.max_frame_len));

    loop {
        let read = match stop {
            Some(stop) => tokio::select! {
                biased;
                _ = stop.notified() => return ForwardEnd::Stopped,
                read = source.read(&mut buf) => read,
            },
            None => source.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => {
                if let Some(rest) = decoder.as_mut().and_then(|d| d.finish()) {
                    if let Err(end) =
                        relay_message(&rest, destination, direction, settings, log).await
                    {
                        return end;
                    }
                }
                return ForwardEnd::SourceClosed;
            }
            Ok(n) => n,
            Err(e) => return ForwardEnd::ReadFailed(e),
        };

        match decoder.as_mut() {
            None => {
                if let Err(end) =
                    relay_message(&buf[..n], destination, direction, settings, log).await
                {
                    return end;
                }
            }
            Some(decoder) => {
                for frame in decoder.feed(&buf[..n]) {
                    if let Err(end) =
                        relay_message(&frame, destination, direction, settings, log).await
                    {
                        return end;
                    }
                }
                if decoder.pending() > 0 {
                    debug!(pending = decoder.pending(), "waiting for ETX");
                }
            }
        }
    }
}

/// Log, validate and write one message.
async fn relay_message<W>(
    message: &[u8],
    destination: &mut W,
    direction: Direction,
    settings: &RelaySettings,
    log: &dyn EventLog,
) -> Result<(), ForwardEnd>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let text = decode_ascii(message);
    log.log(&format!("{}: {}", direction.label(), render_for_log(&text)));

    if direction.validates() {
        if let ValidationOutcome::Reject(reason) = settings.validator.validate(&text) {
            log.log(&format!("BLOCKED message: {reason}"));
            return Err(ForwardEnd::Rejected(reason));
        }
    }

    destination
        .write_all(message)
        .await
        .map_err(ForwardEnd::WriteFailed)?;
    debug!(?direction, bytes = message.len(), "forwarded");
    Ok(())
}
