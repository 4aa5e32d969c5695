//! Per-connection session: one PLC connection paired with one GHP connection.
//!
//! The two forwarders run concurrently inside the session task and race;
//! the first to finish decides the session's fate. Usually the loser is
//! dropped at its pending read or write, so the session never waits on a
//! stalled peer. Both streams are then shut down and released together.
//!
//! A blocked controller message is the exception. The rejection reply shares
//! the PLC write half with GHP→PLC traffic, so the GHP→PLC forwarder is told
//! to stop and gets up to [`DRAIN_LIMIT`] to finish the chunk it is writing.
//! If it cannot, part of a GHP chunk may already be on the wire and the reply
//! is skipped rather than appended to a truncated frame.

use super::forwarder::{forward, Direction, ForwardEnd, RelaySettings};
use crate::event_log::SharedEventLog;
use ghp_guard_core::{rejection_reply, GuardError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How long a GHP→PLC chunk in flight may take to finish before the
/// rejection reply is abandoned.
pub const DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Everything a session needs besides its controller connection. Shared by
/// all sessions of one listener.
pub struct SessionContext {
    /// `host:port` of the GHP endpoint.
    pub upstream_addr: String,
    pub settings: RelaySettings,
    pub log: SharedEventLog,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The GHP endpoint could not be reached; nothing was forwarded.
    UpstreamUnavailable,
    /// Forwarding ran; `direction` finished first for the given reason.
    Closed {
        direction: Direction,
        end: ForwardEnd,
    },
}

/// Run one session to completion. Never returns an error: every failure is
/// logged here and ends only this session.
pub async fn run_session(
    session_id: u64,
    controller: TcpStream,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> SessionEnd {
    ctx.log.log("PLC connected.");
    info!(session_id, peer = %peer, "controller connected");

    let result = match connect_upstream(&ctx.upstream_addr).await {
        Ok(upstream) => {
            ctx.log.log("Connected to GHP.");
            info!(session_id, upstream = %ctx.upstream_addr, "upstream connected");
            relay(session_id, controller, upstream, ctx).await
        }
        Err(e) => {
            ctx.log.log(&format!("Error: {e}"));
            warn!(session_id, error = %e, "upstream connect failed");
            close_controller(controller).await;
            SessionEnd::UpstreamUnavailable
        }
    };

    ctx.log.log("Connection closed.");
    debug!(session_id, outcome = ?result, "session closed");
    result
}

async fn connect_upstream(addr: &str) -> Result<TcpStream, GuardError> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| GuardError::UpstreamConnect {
            addr: addr.to_string(),
            source,
        })
}

async fn close_controller(mut controller: TcpStream) {
    let _ = controller.shutdown().await;
}

/// Race both directions, then close both streams.
async fn relay(
    session_id: u64,
    controller: TcpStream,
    upstream: TcpStream,
    ctx: &SessionContext,
) -> SessionEnd {
    let (mut plc_rx, mut plc_tx) = controller.into_split();
    let (mut ghp_rx, mut ghp_tx) = upstream.into_split();
    let log = &*ctx.log;

    let (direction, end, drained) = {
        let stop = Notify::new();
        let to_ghp = forward(
            &mut plc_rx,
            &mut ghp_tx,
            Direction::ControllerToUpstream,
            &ctx.settings,
            log,
            None,
        );
        let to_plc = forward(
            &mut ghp_rx,
            &mut plc_tx,
            Direction::UpstreamToController,
            &ctx.settings,
            log,
            Some(&stop),
        );
        tokio::pin!(to_ghp, to_plc);

        let (direction, end) = tokio::select! {
            end = &mut to_ghp => (Direction::ControllerToUpstream, end),
            end = &mut to_plc => (Direction::UpstreamToController, end),
        };

        let drained = match end {
            ForwardEnd::Rejected(_) => {
                stop.notify_one();
                match timeout(DRAIN_LIMIT, &mut to_plc).await {
                    Ok(loser) => {
                        debug!(session_id, end = ?loser, "GHP → PLC drained");
                        true
                    }
                    Err(_) => false,
                }
            }
            _ => true,
        };
        (direction, end, drained)
    };

    match &end {
        ForwardEnd::SourceClosed => {
            debug!(session_id, ?direction, "peer closed");
        }
        ForwardEnd::ReadFailed(e) => {
            debug!(session_id, ?direction, error = %e, "read failed");
        }
        ForwardEnd::WriteFailed(e) => {
            ctx.log.log(&format!("Error: {e}"));
            warn!(session_id, ?direction, error = %e, "write failed");
        }
        ForwardEnd::Stopped => {
            debug!(session_id, ?direction, "stopped");
        }
        ForwardEnd::Rejected(reason) if !drained => {
            info!(session_id, reason = %reason, "controller message blocked");
            warn!(session_id, "GHP chunk still being written, rejection reply skipped");
        }
        ForwardEnd::Rejected(reason) => {
            info!(session_id, reason = %reason, "controller message blocked");
            // The reply goes to the PLC, never to the GHP endpoint.
            if let Err(e) = plc_tx.write_all(&rejection_reply(reason)).await {
                ctx.log.log(&format!("Error: {e}"));
                warn!(session_id, error = %e, "failed to send rejection reply");
            }
        }
    }

    let _ = plc_tx.shutdown().await;
    let _ = ghp_tx.shutdown().await;
    drop((plc_rx, plc_tx, ghp_rx, ghp_tx));

    SessionEnd::Closed { direction, end }
}
