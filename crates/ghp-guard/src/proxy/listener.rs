//! Accept loop for PLC connections.
//!
//! Each accepted connection is handed to its own spawned session task, so
//! the accept loop never waits on a session. There is no admission limit.
//! A failed accept (for example `EMFILE`) pauses the loop for
//! [`ACCEPT_BACKOFF`] before the next attempt.

use super::session::{run_session, SessionContext, SessionEnd};
use ghp_guard_core::{GuardError, GuardResult};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Pause after a failed accept.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener for inbound PLC connections.
pub struct ControllerListener {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl ControllerListener {
    /// Bind `0.0.0.0:{port}`.
    pub async fn bind(port: u16, ctx: Arc<SessionContext>) -> GuardResult<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self::bind_addr(addr, ctx).await
    }

    /// Bind an explicit address. Failure is [`GuardError::Bind`].
    pub async fn bind_addr(addr: SocketAddr, ctx: Arc<SessionContext>) -> GuardResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GuardError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!(addr = %addr, upstream = %ctx.upstream_addr, "listener started");
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> GuardResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one session task per connection.
    pub async fn run(self) {
        let mut next_session_id: u64 = 1;

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let session_id = next_session_id;
                    next_session_id += 1;

                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        match run_session(session_id, stream, peer, &ctx).await {
                            SessionEnd::UpstreamUnavailable => {
                                debug!(session_id, "session ended without upstream");
                            }
                            SessionEnd::Closed { direction, end } => {
                                debug!(session_id, ?direction, ?end, "session task ended");
                            }
                        }
                    });
                }
                Err(e) => accept_failed(&e).await,
            }
        }
    }
}

async fn accept_failed(e: &io::Error) {
    warn!(error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "accept failed");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MemoryEventLog;
    use crate::proxy::RelaySettings;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let ctx = Arc::new(SessionContext {
            upstream_addr: "127.0.0.1:1".into(),
            settings: RelaySettings::default(),
            log: MemoryEventLog::new(),
        });

        let err = ControllerListener::bind_addr(addr, ctx).await.err().unwrap();
        assert!(matches!(err, GuardError::Bind { .. }));
    }

    #[tokio::test]
    async fn accept_error_backs_off() {
        let e = io::Error::from_raw_os_error(24); // EMFILE
        let started = tokio::time::Instant::now();
        accept_failed(&e).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn sessions_run_independently() {
        let ghp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let log = MemoryEventLog::new();
        let ctx = Arc::new(SessionContext {
            upstream_addr: ghp.local_addr().unwrap().to_string(),
            settings: RelaySettings::default(),
            log: log.clone(),
        });

        let listener = ControllerListener::bind_addr("127.0.0.1:0".parse().unwrap(), ctx)
            .await
            .unwrap();
        let proxy_addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run());

        // first session stays open and idle
        let _idle_plc = TcpStream::connect(proxy_addr).await.unwrap();
        let (_idle_ghp, _) = timeout(LIMIT, ghp.accept()).await.unwrap().unwrap();

        // second session must still be served
        let mut plc = TcpStream::connect(proxy_addr).await.unwrap();
        let (mut ghp_side, _) = timeout(LIMIT, ghp.accept()).await.unwrap().unwrap();

        plc.write_all(b"\x02CMD,A\x03").await.unwrap();
        let mut buf = [0u8; 7];
        timeout(LIMIT, ghp_side.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"\x02CMD,A\x03");
        assert_eq!(log.count("PLC connected."), 2);
    }
}
