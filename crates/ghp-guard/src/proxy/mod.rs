//! Proxy module: PLC listener, per-connection sessions, and forwarders.
//!
//! # Submodule Architecture
//!
//! - **[`listener`]** — The [`ControllerListener`] binds the PLC-facing port
//!   and spawns one session task per accepted connection.
//!
//! - **[`session`]** — [`run_session`](session::run_session) connects to
//!   the GHP endpoint, races the two forwarders, sends the rejection reply
//!   when a message was blocked, and closes both streams.
//!
//! - **[`forwarder`]** — [`forward`](forwarder::forward) moves bytes one
//!   way, logging each chunk and validating controller traffic with
//!   [`Validator`](ghp_guard_core::Validator).
//!
//! # Data Flow
//!
//! ```text
//! PLC connect
//!   → ControllerListener::run (spawn)
//!     → run_session
//!         → TcpStream::connect(upstream)
//!         → select! {
//!               forward(PLC → GHP, validate)
//!               forward(GHP → PLC, stoppable)
//!           }
//!         → if blocked: stop GHP → PLC at a chunk boundary,
//!           then rejection reply to PLC
//!         → shutdown both streams
//! ```

pub mod forwarder;
pub mod listener;
pub mod session;

pub use forwarder::RelaySettings;
pub use listener::ControllerListener;
pub use session::SessionContext;
