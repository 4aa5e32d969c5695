//! ghp-guard-core: message rules and wire helpers for the PLC → GHP relay.
//!
//! Provides the blocklist [`Validator`], STX/ETX helpers, ETX framing, and
//! the shared error type.

pub mod error;
pub mod framing;
pub mod validator;
pub mod wire;

// Re-export commonly used items at crate root.
pub use error::{GuardError, GuardResult};
pub use framing::EtxFrameDecoder;
pub use validator::{validate, RejectReason, ValidationOutcome, Validator, DEFAULT_MAX_TOKENS};
pub use wire::{decode_ascii, rejection_reply, render_for_log, DEFAULT_CHUNK_SIZE, ETX, STX};
