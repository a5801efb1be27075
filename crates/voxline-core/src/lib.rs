//! voxline-core: call-session relay for a browser chat application.
//!
//! # Architecture (Clean Architecture)
//!
//! - **domain**: identities, audio frames, signaling envelopes, call-session
//!   value types (no I/O).
//! - **application**: use cases + port traits: connection registry, audio
//!   relay, call-session state machine, signal router.
//! - **adapters**: WebSocket transport (tokio-tungstenite), JSON signal codec.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
