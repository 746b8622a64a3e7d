//! Goftar - session lifecycle and resilient chat-stream relay
//!
//! This crate provides a daemon that sits between a chat client and an
//! upstream completion API: it maintains signed session tokens with
//! transparent refresh, and relays upstream Server-Sent-Events streams to
//! the browser with bounded reconnection and content-based continuation.

pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod testing;

pub use error::GoftarError;
