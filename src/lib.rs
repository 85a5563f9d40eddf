//! Voice-auth demo backend and its session client.
//!
//! The server half (`app`, `auth`, `audio`) exposes a cookie-based JWT
//! session API; the `client` half keeps one authoritative session on the
//! consuming side and refreshes it transparently.

pub mod app;
pub mod audio;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod storage;
