//! Glimpse: a terminal AI chat client that can also show you photos.
//!
//! Conversations stream through an OpenRouter-compatible completion API;
//! messages carrying visual intent are routed to a stock-photo search
//! instead and answered with embedded image markdown. Everything persists
//! as JSON under the data directory.

pub mod api;
pub mod app;
pub mod chat;
pub mod config;
pub mod intent;
pub mod onboarding;
pub mod session;
pub mod speech;
pub mod storage;
pub mod ui;
pub mod utils;
