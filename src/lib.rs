//! Bridge from Misskey webhooks to a Gotify-style notification host.
//!
//! Requests arrive on `/push/misskey/{slug}` (plus `/follow` and `/abuse`),
//! are authenticated against the configured source, decoded leniently,
//! rendered to a Markdown message and submitted to the sink.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod http_server;
pub mod payload;
pub mod registry;
pub mod rpc;
pub mod render;
pub mod sink;
pub mod store;
