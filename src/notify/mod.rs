// src/notify/mod.rs
//! Out-of-band alert delivery (chat webhooks).

pub mod discord;

pub use discord::WebhookPublisher;
