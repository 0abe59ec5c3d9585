//! linkdrop - expiring media share links over Telegram
//!
//! An administrator uploads a photo or video to the bot, the bot stores the
//! platform file reference under a short random key and replies with a deep
//! link. Opening the link delivers the media, which self-destructs after a
//! fixed delay and can be re-fetched with an inline button.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Share-key generation
pub mod keygen;
/// Persistent key store
pub mod store;
/// Text utilities
pub mod utils;
