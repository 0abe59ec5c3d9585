//! Configuration and settings management
//!
//! Loads settings from environment variables and defines the relay's fixed
//! parameters.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Numeric Telegram ID of the administrator, as it arrives from the
    /// environment. Kept as a string and parsed by [`Settings::admin_id`]
    /// so a malformed value disables admin uploads instead of panicking.
    #[serde(rename = "admin_id")]
    pub admin_id_str: Option<String>,

    /// Path of the JSON key store file
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_store_path() -> String {
    "file_store.json".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use linkdrop::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // Note: Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Returns the administrator's numeric Telegram ID, if configured.
    ///
    /// `ADMIN_ID` is compared against sender IDs as an `i64`; a missing or
    /// non-numeric value yields `None`, so the admin check never matches.
    #[must_use]
    pub fn admin_id(&self) -> Option<i64> {
        self.admin_id_str
            .as_ref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
    }

    /// How long a delivered file stays in the chat before deletion.
    #[must_use]
    pub const fn delete_delay(&self) -> Duration {
        Duration::from_secs(DELETE_DELAY_SECS)
    }
}

/// Length of generated share keys
pub const KEY_LENGTH: usize = 8;
/// Seconds a delivered file stays in the chat before the expiry timer
/// removes it
pub const DELETE_DELAY_SECS: u64 = 15;
/// Callback payload prefix of the re-fetch button
pub const RETRY_PREFIX: &str = "retry_";
