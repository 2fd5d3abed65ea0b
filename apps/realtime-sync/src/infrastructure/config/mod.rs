//! Configuration Module
//!
//! Environment-driven settings for the sync service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_FALLBACK_ORIGIN, DEFAULT_QX_API_URL, HttpSettings, ServerSettings,
    SocketSettings, SyncConfig,
};
