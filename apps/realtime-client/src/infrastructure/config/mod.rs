//! Configuration Module
//!
//! Environment-driven settings for the realtime client.

mod settings;

pub use settings::{
    ConfigError, DEVELOPMENT_WS_URL, Environment, PRODUCTION_WS_URL, RealtimeSettings,
};
