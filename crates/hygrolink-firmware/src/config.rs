//! Build-time device configuration
//!
//! Generated by `build.rs` from the environment (or `.env`). See
//! `.env.example` for the variable names and defaults.

use embassy_time::Duration;
use hygrolink_core::config::{BrokerConfig, Config, NetworkConfig, TopicConfig};

include!(concat!(env!("OUT_DIR"), "/config.rs"));
