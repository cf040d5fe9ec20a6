//! ESP32-S3 firmware-specific modules for hygrolink
//!
//! This crate contains the hardware-specific side of the node: build-time
//! configuration, the esp-radio station driver feeding the join manager,
//! and the MQTT client task behind the session transport.

#![no_std]

extern crate alloc;

pub mod config;
pub mod mqtt;
pub mod wifi;

use hygrolink_core::session::SessionManager;

/// The session manager as wired on the device.
pub type DeviceSession = SessionManager<mqtt::MqttConnector>;
