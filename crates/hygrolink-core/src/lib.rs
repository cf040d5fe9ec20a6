//! Hardware-independent core library for hygrolink
//!
//! This crate holds the connectivity lifecycle of the hygrolink sensor node:
//! the wireless join state machine with bounded retry, the broker session
//! owner, and the periodic sample-and-publish loop. Radio, broker client and
//! sensor bus are reached only through the traits defined here.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 firmware and on
//! desktop hosts (for the simulator and tests).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod limits;
pub mod network;
pub mod sampling;
pub mod sensors;
pub mod session;
pub mod signal;
