//! ESP32-S3 firmware-specific modules for Tovi
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: the I2S microphone driver, the Wi-Fi station and embassy-net TCP
//! plumbing, the trigger server task and the system profiler sampling.

#![no_std]

extern crate alloc;

pub mod mic;
pub mod net;
pub mod profiler;
pub mod settings;
pub mod trigger_server;

#[cfg(feature = "bench")]
pub mod bench;
