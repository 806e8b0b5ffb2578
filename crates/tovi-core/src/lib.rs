//! Hardware-independent core library for Tovi
//!
//! This crate contains all platform-agnostic logic of the Tovi microphone
//! capture firmware: the audio preprocessing stages, the capture loop, the
//! recorder that drives capture → preprocess → upload, HTTP framing for the
//! upload client and trigger server, device configuration, and the profiler
//! and throughput reports.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod audio;
pub mod bench;
pub mod capture;
pub mod config;
pub mod http;
pub mod profiler;
pub mod recorder;
pub mod transport;
pub mod trigger;
pub mod upload;
