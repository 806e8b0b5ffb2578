//! Device configuration
//!
//! Credentials, the upload URL, pin numbers and audio parameters live here as
//! named fields with documented defaults. The firmware builds a [`DeviceConfig`] at boot from
//! build-time environment values; the simulator builds one from its command
//! line.

use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::upload::{Endpoint, EndpointError};

/// Largest recording window accepted by [`DeviceConfig::validate`]: 10 s at 16 kHz.
pub const MAX_WINDOW_SAMPLES: usize = 160_000;

pub const DEFAULT_UPLOAD_URL: &str = "http://192.168.1.32:5000/upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceConfig<'a> {
    pub wifi: WifiConfig<'a>,
    pub upload: UploadConfig<'a>,
    pub audio: AudioConfig,
    pub mode: CaptureMode,
    pub pins: PinConfig,
    pub trigger: TriggerConfig,
    pub profiler: ProfilerConfig,
}

impl DeviceConfig<'_> {
    /// Check the configuration before any hardware is brought up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.audio.window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        let samples = self.audio.window_samples();
        if samples > MAX_WINDOW_SAMPLES {
            return Err(ConfigError::WindowTooLarge { samples });
        }
        self.upload.endpoint()?;
        if let Some(gpio) = self.pins.shared() {
            return Err(ConfigError::PinConflict { gpio });
        }
        Ok(())
    }
}

/// Wi-Fi station credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig<'a> {
    /// `http://host[:port]/path` the processed windows are POSTed to.
    /// Default: [`DEFAULT_UPLOAD_URL`].
    pub url: &'a str,
    /// Upper bound for one whole upload (connect, send, response). Default: 10 s.
    pub timeout_ms: u64,
}

impl Default for UploadConfig<'_> {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPLOAD_URL,
            timeout_ms: 10_000,
        }
    }
}

impl UploadConfig<'_> {
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        Endpoint::parse(self.url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Recording window and preprocessing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Default: 16 000 Hz.
    pub sample_rate_hz: u32,
    /// Length of one recording window. Default: 4 s.
    pub window_secs: u32,
    /// Left shift applied by the gain stage. Default: 4 (×16).
    pub gain_shift: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            window_secs: 4,
            gain_shift: 4,
        }
    }
}

impl AudioConfig {
    /// Number of samples in one window (`sample_rate × window_secs`).
    pub const fn window_samples(&self) -> usize {
        self.sample_rate_hz as usize * self.window_secs as usize
    }

    /// Size of one window on the wire, 16-bit samples.
    pub const fn window_bytes(&self) -> usize {
        self.window_samples() * core::mem::size_of::<i16>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// One window per `GET /trigger`, filter state reset per session.
    #[default]
    Triggered,
    /// Windows back to back as one continuous stream.
    Streaming,
}

/// GPIO numbers. Defaults match the XIAO ESP32S3 Sense wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub mic_clk: u8,
    pub mic_data: u8,
    pub mic_ws: u8,
    pub led: u8,
}

impl PinConfig {
    /// The first GPIO assigned to more than one role, if any.
    pub fn shared(&self) -> Option<u8> {
        let pins = [self.mic_clk, self.mic_data, self.mic_ws, self.led];
        pins.iter()
            .enumerate()
            .find(|&(i, pin)| pins[i + 1..].contains(pin))
            .map(|(_, &pin)| pin)
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            mic_clk: 42,
            mic_data: 41,
            mic_ws: 40,
            led: 21,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    /// TCP port of the trigger HTTP server. Default: 80.
    pub port: u16,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { port: 80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Seconds between two system reports. Default: 5.
    pub interval_secs: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("recording window must be at least one second")]
    ZeroWindow,
    #[error("recording window of {samples} samples exceeds the supported maximum")]
    WindowTooLarge { samples: usize },
    #[error("invalid upload url: {0}")]
    Url(EndpointError),
    #[error("GPIO{gpio} is assigned to more than one role")]
    PinConflict { gpio: u8 },
}

impl From<EndpointError> for ConfigError {
    fn from(value: EndpointError) -> Self {
        Self::Url(value)
    }
}
