//! Build-time device settings
//!
//! Values come from the environment (or `.env`) at build time; see `build.rs`.

use esp_hal::gpio::Pin;
use log::info;
use tovi_core::config::{DeviceConfig, UploadConfig, WifiConfig};

pub const WIFI_SSID: &str = env!("TOVI_WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("TOVI_WIFI_PASSWORD");
pub const UPLOAD_URL: &str = env!("TOVI_UPLOAD_URL");
/// TCP echo server used by the `bench` feature, as `http://host:port/`.
pub const ECHO_URL: &str = env!("TOVI_ECHO_URL");

/// The device configuration: build-time credentials and URL, defaults elsewhere.
pub fn device_config() -> DeviceConfig<'static> {
    DeviceConfig {
        wifi: WifiConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        upload: UploadConfig {
            url: UPLOAD_URL,
            ..UploadConfig::default()
        },
        ..DeviceConfig::default()
    }
}

/// Check at boot that the GPIO handed to `role` is the one the configuration names.
pub fn check_pin(role: &str, pin: &impl Pin, configured: u8) {
    assert_eq!(
        pin.number(),
        configured,
        "{} is wired to GPIO{}, configuration says GPIO{}",
        role,
        pin.number(),
        configured
    );
    info!("{}: GPIO{}", role, configured);
}
