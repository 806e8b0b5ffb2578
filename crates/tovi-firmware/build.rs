//! Build script: linker setup and build-time device settings.
//!
//! Wi-Fi credentials and the upload URL are read from the environment, or
//! from a `.env` file next to the workspace root, and baked into the binary
//! as `TOVI_*` compile-time variables.

const SETTINGS: &[(&str, &str)] = &[
    ("TOVI_WIFI_SSID", ""),
    ("TOVI_WIFI_PASSWORD", ""),
    ("TOVI_UPLOAD_URL", "http://192.168.1.32:5000/upload"),
    ("TOVI_ECHO_URL", "http://192.168.1.32:5001/"),
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for (key, default) in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| {
            if default.is_empty() {
                println!("cargo:warning={key} is not set; using an empty value");
            }
            default.to_string()
        });
        println!("cargo:rustc-env={key}={value}");
    }
}
