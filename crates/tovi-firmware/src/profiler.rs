//! System profiler task.
//!
//! Samples the chip, heap and uptime into a [`SystemReport`] and logs it
//! every `interval`.

use embassy_time::{Duration, Instant, Timer};
use esp_hal::efuse::Efuse;
use esp_hal::rtc_cntl::{SocResetReason, reset_reason};
use esp_hal::system::Cpu;
use tovi_core::profiler::{ResetCause, SystemReport};

pub const CHIP_NAME: &str = "ESP32-S3";
pub const CPU_CORES: u8 = 2;
/// Matches `CpuClock::max()` used at boot.
pub const CPU_MHZ: u32 = 240;

fn reset_cause() -> ResetCause {
    match reset_reason(Cpu::ProCpu) {
        Some(SocResetReason::ChipPowerOn) => ResetCause::PowerOn,
        Some(SocResetReason::CoreSw | SocResetReason::Cpu0Sw) => ResetCause::Software,
        Some(SocResetReason::CoreDeepSleep) => ResetCause::DeepSleep,
        Some(SocResetReason::CoreMwdt0 | SocResetReason::Cpu0Mwdt0) => ResetCause::TaskWatchdog,
        Some(SocResetReason::CoreMwdt1 | SocResetReason::Cpu0Mwdt1) => {
            ResetCause::InterruptWatchdog
        }
        Some(
            SocResetReason::CoreRtcWdt
            | SocResetReason::Cpu0RtcWdt
            | SocResetReason::SysRtcWdt
            | SocResetReason::SysSuperWdt,
        ) => ResetCause::OtherWatchdog,
        Some(SocResetReason::SysBrownOut) => ResetCause::Brownout,
        _ => ResetCause::Unknown,
    }
}

pub fn sample() -> SystemReport {
    SystemReport {
        chip: CHIP_NAME,
        cpu_cores: CPU_CORES,
        cpu_mhz: CPU_MHZ,
        mac: Efuse::read_base_mac_address(),
        heap_used: esp_alloc::HEAP.used(),
        heap_free: esp_alloc::HEAP.free(),
        uptime_ms: Instant::now().as_millis(),
        reset_cause: reset_cause(),
        temperature_c: None,
    }
}

#[embassy_executor::task]
pub async fn profiler(interval: Duration) {
    loop {
        sample().log();
        Timer::after(interval).await;
    }
}
