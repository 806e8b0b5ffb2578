//! Periodic system report.
//!
//! The firmware samples the chip, heap and clock state into a
//! [`SystemReport`] every few seconds and logs it as one boxed block.

use log::info;

/// Why the chip last came out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    PowerOn,
    External,
    Software,
    Panic,
    InterruptWatchdog,
    TaskWatchdog,
    OtherWatchdog,
    DeepSleep,
    Brownout,
    Sdio,
    Unknown,
}

impl ResetCause {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PowerOn => "Power-on",
            Self::External => "External reset",
            Self::Software => "Software reset",
            Self::Panic => "Exception/panic",
            Self::InterruptWatchdog => "Interrupt watchdog",
            Self::TaskWatchdog => "Task watchdog",
            Self::OtherWatchdog => "Other watchdogs",
            Self::DeepSleep => "Deep sleep",
            Self::Brownout => "Brownout",
            Self::Sdio => "SDIO reset",
            Self::Unknown => "Unknown",
        }
    }
}

/// Snapshot of the device state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemReport {
    pub chip: &'static str,
    pub cpu_cores: u8,
    pub cpu_mhz: u32,
    pub mac: [u8; 6],
    pub heap_used: usize,
    pub heap_free: usize,
    pub uptime_ms: u64,
    pub reset_cause: ResetCause,
    /// `None` when the chip's temperature sensor is not available.
    pub temperature_c: Option<f32>,
}

impl SystemReport {
    pub fn heap_total(&self) -> usize {
        self.heap_used + self.heap_free
    }

    /// Heap usage in whole percent.
    pub fn heap_used_percent(&self) -> u8 {
        let total = self.heap_total();
        if total == 0 {
            return 0;
        }
        ((self.heap_used as u64 * 100) / total as u64) as u8
    }

    pub fn log(&self) {
        let [a, b, c, d, e, f] = self.mac;
        info!("==================================================");
        info!("               TOVI SYSTEM PROFILER               ");
        info!("==================================================");
        info!("> Chip Model         : {}", self.chip);
        info!("> CPU Cores          : {}", self.cpu_cores);
        info!("> CPU Frequency      : {} MHz", self.cpu_mhz);
        info!(
            "> MAC Address        : {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, f
        );
        info!(
            "> Heap Used          : {} bytes ({}%)",
            self.heap_used,
            self.heap_used_percent()
        );
        info!("> Heap Free          : {} bytes", self.heap_free);
        info!(
            "> Reset Cause        : {}",
            self.reset_cause.label()
        );
        match self.temperature_c {
            Some(celsius) => info!("> Temperature        : {:.2} °C", celsius),
            None => info!("> Temperature        : n/a"),
        }
        info!("> Time Since Boot    : {} ms", self.uptime_ms);
        info!("==================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(heap_used: usize, heap_free: usize) -> SystemReport {
        SystemReport {
            chip: "esp32s3",
            cpu_cores: 2,
            cpu_mhz: 240,
            mac: [0x24, 0x0A, 0xC4, 0x00, 0x11, 0x22],
            heap_used,
            heap_free,
            uptime_ms: 5_000,
            reset_cause: ResetCause::PowerOn,
            temperature_c: None,
        }
    }

    #[test]
    fn test_heap_percent() {
        assert_eq!(report(25, 75).heap_used_percent(), 25);
        assert_eq!(report(1, 2).heap_used_percent(), 33);
        assert_eq!(report(0, 0).heap_used_percent(), 0);
        assert_eq!(report(300, 700).heap_total(), 1000);
    }

    #[test]
    fn test_reset_cause_labels() {
        assert_eq!(ResetCause::Panic.label(), "Exception/panic");
        assert_eq!(ResetCause::TaskWatchdog.label(), "Task watchdog");
        assert_eq!(ResetCause::Unknown.label(), "Unknown");
    }
}
