//! Synthetic microphone signals.

use std::convert::Infallible;
use std::f32::consts::TAU;

use clap::ValueEnum;
use tovi_core::capture::SampleSource;

/// Waveform produced by [`SyntheticSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Waveform {
    /// Alternates `+amplitude` and `-amplitude` every sample.
    Square,
    /// 440 Hz tone.
    Sine,
    Silence,
}

const SINE_HZ: f32 = 440.0;

/// Endless generated signal, handed out in reads of at most `chunk` samples.
pub struct SyntheticSource {
    waveform: Waveform,
    amplitude: i16,
    sample_rate_hz: u32,
    chunk: usize,
    position: u64,
}

impl SyntheticSource {
    pub fn new(waveform: Waveform, amplitude: i16, sample_rate_hz: u32, chunk: usize) -> Self {
        Self {
            waveform,
            amplitude,
            sample_rate_hz,
            chunk: chunk.max(1),
            position: 0,
        }
    }

    fn sample_at(&self, n: u64) -> i16 {
        match self.waveform {
            Waveform::Square if n % 2 == 0 => self.amplitude,
            Waveform::Square => self.amplitude.saturating_neg(),
            Waveform::Sine => {
                let t = n as f32 / self.sample_rate_hz as f32;
                (f32::from(self.amplitude) * (TAU * SINE_HZ * t).sin()) as i16
            }
            Waveform::Silence => 0,
        }
    }
}

impl SampleSource for SyntheticSource {
    type Error = Infallible;

    async fn read(&mut self, buf: &mut [i16]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.chunk);
        for slot in &mut buf[..n] {
            *slot = self.sample_at(self.position);
            self.position += 1;
        }
        Ok(n)
    }
}
