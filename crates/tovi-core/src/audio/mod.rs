//! Audio preprocessing applied to every captured window before upload.
//!
//! Stages run in a fixed order, in place, over the whole window:
//!
//! 1. [`apply_gain`]: saturating left shift.
//! 2. [`HighPassFilter`]: DC removal, the only stage with state.
//! 3. [`smooth`]: 3-tap moving average over interior samples.
//!
//! Smoothing reads its neighbours from the full high-pass output, so the stages
//! cannot be interleaved per sample.

mod gain;
mod high_pass;
mod smoothing;

pub use gain::apply_gain;
pub use high_pass::HighPassFilter;
pub use smoothing::smooth;

/// Default left shift of the gain stage (×16).
pub const DEFAULT_GAIN_SHIFT: u32 = 4;

/// Gain → high-pass → smoothing, holding the high-pass state between windows.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    gain_shift: u32,
    high_pass: HighPassFilter,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_GAIN_SHIFT)
    }
}

impl Preprocessor {
    pub const fn new(gain_shift: u32) -> Self {
        Self {
            gain_shift,
            high_pass: HighPassFilter::new(),
        }
    }

    pub fn gain_shift(&self) -> u32 {
        self.gain_shift
    }

    pub fn high_pass(&self) -> &HighPassFilter {
        &self.high_pass
    }

    /// Forget the high-pass history before an unrelated session.
    pub fn reset(&mut self) {
        self.high_pass.reset();
    }

    /// Run all three stages over `samples` in place.
    pub fn process(&mut self, samples: &mut [i16]) {
        apply_gain(samples, self.gain_shift);
        self.high_pass.process(samples);
        smooth(samples);
    }
}
