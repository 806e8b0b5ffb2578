//! First-order high-pass (DC removal) stage.
//!
//! Recurrence per sample `x`:
//!
//! ```text
//! y = x - prev_input + 0.9 * prev_output
//! ```
//!
//! The feedback coefficient is applied to `prev_output` only; this is not the
//! textbook DC blocker and is reproduced as is. The sum is evaluated exactly in
//! tenths using integer arithmetic, truncated toward zero, then clamped to the
//! `i16` range. The clamped value is both stored and fed back.

/// Feedback coefficient 0.9 as a ratio, so the filter needs no FPU.
const ALPHA_NUM: i32 = 9;
const ALPHA_DEN: i32 = 10;

/// Filter state carried across successive buffers of one continuous stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighPassFilter {
    prev_input: i16,
    prev_output: i16,
}

impl HighPassFilter {
    pub const fn new() -> Self {
        Self {
            prev_input: 0,
            prev_output: 0,
        }
    }

    /// Zero the state. Call at the start of every unrelated recording session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the filter still holds its initial zero state.
    pub fn is_reset(&self) -> bool {
        *self == Self::new()
    }

    pub fn process_sample(&mut self, x: i16) -> i16 {
        let scaled = ALPHA_DEN * (x as i32 - self.prev_input as i32)
            + ALPHA_NUM * self.prev_output as i32;
        // i32 division truncates toward zero.
        let y = (scaled / ALPHA_DEN).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        self.prev_input = x;
        self.prev_output = y;
        y
    }

    /// Filter `samples` in place, continuing from the current state.
    pub fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
