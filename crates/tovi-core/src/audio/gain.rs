/// Amplify every sample by `2^shift`, saturating at the `i16` range.
pub fn apply_gain(samples: &mut [i16], shift: u32) {
    // Anything past 15 bits already saturates every non-zero sample; capping
    // the shift keeps the i32 product from overflowing.
    let shift = shift.min(16);
    for sample in samples.iter_mut() {
        let amplified = (*sample as i32) << shift;
        *sample = amplified.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_small_samples() {
        let mut samples = [0, 1, -1, 100, -100];
        apply_gain(&mut samples, 4);
        assert_eq!(samples, [0, 16, -16, 1600, -1600]);
    }

    #[test]
    fn test_gain_saturates() {
        let mut samples = [4000, -4000, i16::MAX, i16::MIN];
        apply_gain(&mut samples, 4);
        assert_eq!(samples, [i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_gain_stays_in_range_for_every_input() {
        for value in i16::MIN..=i16::MAX {
            let mut sample = [value];
            apply_gain(&mut sample, 4);
            let expected = ((value as i32) * 16).clamp(i16::MIN as i32, i16::MAX as i32);
            assert_eq!(sample[0] as i32, expected);
        }
    }

    #[test]
    fn test_huge_shift_saturates_without_panicking() {
        let mut samples = [1, -1, 0];
        apply_gain(&mut samples, 40);
        assert_eq!(samples, [i16::MAX, i16::MIN, 0]);
    }
}
