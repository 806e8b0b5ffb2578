/// 3-tap moving average over the interior samples.
///
/// Every interior sample becomes the truncating average of itself and its two
/// neighbours as they were *before* this pass (snapshot semantics), so the
/// result does not depend on iteration order. The first and last samples are
/// left untouched, as is any buffer shorter than three samples.
pub fn smooth(samples: &mut [i16]) {
    let len = samples.len();
    if len < 3 {
        return;
    }

    // Original value of samples[i - 1]; the slot itself is already overwritten.
    let mut previous = samples[0] as i32;
    for i in 1..len - 1 {
        let current = samples[i] as i32;
        let sum = previous + current + samples[i + 1] as i32;
        samples[i] = (sum / 3) as i16;
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ramp_is_unchanged() {
        let mut samples = [10, 20, 30, 40, 50];
        smooth(&mut samples);
        assert_eq!(samples, [10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_reads_pre_update_neighbours() {
        // A rolling overwrite would give [0, 100, 133, 144, 0].
        let mut samples = [0, 300, 0, 300, 0];
        smooth(&mut samples);
        assert_eq!(samples, [0, 100, 200, 100, 0]);
    }

    #[test]
    fn test_boundaries_untouched() {
        let mut samples = [i16::MAX, 0, 0, i16::MIN];
        smooth(&mut samples);
        assert_eq!(samples[0], i16::MAX);
        assert_eq!(samples[3], i16::MIN);
        assert_eq!(samples[1], (i16::MAX as i32 / 3) as i16);
        assert_eq!(samples[2], (i16::MIN as i32 / 3) as i16);
    }

    #[test]
    fn test_truncates_toward_zero() {
        let mut samples = [-1, -1, 0, 1, 1];
        smooth(&mut samples);
        assert_eq!(samples, [-1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_short_buffers_untouched() {
        let mut empty: [i16; 0] = [];
        smooth(&mut empty);

        let mut two = [5, -5];
        smooth(&mut two);
        assert_eq!(two, [5, -5]);
    }
}
