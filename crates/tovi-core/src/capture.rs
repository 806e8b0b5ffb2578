//! Filling one recording window from a microphone.
//!
//! A [`SampleSource`] hands out whatever samples it has. The capture loop
//! keeps reading until the window is full:
//!
//! - a short read is accumulated,
//! - a read of zero samples means "nothing yet" and is retried,
//! - an error aborts the capture; the partial window is discarded by the caller.

use alloc::vec::Vec;
use log::{debug, warn};
use thiserror_no_std::Error;

/// Number of consecutive empty reads after which a stalled source is logged.
pub const EMPTY_READ_WARN_THRESHOLD: u32 = 64;

/// Source of 16-bit PCM samples, e.g. an I2S microphone.
pub trait SampleSource {
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` samples, returning how many were written.
    ///
    /// `Ok(0)` means no data is available yet. An `Err` is fatal for the
    /// capture in progress.
    fn read(&mut self, buf: &mut [i16]) -> impl Future<Output = Result<usize, Self::Error>>;

    /// Drop samples buffered before now. Called when a new session starts.
    fn discard_buffered(&mut self) {}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError<E: core::fmt::Debug> {
    #[error("sample source failed: {0:?}")]
    Source(E),
    #[error("sample source reported {reported} samples for a {requested}-sample read")]
    Overrun { requested: usize, reported: usize },
}

/// Counters for one filled window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub samples: usize,
    pub reads: u32,
    pub empty_reads: u32,
}

/// Read from `source` until `window` is full.
pub async fn fill_window<S: SampleSource>(
    source: &mut S,
    window: &mut [i16],
) -> Result<CaptureStats, CaptureError<S::Error>> {
    let mut stats = CaptureStats::default();
    let mut idle_streak = 0u32;

    while stats.samples < window.len() {
        let remaining = &mut window[stats.samples..];
        let requested = remaining.len();
        let read = source.read(remaining).await.map_err(CaptureError::Source)?;
        stats.reads += 1;

        if read > requested {
            return Err(CaptureError::Overrun {
                requested,
                reported: read,
            });
        }

        if read == 0 {
            stats.empty_reads += 1;
            idle_streak += 1;
            if idle_streak == EMPTY_READ_WARN_THRESHOLD {
                warn!(
                    "Sample source returned no data {} times in a row ({} of {} samples)",
                    idle_streak,
                    stats.samples,
                    window.len()
                );
            }
            embassy_futures::yield_now().await;
            continue;
        }

        idle_streak = 0;
        stats.samples += read;
        debug!("Captured {}/{} samples", stats.samples, window.len());
    }

    Ok(stats)
}

/// Working buffer for one recording window, allocated once and reused.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<i16>,
}

/// The window could not be allocated.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to allocate a {samples}-sample window")]
pub struct AllocError {
    pub samples: usize,
}

impl SampleBuffer {
    /// Allocate a zeroed window of `samples` samples without aborting on OOM.
    pub fn try_new(samples: usize) -> Result<Self, AllocError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(samples)
            .map_err(|_| AllocError { samples })?;
        buffer.resize(samples, 0);
        Ok(Self { samples: buffer })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.samples
    }
}

// ---------------------------------------------------------------------------
// Stereo frames
// ---------------------------------------------------------------------------

/// Bytes of one 16-bit stereo I2S frame (left, right; little-endian).
pub const STEREO_FRAME_BYTES: usize = 4;

/// Keeps the left channel of a 16-bit stereo byte stream.
///
/// DMA reads do not respect frame boundaries; a trailing partial frame is
/// held back and completed by the next call.
#[derive(Debug, Default)]
pub struct LeftChannel {
    partial: heapless::Vec<u8, STEREO_FRAME_BYTES>,
}

impl LeftChannel {
    pub const fn new() -> Self {
        Self {
            partial: heapless::Vec::new(),
        }
    }

    /// Bytes of an incomplete frame carried over from the last call.
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Most bytes that can be fed to [`LeftChannel::extract`] for `samples` output samples.
    pub fn max_input(&self, samples: usize) -> usize {
        (samples * STEREO_FRAME_BYTES).saturating_sub(self.partial.len())
    }

    /// Decode the complete frames in `bytes` into `out`, returning the samples written.
    ///
    /// `bytes` must not be longer than [`LeftChannel::max_input`] for `out.len()`.
    pub fn extract(&mut self, mut bytes: &[u8], out: &mut [i16]) -> usize {
        let mut written = 0;

        if !self.partial.is_empty() {
            let take = (STEREO_FRAME_BYTES - self.partial.len()).min(bytes.len());
            let (head, rest) = bytes.split_at(take);
            // `take` never exceeds the free capacity.
            let _ = self.partial.extend_from_slice(head);
            bytes = rest;
            if self.partial.is_full() {
                if let Some(slot) = out.first_mut() {
                    *slot = i16::from_le_bytes([self.partial[0], self.partial[1]]);
                    written = 1;
                }
                self.partial.clear();
            }
        }

        let mut frames = bytes.chunks_exact(STEREO_FRAME_BYTES);
        for (slot, frame) in out[written..].iter_mut().zip(&mut frames) {
            *slot = i16::from_le_bytes([frame[0], frame[1]]);
            written += 1;
        }
        let _ = self.partial.extend_from_slice(frames.remainder());
        written
    }
}

/// Left-channel samples decoded from DMA chunks but not read yet.
///
/// A DMA pop hands over everything the ring holds, which is usually more
/// than one read asks for. The surplus waits here and later reads are
/// served from it first. When the queue is full the oldest samples give way.
#[derive(Debug)]
pub struct CaptureQueue<const N: usize> {
    decoder: LeftChannel,
    samples: heapless::Deque<i16, N>,
}

impl<const N: usize> Default for CaptureQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CaptureQueue<N> {
    pub const fn new() -> Self {
        Self {
            decoder: LeftChannel::new(),
            samples: heapless::Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes of an incomplete frame waiting for the next chunk.
    pub fn pending_bytes(&self) -> usize {
        self.decoder.pending_bytes()
    }

    /// Decode a chunk of stereo frames of any length and queue its left channel.
    ///
    /// Returns the number of queued samples that were dropped to make room.
    pub fn push_frames(&mut self, mut bytes: &[u8]) -> usize {
        let mut scratch = [0i16; 64];
        let mut dropped = 0;

        while !bytes.is_empty() {
            let take = self.decoder.max_input(scratch.len()).min(bytes.len());
            let (head, rest) = bytes.split_at(take);
            let decoded = self.decoder.extract(head, &mut scratch);
            for &sample in &scratch[..decoded] {
                if self.samples.is_full() {
                    self.samples.pop_front();
                    dropped += 1;
                }
                // Room was made above.
                let _ = self.samples.push_back(sample);
            }
            bytes = rest;
        }
        dropped
    }

    /// Move up to `out.len()` queued samples into `out`, oldest first.
    pub fn read(&mut self, out: &mut [i16]) -> usize {
        let mut written = 0;
        for slot in out.iter_mut() {
            match self.samples.pop_front() {
                Some(sample) => *slot = sample,
                None => break,
            }
            written += 1;
        }
        written
    }

    /// Forget queued samples and any partial frame.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.decoder = LeftChannel::new();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use embassy_futures::block_on;

    /// One scripted outcome of [`ScriptedSource::read`].
    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        Samples(usize),
        Empty,
        Fail,
    }

    /// Source that replays a script, producing an incrementing ramp.
    pub struct ScriptedSource {
        pub steps: VecDeque<Step>,
        pub next_value: i16,
        pub discards: u32,
    }

    impl ScriptedSource {
        pub fn new(steps: &[Step]) -> Self {
            Self {
                steps: steps.iter().copied().collect(),
                next_value: 0,
                discards: 0,
            }
        }

        /// Source that always returns `chunk` samples.
        pub fn chunked(chunk: usize, reads: usize) -> Self {
            Self::new(&alloc::vec![Step::Samples(chunk); reads])
        }
    }

    impl SampleSource for ScriptedSource {
        type Error = &'static str;

        async fn read(&mut self, buf: &mut [i16]) -> Result<usize, Self::Error> {
            match self.steps.pop_front() {
                Some(Step::Samples(n)) => {
                    let n = n.min(buf.len());
                    for slot in &mut buf[..n] {
                        *slot = self.next_value;
                        self.next_value = self.next_value.wrapping_add(1);
                    }
                    Ok(n)
                }
                Some(Step::Empty) => Ok(0),
                Some(Step::Fail) => Err("i2s read failed"),
                None => Err("script exhausted"),
            }
        }

        fn discard_buffered(&mut self) {
            self.discards += 1;
        }
    }

    #[test]
    fn test_short_reads_accumulate() {
        let mut source =
            ScriptedSource::new(&[Step::Samples(3), Step::Samples(2), Step::Samples(5)]);
        let mut window = [0i16; 8];
        let stats = block_on(fill_window(&mut source, &mut window)).unwrap();

        assert_eq!(window, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(
            stats,
            CaptureStats {
                samples: 8,
                reads: 3,
                empty_reads: 0
            }
        );
    }

    #[test]
    fn test_empty_reads_are_retried() {
        let mut source = ScriptedSource::new(&[
            Step::Empty,
            Step::Samples(2),
            Step::Empty,
            Step::Empty,
            Step::Samples(2),
        ]);
        let mut window = [0i16; 4];
        let stats = block_on(fill_window(&mut source, &mut window)).unwrap();

        assert_eq!(window, [0, 1, 2, 3]);
        assert_eq!(stats.empty_reads, 3);
        assert_eq!(stats.reads, 5);
    }

    #[test]
    fn test_source_error_aborts() {
        let mut source = ScriptedSource::new(&[Step::Samples(2), Step::Fail, Step::Samples(2)]);
        let mut window = [0i16; 4];
        let result = block_on(fill_window(&mut source, &mut window));

        assert_eq!(result, Err(CaptureError::Source("i2s read failed")));
        // The remaining script step was never consumed.
        assert_eq!(source.steps.len(), 1);
    }

    struct LyingSource;

    impl SampleSource for LyingSource {
        type Error = ();

        async fn read(&mut self, buf: &mut [i16]) -> Result<usize, ()> {
            Ok(buf.len() + 1)
        }
    }

    #[test]
    fn test_overrun_is_rejected() {
        let mut window = [0i16; 4];
        let result = block_on(fill_window(&mut LyingSource, &mut window));
        assert_eq!(
            result,
            Err(CaptureError::Overrun {
                requested: 4,
                reported: 5
            })
        );
    }

    #[test]
    fn test_empty_window_needs_no_reads() {
        let mut source = ScriptedSource::new(&[]);
        let stats = block_on(fill_window(&mut source, &mut [])).unwrap();
        assert_eq!(stats, CaptureStats::default());
    }

    #[test]
    fn test_sample_buffer_allocation() {
        let mut buffer = SampleBuffer::try_new(1024).unwrap();
        assert_eq!(buffer.len(), 1024);
        assert!(buffer.as_slice().iter().all(|&s| s == 0));
        buffer.as_mut_slice()[0] = 7;
        assert_eq!(buffer.as_slice()[0], 7);
    }

    #[test]
    fn test_sample_buffer_allocation_failure() {
        assert_eq!(
            SampleBuffer::try_new(usize::MAX).unwrap_err(),
            AllocError { samples: usize::MAX }
        );
    }

    fn frame(left: i16, right: i16) -> [u8; 4] {
        let [l0, l1] = left.to_le_bytes();
        let [r0, r1] = right.to_le_bytes();
        [l0, l1, r0, r1]
    }

    #[test]
    fn test_left_channel_whole_frames() {
        let mut bytes = alloc::vec::Vec::new();
        for (left, right) in [(1, -1), (-300, 300), (i16::MAX, 0)] {
            bytes.extend_from_slice(&frame(left, right));
        }
        let mut left = LeftChannel::new();
        let mut out = [0i16; 3];

        assert_eq!(left.extract(&bytes, &mut out), 3);
        assert_eq!(out, [1, -300, i16::MAX]);
        assert_eq!(left.pending_bytes(), 0);
    }

    #[test]
    fn test_left_channel_split_frames() {
        let bytes: alloc::vec::Vec<u8> = [frame(10, 0), frame(-20, 0), frame(30, 0)].concat();
        let mut left = LeftChannel::new();
        let mut out = [0i16; 3];

        // Split inside the first frame and again inside the third.
        assert_eq!(left.extract(&bytes[..3], &mut out), 0);
        assert_eq!(left.pending_bytes(), 3);
        assert_eq!(left.max_input(3), 9);

        let n = left.extract(&bytes[3..10], &mut out);
        assert_eq!(n, 2);
        assert_eq!(&out[..2], [10, -20]);
        assert_eq!(left.pending_bytes(), 2);

        let n = left.extract(&bytes[10..], &mut out[2..]);
        assert_eq!(n, 1);
        assert_eq!(out, [10, -20, 30]);
        assert_eq!(left.pending_bytes(), 0);
    }

    /// One DMA descriptor's worth of bytes.
    const DESCRIPTOR_BYTES: usize = 4092;

    /// Stereo frames whose left channel counts up from `start`.
    fn ramp_frames(start: i16, frames: usize) -> alloc::vec::Vec<u8> {
        (0..frames)
            .flat_map(|i| frame(start.wrapping_add(i as i16), -1))
            .collect()
    }

    #[test]
    fn test_capture_queue_serves_surplus_on_next_read() {
        let mut queue = CaptureQueue::<64>::new();
        assert_eq!(queue.push_frames(&ramp_frames(0, 8)), 0);

        let mut out = [0i16; 3];
        assert_eq!(queue.read(&mut out), 3);
        assert_eq!(out, [0, 1, 2]);
        assert_eq!(queue.len(), 5);

        let mut out = [0i16; 10];
        assert_eq!(queue.read(&mut out), 5);
        assert_eq!(&out[..5], [3, 4, 5, 6, 7]);
        assert!(queue.is_empty());
        assert_eq!(queue.read(&mut out), 0);
    }

    #[test]
    fn test_capture_queue_single_sample_from_full_descriptor() {
        let frames = DESCRIPTOR_BYTES / STEREO_FRAME_BYTES;
        let mut queue = CaptureQueue::<2048>::new();
        assert_eq!(queue.push_frames(&ramp_frames(100, frames)), 0);

        let mut out = [0i16; 1];
        assert_eq!(queue.read(&mut out), 1);
        assert_eq!(out, [100]);
        assert_eq!(queue.len(), frames - 1);
        assert_eq!(queue.pending_bytes(), 0);
    }

    #[test]
    fn test_capture_queue_partial_frame_at_descriptor_boundary() {
        // Two descriptors whose boundary falls two bytes into a frame.
        let bytes = ramp_frames(0, 2 * DESCRIPTOR_BYTES / STEREO_FRAME_BYTES);
        let split = DESCRIPTOR_BYTES + 2;
        let mut queue = CaptureQueue::<4096>::new();

        queue.push_frames(&bytes[..split]);
        assert_eq!(queue.len(), DESCRIPTOR_BYTES / STEREO_FRAME_BYTES);
        assert_eq!(queue.pending_bytes(), 2);

        queue.push_frames(&bytes[split..]);
        assert_eq!(queue.len(), 2 * DESCRIPTOR_BYTES / STEREO_FRAME_BYTES);
        assert_eq!(queue.pending_bytes(), 0);

        let mut out = alloc::vec![0i16; queue.len()];
        queue.read(&mut out);
        assert!(out.iter().enumerate().all(|(i, &s)| s == i as i16));
    }

    #[test]
    fn test_capture_queue_drops_oldest_when_full() {
        let mut queue = CaptureQueue::<4>::new();
        assert_eq!(queue.push_frames(&ramp_frames(0, 6)), 2);

        let mut out = [0i16; 4];
        assert_eq!(queue.read(&mut out), 4);
        assert_eq!(out, [2, 3, 4, 5]);
    }

    #[test]
    fn test_capture_queue_clear_forgets_partial_frame() {
        let mut queue = CaptureQueue::<16>::new();
        let bytes = ramp_frames(7, 2);
        queue.push_frames(&bytes[..6]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_bytes(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pending_bytes(), 0);

        // Fresh data decodes from a frame boundary again.
        queue.push_frames(&frame(42, 0));
        let mut out = [0i16; 2];
        assert_eq!(queue.read(&mut out), 1);
        assert_eq!(out[0], 42);
    }

    /// Source that drains whole descriptors into a queue, like the I2S adapter.
    struct DescriptorSource {
        descriptors: VecDeque<alloc::vec::Vec<u8>>,
        queue: CaptureQueue<4096>,
        pops: u32,
    }

    impl SampleSource for DescriptorSource {
        type Error = &'static str;

        async fn read(&mut self, buf: &mut [i16]) -> Result<usize, Self::Error> {
            if self.queue.is_empty() {
                let Some(descriptor) = self.descriptors.pop_front() else {
                    return Ok(0);
                };
                self.queue.push_frames(&descriptor);
                self.pops += 1;
            }
            Ok(self.queue.read(buf))
        }

        fn discard_buffered(&mut self) {
            self.queue.clear();
        }
    }

    #[test]
    fn test_fill_window_smaller_than_descriptor() {
        let bytes = ramp_frames(0, 2 * DESCRIPTOR_BYTES / STEREO_FRAME_BYTES);
        let mut source = DescriptorSource {
            descriptors: bytes.chunks(DESCRIPTOR_BYTES).map(<[u8]>::to_vec).collect(),
            queue: CaptureQueue::new(),
            pops: 0,
        };

        let mut window = [0i16; 600];
        block_on(fill_window(&mut source, &mut window)).unwrap();
        assert_eq!(window[599], 599);

        // The second window starts with the surplus of the first descriptor.
        block_on(fill_window(&mut source, &mut window)).unwrap();
        assert_eq!(window[0], 600);
        assert_eq!(window[599], 1199);
        assert_eq!(source.pops, 2);

        source.discard_buffered();
        assert!(source.queue.is_empty());
    }
}
