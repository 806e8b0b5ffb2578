//! Capture → preprocess → upload driver.
//!
//! The [`Recorder`] owns the working window and the preprocessing state. One
//! cycle fills the window from a [`SampleSource`], runs the [`Preprocessor`]
//! over it and hands it to an [`Uploader`].
//!
//! ## Failure handling
//!
//! - The window is allocated once in [`Recorder::new`]; failure is returned there.
//! - A source error aborts the cycle with [`RecordError::Capture`]. The
//!   partial window is never processed or uploaded.
//! - An upload failure is not an error: the cycle completes with
//!   [`CycleOutcome::NotDelivered`] and the filter state is kept.
//! - [`Recorder::run`] waits [`CAPTURE_RETRY_DELAY`] after a capture failure
//!   so a broken microphone cannot starve the other tasks.
//!
//! ## Sessions
//!
//! In [`CaptureMode::Triggered`] every trigger starts a new session and the
//! high-pass state is reset. In [`CaptureMode::Streaming`] consecutive windows
//! are one stream; the state is reset only when the stream (re)starts, i.e.
//! at the first cycle and after a capture failure broke continuity. Starting
//! a session also discards whatever audio the source buffered before it.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::audio::Preprocessor;
use crate::capture::{self, AllocError, CaptureError, CaptureStats, SampleBuffer, SampleSource};
use crate::config::{AudioConfig, CaptureMode};
use crate::trigger::Trigger;
use crate::upload::Uploader;

/// Pause after a failed capture before the next cycle.
pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered,
    /// Processed, but the uploader failed.
    NotDelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub capture: CaptureStats,
    /// 1-based index of this cycle since boot.
    pub cycle: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError<E: core::fmt::Debug> {
    #[error("capture failed: {0}")]
    Capture(CaptureError<E>),
}

impl<E: core::fmt::Debug> From<CaptureError<E>> for RecordError<E> {
    fn from(value: CaptureError<E>) -> Self {
        Self::Capture(value)
    }
}

/// Running totals since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub cycles: u32,
    pub delivered: u32,
    pub not_delivered: u32,
    pub capture_failures: u32,
}

pub struct Recorder {
    mode: CaptureMode,
    preprocessor: Preprocessor,
    window: SampleBuffer,
    window_valid: bool,
    stream_open: bool,
    stats: RecorderStats,
}

impl Recorder {
    pub fn new(audio: &AudioConfig, mode: CaptureMode) -> Result<Self, AllocError> {
        let window = SampleBuffer::try_new(audio.window_samples())?;
        info!(
            "Recorder ready: {} samples per window ({} s at {} Hz), gain <<{}, {:?} mode",
            window.len(),
            audio.window_secs,
            audio.sample_rate_hz,
            audio.gain_shift,
            mode
        );
        Ok(Self {
            mode,
            preprocessor: Preprocessor::new(audio.gain_shift),
            window,
            window_valid: false,
            stream_open: false,
            stats: RecorderStats::default(),
        })
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Last processed window; `None` before the first one and after a failed capture.
    pub fn window(&self) -> Option<&[i16]> {
        self.window_valid.then(|| self.window.as_slice())
    }

    /// Start an unrelated session: forget the high-pass history.
    pub fn begin_session(&mut self) {
        self.preprocessor.reset();
        self.stream_open = true;
    }

    /// Capture, preprocess and upload one window.
    pub async fn run_cycle<S, U>(
        &mut self,
        source: &mut S,
        uploader: &mut U,
    ) -> Result<CycleReport, RecordError<S::Error>>
    where
        S: SampleSource,
        U: Uploader,
    {
        self.stats.cycles += 1;
        let cycle = self.stats.cycles;
        self.window_valid = false;

        let capture = match capture::fill_window(source, self.window.as_mut_slice()).await {
            Ok(capture) => capture,
            Err(e) => {
                self.stats.capture_failures += 1;
                self.stream_open = false;
                error!("Cycle {}: capture aborted: {:?}", cycle, e);
                return Err(e.into());
            }
        };

        self.preprocessor.process(self.window.as_mut_slice());
        self.window_valid = true;

        let outcome = match uploader.upload(self.window.as_slice()).await {
            Ok(()) => {
                self.stats.delivered += 1;
                info!(
                    "Cycle {}: sent {} bytes of audio",
                    cycle,
                    self.window.len() * core::mem::size_of::<i16>()
                );
                CycleOutcome::Delivered
            }
            Err(e) => {
                self.stats.not_delivered += 1;
                warn!("Cycle {}: failed to send audio: {:?}", cycle, e);
                CycleOutcome::NotDelivered
            }
        };

        Ok(CycleReport {
            outcome,
            capture,
            cycle,
        })
    }

    /// Run the next cycle the configured mode calls for.
    ///
    /// Triggered mode waits for `trigger`, starts a new session and holds
    /// `led` high while recording and sending. Streaming mode starts a session
    /// only when the stream is not open yet. A new session drops the audio
    /// `source` buffered before it.
    pub async fn next_cycle<S, U, P>(
        &mut self,
        trigger: &Trigger,
        source: &mut S,
        uploader: &mut U,
        led: &mut P,
    ) -> Result<CycleReport, RecordError<S::Error>>
    where
        S: SampleSource,
        U: Uploader,
        P: OutputPin,
    {
        match self.mode {
            CaptureMode::Triggered => {
                trigger.wait().await;
                info!("Recording started");
                self.begin_session();
                source.discard_buffered();
                set_led(led, true);
                let report = self.run_cycle(source, uploader).await;
                set_led(led, false);
                report
            }
            CaptureMode::Streaming => {
                if !self.stream_open {
                    info!("Audio stream started");
                    self.begin_session();
                    source.discard_buffered();
                }
                self.run_cycle(source, uploader).await
            }
        }
    }

    /// Run cycles forever. Failed cycles are logged by [`Recorder::run_cycle`];
    /// a capture failure is followed by [`CAPTURE_RETRY_DELAY`] of idling.
    pub async fn run<S, U, P>(
        &mut self,
        trigger: &Trigger,
        source: &mut S,
        uploader: &mut U,
        led: &mut P,
    ) -> !
    where
        S: SampleSource,
        U: Uploader,
        P: OutputPin,
    {
        loop {
            if let Err(RecordError::Capture(_)) =
                self.next_cycle(trigger, source, uploader, led).await
            {
                Timer::after(CAPTURE_RETRY_DELAY).await;
            }
        }
    }
}

fn set_led<P: OutputPin>(led: &mut P, on: bool) {
    let result = if on { led.set_high() } else { led.set_low() };
    if let Err(e) = result {
        warn!("Status LED update failed: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::{ScriptedSource, Step};
    use alloc::vec::Vec;
    use core::convert::Infallible;
    use core::pin::pin;
    use core::task::{Context, Waker};
    use embassy_futures::block_on;

    const WINDOW: AudioConfig = AudioConfig {
        sample_rate_hz: 4,
        window_secs: 2,
        gain_shift: 4,
    };

    /// Uploader that keeps a copy of every window; fails while `fail` is set.
    #[derive(Default)]
    struct CollectingUploader {
        windows: Vec<Vec<i16>>,
        fail: bool,
    }

    impl Uploader for CollectingUploader {
        type Error = &'static str;

        async fn upload(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
            if self.fail {
                return Err("connection refused");
            }
            self.windows.push(samples.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Led {
        high: bool,
        toggles: u32,
    }

    impl embedded_hal::digital::ErrorType for Led {
        type Error = Infallible;
    }

    impl OutputPin for Led {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.toggles += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.toggles += 1;
            Ok(())
        }
    }

    fn expected_window(samples: &[i16]) -> Vec<i16> {
        let mut window = samples.to_vec();
        Preprocessor::new(WINDOW.gain_shift).process(&mut window);
        window
    }

    #[test]
    fn test_cycle_delivers_processed_window() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let mut source = ScriptedSource::new(&[Step::Samples(3), Step::Empty, Step::Samples(5)]);
        let mut uploader = CollectingUploader::default();

        let report = block_on(recorder.run_cycle(&mut source, &mut uploader)).unwrap();

        assert_eq!(report.outcome, CycleOutcome::Delivered);
        assert_eq!(report.cycle, 1);
        assert_eq!(report.capture.samples, 8);
        assert_eq!(report.capture.empty_reads, 1);
        assert_eq!(uploader.windows, [expected_window(&[0, 1, 2, 3, 4, 5, 6, 7])]);
        assert_eq!(recorder.window(), Some(uploader.windows[0].as_slice()));
    }

    #[test]
    fn test_upload_failure_is_not_delivered() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let mut source = ScriptedSource::chunked(8, 2);
        let mut uploader = CollectingUploader {
            fail: true,
            ..Default::default()
        };

        let report = block_on(recorder.run_cycle(&mut source, &mut uploader)).unwrap();
        assert_eq!(report.outcome, CycleOutcome::NotDelivered);
        // The window was still processed and the filter advanced.
        assert!(!recorder.preprocessor().high_pass().is_reset());

        uploader.fail = false;
        let report = block_on(recorder.run_cycle(&mut source, &mut uploader)).unwrap();
        assert_eq!(report.outcome, CycleOutcome::Delivered);

        let stats = recorder.stats();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.not_delivered, 1);
    }

    #[test]
    fn test_capture_failure_skips_upload() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let mut source = ScriptedSource::new(&[Step::Samples(4), Step::Fail]);
        let mut uploader = CollectingUploader::default();

        let result = block_on(recorder.run_cycle(&mut source, &mut uploader));

        assert_eq!(
            result,
            Err(RecordError::Capture(CaptureError::Source("i2s read failed")))
        );
        assert!(uploader.windows.is_empty());
        assert!(recorder.preprocessor().high_pass().is_reset());
        assert_eq!(recorder.stats().capture_failures, 1);
        assert_eq!(recorder.window(), None);
    }

    #[test]
    fn test_failed_capture_invalidates_window() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let mut uploader = CollectingUploader::default();
        assert_eq!(recorder.window(), None);

        let mut source = ScriptedSource::chunked(8, 1);
        block_on(recorder.run_cycle(&mut source, &mut uploader)).unwrap();
        assert!(recorder.window().is_some());

        // Half a window lands in the buffer before the source breaks.
        let mut broken = ScriptedSource::new(&[Step::Samples(4), Step::Fail]);
        assert!(block_on(recorder.run_cycle(&mut broken, &mut uploader)).is_err());
        assert_eq!(recorder.window(), None);
    }

    #[test]
    fn test_run_backs_off_after_capture_failure() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let trigger = Trigger::new();
        let mut source = ScriptedSource::new(&[Step::Fail; 1000]);
        let mut uploader = CollectingUploader::default();
        let mut led = Led::default();

        {
            let run = pin!(recorder.run(&trigger, &mut source, &mut uploader, &mut led));
            let mut cx = Context::from_waker(Waker::noop());
            // The first failure parks the loop on the retry timer.
            assert!(run.poll(&mut cx).is_pending());
        }

        assert_eq!(source.steps.len(), 999);
        assert_eq!(recorder.stats().capture_failures, 1);
        assert_eq!(recorder.stats().cycles, 1);
    }

    #[test]
    fn test_triggered_sessions_reset_filter_state() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Triggered).unwrap();
        let trigger = Trigger::new();
        let mut uploader = CollectingUploader::default();
        let mut led = Led::default();

        for _ in 0..2 {
            // Same audio in both sessions.
            let mut source = ScriptedSource::chunked(8, 1);
            trigger.fire();
            let report =
                block_on(recorder.next_cycle(&trigger, &mut source, &mut uploader, &mut led))
                    .unwrap();
            assert_eq!(report.outcome, CycleOutcome::Delivered);
            assert_eq!(source.discards, 1);
        }

        assert_eq!(uploader.windows.len(), 2);
        assert_eq!(uploader.windows[0], uploader.windows[1]);
        assert!(!led.high);
        assert_eq!(led.toggles, 4);
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_streaming_carries_filter_state() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let trigger = Trigger::new();
        let mut uploader = CollectingUploader::default();
        let mut led = Led::default();

        let mut discards = Vec::new();
        for _ in 0..2 {
            let mut source = ScriptedSource::chunked(8, 1);
            block_on(recorder.next_cycle(&trigger, &mut source, &mut uploader, &mut led)).unwrap();
            discards.push(source.discards);
        }

        assert_ne!(uploader.windows[0], uploader.windows[1]);
        // Only the start of the stream drops buffered audio.
        assert_eq!(discards, [1, 0]);
        // Streaming never touches the LED.
        assert_eq!(led.toggles, 0);
    }

    #[test]
    fn test_streaming_restarts_after_capture_failure() {
        let mut recorder = Recorder::new(&WINDOW, CaptureMode::Streaming).unwrap();
        let trigger = Trigger::new();
        let mut uploader = CollectingUploader::default();
        let mut led = Led::default();

        let mut source = ScriptedSource::chunked(8, 1);
        block_on(recorder.next_cycle(&trigger, &mut source, &mut uploader, &mut led)).unwrap();

        let mut broken = ScriptedSource::new(&[Step::Fail]);
        let result = block_on(recorder.next_cycle(&trigger, &mut broken, &mut uploader, &mut led));
        assert!(result.is_err());

        let mut source = ScriptedSource::chunked(8, 1);
        block_on(recorder.next_cycle(&trigger, &mut source, &mut uploader, &mut led)).unwrap();

        assert_eq!(uploader.windows.len(), 2);
        assert_eq!(uploader.windows[0], uploader.windows[1]);
    }
}
