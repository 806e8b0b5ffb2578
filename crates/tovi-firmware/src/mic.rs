//! I2S microphone
//!
//! The microphone is read through I2S0 in standard Philips mode with 16-bit
//! stereo frames; only the left channel carries audio.
//!
//! [`capture_task`] owns the circular DMA transfer and drains it for the
//! lifetime of the firmware, decoding every pop into a shared
//! [`CaptureQueue`]. The ring therefore keeps moving while the recorder waits
//! for a trigger or uploads. [`I2sMicrophone`] reads that queue as a
//! [`SampleSource`].
//!
//! Each pop takes the whole ring's worth of space, as `pop` refuses a buffer
//! smaller than what the DMA has filled. If the ring is overrun anyway the
//! transfer reports `Late` forever, so any DMA error drops the queued audio
//! and restarts the transfer from scratch.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_executor::{SpawnError, Spawner};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use esp_hal::dma_buffers;
use esp_hal::i2s::master::{Channels, Config, DataFormat, Error as I2sError, I2s};
use esp_hal::peripherals::{DMA_CH0, GPIO40, GPIO41, GPIO42, I2S0};
use esp_hal::time::Rate;
use log::{debug, error, info, trace, warn};
use thiserror_no_std::Error;
use tovi_core::capture::{CaptureQueue, SampleSource};

/// Size of the circular DMA ring.
pub const DMA_BUFFER_BYTES: usize = 4 * 4092;

/// Decoded samples kept for the recorder, 0.5 s at 16 kHz.
pub const QUEUE_SAMPLES: usize = 8192;

/// A read gives up when the drain task delivers nothing for this long.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause before a failed transfer is started again.
const RESTART_DELAY: Duration = Duration::from_millis(100);

static CAPTURED: Mutex<CriticalSectionRawMutex, RefCell<CaptureQueue<QUEUE_SAMPLES>>> =
    Mutex::new(RefCell::new(CaptureQueue::new()));

/// Raised by the drain task after every pop.
static CAPTURED_READY: Signal<CriticalSectionRawMutex, ()> = Signal::new();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicError {
    #[error("no audio from the microphone for {0} ms")]
    Stalled(u64),
}

/// Pins of the microphone. Wiring matches `PinConfig::default()`.
pub struct MicPins {
    pub clk: GPIO42<'static>,
    pub data: GPIO41<'static>,
    pub ws: GPIO40<'static>,
}

/// Everything the drain task needs to (re)build the transfer.
pub struct MicHardware {
    pub i2s0: I2S0<'static>,
    pub dma: DMA_CH0<'static>,
    pub pins: MicPins,
}

/// Left channel of the I2S0 input as 16-bit samples.
pub struct I2sMicrophone(());

impl I2sMicrophone {
    /// Start the drain task on `hardware` and return its reading end.
    pub fn start(
        spawner: &Spawner,
        hardware: MicHardware,
        sample_rate_hz: u32,
    ) -> Result<Self, SpawnError> {
        spawner.spawn(capture_task(hardware, sample_rate_hz)?);
        Ok(Self(()))
    }
}

impl SampleSource for I2sMicrophone {
    type Error = MicError;

    async fn read(&mut self, buf: &mut [i16]) -> Result<usize, MicError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let read = CAPTURED.lock(|queue| queue.borrow_mut().read(buf));
            if read > 0 {
                return Ok(read);
            }
            with_timeout(STALL_TIMEOUT, CAPTURED_READY.wait())
                .await
                .map_err(|_| MicError::Stalled(STALL_TIMEOUT.as_millis()))?;
        }
    }

    fn discard_buffered(&mut self) {
        let dropped = CAPTURED.lock(|queue| {
            let mut queue = queue.borrow_mut();
            let queued = queue.len();
            queue.clear();
            queued
        });
        CAPTURED_READY.reset();
        debug!("Discarded {} buffered samples", dropped);
    }
}

#[embassy_executor::task]
pub async fn capture_task(mut hardware: MicHardware, sample_rate_hz: u32) {
    let mut chunk = [0u8; DMA_BUFFER_BYTES];
    loop {
        let Err(e) = drain(&mut hardware, sample_rate_hz, &mut chunk).await;
        warn!("I2S capture stopped: {:?}; restarting", e);
        CAPTURED.lock(|queue| queue.borrow_mut().clear());
        Timer::after(RESTART_DELAY).await;
    }
}

/// Configure I2S0, start the circular transfer and pop it until it fails.
async fn drain(
    hardware: &mut MicHardware,
    sample_rate_hz: u32,
    chunk: &mut [u8; DMA_BUFFER_BYTES],
) -> Result<Infallible, I2sError> {
    // The buffers are statics; the previous transfer was dropped before this call.
    #[allow(clippy::manual_div_ceil)]
    let (rx_buffer, rx_descriptors, _, _) = dma_buffers!(DMA_BUFFER_BYTES, 0);

    let i2s = I2s::new(
        hardware.i2s0.reborrow(),
        hardware.dma.reborrow(),
        Config::new_tdm_philips()
            .with_sample_rate(Rate::from_hz(sample_rate_hz))
            .with_data_format(DataFormat::Data16Channel16)
            .with_channels(Channels::STEREO),
    )
    .map_err(|e| {
        error!("I2S configuration rejected: {:?}", e);
        I2sError::IllegalArgument
    })?
    .into_async();

    let i2s_rx = i2s
        .i2s_rx
        .with_bclk(hardware.pins.clk.reborrow())
        .with_ws(hardware.pins.ws.reborrow())
        .with_din(hardware.pins.data.reborrow())
        .build(rx_descriptors);

    let mut transfer = i2s_rx.read_dma_circular_async(rx_buffer)?;
    info!("I2S microphone running at {} Hz", sample_rate_hz);

    loop {
        let received = transfer.pop(&mut chunk[..]).await?;
        let dropped = CAPTURED.lock(|queue| queue.borrow_mut().push_frames(&chunk[..received]));
        CAPTURED_READY.signal(());
        if dropped > 0 {
            // Normal while nobody records.
            trace!("Capture queue full, dropped {} samples", dropped);
        }
    }
}
