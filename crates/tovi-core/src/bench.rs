//! Network throughput benchmarks.
//!
//! Two measurements, both sized like one 5 s window of 16 kHz 16-bit audio:
//!
//! - **TCP echo**: send the payload to an echo server and read it back,
//!   [`ECHO_ITERATIONS`] times per connection.
//! - **HTTP upload**: `POST` the payload through the regular upload client.
//!
//! Both report [`Throughput`]; the caller measures elapsed time.

use embassy_time::Duration;
use log::{error, info};
use thiserror_no_std::Error;

use crate::transport::{Connector, Transport};
use crate::upload::{Body, HttpUploader, UploadError};

/// 16 kHz × 5 s × 2 bytes.
pub const BENCH_PAYLOAD_BYTES: usize = 16_000 * 5 * 2;
pub const ECHO_ITERATIONS: usize = 10;
/// Pause between two benchmark runs.
pub const BENCH_PAUSE: Duration = Duration::from_secs(5);
/// Fill byte of the upload benchmark payload.
pub const UPLOAD_FILL: u8 = 0xAA;
/// Fill byte of the echo benchmark payload.
pub const ECHO_FILL: u8 = b'A';

const BYTES_PER_MB: f32 = 1024.0 * 1024.0;

/// Bytes moved over a measured period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Throughput {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Throughput {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    pub fn megabytes(&self) -> f32 {
        self.bytes as f32 / BYTES_PER_MB
    }

    pub fn seconds(&self) -> f32 {
        self.elapsed.as_micros() as f32 / 1_000_000.0
    }

    /// MB/s, or 0 if no time has elapsed.
    pub fn megabytes_per_sec(&self) -> f32 {
        let seconds = self.seconds();
        if seconds > 0.0 {
            self.megabytes() / seconds
        } else {
            0.0
        }
    }

    pub fn log(&self, label: &str) {
        info!("======== {} ========", label);
        info!("Total transferred : {:.2} MB", self.megabytes());
        info!("Elapsed time      : {:.2} s", self.seconds());
        info!("Bandwidth         : {:.2} MB/s", self.megabytes_per_sec());
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoError<E: core::fmt::Debug> {
    #[error("transport error: {0:?}")]
    Io(E),
    #[error("echo server closed the connection after {received} bytes")]
    Closed { received: usize },
}

/// Send `tx` and read exactly `tx.len()` bytes back into `rx`.
///
/// Returns the bytes moved in both directions.
pub async fn echo_round<T: Transport>(
    transport: &mut T,
    tx: &[u8],
    rx: &mut [u8],
) -> Result<usize, EchoError<T::Error>> {
    transport.write_all(tx).await.map_err(EchoError::Io)?;

    let expected = tx.len().min(rx.len());
    let mut received = 0;
    while received < expected {
        let n = transport
            .read(&mut rx[received..expected])
            .await
            .map_err(EchoError::Io)?;
        if n == 0 {
            return Err(EchoError::Closed { received });
        }
        received += n;
    }
    Ok(tx.len() + received)
}

/// Run `iterations` echo rounds and return the bytes moved.
///
/// Stops at the first failed round; the bytes of completed rounds still count.
pub async fn echo_benchmark<T: Transport>(
    transport: &mut T,
    tx: &[u8],
    rx: &mut [u8],
    iterations: usize,
) -> (u64, Option<EchoError<T::Error>>) {
    let mut total = 0u64;
    for i in 0..iterations {
        match echo_round(transport, tx, rx).await {
            Ok(moved) => total += moved as u64,
            Err(e) => {
                error!("Echo round {} failed: {:?}", i + 1, e);
                return (total, Some(e));
            }
        }
    }
    (total, None)
}

/// Upload `payload` once, returning the bytes that count towards throughput.
///
/// A failed or rejected upload counts zero bytes.
pub async fn upload_round<C: Connector>(
    uploader: &mut HttpUploader<C>,
    payload: &[u8],
) -> Result<u64, UploadError<C::Error>> {
    match uploader.post(Body::Bytes(payload)).await? {
        status if (200..300).contains(&status) => Ok(payload.len() as u64),
        status => Err(UploadError::Status(status)),
    }
}
