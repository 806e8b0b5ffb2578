//! Throughput benchmark task, built with the `bench` feature.
//!
//! Alternates an HTTP upload of one window-sized payload with a TCP echo run
//! against `TOVI_ECHO_URL`, logging the throughput of each.

use alloc::vec;
use embassy_time::{Instant, Timer};
use log::{info, warn};
use tovi_core::bench::{
    BENCH_PAUSE, BENCH_PAYLOAD_BYTES, ECHO_FILL, ECHO_ITERATIONS, Throughput, UPLOAD_FILL,
    echo_benchmark, upload_round,
};
use tovi_core::transport::{Connector, Transport};
use tovi_core::upload::{Endpoint, HttpUploader};

use crate::net::TcpConnector;

#[embassy_executor::task]
pub async fn bench(mut uploader: HttpUploader<TcpConnector>, echo: Endpoint) {
    let upload_payload = vec![UPLOAD_FILL; BENCH_PAYLOAD_BYTES];
    let echo_tx = vec![ECHO_FILL; BENCH_PAYLOAD_BYTES];
    let mut echo_rx = vec![0u8; BENCH_PAYLOAD_BYTES];

    info!("Benchmark payload: {} bytes", BENCH_PAYLOAD_BYTES);
    loop {
        let start = Instant::now();
        match upload_round(&mut uploader, &upload_payload).await {
            Ok(bytes) => Throughput::new(bytes, start.elapsed()).log("HTTP upload"),
            Err(e) => warn!("Upload benchmark failed: {:?}", e),
        }
        Timer::after(BENCH_PAUSE).await;

        let start = Instant::now();
        match uploader.connector_mut().connect(&echo).await {
            Ok(mut connection) => {
                let (bytes, _) =
                    echo_benchmark(&mut connection, &echo_tx, &mut echo_rx, ECHO_ITERATIONS).await;
                let elapsed = start.elapsed();
                if let Err(e) = connection.close().await {
                    warn!("Closing echo connection failed: {:?}", e);
                }
                Throughput::new(bytes, elapsed).log("TCP echo");
            }
            Err(e) => warn!("Echo server unreachable: {:?}", e),
        }
        Timer::after(BENCH_PAUSE).await;
    }
}
