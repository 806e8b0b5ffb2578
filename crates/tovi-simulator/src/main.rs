//! Desktop simulator for the Tovi capture pipeline.
//!
//! Runs the same recorder the firmware runs, fed by a synthetic microphone,
//! uploading over `std::net` (or writing the processed windows to a file).
//! The `bench` command runs the HTTP upload and TCP echo benchmarks from the
//! host.
//!
//! ```text
//! tovi-simulator record --signal sine --windows 3
//! tovi-simulator record --mode triggered --trigger-port 8080
//! tovi-simulator bench --url http://127.0.0.1:5000/upload --echo http://127.0.0.1:5001/
//! ```

mod net;
mod source;

use std::convert::Infallible;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use embassy_futures::block_on;
use embassy_time::{Duration, Instant};
use log::{info, warn};

use tovi_core::bench::{
    BENCH_PAUSE, BENCH_PAYLOAD_BYTES, ECHO_FILL, ECHO_ITERATIONS, Throughput, UPLOAD_FILL,
    echo_benchmark, upload_round,
};
use tovi_core::config::{
    AudioConfig, CaptureMode, DEFAULT_UPLOAD_URL, DeviceConfig, TriggerConfig, UploadConfig,
};
use tovi_core::recorder::{CycleOutcome, Recorder};
use tovi_core::transport::{Connector, Transport};
use tovi_core::trigger::{Trigger, serve_connection};
use tovi_core::upload::{Endpoint, HttpUploader, TimedUploader, Uploader};

use crate::net::{StdConnector, StdStream};
use crate::source::{SyntheticSource, Waveform};

/// Samples handed out per synthetic read, like one DMA chunk on the device.
const READ_CHUNK_SAMPLES: usize = 512;

/// How often the main thread checks for a pending HTTP trigger.
const TRIGGER_POLL: StdDuration = StdDuration::from_millis(50);

static TRIGGER: Trigger = Trigger::new();

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "tovi-simulator")]
#[command(about = "Run the Tovi capture pipeline on the desktop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, preprocess and upload synthetic recording windows.
    Record(RecordArgs),
    /// Measure HTTP upload and TCP echo throughput.
    Bench(BenchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Triggered,
    Streaming,
}

impl From<Mode> for CaptureMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Triggered => CaptureMode::Triggered,
            Mode::Streaming => CaptureMode::Streaming,
        }
    }
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long, default_value = DEFAULT_UPLOAD_URL)]
    url: String,
    /// Append the processed windows to this file instead of uploading them.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Mode::Triggered)]
    mode: Mode,
    #[arg(long, value_enum, default_value_t = Waveform::Square)]
    signal: Waveform,
    #[arg(long, default_value_t = 1000)]
    amplitude: i16,
    /// Number of windows to record.
    #[arg(short, long, default_value_t = 1)]
    windows: u32,
    #[arg(long, default_value_t = 16_000)]
    sample_rate: u32,
    #[arg(long, default_value_t = 4)]
    window_secs: u32,
    #[arg(long, default_value_t = 4)]
    gain_shift: u32,
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    /// In triggered mode, wait for `GET /trigger` on this port instead of
    /// triggering every window immediately.
    #[arg(long)]
    trigger_port: Option<u16>,
}

#[derive(Args)]
struct BenchArgs {
    #[arg(long, default_value = DEFAULT_UPLOAD_URL)]
    url: String,
    /// TCP echo server as `http://host:port/`; skipped when absent.
    #[arg(long)]
    echo: Option<String>,
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes windows as raw little-endian PCM.
struct FileUploader {
    out: BufWriter<File>,
}

impl Uploader for FileUploader {
    type Error = io::Error;

    async fn upload(&mut self, samples: &[i16]) -> io::Result<()> {
        for sample in samples {
            self.out.write_all(&sample.to_le_bytes())?;
        }
        self.out.flush()
    }
}

enum Sink {
    Http(TimedUploader<HttpUploader<StdConnector>>),
    File(FileUploader),
}

impl Uploader for Sink {
    type Error = anyhow::Error;

    async fn upload(&mut self, samples: &[i16]) -> Result<()> {
        match self {
            Self::Http(uploader) => uploader
                .upload(samples)
                .await
                .map_err(|e| anyhow!("{e:?}")),
            Self::File(file) => Ok(file.upload(samples).await?),
        }
    }
}

/// Stands in for the status LED.
struct ConsoleLed;

impl embedded_hal::digital::ErrorType for ConsoleLed {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for ConsoleLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        info!("LED off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        info!("LED on");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn record(args: RecordArgs) -> Result<()> {
    let config = DeviceConfig {
        upload: UploadConfig {
            url: &args.url,
            timeout_ms: args.timeout_ms,
        },
        audio: AudioConfig {
            sample_rate_hz: args.sample_rate,
            window_secs: args.window_secs,
            gain_shift: args.gain_shift,
        },
        mode: args.mode.into(),
        trigger: TriggerConfig {
            port: args.trigger_port.unwrap_or(TriggerConfig::default().port),
        },
        ..DeviceConfig::default()
    };
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;

    let mut sink = match &args.output {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            info!("Writing windows to {}", path.display());
            Sink::File(FileUploader {
                out: BufWriter::new(file),
            })
        }
        None => {
            let endpoint = config
                .upload
                .endpoint()
                .map_err(|e| anyhow!("invalid upload URL: {e}"))?;
            let connector = StdConnector::new(StdDuration::from_millis(args.timeout_ms));
            info!("Uploading to {}", config.upload.url);
            Sink::Http(TimedUploader::new(
                HttpUploader::new(connector, endpoint),
                config.upload.timeout(),
            ))
        }
    };

    if config.mode == CaptureMode::Triggered {
        if let Some(port) = args.trigger_port {
            spawn_trigger_server(port)?;
        }
    }

    let mut source = SyntheticSource::new(
        args.signal,
        args.amplitude,
        config.audio.sample_rate_hz,
        READ_CHUNK_SAMPLES,
    );
    let mut recorder =
        Recorder::new(&config.audio, config.mode).map_err(|e| anyhow!("{e}"))?;
    let mut led = ConsoleLed;

    for _ in 0..args.windows {
        if config.mode == CaptureMode::Triggered {
            if args.trigger_port.is_some() {
                while !TRIGGER.is_pending() {
                    thread::sleep(TRIGGER_POLL);
                }
            } else {
                TRIGGER.fire();
            }
        }

        let report = block_on(recorder.next_cycle(&TRIGGER, &mut source, &mut sink, &mut led))
            .map_err(|e| anyhow!("{e}"))?;
        if report.outcome == CycleOutcome::NotDelivered {
            warn!("Window {} was not delivered", report.cycle);
        }
    }

    let stats = recorder.stats();
    info!(
        "Recorded {} windows: {} delivered, {} not delivered",
        stats.cycles, stats.delivered, stats.not_delivered
    );
    Ok(())
}

/// Serve `GET /trigger` on a background thread.
fn spawn_trigger_server(port: u16) -> Result<()> {
    let listener =
        TcpListener::bind(("0.0.0.0", port)).with_context(|| format!("binding port {port}"))?;
    info!("Trigger server listening on port {}", port);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Trigger server accept failed: {}", e);
                    continue;
                }
            };
            let mut connection = StdStream::new(stream);
            if let Err(e) = block_on(serve_connection(&mut connection, &TRIGGER)) {
                warn!("Trigger client dropped: {}", e);
            }
        }
    });
    Ok(())
}

fn bench(args: BenchArgs) -> Result<()> {
    let timeout = StdDuration::from_millis(args.timeout_ms);
    let endpoint = Endpoint::parse(&args.url).map_err(|e| anyhow!("invalid upload URL: {e}"))?;
    let echo = args
        .echo
        .as_deref()
        .map(Endpoint::parse)
        .transpose()
        .map_err(|e| anyhow!("invalid echo URL: {e}"))?;

    let mut uploader = HttpUploader::new(StdConnector::new(timeout), endpoint);
    let upload_payload = vec![UPLOAD_FILL; BENCH_PAYLOAD_BYTES];
    let echo_tx = vec![ECHO_FILL; BENCH_PAYLOAD_BYTES];
    let mut echo_rx = vec![0u8; BENCH_PAYLOAD_BYTES];

    for round in 1..=args.rounds {
        info!("Benchmark round {}/{}", round, args.rounds);

        let start = Instant::now();
        match block_on(upload_round(&mut uploader, &upload_payload)) {
            Ok(bytes) => Throughput::new(bytes, start.elapsed()).log("HTTP upload"),
            Err(e) => warn!("Upload benchmark failed: {:?}", e),
        }

        if let Some(echo) = &echo {
            block_on(echo_run(
                uploader.connector_mut(),
                echo,
                &echo_tx,
                &mut echo_rx,
            ));
        }

        if round < args.rounds {
            thread::sleep(to_std(BENCH_PAUSE));
        }
    }
    Ok(())
}

async fn echo_run(connector: &mut StdConnector, echo: &Endpoint, tx: &[u8], rx: &mut [u8]) {
    let start = Instant::now();
    let mut connection = match connector.connect(echo).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Echo server unreachable: {}", e);
            return;
        }
    };
    let (bytes, _) = echo_benchmark(&mut connection, tx, rx, ECHO_ITERATIONS).await;
    let elapsed = start.elapsed();
    if let Err(e) = connection.close().await {
        warn!("Closing echo connection failed: {}", e);
    }
    Throughput::new(bytes, elapsed).log("TCP echo");
}

fn to_std(duration: Duration) -> StdDuration {
    StdDuration::from_micros(duration.as_micros())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Commands::Record(args) => record(args),
        Commands::Bench(args) => bench(args),
    }
}
