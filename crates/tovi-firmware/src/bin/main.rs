#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::Duration;
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;

use tovi_core::upload::HttpUploader;
use tovi_firmware::net::{self, TCP_BUFFER_BYTES, TcpConnector};
use tovi_firmware::{profiler, settings};

#[cfg(not(feature = "bench"))]
use {
    esp_hal::gpio::{Level, Output, OutputConfig},
    tovi_core::recorder::Recorder,
    tovi_core::trigger::Trigger,
    tovi_core::upload::TimedUploader,
    tovi_firmware::mic::{I2sMicrophone, MicHardware, MicPins},
    tovi_firmware::trigger_server,
};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// DHCP, DNS, the trigger server and one outgoing connection.
const STACK_SOCKETS: usize = 6;

#[cfg(not(feature = "bench"))]
static TRIGGER: Trigger = Trigger::new();

#[cfg(not(feature = "bench"))]
type Uploader = TimedUploader<HttpUploader<TcpConnector>>;

#[cfg(not(feature = "bench"))]
#[embassy_executor::task]
async fn recorder_task(
    mut recorder: Recorder,
    mut mic: I2sMicrophone,
    mut uploader: Uploader,
    mut led: Output<'static>,
) {
    recorder
        .run(&TRIGGER, &mut mic, &mut uploader, &mut led)
        .await;
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = settings::device_config();
    config.validate().expect("Invalid device configuration");

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    // Recording windows do not fit in internal RAM.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Wi-Fi and network stack
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    static RESOURCES: StaticCell<StackResources<STACK_SOCKETS>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(
        net::connection(wifi_controller, config.wifi).expect("Failed to spawn Wi-Fi task"),
    );
    spawner.spawn(net::net_task(runner).expect("Failed to spawn network task"));
    spawner.spawn(
        profiler::profiler(Duration::from_secs(config.profiler.interval_secs))
            .expect("Failed to spawn profiler task"),
    );

    net::wait_for_network(stack).await;

    static TCP_RX: StaticCell<[u8; TCP_BUFFER_BYTES]> = StaticCell::new();
    static TCP_TX: StaticCell<[u8; TCP_BUFFER_BYTES]> = StaticCell::new();
    let connector = TcpConnector::new(
        stack,
        TCP_RX.init([0; TCP_BUFFER_BYTES]),
        TCP_TX.init([0; TCP_BUFFER_BYTES]),
        config.upload.timeout(),
    );
    let endpoint = config.upload.endpoint().expect("Invalid upload URL");
    info!("Uploading to {}", config.upload.url);

    #[cfg(feature = "bench")]
    {
        let echo =
            tovi_core::upload::Endpoint::parse(settings::ECHO_URL).expect("Invalid echo URL");
        spawner.spawn(
            tovi_firmware::bench::bench(HttpUploader::new(connector, endpoint), echo)
                .expect("Failed to spawn benchmark task"),
        );
    }

    #[cfg(not(feature = "bench"))]
    {
        let pins = config.pins;
        settings::check_pin("Mic clock", &peripherals.GPIO42, pins.mic_clk);
        settings::check_pin("Mic data", &peripherals.GPIO41, pins.mic_data);
        settings::check_pin("Mic word select", &peripherals.GPIO40, pins.mic_ws);
        settings::check_pin("Status LED", &peripherals.GPIO21, pins.led);

        let mic = I2sMicrophone::start(
            &spawner,
            MicHardware {
                i2s0: peripherals.I2S0,
                dma: peripherals.DMA_CH0,
                pins: MicPins {
                    clk: peripherals.GPIO42,
                    data: peripherals.GPIO41,
                    ws: peripherals.GPIO40,
                },
            },
            config.audio.sample_rate_hz,
        )
        .expect("Failed to spawn I2S capture task");
        let led = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());

        let recorder = Recorder::new(&config.audio, config.mode)
            .expect("Failed to allocate recording window");
        let uploader = TimedUploader::new(
            HttpUploader::new(connector, endpoint),
            config.upload.timeout(),
        );

        spawner.spawn(
            trigger_server::trigger_server(stack, config.trigger.port, &TRIGGER)
                .expect("Failed to spawn trigger server"),
        );
        spawner.spawn(
            recorder_task(recorder, mic, uploader, led).expect("Failed to spawn recorder task"),
        );
        info!("Recorder ready ({:?} mode)", config.mode);
    }

    loop {
        embassy_time::Timer::after(Duration::from_secs(60)).await;
    }
}
