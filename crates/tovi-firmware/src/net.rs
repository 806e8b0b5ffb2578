//! Wi-Fi station and TCP plumbing
//!
//! The Wi-Fi controller and the embassy-net runner each live in their own
//! task. [`TcpConnector`] and [`TcpConnection`] adapt embassy-net sockets to
//! the core [`Connector`]/[`Transport`] traits so the upload client, the
//! trigger server and the benchmarks run unchanged on top of them.

use embassy_net::dns::{self, DnsQueryType};
use embassy_net::tcp::{self, ConnectError, TcpSocket};
use embassy_net::{IpAddress, Runner, Stack};
use embassy_time::{Duration, Timer, with_timeout};
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use log::{debug, info, warn};
use thiserror_no_std::Error;
use tovi_core::config::WifiConfig;
use tovi_core::transport::{Connector, Transport};
use tovi_core::upload::{Endpoint, Host};

/// Socket buffer size for uploads and benchmarks.
pub const TCP_BUFFER_BYTES: usize = 4096;

/// Delay before reconnecting after the access point dropped us.
const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

#[derive(Error, Debug)]
pub enum NetError {
    #[error("DNS lookup failed: {0:?}")]
    Dns(dns::Error),
    #[error("host name did not resolve to an IPv4 address")]
    NoAddress,
    #[error("connect failed: {0:?}")]
    Connect(ConnectError),
    #[error("TCP error: {0:?}")]
    Tcp(tcp::Error),
    #[error("timed out")]
    Timeout,
}

impl From<tcp::Error> for NetError {
    fn from(value: tcp::Error) -> Self {
        Self::Tcp(value)
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Keep the station associated, reconnecting whenever the link drops.
#[embassy_executor::task]
pub async fn connection(mut controller: WifiController<'static>, wifi: WifiConfig<'static>) {
    info!("Wi-Fi connection task started");
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(wifi.ssid.into())
                    .with_password(wifi.password.into()),
            );
            if let Err(e) = controller.set_config(&client) {
                warn!("Wi-Fi configuration rejected: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            info!("Starting Wi-Fi");
            if let Err(e) = controller.start_async().await {
                warn!("Wi-Fi start failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
        }

        info!("Connecting to {}", wifi.ssid);
        match controller.connect_async().await {
            Ok(()) => info!("Wi-Fi connected"),
            Err(e) => {
                warn!("Wi-Fi connect failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Wait for the link and a DHCP lease.
pub async fn wait_for_network(stack: Stack<'_>) {
    stack.wait_link_up().await;
    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("Got IP: {}", config.address);
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A connected embassy-net TCP socket.
pub struct TcpConnection<'a> {
    socket: TcpSocket<'a>,
}

impl<'a> TcpConnection<'a> {
    pub fn new(socket: TcpSocket<'a>) -> Self {
        Self { socket }
    }
}

impl Transport for TcpConnection<'_> {
    type Error = NetError;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        Ok(self.socket.read(buf).await?)
    }

    async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), NetError> {
        while !buf.is_empty() {
            let written = self.socket.write(buf).await?;
            if written == 0 {
                return Err(NetError::Tcp(tcp::Error::ConnectionReset));
            }
            buf = &buf[written..];
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NetError> {
        self.socket.close();
        self.socket.flush().await?;
        Ok(())
    }
}

/// Opens TCP connections over the Wi-Fi stack, one at a time.
///
/// Every connection borrows the connector's socket buffers, so a second
/// connection can only be opened once the previous one is dropped.
pub struct TcpConnector {
    stack: Stack<'static>,
    rx: &'static mut [u8; TCP_BUFFER_BYTES],
    tx: &'static mut [u8; TCP_BUFFER_BYTES],
    timeout: Duration,
}

impl TcpConnector {
    /// `timeout` bounds the connect and every later socket operation.
    pub fn new(
        stack: Stack<'static>,
        rx: &'static mut [u8; TCP_BUFFER_BYTES],
        tx: &'static mut [u8; TCP_BUFFER_BYTES],
        timeout: Duration,
    ) -> Self {
        Self {
            stack,
            rx,
            tx,
            timeout,
        }
    }

    async fn resolve(&self, host: &Host) -> Result<IpAddress, NetError> {
        match host {
            Host::Ipv4(addr) => Ok(IpAddress::Ipv4(*addr)),
            Host::Name(name) => {
                let addrs = self
                    .stack
                    .dns_query(name.as_str(), DnsQueryType::A)
                    .await
                    .map_err(NetError::Dns)?;
                let addr = addrs.first().copied().ok_or(NetError::NoAddress)?;
                debug!("Resolved {} to {}", name.as_str(), addr);
                Ok(addr)
            }
        }
    }
}

impl Connector for TcpConnector {
    type Error = NetError;
    type Connection<'a> = TcpConnection<'a>;

    async fn connect(&mut self, endpoint: &Endpoint) -> Result<TcpConnection<'_>, NetError> {
        let addr = self.resolve(&endpoint.host).await?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx[..], &mut self.tx[..]);
        socket.set_timeout(Some(self.timeout));

        match with_timeout(self.timeout, socket.connect((addr, endpoint.port))).await {
            Ok(Ok(())) => Ok(TcpConnection::new(socket)),
            Ok(Err(e)) => Err(NetError::Connect(e)),
            Err(_) => {
                socket.abort();
                Err(NetError::Timeout)
            }
        }
    }
}
