//! Blocking `std::net` transport for the host.
//!
//! The simulator drives everything with `block_on` on one thread, so the
//! async trait methods simply perform blocking socket calls.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use tovi_core::transport::{Connector, Transport};
use tovi_core::upload::{Endpoint, Host};

pub struct StdStream {
    stream: TcpStream,
}

impl StdStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for StdStream {
    type Error = io::Error;

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.flush()?;
        self.stream.shutdown(Shutdown::Write)
    }
}

/// Connects with `std::net`, applying `timeout` to connect, reads and writes.
pub struct StdConnector {
    timeout: Duration,
}

impl StdConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for StdConnector {
    type Error = io::Error;
    type Connection<'a> = StdStream;

    async fn connect(&mut self, endpoint: &Endpoint) -> io::Result<StdStream> {
        let addr: SocketAddr = match &endpoint.host {
            Host::Ipv4(ip) => (*ip, endpoint.port).into(),
            Host::Name(name) => (name.as_str(), endpoint.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?,
        };
        debug!("Connecting to {}", addr);

        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        Ok(StdStream::new(stream))
    }
}
