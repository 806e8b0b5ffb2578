//! HTTP trigger server task.

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::Duration;
use log::{debug, info, warn};
use tovi_core::trigger::{Trigger, serve_connection};

use crate::net::TcpConnection;

/// Drop clients that stall mid-request.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

const SOCKET_BUFFER_BYTES: usize = 512;

/// Accept one client at a time on `port` and fire `trigger` on `GET /trigger`.
#[embassy_executor::task]
pub async fn trigger_server(stack: Stack<'static>, port: u16, trigger: &'static Trigger) {
    let mut rx = [0u8; SOCKET_BUFFER_BYTES];
    let mut tx = [0u8; SOCKET_BUFFER_BYTES];

    info!("Trigger server listening on port {}", port);
    loop {
        let mut socket = TcpSocket::new(stack, &mut rx, &mut tx);
        socket.set_timeout(Some(CLIENT_TIMEOUT));

        if let Err(e) = socket.accept(port).await {
            warn!("Trigger server accept failed: {:?}", e);
            continue;
        }
        debug!("Trigger client connected: {:?}", socket.remote_endpoint());

        let mut connection = TcpConnection::new(socket);
        if let Err(e) = serve_connection(&mut connection, trigger).await {
            warn!("Trigger client dropped: {:?}", e);
        }
    }
}
