//! Remote recording trigger.
//!
//! A tiny HTTP server on the device answers `GET /trigger` and arms one
//! recording cycle. The recorder task waits on the [`Trigger`]; triggers that
//! arrive while a cycle is running collapse into a single follow-up cycle.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{info, warn};

use crate::http::{self, Head, HttpError, Method, ReadLineError};
use crate::transport::Transport;

pub const TRIGGER_PATH: &str = "/trigger";
pub const TRIGGER_BODY: &str = "Trigger received";

/// Shared "record now" flag between the trigger server and the recorder.
pub struct Trigger {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    pub fn fire(&self) {
        self.signal.signal(());
    }

    /// Wait for the next trigger and consume it.
    pub async fn wait(&self) {
        self.signal.wait().await
    }

    /// Consume a pending trigger without waiting.
    pub fn try_take(&self) -> bool {
        self.signal.try_take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.signal.signaled()
    }
}

/// What the server does with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Trigger,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    pub fn resolve(method: Method, path: &str) -> Self {
        match (method, path) {
            (Method::Get, TRIGGER_PATH) => Self::Trigger,
            (_, TRIGGER_PATH) => Self::MethodNotAllowed,
            _ => Self::NotFound,
        }
    }

    pub fn status(self) -> u16 {
        match self {
            Self::Trigger => 200,
            Self::MethodNotAllowed => 405,
            Self::NotFound => 404,
        }
    }

    pub fn response(self) -> Result<Head, HttpError> {
        let body = match self {
            Self::Trigger => TRIGGER_BODY,
            Self::MethodNotAllowed => "Method not allowed",
            Self::NotFound => "Not found",
        };
        http::response(self.status(), body)
    }
}

/// Serve one request on an accepted connection, firing `trigger` on `GET /trigger`.
///
/// Returns the route taken, or `None` if the request line was unusable (a
/// `400` is sent when the connection is still writable).
pub async fn serve_connection<T: Transport>(
    transport: &mut T,
    trigger: &Trigger,
) -> Result<Option<Route>, T::Error> {
    let mut buf = [0u8; 256];
    let route = match http::read_line(transport, &mut buf).await {
        Ok(line) => http::parse_request_line(line)
            .ok()
            .map(|request| Route::resolve(request.method, request.path)),
        Err(ReadLineError::Io(e)) => return Err(e),
        Err(ReadLineError::Closed) => return Ok(None),
        Err(ReadLineError::TooLong) => None,
    };

    let response = match route {
        Some(route) => route.response(),
        None => http::response(400, "Bad request"),
    };

    if route == Some(Route::Trigger) {
        trigger.fire();
        info!("Recording triggered over HTTP");
    } else {
        warn!("Trigger server rejected request: {:?}", route);
    }

    // All responses are static and short; they always fit.
    if let Ok(response) = response {
        transport.write_all(response.as_bytes()).await?;
    }
    transport.close().await?;
    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::MockStream;
    use embassy_futures::block_on;

    #[test]
    fn test_route_resolution() {
        assert_eq!(Route::resolve(Method::Get, "/trigger"), Route::Trigger);
        assert_eq!(Route::resolve(Method::Post, "/trigger"), Route::MethodNotAllowed);
        assert_eq!(Route::resolve(Method::Get, "/"), Route::NotFound);
        assert_eq!(Route::Trigger.status(), 200);
        assert_eq!(Route::MethodNotAllowed.status(), 405);
        assert_eq!(Route::NotFound.status(), 404);
    }

    #[test]
    fn test_trigger_request_fires() {
        let trigger = Trigger::new();
        let mut stream = MockStream::with_response(b"GET /trigger HTTP/1.1\r\nHost: tovi\r\n\r\n");

        let route = block_on(serve_connection(&mut stream, &trigger)).unwrap();

        assert_eq!(route, Some(Route::Trigger));
        assert!(trigger.is_pending());
        assert!(stream.closed);
        let reply = core::str::from_utf8(&stream.written).unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("Trigger received"));
    }

    #[test]
    fn test_other_requests_do_not_fire() {
        let trigger = Trigger::new();
        let mut stream = MockStream::with_response(b"GET /favicon.ico HTTP/1.1\r\n\r\n");
        let route = block_on(serve_connection(&mut stream, &trigger)).unwrap();
        assert_eq!(route, Some(Route::NotFound));
        assert!(!trigger.is_pending());
        assert!(stream.written.starts_with(b"HTTP/1.1 404 Not Found\r\n"));

        let mut stream = MockStream::with_response(b"nonsense\r\n");
        let route = block_on(serve_connection(&mut stream, &trigger)).unwrap();
        assert_eq!(route, None);
        assert!(stream.written.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_triggers_collapse() {
        let trigger = Trigger::new();
        trigger.fire();
        trigger.fire();
        assert!(trigger.try_take());
        assert!(!trigger.try_take());
    }

    #[test]
    fn test_wait_consumes_trigger() {
        let trigger = Trigger::new();
        trigger.fire();
        block_on(trigger.wait());
        assert!(!trigger.is_pending());
    }
}
