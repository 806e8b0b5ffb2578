//! Byte-stream abstraction shared by the upload client and the benchmarks.
//!
//! On the device a [`Transport`] is an embassy-net TCP socket; on the host it
//! is a `std::net::TcpStream`; in tests it is a scripted in-memory stream.

use crate::upload::Endpoint;

/// A connected, bidirectional byte stream.
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Read into `buf`, returning the number of bytes read. `Ok(0)` is end of stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Self::Error>>;

    /// Write all of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;

    /// Flush pending output and close the write half.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Opens [`Transport`]s to an [`Endpoint`].
pub trait Connector {
    type Error: core::fmt::Debug;
    type Connection<'a>: Transport<Error = Self::Error>
    where
        Self: 'a;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Connection<'_>, Self::Error>>;
}

impl<T: Transport> Transport for &mut T {
    type Error = T::Error;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, T::Error> {
        (**self).read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), T::Error> {
        (**self).write_all(buf).await
    }

    async fn close(&mut self) -> Result<(), T::Error> {
        (**self).close().await
    }
}
