//! Delivering processed windows to the collection server.
//!
//! [`Uploader`] is the seam the recorder hands finished windows to.
//! [`HttpUploader`] is the implementation used on the device and in the
//! simulator: one `POST` per window over any [`Connector`], body is the raw
//! little-endian PCM (`application/octet-stream`).

mod endpoint;

pub use endpoint::{Endpoint, EndpointError, Host, MAX_HOST_LEN, MAX_PATH_LEN};

use embassy_time::{Duration, with_timeout};
use log::debug;
use thiserror_no_std::Error;

use crate::http::{self, HttpError, ReadLineError};
use crate::transport::{Connector, Transport};

/// Bytes of PCM staged per socket write.
pub const UPLOAD_CHUNK_BYTES: usize = 1024;

/// Receives processed windows.
pub trait Uploader {
    type Error: core::fmt::Debug;

    fn upload(&mut self, samples: &[i16]) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError<E: core::fmt::Debug> {
    #[error("connect failed: {0:?}")]
    Connect(E),
    #[error("transport error: {0:?}")]
    Io(E),
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("http error: {0}")]
    Http(HttpError),
    #[error("server answered with status {0}")]
    Status(u16),
}

impl<E: core::fmt::Debug> From<HttpError> for UploadError<E> {
    fn from(value: HttpError) -> Self {
        Self::Http(value)
    }
}

impl<E: core::fmt::Debug> From<ReadLineError<E>> for UploadError<E> {
    fn from(value: ReadLineError<E>) -> Self {
        match value {
            ReadLineError::Io(e) => Self::Io(e),
            ReadLineError::Closed => Self::Closed,
            ReadLineError::TooLong => Self::Http(HttpError::MalformedStatusLine),
        }
    }
}

/// `POST`s each window to a fixed [`Endpoint`].
pub struct HttpUploader<C> {
    connector: C,
    endpoint: Endpoint,
}

impl<C: Connector> HttpUploader<C> {
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Send `body` as one request and return the response status.
    pub async fn post(&mut self, body: Body<'_>) -> Result<u16, UploadError<C::Error>> {
        let head = http::post_head(
            self.endpoint.host_header().as_str(),
            self.endpoint.port,
            self.endpoint.path.as_str(),
            body.len(),
        )?;

        let mut connection = self
            .connector
            .connect(&self.endpoint)
            .await
            .map_err(UploadError::Connect)?;

        connection
            .write_all(head.as_bytes())
            .await
            .map_err(UploadError::Io)?;
        body.write_to(&mut connection).await.map_err(UploadError::Io)?;

        let mut line = [0u8; 128];
        let status = http::parse_status_line(http::read_line(&mut connection, &mut line).await?)?;
        // The server has answered; a failing close changes nothing.
        if let Err(e) = connection.close().await {
            debug!("Closing upload connection failed: {:?}", e);
        }
        Ok(status)
    }
}

impl<C: Connector> Uploader for HttpUploader<C> {
    type Error = UploadError<C::Error>;

    async fn upload(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        let status = self.post(Body::Samples(samples)).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(UploadError::Status(status))
        }
    }
}

/// Bounds every upload of the wrapped [`Uploader`], connect through response.
pub struct TimedUploader<U> {
    inner: U,
    timeout: Duration,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimedUploadError<E: core::fmt::Debug> {
    #[error("upload did not finish in time")]
    Timeout,
    #[error("{0:?}")]
    Upload(E),
}

impl<U: Uploader> TimedUploader<U> {
    pub fn new(inner: U, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner_mut(&mut self) -> &mut U {
        &mut self.inner
    }
}

impl<U: Uploader> Uploader for TimedUploader<U> {
    type Error = TimedUploadError<U::Error>;

    async fn upload(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        match with_timeout(self.timeout, self.inner.upload(samples)).await {
            Ok(result) => result.map_err(TimedUploadError::Upload),
            Err(_) => Err(TimedUploadError::Timeout),
        }
    }
}

/// Request body of an upload.
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    /// 16-bit PCM, sent little-endian.
    Samples(&'a [i16]),
    Bytes(&'a [u8]),
}

impl Body<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Samples(samples) => samples.len() * core::mem::size_of::<i16>(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn write_to<T: Transport>(&self, transport: &mut T) -> Result<(), T::Error> {
        match self {
            Self::Bytes(bytes) => transport.write_all(bytes).await,
            Self::Samples(samples) => {
                let mut staging = [0u8; UPLOAD_CHUNK_BYTES];
                for chunk in samples.chunks(UPLOAD_CHUNK_BYTES / 2) {
                    for (dst, sample) in staging.chunks_exact_mut(2).zip(chunk) {
                        dst.copy_from_slice(&sample.to_le_bytes());
                    }
                    transport.write_all(&staging[..chunk.len() * 2]).await?;
                }
                Ok(())
            }
        }
    }
}
