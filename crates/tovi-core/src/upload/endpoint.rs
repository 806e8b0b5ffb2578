use core::net::Ipv4Addr;

use heapless::String;
use thiserror_no_std::Error;

pub const MAX_HOST_LEN: usize = 64;
pub const MAX_PATH_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(Ipv4Addr),
    /// Resolved over DNS at connect time.
    Name(String<MAX_HOST_LEN>),
}

/// Upload target parsed from an `http://host[:port][/path]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Host,
    pub port: u16,
    pub path: String<MAX_PATH_LEN>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    #[error("only http:// urls are supported")]
    UnsupportedScheme,
    #[error("missing host")]
    MissingHost,
    #[error("invalid port")]
    InvalidPort,
    #[error("host or path too long")]
    TooLong,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, EndpointError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or(EndpointError::UnsupportedScheme)?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| EndpointError::InvalidPort)?;
                if port == 0 {
                    return Err(EndpointError::InvalidPort);
                }
                (host, port)
            }
            None => (authority, 80),
        };

        if host.is_empty() {
            return Err(EndpointError::MissingHost);
        }

        let host = match host.parse::<Ipv4Addr>() {
            Ok(addr) => Host::Ipv4(addr),
            Err(_) => Host::Name(String::try_from(host).map_err(|_| EndpointError::TooLong)?),
        };

        Ok(Self {
            host,
            port,
            path: String::try_from(path).map_err(|_| EndpointError::TooLong)?,
        })
    }

    /// Host as written in the `Host` header.
    pub fn host_header(&self) -> String<MAX_HOST_LEN> {
        match &self.host {
            Host::Name(name) => name.clone(),
            Host::Ipv4(addr) => {
                let mut out = String::new();
                // "255.255.255.255" always fits.
                let _ = core::fmt::write(&mut out, format_args!("{}", addr));
                out
            }
        }
    }
}
