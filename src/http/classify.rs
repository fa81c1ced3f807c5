//! Classification of reqwest failures into stable fetch errors.

use std::error::Error as StdError;
use std::io;

use crate::error::{FetchError, TransportCode};

/// Maps a reqwest error for `url` into a [`FetchError`].
///
/// Responses with a status become [`FetchError::status`]; anything that
/// failed before a response arrived is reduced to an errno-style code by
/// walking the source chain for the underlying I/O error.
pub fn classify_error(url: &str, error: &reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return FetchError::status(url, status.as_u16());
    }
    if error.is_timeout() {
        return FetchError::transport(url, TransportCode::TimedOut);
    }
    FetchError::transport(url, transport_code(error))
}

fn transport_code(error: &(dyn StdError + 'static)) -> TransportCode {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(cause) = current {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            if let Some(code) = io_code(io_error.kind()) {
                return code;
            }
        }
        let message = cause.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return TransportCode::NameResolution;
        }
        current = cause.source();
    }
    TransportCode::Other
}

fn io_code(kind: io::ErrorKind) -> Option<TransportCode> {
    match kind {
        io::ErrorKind::TimedOut => Some(TransportCode::TimedOut),
        io::ErrorKind::ConnectionRefused => Some(TransportCode::ConnectionRefused),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            Some(TransportCode::ConnectionReset)
        }
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            Some(TransportCode::HostUnreachable)
        }
        _ => None,
    }
}
