//! Crate-wide error type.

use std::{fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the store, the runtime, or the
/// network.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    Http(hyper::Error),
    Build(hyper::http::Error),
    InvalidUri(hyper::http::uri::InvalidUri),
    /// A non-2xx response, or a response we could not make sense of.
    Fault { code: hyper::StatusCode, message: String },
    NotFound(String),
    InvalidConfig(String),
    /// A serializer job panicked; the worker recovered and kept running, but
    /// this particular call produced no result.
    JobPanicked(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::Http(e) => write!(f, "http error: {}", e),
            Error::Build(e) => write!(f, "request build error: {}", e),
            Error::InvalidUri(e) => write!(f, "invalid uri: {}", e),
            Error::Fault { code, message } => write!(f, "fault: {} ({})", message, code),
            Error::NotFound(what) => write!(f, "not found: {}", what),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::JobPanicked(msg) => write!(f, "serializer job panicked: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Build(e) => Some(e),
            Error::InvalidUri(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Http(e)
    }
}

impl From<hyper::http::Error> for Error {
    fn from(e: hyper::http::Error) -> Self {
        Error::Build(e)
    }
}

impl From<hyper::http::uri::InvalidUri> for Error {
    fn from(e: hyper::http::uri::InvalidUri) -> Self {
        Error::InvalidUri(e)
    }
}
