//! Connection to the Docker Engine API: either a Unix domain socket or a
//! plain TCP host. Same request/response plumbing regardless of which
//! transport is in use; callers never see the difference once a
//! `Transport` is built.

use std::fmt;

use hyper::{body::Bytes, client::HttpConnector, header, Body, Method, Request, StatusCode, Uri};
use mime::Mime;
use serde::{Deserialize, Serialize};

#[cfg(feature = "unix-socket")]
use hyperlocal::{UnixClientExt, UnixConnector, Uri as DomainUri};

use crate::{Error, Result};

#[derive(Clone)]
pub enum Transport {
    Tcp { client: hyper::Client<HttpConnector>, host: String },
    #[cfg(feature = "unix-socket")]
    Unix { client: hyper::Client<UnixConnector>, path: String },
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Tcp { host, .. } => write!(f, "Tcp({})", host),
            #[cfg(feature = "unix-socket")]
            Transport::Unix { path, .. } => write!(f, "Unix({})", path),
        }
    }
}

impl Transport {
    pub fn from_uri(uri: &Uri) -> Self {
        match uri.scheme_str() {
            #[cfg(feature = "unix-socket")]
            Some("unix") => Transport::Unix {
                client: hyper::Client::unix(),
                path: uri.path().to_owned(),
            },
            _ => {
                let host = format!(
                    "{}://{}:{}",
                    uri.scheme_str().unwrap_or("http"),
                    uri.host().unwrap_or("localhost"),
                    uri.port_u16().unwrap_or(2375)
                );
                Transport::Tcp { client: hyper::Client::new(), host }
            }
        }
    }

    pub async fn request<B>(&self, method: Method, endpoint: impl AsRef<str>, body: Option<(B, Mime)>) -> Result<String>
    where
        B: Into<Body>,
    {
        let bytes = self.request_bytes(method, endpoint, body).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn request_json<T: for<'de> Deserialize<'de>>(&self, method: Method, endpoint: impl AsRef<str>, body: Option<(Body, Mime)>) -> Result<T> {
        let s = self.request(method, endpoint, body).await?;
        Ok(serde_json::from_str(&s)?)
    }

    async fn request_bytes<B>(&self, method: Method, endpoint: impl AsRef<str>, body: Option<(B, Mime)>) -> Result<Bytes>
    where
        B: Into<Body>,
    {
        let req = self.build_request(method, endpoint, body)?;
        let response = self.send_request(req).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(bytes),
            _ => {
                let message_body = String::from_utf8_lossy(&bytes).into_owned();
                Err(Error::Fault {
                    code: status,
                    message: Self::error_message(&message_body)
                        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned()),
                })
            }
        }
    }

    fn build_request<B>(&self, method: Method, endpoint: impl AsRef<str>, body: Option<(B, Mime)>) -> Result<Request<Body>>
    where
        B: Into<Body>,
    {
        let builder = Request::builder().method(method);
        let builder = match self {
            Transport::Tcp { host, .. } => builder.uri(format!("{}{}", host, endpoint.as_ref())),
            #[cfg(feature = "unix-socket")]
            Transport::Unix { path, .. } => builder.uri(DomainUri::new(path, endpoint.as_ref())),
        };
        let builder = builder.header(header::HOST, "");

        Ok(match body {
            Some((b, mime)) => builder.header(header::CONTENT_TYPE, mime.to_string()).body(b.into())?,
            None => builder.body(Body::empty())?,
        })
    }

    async fn send_request(&self, req: Request<Body>) -> Result<hyper::Response<Body>> {
        match self {
            Transport::Tcp { client, .. } => Ok(client.request(req).await?),
            #[cfg(feature = "unix-socket")]
            Transport::Unix { client, .. } => Ok(client.request(req).await?),
        }
    }

    fn error_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorResponse>(body).map(|e| e.message).ok()
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    message: String,
}
