//! Typed HTTP client the node uses to talk to the master.
//!
//! Shares [`crate::docker::transport::Transport`]'s shape (hyper client,
//! explicit `Content-Type: application/json`, non-2xx is a transport error)
//! for the node's two calls to the master: `POST /master/nodeinfo` and
//! `GET /master/definitions/{name}`.

use std::time::Duration;

use hyper::{body::Bytes, client::HttpConnector, header, Body, Method, Request, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    model::{Definition, NodeInfo, NodeInfoResponse},
    Error, Result,
};

/// Bounds how long a heartbeat or definition lookup can stall before the
/// node gives up and retries on its own schedule.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MasterClient {
    client: hyper::Client<HttpConnector>,
    base: String,
}

impl MasterClient {
    /// `master_addr` is `host:port`, as handed to `flotilla-node --node`.
    pub fn new(master_addr: &str) -> Self {
        MasterClient {
            client: hyper::Client::builder().build(HttpConnector::new()),
            base: format!("http://{}", master_addr),
        }
    }

    pub async fn ping_node_info(&self, info: &NodeInfo) -> Result<NodeInfoResponse> {
        let url = format!("{}/master/nodeinfo", self.base);
        self.post_json(&url, info).await
    }

    pub async fn get_definition(&self, name: &str) -> Result<Option<Definition>> {
        let url = format!("{}/master/definitions/{}", self.base, urlencode(name));
        match self.get_bytes(&url).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(Error::Fault { code, .. }) if code == StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        let bytes = serde_json::to_vec(body)?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))?;
        let bytes = self.send(req).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let req = Request::builder().method(Method::GET).uri(url).body(Body::empty())?;
        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> Result<Bytes> {
        let response = tokio::time::timeout(CLIENT_TIMEOUT, self.client.request(req))
            .await
            .map_err(|_| Error::InvalidConfig("request to master timed out".into()))??;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        if status.is_success() {
            Ok(bytes)
        } else {
            let message = serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());
            Err(Error::Fault { code: status, message })
        }
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_prefixed_with_http() {
        let c = MasterClient::new("10.0.0.5:9000");
        assert_eq!(c.base, "http://10.0.0.5:9000");
    }
}
