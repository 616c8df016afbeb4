//! The master's HTTP surface: `POST /master/nodeinfo`,
//! `GET /master/definitions/{name}`, `GET /master/containers`,
//! `GET /master/nodes`.
//!
//! Mirrors `docker::transport`'s build-request/send-request/translate-errors
//! shape on the server side: one small adapter from a domain handler's typed
//! `Response` to a wire `hyper::Response`, with JSON marshalling happening in
//! exactly one place.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response as HyperResponse, Server, StatusCode,
};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;

use crate::{
    filter::{matches_all, parse_filters},
    model::{Container, Node, NodeInfo, NodeInfoResponse},
    serializer::Serializer,
};

/// A domain handler's answer, before it's been turned into wire bytes.
/// A status code plus a JSON body; headers and content type are fixed to
/// `application/json` by [`Reply::into_response`].
struct Reply {
    status: StatusCode,
    body: serde_json::Value,
}

impl Reply {
    fn ok(body: impl Serialize) -> Self {
        Reply { status: StatusCode::OK, body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null) }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Reply { status, body: json!({ "error": message.into() }) }
    }

    fn into_response(self) -> HyperResponse<Body> {
        let bytes = serde_json::to_vec(&self.body).unwrap_or_default();
        HyperResponse::builder()
            .status(self.status)
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| HyperResponse::new(Body::empty()))
    }
}

/// 15s read/write timeouts and a 15s graceful-shutdown drain.
pub const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Serve the master HTTP API at `addr` until `shutdown` resolves, then drain
/// in-flight handlers for up to [`SHUTDOWN_GRACE`].
pub async fn serve(
    addr: SocketAddr,
    serializer: Arc<Serializer>,
    shutdown: impl std::future::Future<Output = ()>,
) -> crate::Result<()> {
    let listener = std::net::TcpListener::bind(addr)?;
    serve_listener(listener, serializer, shutdown).await
}

/// As [`serve`], but binds to an already-constructed listener -- lets
/// callers (integration tests in particular) bind an ephemeral port and
/// read back its address before the server starts accepting.
pub async fn serve_listener(
    listener: std::net::TcpListener,
    serializer: Arc<Serializer>,
    shutdown: impl std::future::Future<Output = ()>,
) -> crate::Result<()> {
    let addr = listener.local_addr()?;
    let make_svc = make_service_fn(move |_conn| {
        let serializer = serializer.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let serializer = serializer.clone();
                async move { Ok::<_, Infallible>(dispatch(req, serializer).await) }
            }))
        }
    });

    info!("master listening on {}", addr);
    let server = Server::from_tcp(listener)?.serve(make_svc);
    let graceful = server.with_graceful_shutdown(shutdown);
    if let Err(e) = graceful.await {
        error!("master http server error: {}", e);
    }
    Ok(())
}

/// `run_async` wraps a job that itself returns `crate::Result<T>`, so a
/// completed-but-failing job and a panicked-and-recovered job both arrive
/// here as an outer/inner `Result` pair; collapse them into one so handlers
/// don't have to match two layers of error.
fn flatten<T>(r: crate::Result<crate::Result<T>>) -> crate::Result<T> {
    match r {
        Ok(inner) => inner,
        Err(e) => Err(e),
    }
}

async fn dispatch(req: Request<Body>, serializer: Arc<Serializer>) -> HyperResponse<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();

    let reply = match (method.clone(), split_path(&path)) {
        (Method::POST, ["master", "nodeinfo"]) => handle_nodeinfo(req, serializer).await,
        (Method::GET, ["master", "definitions", name]) => handle_get_definition(name, serializer).await,
        (Method::GET, ["master", "containers"]) => handle_list_containers(&query, serializer).await,
        (Method::GET, ["master", "nodes"]) => handle_list_nodes(&query, serializer).await,
        _ => Reply::error(StatusCode::NOT_FOUND, "not found"),
    };
    reply.into_response()
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

async fn handle_nodeinfo(req: Request<Body>, serializer: Arc<Serializer>) -> Reply {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => return Reply::error(StatusCode::BAD_REQUEST, format!("could not read body: {}", e)),
    };
    let info: NodeInfo = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return Reply::error(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)),
    };
    if info.node.name.is_empty() || info.node.addr.is_empty() {
        return Reply::error(StatusCode::BAD_REQUEST, "node.name and node.addr are required");
    }

    let response = flatten(serializer
        .run_async(move |store| -> crate::Result<NodeInfoResponse> {
            upsert_node(store, &info.node)?;

            let mut known = store.list_containers()?;
            for observed in &info.containers {
                match known.get_mut(&observed.name) {
                    // The node is the authority on ContainerID/Running for a
                    // record it owns; persist what it just observed.
                    Some(record) if record.node_name == info.node.name => {
                        if record.container_id != observed.container_id || record.running != observed.running {
                            record.container_id = observed.container_id.clone();
                            record.running = observed.running;
                            store.save_container(record)?;
                        }
                    }
                    Some(record) => warn!(
                        "nodeinfo: node {} reported container {} which belongs to node {}, ignoring",
                        info.node.name, observed.name, record.node_name
                    ),
                    None => warn!("nodeinfo: node {} reported unknown container {}", info.node.name, observed.name),
                }
            }

            let expected: Vec<Container> = known
                .into_values()
                .filter(|c| c.node_name == info.node.name)
                .collect();
            Ok(NodeInfoResponse { containers: expected })
        })
        .await);

    match response {
        Ok(resp) => Reply::ok(resp),
        Err(e) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn upsert_node(store: &dyn crate::store::Store, incoming: &Node) -> crate::Result<()> {
    let mut node = store.get_node(&incoming.name)?.unwrap_or_else(|| Node {
        name: incoming.name.clone(),
        addr: incoming.addr.clone(),
        enabled: true,
        last_updated: None,
    });
    node.addr = incoming.addr.clone();
    node.last_updated = Some(chrono::Utc::now());
    store.save_node(&node)
}

async fn handle_get_definition(name: &str, serializer: Arc<Serializer>) -> Reply {
    let name = name.to_owned();
    let result = flatten(serializer.run_async(move |store| store.get_definition(&name)).await);
    match result {
        Ok(Some(def)) => Reply::ok(def),
        Ok(None) => Reply::error(StatusCode::NOT_FOUND, "definition not found"),
        Err(e) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_list_containers(query: &str, serializer: Arc<Serializer>) -> Reply {
    let filters = parse_filters(query);
    let result = flatten(serializer.run_async(move |store| store.list_containers()).await);
    match result {
        Ok(all) => {
            let filtered: std::collections::HashMap<_, _> =
                all.into_iter().filter(|(_, c)| matches_all(c, &filters)).collect();
            Reply::ok(filtered)
        }
        Err(e) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_list_nodes(query: &str, serializer: Arc<Serializer>) -> Reply {
    let filters = parse_filters(query);
    let result = flatten(serializer.run_async(move |store| store.list_nodes()).await);
    match result {
        Ok(all) => {
            let filtered: std::collections::HashMap<_, _> =
                all.into_iter().filter(|(_, n)| matches_all(n, &filters)).collect();
            Reply::ok(filtered)
        }
        Err(e) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
