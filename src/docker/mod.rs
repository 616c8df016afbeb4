//! Concrete [`crate::runtime::Runtime`] backed by the Docker Engine API.
//!
//! Every container this crate creates is labeled `one.managed=true` and
//! `one.definitionName={def}`, container names are compared with their
//! leading `/` stripped (the Engine API always returns names that way), and
//! every container additionally gets its `NodeHTTPPort` bound to the host,
//! on top of whatever explicit port mappings the definition lists.

mod transport;

use std::collections::HashMap;

use async_trait::async_trait;
use hyper::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    model::Definition,
    runtime::{Runtime, RuntimeContainer},
    Error, Result,
};

use transport::Transport;

const MANAGED_LABEL: &str = "one.managed";
const DEFINITION_LABEL: &str = "one.definitionName";

pub struct DockerRuntime {
    transport: Transport,
}

impl DockerRuntime {
    /// Connect to the Docker daemon over a Unix socket, e.g.
    /// `unix:///var/run/docker.sock`.
    pub fn new(uri: &str) -> Result<Self> {
        let uri: hyper::Uri = uri.parse()?;
        Ok(DockerRuntime { transport: Transport::from_uri(&uri) })
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn pull(&self, image: &str) -> Result<()> {
        let path = format!("/images/create?fromImage={}", urlencode(image));
        self.transport.request(Method::POST, &path, None::<(hyper::Body, mime::Mime)>).await?;
        Ok(())
    }

    async fn run(&self, def: &Definition, name: &str, node_http_port: Option<u16>) -> Result<String> {
        self.pull(&def.image).await.ok();

        let body = build_container_config(def, name, node_http_port);
        let body_str = serde_json::to_string(&body)?;
        let path = format!("/containers/create?name={}", urlencode(name));
        let created: ContainerCreateInfo = self
            .transport
            .request_json(Method::POST, &path, Some((body_str.into(), mime::APPLICATION_JSON)))
            .await?;

        let start_path = format!("/containers/{}/start", created.id);
        self.transport.request(Method::POST, &start_path, None::<(hyper::Body, mime::Mime)>).await?;

        Ok(created.id)
    }

    async fn remove_by_name(&self, name: &str) -> Result<()> {
        if let Some(existing) = self.get_by_name(name).await? {
            let kill_path = format!("/containers/{}/kill?signal=SIGINT", existing.id);
            // best-effort: a container that already exited returns 409, which we ignore.
            let _ = self.transport.request(Method::POST, &kill_path, None::<(hyper::Body, mime::Mime)>).await;

            let rm_path = format!("/containers/{}?force=true", existing.id);
            self.transport.request(Method::DELETE, &rm_path, None::<(hyper::Body, mime::Mime)>).await?;
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{}/stop", id);
        self.transport.request(Method::POST, &path, None::<(hyper::Body, mime::Mime)>).await?;
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{}/kill", id);
        self.transport.request(Method::POST, &path, None::<(hyper::Body, mime::Mime)>).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RuntimeContainer>> {
        let filters = json!({ "label": [MANAGED_LABEL] });
        let path = format!("/containers/json?all=true&filters={}", urlencode(&filters.to_string()));
        let raw: Vec<EngineContainer> = self.transport.request_json(Method::GET, &path, None::<(hyper::Body, mime::Mime)>).await?;

        Ok(raw.into_iter().map(EngineContainer::into_runtime_container).collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<RuntimeContainer>> {
        Ok(self.list().await?.into_iter().find(|c| c.name == name))
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Build the Docker `/containers/create` request body for `def`, following
/// the dotted-path nesting convention (`HostConfig.PortBindings`, ...) the
/// Engine API expects.
fn build_container_config(def: &Definition, name: &str, node_http_port: Option<u16>) -> Value {
    let mut labels = Map::new();
    labels.insert(MANAGED_LABEL.to_owned(), json!("true"));
    labels.insert(DEFINITION_LABEL.to_owned(), json!(def.name));

    let mut exposed_ports = Map::new();
    let mut port_bindings = Map::new();

    if let (Some(http_port), Some(def_port)) = (node_http_port, def.http_port) {
        let key = format!("{}/tcp", def_port);
        exposed_ports.insert(key.clone(), json!({}));
        port_bindings.insert(key, json!([{ "HostPort": http_port.to_string() }]));
    }
    for p in &def.ports {
        let key = format!("{}/{}", p.container_port, p.proto);
        exposed_ports.insert(key.clone(), json!({}));
        port_bindings.insert(key, json!([{ "HostPort": p.host_port.to_string() }]));
    }

    let mut host_config = Map::new();
    host_config.insert("PortBindings".to_owned(), Value::Object(port_bindings));
    if !def.volumes.is_empty() {
        let binds: Vec<String> = def
            .volumes
            .iter()
            .map(|(host, container)| format!("{}:{}", host, container))
            .collect();
        host_config.insert("Binds".to_owned(), json!(binds));
    }
    if !def.caps.is_empty() {
        host_config.insert("CapAdd".to_owned(), json!(def.caps));
    }

    let mut body = Map::new();
    body.insert("Image".to_owned(), json!(def.image));
    body.insert("Labels".to_owned(), Value::Object(labels));
    body.insert("ExposedPorts".to_owned(), Value::Object(exposed_ports));
    body.insert("HostConfig".to_owned(), Value::Object(host_config));
    if !def.env.is_empty() {
        let env: Vec<String> = def.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        body.insert("Env".to_owned(), json!(env));
    }
    if !def.cmd.is_empty() {
        body.insert("Cmd".to_owned(), json!(def.cmd));
    }
    let _ = name; // name is passed as a query param on create, not in the body.

    Value::Object(body)
}

#[derive(Deserialize)]
struct ContainerCreateInfo {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct EngineContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names")]
    names: Vec<String>,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

impl EngineContainer {
    fn into_runtime_container(self) -> RuntimeContainer {
        let name = self
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let definition_name = self.labels.get(DEFINITION_LABEL).cloned().unwrap_or_default();
        RuntimeContainer {
            id: self.id,
            name,
            definition_name,
            image: self.image,
            running: self.state == "running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Definition;

    #[test]
    fn build_container_config_sets_managed_labels_and_port_bindings() {
        let def = Definition {
            name: "web".into(),
            image: "nginx".into(),
            count: 1,
            http_port: Some(80),
            ..Default::default()
        };
        let cfg = build_container_config(&def, "web-1", Some(11000));
        assert_eq!(cfg["Labels"]["one.managed"], "true");
        assert_eq!(cfg["Labels"]["one.definitionName"], "web");
        assert_eq!(cfg["HostConfig"]["PortBindings"]["80/tcp"][0]["HostPort"], "11000");
    }

    #[test]
    fn engine_container_strips_leading_slash_from_name() {
        let raw = EngineContainer {
            id: "abc123".into(),
            names: vec!["/web-1".into()],
            image: "nginx".into(),
            state: "running".into(),
            labels: HashMap::new(),
        };
        let rc = raw.into_runtime_container();
        assert_eq!(rc.name, "web-1");
        assert!(rc.running);
    }
}
