//! Abstraction over "a thing that can run containers".
//!
//! The allocator and reconciler only ever see this trait; the concrete
//! Docker Engine API client lives in [`crate::docker`] and is constructed
//! and injected by the binaries, so control-loop logic can be exercised in
//! tests against an in-memory fake with no daemon required.

use async_trait::async_trait;

use crate::{model::Definition, Result};

/// A runtime-observed container: enough to diff against the desired state,
/// independent of any particular engine's API shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeContainer {
    pub id: String,
    pub name: String,
    pub definition_name: String,
    pub image: String,
    pub running: bool,
}

#[async_trait]
pub trait Runtime: Send + Sync {
    /// Pull `image` if not already present locally.
    async fn pull(&self, image: &str) -> Result<()>;

    /// Create and start a new container for `def`, named `name`, binding
    /// `node_http_port` on both the loopback and routable interfaces.
    /// Returns the engine-assigned container id.
    async fn run(&self, def: &Definition, name: &str, node_http_port: Option<u16>) -> Result<String>;

    /// Best-effort stop (e.g. SIGINT) then remove, by container name.
    async fn remove_by_name(&self, name: &str) -> Result<()>;

    /// Stop a running container by id.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Forcibly kill a container by id.
    async fn kill(&self, id: &str) -> Result<()>;

    /// List every container this runtime manages (labeled `one.managed`).
    async fn list(&self) -> Result<Vec<RuntimeContainer>>;

    /// Look a managed container up by the name flotilla gave it.
    async fn get_by_name(&self, name: &str) -> Result<Option<RuntimeContainer>>;

    /// All managed containers belonging to one definition.
    async fn get_by_definition(&self, definition_name: &str) -> Result<Vec<RuntimeContainer>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|c| c.definition_name == definition_name)
            .collect())
    }
}
