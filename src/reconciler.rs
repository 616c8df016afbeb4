//! Node-side periodic reconciliation loop: list what's actually running,
//! clear out anything dead, heartbeat to the master, then converge the
//! local runtime onto whatever the master says this node should be running.

use std::collections::HashMap;

use log::{info, warn};

use crate::{
    hooks,
    model::{Container, Node, NodeInfo},
    node_client::MasterClient,
    runtime::Runtime,
};

/// Everything one reconcile needs: who we are, how to reach the master, and
/// the local container runtime.
pub struct Reconciler<R: Runtime> {
    pub node_name: String,
    pub node_addr: String,
    pub runtime: R,
    pub master: MasterClient,
    pub hook_pre: Option<String>,
    pub hook_post: Option<String>,
}

impl<R: Runtime> Reconciler<R> {
    /// One full reconciliation pass:
    /// 1. list observed containers
    /// 2. remove dead ones, excluding them from the observed set
    /// 3. heartbeat; abort this tick on transport failure
    /// 4. diff expected vs remaining-observed
    /// 5. stop/remove extras
    /// 6. start missing, with pre/post hooks
    pub async fn tick(&self) {
        let observed = match self.runtime.list().await {
            Ok(c) => c,
            Err(e) => {
                warn!("reconciler: could not list local containers: {}", e);
                return;
            }
        };

        let mut current: HashMap<String, crate::runtime::RuntimeContainer> = HashMap::new();
        for c in observed {
            if !c.running {
                info!("reconciler: removing dead container {}", c.name);
                if let Err(e) = self.runtime.remove_by_name(&c.name).await {
                    warn!("reconciler: failed to remove dead container {}: {}", c.name, e);
                }
                continue;
            }
            current.insert(c.name.clone(), c);
        }

        let heartbeat_containers: Vec<Container> = current
            .values()
            .map(|c| Container {
                name: c.name.clone(),
                definition_name: c.definition_name.clone(),
                image: c.image.clone(),
                container_id: c.id.clone(),
                running: c.running,
                node_name: self.node_name.clone(),
                ..Default::default()
            })
            .collect();

        let info = NodeInfo {
            node: Node { name: self.node_name.clone(), addr: self.node_addr.clone(), enabled: true, last_updated: None },
            containers: heartbeat_containers,
        };

        let response = match self.master.ping_node_info(&info).await {
            Ok(r) => r,
            Err(e) => {
                warn!("reconciler: heartbeat to master failed: {}", e);
                return;
            }
        };

        let expected: HashMap<String, Container> =
            response.containers.into_iter().map(|c| (c.name.clone(), c)).collect();

        for name in current.keys() {
            if !expected.contains_key(name) {
                info!("reconciler: stopping unexpected container {}", name);
                if let Err(e) = self.runtime.remove_by_name(name).await {
                    warn!("reconciler: failed to remove {}: {}", name, e);
                }
            }
        }

        for (name, container) in &expected {
            if current.contains_key(name) {
                continue;
            }
            if !hooks::run(self.hook_pre.as_deref(), container).await {
                warn!("reconciler: pre-run hook failed for {}, skipping this tick", name);
                continue;
            }
            match self.runtime.run(&to_definition(container), name, container.node_http_port).await {
                Ok(_id) => {
                    info!("reconciler: started {}", name);
                    if !hooks::run(self.hook_post.as_deref(), container).await {
                        warn!("reconciler: post-run hook failed for {} (container still started)", name);
                    }
                }
                Err(e) => warn!("reconciler: failed to start {}: {}", name, e),
            }
        }
    }
}

/// The `Runtime::run` surface takes a `Definition`; build a synthetic one
/// from the container record's own copied-down fields.
fn to_definition(c: &Container) -> crate::model::Definition {
    crate::model::Definition {
        name: c.definition_name.clone(),
        image: c.image.clone(),
        count: 1,
        http_port: c.http_port,
        ports: c.ports.clone(),
        volumes: c.volumes.clone(),
        env: c.env.clone(),
        caps: c.caps.clone(),
        cmd: c.cmd.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeContainer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        containers: Mutex<Vec<RuntimeContainer>>,
        run_calls: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Runtime for FakeRuntime {
        async fn pull(&self, _image: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn run(&self, def: &crate::model::Definition, name: &str, _port: Option<u16>) -> crate::Result<String> {
            self.run_calls.lock().unwrap().push(name.to_owned());
            self.containers.lock().unwrap().push(RuntimeContainer {
                id: format!("id-{}", name),
                name: name.to_owned(),
                definition_name: def.name.clone(),
                image: def.image.clone(),
                running: true,
            });
            Ok(format!("id-{}", name))
        }
        async fn remove_by_name(&self, name: &str) -> crate::Result<()> {
            self.removed.lock().unwrap().push(name.to_owned());
            self.containers.lock().unwrap().retain(|c| c.name != name);
            Ok(())
        }
        async fn stop(&self, _id: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn kill(&self, _id: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn list(&self) -> crate::Result<Vec<RuntimeContainer>> {
            Ok(self.containers.lock().unwrap().clone())
        }
        async fn get_by_name(&self, name: &str) -> crate::Result<Option<RuntimeContainer>> {
            Ok(self.containers.lock().unwrap().iter().find(|c| c.name == name).cloned())
        }
    }

    #[test]
    fn to_definition_copies_fields_down_from_container() {
        let c = Container { definition_name: "web".into(), image: "nginx".into(), http_port: Some(80), ..Default::default() };
        let def = to_definition(&c);
        assert_eq!(def.name, "web");
        assert_eq!(def.image, "nginx");
        assert_eq!(def.http_port, Some(80));
    }

    /// Bind an ephemeral port and serve the master API against a fresh
    /// `FileStore`, mirroring `tests/e2e.rs`'s `spawn_master` helper.
    async fn spawn_master(
        store: crate::store::FileStore,
    ) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let serializer = std::sync::Arc::new(crate::serializer::Serializer::new(store));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = crate::master_api::serve_listener(listener, serializer, async {
                rx.await.ok();
            })
            .await;
        });
        (addr, tx)
    }

    #[tokio::test]
    async fn a_second_tick_with_an_unchanged_expected_set_issues_no_extra_run_or_remove_calls() {
        use crate::store::Store;

        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FileStore::new(dir.path());
        store
            .save_container(&Container {
                name: "web-1".into(),
                definition_name: "web".into(),
                image: "nginx".into(),
                node_name: "n1".into(),
                ..Default::default()
            })
            .unwrap();
        let (addr, _shutdown) = spawn_master(store).await;

        let reconciler = Reconciler {
            node_name: "n1".into(),
            node_addr: "10.0.0.1:9000".into(),
            runtime: FakeRuntime::default(),
            master: MasterClient::new(&addr.to_string()),
            hook_pre: None,
            hook_post: None,
        };

        // First tick: web-1 is expected but not yet observed locally, so it
        // gets started.
        reconciler.tick().await;
        assert_eq!(reconciler.runtime.run_calls.lock().unwrap().as_slice(), ["web-1"]);
        assert!(reconciler.runtime.removed.lock().unwrap().is_empty());

        // Second tick: the runtime now reports web-1 as running and the
        // master's expected set hasn't changed, so idempotence means no
        // further run/remove calls beyond the list() already issued.
        reconciler.tick().await;
        assert_eq!(reconciler.runtime.run_calls.lock().unwrap().as_slice(), ["web-1"]);
        assert!(reconciler.runtime.removed.lock().unwrap().is_empty());
    }
}
