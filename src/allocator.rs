//! Master-side periodic reconciliation: bring `Container` record counts in
//! line with `Definition.count`, spreading new records across the
//! least-loaded known nodes.

use std::collections::HashMap;

use log::{info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    model::{Container, Definition},
    store::Store,
};

/// One allocator tick against `store`, using `rng` to pick scale-down
/// victims without replacement. Injectable so tests can seed determinism.
pub fn tick(store: &dyn Store, rng: &mut StdRng) {
    let defs = match store.list_definitions() {
        Ok(d) => d,
        Err(e) => {
            warn!("allocator: could not list definitions: {}", e);
            return;
        }
    };
    let conts = match store.list_containers() {
        Ok(c) => c,
        Err(e) => {
            warn!("allocator: could not list containers: {}", e);
            return;
        }
    };
    let nodes = match store.list_nodes() {
        Ok(n) => n,
        Err(e) => {
            warn!("allocator: could not list nodes: {}", e);
            return;
        }
    };

    let mut def_index: HashMap<&str, Vec<&Container>> = HashMap::new();
    for c in conts.values() {
        def_index.entry(c.definition_name.as_str()).or_default().push(c);
    }

    let mut node_index: HashMap<String, usize> = nodes.keys().map(|n| (n.clone(), 0)).collect();
    for c in conts.values() {
        if let Some(count) = node_index.get_mut(c.node_name.as_str()) {
            *count += 1;
        }
    }

    for def in defs.values() {
        reconcile_definition(store, def, &def_index, &mut node_index, rng);
    }
}

fn reconcile_definition(
    store: &dyn Store,
    def: &Definition,
    def_index: &HashMap<&str, Vec<&Container>>,
    node_index: &mut HashMap<String, usize>,
    rng: &mut StdRng,
) {
    let existing = def_index.get(def.name.as_str()).cloned().unwrap_or_default();
    let n = existing.len();
    let want = def.count as usize;

    if n > want {
        let mut victims: Vec<&&Container> = existing.iter().collect();
        victims.shuffle(rng);
        for victim in victims.into_iter().take(n - want) {
            if let Err(e) = store.delete_container(&victim.name) {
                warn!("allocator: failed to delete {}: {}", victim.name, e);
            }
        }
    } else if n < want {
        if node_index.is_empty() {
            warn!("allocator: no known nodes, skipping creation for definition {}", def.name);
            return;
        }
        for _ in 0..(want - n) {
            let target = match node_index.iter().min_by_key(|(_, &count)| count) {
                Some((name, _)) => name.clone(),
                None => {
                    warn!("allocator: no known nodes, skipping creation for definition {}", def.name);
                    return;
                }
            };

            let index = match store.next_auto_increment("inc.container", &def.name) {
                Ok(i) => i,
                Err(e) => {
                    warn!("allocator: failed to mint container index for {}: {}", def.name, e);
                    return;
                }
            };
            // Every new record gets a node http port, not just ones with an
            // `http_port` set -- uniqueness of the counter is what matters,
            // and the dual port binding itself is gated on `http_port` later.
            let node_http_port = match store.next_node_http_port() {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("allocator: failed to mint node http port: {}", e);
                    return;
                }
            };

            let cont = Container {
                name: format!("{}-{}", def.name, index),
                definition_name: def.name.clone(),
                image: def.image.clone(),
                node_name: target.clone(),
                container_id: String::new(),
                running: false,
                labels: Default::default(),
                volumes: def.volumes.clone(),
                http_port: def.http_port,
                node_http_port,
                ports: def.ports.clone(),
                env: def.env.clone(),
                cmd: def.cmd.clone(),
                caps: def.caps.clone(),
            };

            if let Err(e) = store.save_container(&cont) {
                warn!("allocator: failed to save {}: {}", cont.name, e);
                continue;
            }
            info!("allocator: assigned {} to node {}", cont.name, target);
            *node_index.entry(target).or_insert(0) += 1;
        }
    }
}

/// Construct a fresh, OS-seeded RNG for production use; tests inject their
/// own seeded [`StdRng`] via [`tick`] directly.
pub fn new_rng() -> StdRng {
    StdRng::from_entropy()
}
