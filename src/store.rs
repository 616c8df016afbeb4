//! On-disk JSON document store.
//!
//! Four logical collections live under one directory: `nodes/`, `defs/`,
//! `conts/` (one JSON file per entity, named after its key) and a single
//! `vars.json` document holding named counters. None of this is meant to be
//! safe for concurrent writers -- callers are expected to funnel every
//! mutation through a [`crate::serializer::Serializer`].

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    model::{Container, Counters, Definition, Node},
    Error, Result,
};

const NODES_DIR: &str = "nodes";
const DEFS_DIR: &str = "defs";
const CONTS_DIR: &str = "conts";
const VARS_FILE: &str = "vars.json";

const INITIAL_HTTP_PORT: u32 = 10999;

/// Everything the allocator, heartbeat handler, and reconciler need from
/// persistent storage.
pub trait Store: Send + Sync {
    fn list_definitions(&self) -> Result<HashMap<String, Definition>>;
    fn get_definition(&self, name: &str) -> Result<Option<Definition>>;
    fn save_definition(&self, def: &Definition) -> Result<()>;

    fn list_nodes(&self) -> Result<HashMap<String, Node>>;
    fn get_node(&self, name: &str) -> Result<Option<Node>>;
    fn save_node(&self, node: &Node) -> Result<()>;

    fn list_containers(&self) -> Result<HashMap<String, Container>>;
    fn save_container(&self, cont: &Container) -> Result<()>;
    fn delete_container(&self, name: &str) -> Result<()>;

    fn next_auto_increment(&self, ns: &str, name: &str) -> Result<u32>;
    fn next_node_http_port(&self) -> Result<u16>;
}

/// File-backed [`Store`] implementation.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    fn collection_dir(&self, sub: &str) -> PathBuf {
        self.dir.join(sub)
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            warn!("directory {} does not exist, creating", dir.display());
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn list_json<T: serde::de::DeserializeOwned>(
        &self,
        sub: &str,
    ) -> Result<Vec<(String, T)>> {
        let dir = self.collection_dir(sub);
        Self::ensure_dir(&dir)?;

        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file_name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_owned();

            debug!("reading store file {}", path.display());
            let contents = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("unable to read {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<T>(&contents) {
                Ok(value) => out.push((file_name, value)),
                Err(e) => {
                    warn!("unable to unmarshal {}: {}", path.display(), e);
                    continue;
                }
            }
        }
        Ok(out)
    }

    /// Write `value` to `{sub}/{name}.json` atomically: write to a sibling
    /// `.tmp` file then rename over the final path, so a crash mid-write
    /// never leaves a half-written, unparsable entity file behind.
    fn write_json<T: serde::Serialize>(&self, sub: &str, name: &str, value: &T) -> Result<()> {
        let dir = self.collection_dir(sub);
        Self::ensure_dir(&dir)?;
        let final_path = dir.join(format!("{}.json", name));
        let tmp_path = dir.join(format!("{}.json.tmp", name));
        let bytes = serde_json::to_vec(value)?;
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn read_vars(&self) -> Result<Counters> {
        let path = self.dir.join(VARS_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) if !contents.trim().is_empty() => Ok(serde_json::from_str(&contents)?),
            Ok(_) => Ok(Counters::new()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Counters::new()),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn write_vars(&self, vars: &Counters) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(VARS_FILE);
        let tmp_path = self.dir.join(format!("{}.tmp", VARS_FILE));
        fs::write(&tmp_path, serde_json::to_vec(vars)?)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn list_definitions(&self) -> Result<HashMap<String, Definition>> {
        Ok(self
            .list_json::<Definition>(DEFS_DIR)?
            .into_iter()
            .map(|(_, def)| (def.name.clone(), def))
            .collect())
    }

    fn get_definition(&self, name: &str) -> Result<Option<Definition>> {
        Ok(self.list_definitions()?.remove(name))
    }

    fn save_definition(&self, def: &Definition) -> Result<()> {
        self.write_json(DEFS_DIR, &def.name, def)
    }

    fn list_nodes(&self) -> Result<HashMap<String, Node>> {
        Ok(self
            .list_json::<Node>(NODES_DIR)?
            .into_iter()
            .map(|(_, node)| (node.name.clone(), node))
            .collect())
    }

    fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.list_nodes()?.remove(name))
    }

    fn save_node(&self, node: &Node) -> Result<()> {
        self.write_json(NODES_DIR, &node.name, node)
    }

    fn list_containers(&self) -> Result<HashMap<String, Container>> {
        Ok(self
            .list_json::<Container>(CONTS_DIR)?
            .into_iter()
            .map(|(_, c)| (c.name.clone(), c))
            .collect())
    }

    fn save_container(&self, cont: &Container) -> Result<()> {
        self.write_json(CONTS_DIR, &cont.name, cont)
    }

    fn delete_container(&self, name: &str) -> Result<()> {
        let dir = self.collection_dir(CONTS_DIR);
        let path = dir.join(format!("{}.json", name));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn next_auto_increment(&self, ns: &str, name: &str) -> Result<u32> {
        let key = format!("{}.{}", ns, name);
        let mut vars = self.read_vars()?;
        let n: u32 = vars.get(&key).and_then(|s| s.parse().ok()).unwrap_or(0) + 1;
        vars.insert(key, n.to_string());
        self.write_vars(&vars)?;
        Ok(n)
    }

    fn next_node_http_port(&self) -> Result<u16> {
        const KEY: &str = "lastHttpPort";
        let mut vars = self.read_vars()?;
        let n: u32 = vars
            .get(KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(INITIAL_HTTP_PORT)
            + 1;
        vars.insert(KEY.to_owned(), n.to_string());
        self.write_vars(&vars)?;
        Ok(n as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_and_list_definitions_round_trip() {
        let (_dir, store) = store();
        let def = Definition { name: "web".into(), image: "nginx".into(), count: 2, ..Default::default() };
        store.save_definition(&def).unwrap();
        let all = store.list_definitions().unwrap();
        assert_eq!(all.get("web"), Some(&def));
    }

    #[test]
    fn list_on_missing_dir_creates_it_and_returns_empty() {
        let (_dir, store) = store();
        let all = store.list_nodes().unwrap();
        assert!(all.is_empty());
        assert!(store.collection_dir(NODES_DIR).exists());
    }

    #[test]
    fn get_node_returns_none_when_absent() {
        let (_dir, store) = store();
        assert_eq!(store.get_node("n1").unwrap(), None);
        store.save_node(&Node { name: "n1".into(), addr: "a".into(), enabled: true, last_updated: None }).unwrap();
        assert_eq!(store.get_node("n1").unwrap().map(|n| n.name), Some("n1".into()));
    }

    #[test]
    fn delete_missing_container_is_not_an_error() {
        let (_dir, store) = store();
        store.delete_container("nope").unwrap();
    }

    #[test]
    fn next_auto_increment_starts_at_one_and_is_per_key() {
        let (_dir, store) = store();
        assert_eq!(store.next_auto_increment("inc.container", "web").unwrap(), 1);
        assert_eq!(store.next_auto_increment("inc.container", "web").unwrap(), 2);
        assert_eq!(store.next_auto_increment("inc.container", "db").unwrap(), 1);
    }

    #[test]
    fn next_node_http_port_starts_at_11000() {
        let (_dir, store) = store();
        assert_eq!(store.next_node_http_port().unwrap(), 11000);
        assert_eq!(store.next_node_http_port().unwrap(), 11001);
    }

    #[test]
    fn save_container_then_delete_removes_it() {
        let (_dir, store) = store();
        let cont = Container { name: "web-1".into(), definition_name: "web".into(), ..Default::default() };
        store.save_container(&cont).unwrap();
        assert!(store.list_containers().unwrap().contains_key("web-1"));
        store.delete_container("web-1").unwrap();
        assert!(!store.list_containers().unwrap().contains_key("web-1"));
    }
}
