//! Wire and on-disk entities.
//!
//! All of these round-trip as `camelCase` JSON; since every field below is
//! already named the way it should appear on the wire, none needs a
//! per-field rename — just the blanket container attribute.

use std::{collections::HashMap, fmt};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A desired workload: "run `count` copies of `image`".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub name: String,
    pub image: String,
    pub count: u32,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// host path -> container path.
    #[serde(default)]
    pub volumes: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
}

/// An explicit port mapping. Wire format is a single `hostPort:containerPort/proto`
/// string (e.g. `"53:53/udp"`), per spec -- not a nested object -- since
/// `Definition` files are hand-authored externally.
#[derive(Clone, Debug, PartialEq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub proto: String,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host_port, self.container_port, self.proto)
    }
}

impl std::str::FromStr for PortMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, proto) = match s.rsplit_once('/') {
            Some((p, proto)) => (p, proto.to_owned()),
            None => (s, default_proto()),
        };
        let (host_port, container_port) = ports
            .split_once(':')
            .ok_or_else(|| format!("invalid port mapping {:?}: expected hostPort:containerPort/proto", s))?;
        Ok(PortMapping {
            host_port: host_port.parse().map_err(|_| format!("invalid host port in {:?}", s))?,
            container_port: container_port.parse().map_err(|_| format!("invalid container port in {:?}", s))?,
            proto,
        })
    }
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

fn default_proto() -> String {
    "tcp".to_owned()
}

/// A single running (or believed-to-be-running) container, as tracked in
/// the store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub definition_name: String,
    pub image: String,
    pub node_name: String,
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub volumes: HashMap<String, String>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub node_http_port: Option<u16>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub caps: Vec<String>,
}

/// A worker host, as last reported by its own heartbeat.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub addr: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

/// What a node POSTs to the master at heartbeat time: what it believes is
/// actually running right now.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node: Node,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// What the master hands back: the set of containers this node is expected
/// to be running.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoResponse {
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// The `vars.json` document: a flat string/string map used for named
/// counters (`lastHttpPort`, `inc.container.{def}`, ...).
pub type Counters = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_round_trips_camel_case() {
        let def = Definition {
            name: "web".into(),
            image: "nginx:latest".into(),
            count: 3,
            http_port: Some(80),
            ports: vec![],
            volumes: HashMap::from([("/data".to_owned(), "/data".to_owned())]),
            env: HashMap::from([("FOO".to_owned(), "bar".to_owned())]),
            caps: vec![],
            cmd: vec![],
        };
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"httpPort\":80"));
        assert!(json.contains("\"name\":\"web\""));
        let back: Definition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn port_mapping_serializes_as_host_container_proto_string() {
        let p = PortMapping { host_port: 53, container_port: 53, proto: "udp".into() };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"53:53/udp\"");
        let back: PortMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn port_mapping_defaults_to_tcp_when_proto_omitted() {
        let p: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(p, PortMapping { host_port: 8080, container_port: 80, proto: "tcp".into() });
    }

    #[test]
    fn definition_ports_round_trip_as_string_array() {
        let json = r#"{"name":"dns","image":"bind","count":1,"ports":["53:53/udp"]}"#;
        let def: Definition = serde_json::from_str(json).unwrap();
        assert_eq!(def.ports, vec![PortMapping { host_port: 53, container_port: 53, proto: "udp".into() }]);
        let back = serde_json::to_string(&def).unwrap();
        assert!(back.contains("\"ports\":[\"53:53/udp\"]"));
    }

    #[test]
    fn container_defaults_missing_fields() {
        let json = r#"{"name":"web-1","definitionName":"web","image":"nginx","nodeName":"n1"}"#;
        let c: Container = serde_json::from_str(json).unwrap();
        assert_eq!(c.running, false);
        assert!(c.ports.is_empty());
        assert!(c.labels.is_empty());
    }

    #[test]
    fn node_info_round_trip_empty_containers() {
        let info = NodeInfo {
            node: Node {
                name: "n1".into(),
                addr: "10.0.0.5:11000".into(),
                enabled: true,
                last_updated: None,
            },
            containers: vec![],
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: NodeInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
