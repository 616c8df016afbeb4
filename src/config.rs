//! Flag/env configuration for both binaries.
//!
//! Built on `clap`'s derive API, keeping a dot-to-underscore, upper-cased
//! env var convention: `--var.dir` is overridable as `FLOTILLA_VAR_DIR`.

use clap::Parser;

/// Parse this process's command-line arguments, exiting with status 1 (not
/// clap's default 2) when a required flag is missing or malformed -- "exit
/// code 1 when required configuration is missing" is part of the documented
/// contract, so the two binaries can't just call `T::parse()`.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "flotilla-master", about = "Control-plane master: allocator + heartbeat API")]
pub struct MasterConfig {
    /// Address to listen on, e.g. 0.0.0.0:9000
    #[arg(long = "master", env = "FLOTILLA_MASTER")]
    pub master: String,

    /// Directory holding defs/, nodes/, conts/, vars.json
    #[arg(long = "var.dir", env = "FLOTILLA_VAR_DIR", default_value = "./var")]
    pub var_dir: String,

    /// TLS certificate file. Out of scope (see DESIGN.md) -- parsed and
    /// warned about, never used.
    #[arg(long = "tls.cert.file", env = "FLOTILLA_TLS_CERT_FILE")]
    pub tls_cert_file: Option<String>,

    /// TLS private key file. Out of scope, same as above.
    #[arg(long = "tls.key.file", env = "FLOTILLA_TLS_KEY_FILE")]
    pub tls_key_file: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "flotilla-node", about = "Worker node: runtime reconciler")]
pub struct NodeConfig {
    /// `host:port` of the master to heartbeat against.
    #[arg(long = "node", env = "FLOTILLA_NODE")]
    pub master_addr: String,

    /// This node's own name; defaults to the OS hostname.
    #[arg(long = "node.name", env = "FLOTILLA_NODE_NAME")]
    pub node_name: Option<String>,

    /// This node's own `ip:port`, reported to the master on heartbeat.
    #[arg(long = "node.addr", env = "FLOTILLA_NODE_ADDR")]
    pub node_addr: String,

    /// Docker Engine API endpoint, e.g. unix:///var/run/docker.sock
    #[arg(long = "docker.host", env = "FLOTILLA_DOCKER_HOST", default_value = "unix:///var/run/docker.sock")]
    pub docker_host: String,

    /// Command run before starting a missing container.
    #[arg(long = "hook.run.pre", env = "FLOTILLA_HOOK_RUN_PRE")]
    pub hook_run_pre: Option<String>,

    /// Command run after starting a missing container (best-effort).
    #[arg(long = "hook.run.post", env = "FLOTILLA_HOOK_RUN_POST")]
    pub hook_run_post: Option<String>,
}

impl NodeConfig {
    /// Resolve `node.name`, defaulting to the OS hostname when unset.
    pub fn resolved_node_name(&self) -> crate::Result<String> {
        if let Some(name) = &self.node_name {
            return Ok(name.clone());
        }
        hostname()
    }
}

fn hostname() -> crate::Result<String> {
    let out = std::process::Command::new("hostname")
        .output()
        .map_err(|e| crate::Error::InvalidConfig(format!("could not determine hostname: {}", e)))?;
    if !out.status.success() {
        return Err(crate::Error::InvalidConfig("hostname command failed".into()));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn master_config_parses_required_flags() {
        let cfg = MasterConfig::parse_from(["flotilla-master", "--master", "0.0.0.0:9000"]);
        assert_eq!(cfg.master, "0.0.0.0:9000");
        assert_eq!(cfg.var_dir, "./var");
    }

    #[test]
    fn node_config_parses_required_flags() {
        let cfg = NodeConfig::parse_from([
            "flotilla-node",
            "--node",
            "10.0.0.1:9000",
            "--node.addr",
            "10.0.0.2:11000",
        ]);
        assert_eq!(cfg.master_addr, "10.0.0.1:9000");
        assert!(cfg.node_name.is_none());
    }
}
