//! Pre/post-run hook invocation: spawn the configured hook binary with
//! `--name {container}` and one `--volume {v}` per key in the container's
//! volume map, inherit the parent's environment, discard stdout/stderr, and
//! report success as exit code 0.

use log::warn;

use crate::model::Container;

/// Run `hook_path` against `container`, if configured. Returns `true` on
/// success (no hook configured counts as success).
pub async fn run(hook_path: Option<&str>, container: &Container) -> bool {
    let hook_path = match hook_path {
        Some(p) if !p.is_empty() => p,
        _ => return true,
    };

    let mut cmd = tokio::process::Command::new(hook_path);
    cmd.arg("--name").arg(&container.name);
    for host_path in container.volumes.keys() {
        cmd.arg("--volume").arg(host_path);
    }
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    match cmd.status().await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!("hook {} for {} exited with {}", hook_path, container.name, status);
            false
        }
        Err(e) => {
            warn!("failed to spawn hook {} for {}: {}", hook_path, container.name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_hook_configured_is_success() {
        let c = Container { name: "web-1".into(), ..Default::default() };
        assert!(run(None, &c).await);
    }

    #[tokio::test]
    async fn a_hook_that_exits_zero_succeeds() {
        let c = Container { name: "web-1".into(), ..Default::default() };
        assert!(run(Some("true"), &c).await);
    }

    #[tokio::test]
    async fn a_hook_that_exits_nonzero_fails() {
        let c = Container { name: "web-1".into(), ..Default::default() };
        assert!(!run(Some("false"), &c).await);
    }

    #[tokio::test]
    async fn a_missing_hook_binary_fails_without_panicking() {
        let c = Container { name: "web-1".into(), ..Default::default() };
        assert!(!run(Some("/no/such/hook/binary"), &c).await);
    }
}
