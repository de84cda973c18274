//! Hook-based provider
//!
//! Delegates every resource kind to an operator-supplied executable:
//!
//! ```text
//! <hooks_dir>/<kind> create|update|delete <name>   properties as JSON on stdin
//! <hooks_dir>/<kind> observe <stack>                prints live resources as JSON
//! ```
//!
//! Exit status 0 is success, 75 (`EX_TEMPFAIL`) a transient failure and
//! anything else a permanent failure with stderr as the message. A hook
//! whose call is dropped, e.g. by a timeout, is killed.

use async_trait::async_trait;
use ferry_core::domain::operation::Operation;
use ferry_core::domain::resource::{ObservedResource, Properties, ResourceKind};
use ferry_core::domain::state::{DesiredState, ObservedState};
use ferry_core::error::OperationError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::ResourceProvider;

/// Exit status signalling a retryable failure
const EX_TEMPFAIL: i32 = 75;

/// Provider running one hook executable per resource kind
pub struct HookProvider {
    hooks_dir: PathBuf,
}

/// One live resource as printed by `observe`
#[derive(Debug, Deserialize)]
struct HookResource {
    name: String,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    depends_on: Vec<String>,
}

impl HookProvider {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
        }
    }

    fn hook_path(&self, kind: ResourceKind) -> PathBuf {
        self.hooks_dir.join(kind.as_str())
    }

    /// Runs a hook and classifies its exit status
    async fn run_hook(
        &self,
        hook: &Path,
        args: &[&str],
        stdin: Option<Vec<u8>>,
    ) -> Result<Output, OperationError> {
        debug!("Running hook {} {}", hook.display(), args.join(" "));

        let mut child = Command::new(hook)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OperationError::permanent(format!("failed to run hook {}: {}", hook.display(), e))
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // A hook may exit without reading its input
            if let Err(e) = pipe.write_all(&input).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(OperationError::transient(format!(
                    "failed to write to hook stdin: {}",
                    e
                )));
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            OperationError::transient(format!("failed to wait for hook: {}", e))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Hook stderr: {}", stderr.trim());
        }

        classify(&output)?;
        Ok(output)
    }
}

/// Maps a hook exit status to success or an operation error
fn classify(output: &Output) -> Result<(), OperationError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("hook exited with {}", output.status)
    } else {
        stderr
    };

    match output.status.code() {
        Some(EX_TEMPFAIL) => Err(OperationError::Transient(message)),
        _ => Err(OperationError::Permanent(message)),
    }
}

#[async_trait]
impl ResourceProvider for HookProvider {
    async fn observe(&self, desired: &DesiredState) -> Result<ObservedState, OperationError> {
        let mut resources = Vec::new();

        for kind in ResourceKind::ALL {
            let hook = self.hook_path(kind);
            if !hook.is_file() {
                debug!("No {} hook at {}, nothing to observe", kind, hook.display());
                continue;
            }

            let output = self.run_hook(&hook, &["observe", &desired.name], None).await?;
            let live: Vec<HookResource> = serde_json::from_slice(&output.stdout).map_err(|e| {
                OperationError::permanent(format!("{} hook printed invalid JSON: {}", kind, e))
            })?;

            resources.extend(live.into_iter().map(|r| ObservedResource {
                name: r.name,
                kind,
                properties: r.properties,
                depends_on: r.depends_on,
            }));
        }

        info!(
            "Observed {} live resource(s) for '{}'",
            resources.len(),
            desired.name
        );
        Ok(ObservedState::new(resources))
    }

    async fn apply(&self, operation: &Operation) -> Result<(), OperationError> {
        let hook = self.hook_path(operation.resource.kind);
        if !hook.is_file() {
            return Err(OperationError::permanent(format!(
                "no hook for {} resources at {}",
                operation.resource.kind,
                hook.display()
            )));
        }

        let input = serde_json::to_vec(&operation.properties).map_err(|e| {
            OperationError::permanent(format!("failed to encode properties: {}", e))
        })?;

        self.run_hook(
            &hook,
            &[operation.action.as_str(), &operation.resource.name],
            Some(input),
        )
        .await?;

        debug!("Hook applied {}", operation.id);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::service::{Executor, RetryPolicy, RunLogBuffer};
    use ferry_core::domain::operation::OperationAction;
    use ferry_core::domain::resource::ResourceDecl;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct HookDir(PathBuf);

    impl HookDir {
        fn new() -> Self {
            let dir =
                std::env::temp_dir().join(format!("ferry-hooks-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn hook(&self, kind: ResourceKind, script: &str) {
            let path = self.0.join(kind.as_str());
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    impl Drop for HookDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn op(action: OperationAction, kind: ResourceKind) -> Operation {
        Operation::for_decl(
            action,
            &ResourceDecl::new("main", kind).with_property("cidr", json!("10.0.0.0/16")),
        )
    }

    #[tokio::test]
    async fn test_apply_passes_action_name_and_properties() {
        let dir = HookDir::new();
        let out = dir.0.join("received");
        dir.hook(
            ResourceKind::Network,
            &format!("echo \"$1 $2\" > {0}; cat >> {0}", out.display()),
        );

        let provider = HookProvider::new(&dir.0);
        provider
            .apply(&op(OperationAction::Create, ResourceKind::Network))
            .await
            .unwrap();

        let received = std::fs::read_to_string(out).unwrap();
        assert!(received.starts_with("create main\n"));
        assert!(received.contains("10.0.0.0/16"));
    }

    #[tokio::test]
    async fn test_exit_codes_map_to_error_kinds() {
        let dir = HookDir::new();
        dir.hook(ResourceKind::Cluster, "echo 'api throttled' >&2; exit 75");
        dir.hook(ResourceKind::Database, "echo 'quota exceeded' >&2; exit 1");
        let provider = HookProvider::new(&dir.0);

        assert_eq!(
            provider
                .apply(&op(OperationAction::Create, ResourceKind::Cluster))
                .await,
            Err(OperationError::transient("api throttled"))
        );
        assert_eq!(
            provider
                .apply(&op(OperationAction::Update, ResourceKind::Database))
                .await,
            Err(OperationError::permanent("quota exceeded"))
        );
    }

    #[tokio::test]
    async fn test_missing_hook_is_permanent() {
        let dir = HookDir::new();
        let provider = HookProvider::new(&dir.0);

        let err = provider
            .apply(&op(OperationAction::Delete, ResourceKind::Monitoring))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message().contains("no hook for monitoring"));
    }

    #[tokio::test]
    async fn test_observe_collects_every_kind_with_a_hook() {
        let dir = HookDir::new();
        dir.hook(
            ResourceKind::Network,
            r#"echo '[{"name":"vpc","properties":{"cidr":"10.0.0.0/16"}}]'"#,
        );
        dir.hook(
            ResourceKind::Workload,
            r#"echo '[{"name":"orders","depends_on":["vpc"]},{"name":"legacy"}]'"#,
        );
        let provider = HookProvider::new(&dir.0);

        let observed = provider.observe(&DesiredState::new("shop")).await.unwrap();
        let names: Vec<&str> = observed.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["vpc", "orders", "legacy"]);
        assert_eq!(observed.resources[1].kind, ResourceKind::Workload);
        assert_eq!(observed.resources[1].depends_on, vec!["vpc".to_string()]);
        assert_eq!(observed.resources[0].properties["cidr"], json!("10.0.0.0/16"));
    }

    #[tokio::test]
    async fn test_observe_rejects_invalid_output() {
        let dir = HookDir::new();
        dir.hook(ResourceKind::Database, "echo 'not json'");
        let provider = HookProvider::new(&dir.0);

        let err = provider.observe(&DesiredState::new("shop")).await.unwrap_err();
        assert!(err.message().contains("database hook printed invalid JSON"));
    }

    fn executor(dir: &HookDir, timeout: Duration) -> Executor {
        let provider: Arc<dyn ResourceProvider> = Arc::new(HookProvider::new(&dir.0));
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        Executor::new(provider, Arc::new(RunLogBuffer::new()))
            .with_retry(retry)
            .with_operation_timeout(timeout)
    }

    #[tokio::test]
    async fn test_hung_observe_hook_times_out() {
        let dir = HookDir::new();
        dir.hook(ResourceKind::Network, "sleep 30");
        let executor = executor(&dir, Duration::from_millis(200));

        let started = Instant::now();
        let err = executor
            .observe(&DesiredState::new("shop"))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.message().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_tempfail_observe_hook_is_retried() {
        let dir = HookDir::new();
        let marker = dir.0.join("throttled-once");
        dir.hook(
            ResourceKind::Network,
            &format!(
                r#"if [ -f {0} ]; then echo '[{{"name":"vpc"}}]'; else touch {0}; echo 'throttled' >&2; exit 75; fi"#,
                marker.display()
            ),
        );
        let executor = executor(&dir, Duration::from_secs(10));

        let observed = executor.observe(&DesiredState::new("shop")).await.unwrap();
        assert_eq!(observed.resources.len(), 1);
        assert_eq!(observed.resources[0].name, "vpc");
    }
}
