//! Docker image builder
//!
//! Drives the build and push stages through the docker CLI:
//! - Checking docker availability
//! - Building `<repository>:<tag>` from a service's build context
//! - Pushing to the registry and resolving the pushed digest

use anyhow::{Context, Result};
use async_trait::async_trait;
use ferry_core::domain::resource::BuildSpec;
use ferry_core::error::OperationError;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::service::ImageBuilder;

/// Registry and daemon errors worth retrying
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "toomanyrequests",
    "too many requests",
    "connection reset",
    "connection refused",
    "service unavailable",
    "temporary failure",
];

/// Checks if docker is installed and available
pub async fn check_docker_available(docker_bin: &str) -> Result<()> {
    let output = Command::new(docker_bin)
        .arg("--version")
        .output()
        .await
        .with_context(|| {
            format!(
                "Failed to execute '{} --version'. Is docker installed?",
                docker_bin
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("Docker is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Docker is available: {}", version.trim());

    Ok(())
}

/// Image builder shelling out to `docker build` / `docker push`
pub struct DockerImageBuilder {
    docker_bin: String,
}

impl DockerImageBuilder {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<Output, OperationError> {
        debug!("Running {} {}", self.docker_bin, args.join(" "));

        let output = Command::new(&self.docker_bin)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                OperationError::permanent(format!("failed to execute {}: {}", self.docker_bin, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Always log stdout/stderr as debug
        if !stdout.trim().is_empty() {
            debug!("docker {} stdout: {}", args[0], stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("docker {} stderr: {}", args[0], stderr.trim());
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let message = format!(
                "docker {} failed: exit_code={}, stderr='{}'",
                args[0],
                exit_code,
                stderr.trim()
            );
            error!("{}", message);
            return Err(classify_failure(&stderr, message));
        }

        Ok(output)
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build(
        &self,
        service: &str,
        spec: &BuildSpec,
        tag: &str,
    ) -> Result<String, OperationError> {
        let image = format!("{}:{}", spec.repository, tag);
        info!("Building image {} for service {}", image, service);

        let mut args = vec!["build", "-t", image.as_str()];
        if let Some(dockerfile) = spec.dockerfile.as_deref() {
            args.extend(["-f", dockerfile]);
        }
        args.push(spec.context.as_str());

        self.docker(&args).await?;
        Ok(image)
    }

    async fn push(&self, image: &str) -> Result<String, OperationError> {
        info!("Pushing image {}", image);

        let output = self.docker(&["push", image]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        Ok(match parse_digest(&stdout) {
            Some(digest) => format!("{}@{}", repository_of(image), digest),
            None => image.to_string(),
        })
    }
}

/// Registry hiccups are transient, everything else permanent
fn classify_failure(stderr: &str, message: String) -> OperationError {
    let lower = stderr.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        OperationError::Transient(message)
    } else {
        OperationError::Permanent(message)
    }
}

/// Extracts `sha256:...` from the `digest: ` line of `docker push` output
fn parse_digest(output: &str) -> Option<&str> {
    output
        .split("digest: ")
        .nth(1)?
        .split_whitespace()
        .next()
        .filter(|digest| digest.starts_with("sha256:"))
}

/// Image reference without its tag (`host:5000/shop/orders:abc` -> `host:5000/shop/orders`)
fn repository_of(image: &str) -> &str {
    match image.rfind(':') {
        Some(idx) if !image[idx..].contains('/') => &image[..idx],
        _ => image,
    }
}
