//! Decoy payload services in local containers.
//!
//! Provisioning is fire-and-forget: the `run` command keeps going while the
//! image builds, and failures only show up as display messages.

use std::path::PathBuf;
use std::process::Stdio;

use iosrecon::display::DisplaySink;
use log::debug;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// A container to build and start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Image tag, also used as the container name.
    pub tag: String,

    /// Docker build context holding the Dockerfile.
    pub context: PathBuf,

    /// `(container port/proto, host port)` mappings.
    pub ports: Vec<(String, u16)>,
}

impl ProvisionRequest {
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "build".to_string(),
            "-t".to_string(),
            self.tag.clone(),
            self.context.display().to_string(),
        ]
    }

    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.tag.clone(),
        ];
        for (container, host) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host, container));
        }
        args.push(self.tag.clone());
        args
    }
}

/// Runs the docker CLI.
#[derive(Debug, Clone)]
pub struct Provisioner {
    docker: String,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
        }
    }
}

impl Provisioner {
    /// Build and start `request` in the background.
    pub fn spawn(&self, request: ProvisionRequest, display: DisplaySink) -> JoinHandle<()> {
        let docker = self.docker.clone();
        tokio::spawn(async move {
            display.emphasis(format!("Building container image '{}'", request.tag));
            if let Err(message) = docker_step(&docker, &request.build_args()).await {
                display.error(format!("Failed to build '{}': {}", request.tag, message));
                return;
            }
            if let Err(message) = docker_step(&docker, &request.run_args()).await {
                display.error(format!("Failed to start '{}': {}", request.tag, message));
                return;
            }
            display.success(format!("Container '{}' is running", request.tag));
        })
    }
}

async fn docker_step(docker: &str, args: &[String]) -> Result<(), String> {
    debug!("provision: {} {}", docker, args.join(" "));
    let output = Command::new(docker)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(stderr.lines().last().unwrap_or("unknown error").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_request() -> ProvisionRequest {
        ProvisionRequest {
            tag: "decoy_http".to_string(),
            context: PathBuf::from("docker/services/http"),
            ports: vec![("8000/tcp".to_string(), 8080)],
        }
    }

    #[test]
    fn test_docker_arguments() {
        let request = http_request();
        assert_eq!(
            request.build_args(),
            vec!["build", "-t", "decoy_http", "docker/services/http"]
        );
        assert_eq!(
            request.run_args(),
            vec!["run", "-d", "--rm", "--name", "decoy_http", "-p", "8080:8000/tcp", "decoy_http"]
        );
    }

    #[tokio::test]
    async fn test_missing_docker_reports_error() {
        let (sink, mut rx) = iosrecon::display::channel();
        let provisioner = Provisioner {
            docker: "/nonexistent/docker".to_string(),
        };
        provisioner.spawn(http_request(), sink).await.unwrap();

        let mut texts = Vec::new();
        while let Ok(message) = rx.try_recv() {
            texts.push(message.text);
        }
        assert_eq!(texts.len(), 2);
        assert!(texts[1].starts_with("Failed to build 'decoy_http'"));
    }
}
