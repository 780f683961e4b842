// ABOUTME: Docker provider implementation for local container-backed sessions
// ABOUTME: Uses bollard to create, pause, resume and run code inside session containers

use super::{ExecutionProvider, ProviderError, Result, TemplateConfig, TemplateRegistry};
use crate::types::{CodeOutput, CommandOutput, RuntimeError, SessionHandle, SessionMetadata};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
        UploadToContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::CreateImageOptions,
    models::{ContainerInspectResponse, HostConfig, PortBinding},
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const LABEL_PREFIX: &str = "sparkbox";

pub struct DockerProvider {
    client: Docker,
    templates: TemplateRegistry,
    public_host: String,
    pull_timeout: Duration,
}

impl DockerProvider {
    /// Connect to the local Docker daemon with the built-in templates
    pub fn new(public_host: impl Into<String>) -> Result<Self> {
        Self::with_templates(TemplateRegistry::new()?, public_host)
    }

    pub fn with_templates(templates: TemplateRegistry, public_host: impl Into<String>) -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self::with_client(client, templates, public_host))
    }

    pub fn with_client(
        client: Docker,
        templates: TemplateRegistry,
        public_host: impl Into<String>,
    ) -> Self {
        Self {
            client,
            templates,
            public_host: public_host.into(),
            pull_timeout: Duration::from_secs(600),
        }
    }

    pub async fn is_available(&self) -> bool {
        match self.client.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Docker not available: {}", e);
                false
            }
        }
    }

    fn to_bollard_config(&self, template: &TemplateConfig, metadata: &SessionMetadata) -> Config<String> {
        let mut labels = HashMap::from([
            (format!("{}.managed", LABEL_PREFIX), "true".to_string()),
            (format!("{}.project_id", LABEL_PREFIX), metadata.project_id.clone()),
            (format!("{}.template", LABEL_PREFIX), template.id.clone()),
        ]);
        if let Some(user_id) = &metadata.user_id {
            labels.insert(format!("{}.user_id", LABEL_PREFIX), user_id.clone());
        }
        if let Some(team_id) = &metadata.team_id {
            labels.insert(format!("{}.team_id", LABEL_PREFIX), team_id.clone());
        }

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &template.ports {
            let container_port = format!("{}/tcp", port);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            // No host port: the daemon picks a free one
            let binding = vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: None,
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        let host_config = HostConfig {
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            cpu_shares: Some((template.cpu_cores * 1024.0) as i64),
            memory: Some((template.memory_mb * 1024 * 1024) as i64),
            ..Default::default()
        };

        Config {
            image: Some(template.image.clone()),
            cmd: template.command.clone(),
            working_dir: Some(template.working_dir.clone()),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn inspect(&self, handle: &SessionHandle) -> Result<ContainerInspectResponse> {
        self.client
            .inspect_container(handle.as_str(), None)
            .await
            .map_err(|e| container_error(handle, e))
    }

    /// Template the container was created from, read back from its labels.
    async fn template_for(&self, handle: &SessionHandle) -> Result<&TemplateConfig> {
        let inspect = self.inspect(handle).await?;
        let template_id = inspect
            .config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .and_then(|labels| labels.get(&format!("{}.template", LABEL_PREFIX)))
            .ok_or_else(|| {
                ProviderError::ContainerError(format!("{} is not a sparkbox session", handle))
            })?;

        self.templates.get(template_id)
    }

    async fn exec(
        &self,
        handle: &SessionHandle,
        command: Vec<String>,
        working_dir: &str,
    ) -> Result<(i64, Vec<u8>, Vec<u8>)> {
        let exec_config = CreateExecOptions {
            cmd: Some(command),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(working_dir.to_string()),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(handle.as_str(), exec_config)
            .await
            .map_err(|e| container_error(handle, e))?;

        let start_result = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| ProviderError::ContainerError(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                        Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                        Ok(LogOutput::Console { message }) => stdout.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ProviderError::ContainerError(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exec_inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| ProviderError::ContainerError(e.to_string()))?;

        Ok((exec_inspect.exit_code.unwrap_or(0), stdout, stderr))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image: {} (timeout: {:?})", image, self.pull_timeout);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);

        let result = tokio::time::timeout(self.pull_timeout, async {
            while let Some(result) = stream.next().await {
                let info = result.map_err(|e| {
                    ProviderError::ImageError(format!("Failed to pull image {}: {}", image, e))
                })?;
                if let Some(error) = info.error {
                    return Err(ProviderError::ImageError(format!(
                        "Failed to pull image {}: {}",
                        image, error
                    )));
                }
                if let Some(status) = &info.status {
                    debug!("Pull status: {}", status);
                }
            }
            Ok(())
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ProviderError::ImageError(format!(
                "Timeout pulling image {} after {:?}",
                image, self.pull_timeout
            ))),
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.client.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ProviderError::ImageError(e.to_string())),
        }
    }
}

#[async_trait]
impl ExecutionProvider for DockerProvider {
    async fn create(
        &self,
        template: &str,
        metadata: &SessionMetadata,
        timeout: Duration,
    ) -> Result<SessionHandle> {
        let template = self.templates.get(template)?;

        if !self.image_exists(&template.image).await? {
            self.pull_image(&template.image).await?;
        }

        let name = container_name(&metadata.project_id);
        info!(
            "Creating session container {} for project {} from template {} (timeout {:?})",
            name, metadata.project_id, template.id, timeout
        );

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let container = self
            .client
            .create_container(Some(options), self.to_bollard_config(template, metadata))
            .await
            .map_err(|e| ProviderError::ContainerError(e.to_string()))?;

        self.client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProviderError::ContainerError(e.to_string()))?;

        debug!("Started container {}", container.id);
        Ok(SessionHandle::new(container.id))
    }

    async fn resume(&self, handle: &SessionHandle, _timeout: Duration) -> Result<SessionHandle> {
        let inspect = self.inspect(handle).await?;
        let state = inspect.state.unwrap_or_default();

        if state.paused.unwrap_or(false) {
            info!("Unpausing container {}", handle);
            self.client
                .unpause_container(handle.as_str())
                .await
                .map_err(|e| container_error(handle, e))?;
        } else if !state.running.unwrap_or(false) {
            info!("Starting stopped container {}", handle);
            self.client
                .start_container(handle.as_str(), None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| container_error(handle, e))?;
        }

        Ok(handle.clone())
    }

    async fn is_alive(&self, handle: &SessionHandle) -> Result<bool> {
        match self.client.inspect_container(handle.as_str(), None).await {
            Ok(inspect) => {
                let state = inspect.state.unwrap_or_default();
                Ok(state.running.unwrap_or(false) && !state.paused.unwrap_or(false))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ProviderError::ConnectionError(e.to_string())),
        }
    }

    async fn set_timeout(&self, handle: &SessionHandle, timeout: Duration) -> Result<()> {
        // Containers have no server-side expiry; the local timer is the only one
        debug!("Container {} keeps running, requested timeout {:?}", handle, timeout);
        Ok(())
    }

    async fn pause(&self, handle: &SessionHandle) -> Result<SessionHandle> {
        info!("Pausing container {}", handle);
        self.client
            .pause_container(handle.as_str())
            .await
            .map_err(|e| container_error(handle, e))?;
        Ok(handle.clone())
    }

    async fn kill(&self, handle: &SessionHandle) -> Result<()> {
        info!("Removing container {}", handle);
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.client
            .remove_container(handle.as_str(), Some(options))
            .await
            .map_err(|e| container_error(handle, e))
    }

    async fn write_file(&self, handle: &SessionHandle, path: &str, content: &str) -> Result<()> {
        let template = self.template_for(handle).await?;
        let absolute = template.resolve_path(path);
        debug!("Writing {} bytes to {}:{}", content.len(), handle, absolute);

        let tar_data = single_file_archive(&absolute, content.as_bytes())
            .map_err(|e| ProviderError::InternalError(e.to_string()))?;

        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };

        self.client
            .upload_to_container(handle.as_str(), Some(options), tar_data.into())
            .await
            .map_err(|e| container_error(handle, e))
    }

    async fn run_command(&self, handle: &SessionHandle, command: &str) -> Result<CommandOutput> {
        let template = self.template_for(handle).await?;
        info!("Running command in container {}: {}", handle, command);

        let (exit_code, stdout, stderr) = self
            .exec(
                handle,
                vec!["sh".to_string(), "-c".to_string(), command.to_string()],
                &template.working_dir,
            )
            .await?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn run_code(&self, handle: &SessionHandle, code: &str) -> Result<CodeOutput> {
        let template = self.template_for(handle).await?;
        let mut argv = template.code_runner.clone().ok_or_else(|| {
            ProviderError::NotSupported(format!("template {} cannot run code", template.id))
        })?;
        argv.push(code.to_string());

        let (exit_code, stdout, stderr) = self.exec(handle, argv, &template.working_dir).await?;
        let stderr_text = String::from_utf8_lossy(&stderr).into_owned();

        let runtime_error = if exit_code != 0 {
            Some(parse_runtime_error(&stderr_text).unwrap_or_else(|| RuntimeError {
                name: "ExitError".to_string(),
                value: format!("process exited with code {}", exit_code),
                traceback: stderr_text.clone(),
            }))
        } else {
            None
        };

        Ok(CodeOutput {
            stdout: split_lines(&String::from_utf8_lossy(&stdout)),
            stderr: split_lines(&stderr_text),
            structured_results: Vec::new(),
            runtime_error,
        })
    }

    async fn compute_url(&self, handle: &SessionHandle, port: u16) -> Result<String> {
        let inspect = self.inspect(handle).await?;
        let key = format!("{}/tcp", port);

        let host_port = inspect
            .network_settings
            .as_ref()
            .and_then(|n| n.ports.as_ref())
            .and_then(|ports| ports.get(&key))
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.iter().find_map(|b| b.host_port.clone()))
            .filter(|p| !p.is_empty())
            .ok_or(ProviderError::PortNotExposed(port))?;

        Ok(format!("http://{}:{}", self.public_host, host_port))
    }

    fn default_port(&self, template: &str) -> Option<u16> {
        self.templates.get(template).ok().and_then(TemplateConfig::default_port)
    }
}

fn container_error(handle: &SessionHandle, e: bollard::errors::Error) -> ProviderError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ProviderError::NotFound(handle.to_string()),
        other => ProviderError::ContainerError(other.to_string()),
    }
}

fn container_name(project_id: &str) -> String {
    let sanitized: String = project_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", LABEL_PREFIX, sanitized, &suffix[..8])
}

fn single_file_archive(absolute_path: &str, data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();

    let mut archive = tar::Builder::new(Vec::new());
    archive.append_data(&mut header, absolute_path.trim_start_matches('/'), data)?;
    archive.into_inner()
}

fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(String::from).collect()
}

/// Pull `Name: value` out of the last meaningful stderr line, keeping the
/// whole stderr as the traceback.
fn parse_runtime_error(stderr: &str) -> Option<RuntimeError> {
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty())?.trim();

    let (name, value) = match last.split_once(':') {
        Some((name, value))
            if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') =>
        {
            (name.to_string(), value.trim().to_string())
        }
        _ => ("Error".to_string(), last.to_string()),
    };

    Some(RuntimeError {
        name,
        value,
        traceback: stderr.to_string(),
    })
}
