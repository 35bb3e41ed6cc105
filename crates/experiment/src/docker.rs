//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐
//! │ContainerKillInj. │   │DockerHealthChecker│
//! └────────┬─────────┘   └─────────┬─────────┘
//!          └───────────┬───────────┘
//!                      ▼
//!               ┌─────────────┐
//!               │DockerClient │ (trait)
//!               └─────────────┘
//!                  │       │
//!                  ▼       ▼
//!             ┌───────┐ ┌────┐
//!             │Bollard│ │Mock│
//!             └───┬───┘ └────┘
//!                 ▼
//!           Docker Daemon
//! ```
//!
//! # Container ID Validation
//!
//! All methods that act on a single container validate the ID first:
//! - Must be 1-64 characters
//! - Must contain only ASCII hex digits ([0-9a-fA-F])

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use chaosrun_core::types::TargetDescriptor;

use crate::error::ExperimentError;

/// Grace period handed to the daemon for a graceful stop.
const STOP_GRACE_SECS: i64 = 10;

/// Signal used for forced termination.
const KILL_SIGNAL: &str = "SIGKILL";

/// A container that can be selected as a chaos target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContainer {
    /// Container ID
    pub id: String,
    /// Container name (without the leading `/`)
    pub name: String,
    /// Daemon-reported state (`running`, `exited`, `restarting`, ...)
    pub state: String,
    /// Container labels
    pub labels: HashMap<String, String>,
}

impl TargetContainer {
    /// Returns `true` if the daemon reports the container as running.
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Validates a container ID to prevent injection attacks.
fn validate_container_id(id: &str) -> Result<(), ExperimentError> {
    if id.is_empty() || id.len() > 64 {
        return Err(ExperimentError::DockerApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ExperimentError::DockerApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting the Docker API operations used by the injector and the
/// health checker.
///
/// # Error Handling
///
/// - **404 errors**: Converted to `ExperimentError::TargetNotFound`
/// - **Connection errors**: Wrapped as `ExperimentError::DockerConnection`
/// - **Kill/stop failures**: Wrapped as `ExperimentError::InjectionFailed`
pub trait DockerClient: Send + Sync + 'static {
    /// Lists containers carrying `label` (`key=value`), including stopped ones.
    fn list_containers(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Vec<TargetContainer>, ExperimentError>> + Send;

    /// Inspects a specific container.
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<TargetContainer, ExperimentError>> + Send;

    /// Sends `SIGKILL` to a container.
    fn kill_container(&self, id: &str)
    -> impl Future<Output = Result<(), ExperimentError>> + Send;

    /// Stops a container with a 10-second grace period.
    fn stop_container(&self, id: &str)
    -> impl Future<Output = Result<(), ExperimentError>> + Send;

    /// Checks Docker daemon connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), ExperimentError>> + Send;
}

/// Resolves a target descriptor to the containers it currently selects.
///
/// Containers are selected by label; when the descriptor lists explicit
/// names, only containers whose name or ID matches one of them are kept.
pub async fn resolve_targets<D: DockerClient>(
    docker: &D,
    target: &TargetDescriptor,
) -> Result<Vec<TargetContainer>, ExperimentError> {
    let mut containers = docker.list_containers(&target.app_label).await?;

    if !target.names.is_empty() {
        containers.retain(|c| {
            target
                .names
                .iter()
                .any(|n| n == &c.name || (!n.is_empty() && c.id.starts_with(n.as_str())))
        });
    }

    containers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(containers)
}

/// Production Docker client implementation using `bollard`.
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker using the default local socket.
    pub fn connect_local() -> Result<Self, ExperimentError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ExperimentError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ExperimentError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ExperimentError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

impl DockerClient for BollardDockerClient {
    async fn list_containers(&self, label: &str) -> Result<Vec<TargetContainer>, ExperimentError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        if !label.is_empty() {
            filters.insert("label".to_owned(), vec![label.to_owned()]);
        }

        // Stopped containers are listed too so the health checker can see them
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ExperimentError::DockerApi(format!("list containers failed: {e}")))?;

        let result = containers
            .into_iter()
            .map(|container| {
                let name = container
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default();
                TargetContainer {
                    id: container.id.unwrap_or_default(),
                    name,
                    state: container.state.unwrap_or_default(),
                    labels: container.labels.unwrap_or_default(),
                }
            })
            .collect();

        Ok(result)
    }

    async fn inspect_container(&self, id: &str) -> Result<TargetContainer, ExperimentError> {
        validate_container_id(id)?;

        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if e.to_string().contains("404") {
                ExperimentError::TargetNotFound(id.to_owned())
            } else {
                ExperimentError::DockerApi(format!("inspect container failed: {e}"))
            }
        })?;

        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let labels = details
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();
        let state = match details.state.and_then(|s| s.running) {
            Some(true) => "running".to_owned(),
            Some(false) => "exited".to_owned(),
            None => "unknown".to_owned(),
        };

        Ok(TargetContainer {
            id: details.id.unwrap_or_default(),
            name,
            state,
            labels,
        })
    }

    async fn kill_container(&self, id: &str) -> Result<(), ExperimentError> {
        validate_container_id(id)?;

        use bollard::container::KillContainerOptions;

        self.docker
            .kill_container(
                id,
                Some(KillContainerOptions {
                    signal: KILL_SIGNAL,
                }),
            )
            .await
            .map_err(|e| ExperimentError::InjectionFailed {
                target: id.to_owned(),
                reason: format!("kill failed: {e}"),
            })
    }

    async fn stop_container(&self, id: &str) -> Result<(), ExperimentError> {
        validate_container_id(id)?;

        use bollard::container::StopContainerOptions;

        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(|e| ExperimentError::InjectionFailed {
                target: id.to_owned(),
                reason: format!("stop failed: {e}"),
            })
    }

    async fn ping(&self) -> Result<(), ExperimentError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ExperimentError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock Docker 클라이언트
///
/// 종료된 컨테이너 ID를 기록하고, `restart_killed`가 켜져 있으면
/// 종료 직후 다시 running 상태로 되돌립니다 (재시작 정책 시뮬레이션).
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    /// 현재 컨테이너 목록
    pub containers: std::sync::Mutex<Vec<TargetContainer>>,
    /// 종료/정지 요청된 컨테이너 ID (호출 순서)
    pub killed: std::sync::Mutex<Vec<String>>,
    /// 액션 호출 시 실패를 시뮬레이션할지 여부
    pub fail_actions: bool,
    /// 종료된 컨테이너를 즉시 재시작할지 여부
    pub restart_killed: bool,
}

#[cfg(test)]
impl MockDockerClient {
    /// 빈 컨테이너 목록으로 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self {
            restart_killed: true,
            ..Self::default()
        }
    }

    /// 테스트용 컨테이너를 추가합니다.
    pub fn with_containers(self, containers: Vec<TargetContainer>) -> Self {
        *self.containers.lock().unwrap() = containers;
        self
    }

    /// 액션 호출 시 실패하도록 설정합니다.
    pub fn with_failing_actions(mut self) -> Self {
        self.fail_actions = true;
        self
    }

    /// 종료된 컨테이너가 재시작되지 않도록 설정합니다.
    pub fn without_restart(mut self) -> Self {
        self.restart_killed = false;
        self
    }

    /// 지금까지 종료된 컨테이너 ID 목록을 반환합니다.
    pub fn killed_ids(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    fn terminate(&self, id: &str) -> Result<(), ExperimentError> {
        if self.fail_actions {
            return Err(ExperimentError::InjectionFailed {
                target: id.to_owned(),
                reason: "mock failure".to_owned(),
            });
        }
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ExperimentError::TargetNotFound(id.to_owned()))?;
        if !self.restart_killed {
            container.state = "exited".to_owned();
        }
        self.killed.lock().unwrap().push(id.to_owned());
        Ok(())
    }
}

#[cfg(test)]
pub fn sample_container(id: &str, name: &str, app: &str) -> TargetContainer {
    TargetContainer {
        id: id.to_owned(),
        name: name.to_owned(),
        state: "running".to_owned(),
        labels: HashMap::from([("app".to_owned(), app.to_owned())]),
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn list_containers(&self, label: &str) -> Result<Vec<TargetContainer>, ExperimentError> {
        let containers = self.containers.lock().unwrap().clone();
        if label.is_empty() {
            return Ok(containers);
        }
        let (key, value) = label.split_once('=').unwrap_or((label, ""));
        Ok(containers
            .into_iter()
            .filter(|c| c.labels.get(key).is_some_and(|v| value.is_empty() || v == value))
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<TargetContainer, ExperimentError> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ExperimentError::TargetNotFound(id.to_owned()))
    }

    async fn kill_container(&self, id: &str) -> Result<(), ExperimentError> {
        self.terminate(id)
    }

    async fn stop_container(&self, id: &str) -> Result<(), ExperimentError> {
        self.terminate(id)
    }

    async fn ping(&self) -> Result<(), ExperimentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx_pair() -> Vec<TargetContainer> {
        vec![
            sample_container("aaa111", "nginx-2", "nginx"),
            sample_container("bbb222", "nginx-1", "nginx"),
            sample_container("ccc333", "redis-1", "redis"),
        ]
    }

    #[tokio::test]
    async fn mock_client_filters_by_label() {
        let client = MockDockerClient::new().with_containers(nginx_pair());
        let containers = client.list_containers("app=nginx").await.unwrap();
        assert_eq!(containers.len(), 2);
        let all = client.list_containers("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn mock_client_inspect_not_found() {
        let client = MockDockerClient::new();
        let result = client.inspect_container("deadbeef").await;
        assert!(matches!(
            result.unwrap_err(),
            ExperimentError::TargetNotFound(_)
        ));
    }

    #[tokio::test]
    async fn mock_client_kill_records_id() {
        let client = MockDockerClient::new().with_containers(nginx_pair());
        client.kill_container("aaa111").await.unwrap();
        assert_eq!(client.killed_ids(), vec!["aaa111".to_owned()]);
        let c = client.inspect_container("aaa111").await.unwrap();
        assert!(c.is_running());
    }

    #[tokio::test]
    async fn mock_client_without_restart_leaves_container_exited() {
        let client = MockDockerClient::new()
            .with_containers(nginx_pair())
            .without_restart();
        client.stop_container("bbb222").await.unwrap();
        let c = client.inspect_container("bbb222").await.unwrap();
        assert!(!c.is_running());
    }

    #[tokio::test]
    async fn mock_client_failing_actions() {
        let client = MockDockerClient::new()
            .with_containers(nginx_pair())
            .with_failing_actions();
        let result = client.kill_container("aaa111").await;
        assert!(matches!(
            result.unwrap_err(),
            ExperimentError::InjectionFailed { .. }
        ));
    }

    #[tokio::test]
    async fn resolve_targets_sorts_by_name() {
        let client = MockDockerClient::new().with_containers(nginx_pair());
        let target = TargetDescriptor {
            app_label: "app=nginx".to_owned(),
            names: Vec::new(),
        };
        let targets = resolve_targets(&client, &target).await.unwrap();
        let names: Vec<_> = targets.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["nginx-1", "nginx-2"]);
    }

    #[tokio::test]
    async fn resolve_targets_restricts_to_names() {
        let client = MockDockerClient::new().with_containers(nginx_pair());
        let target = TargetDescriptor {
            app_label: "app=nginx".to_owned(),
            names: vec!["nginx-2".to_owned()],
        };
        let targets = resolve_targets(&client, &target).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "aaa111");
    }

    #[tokio::test]
    async fn resolve_targets_matches_id_prefix() {
        let client = MockDockerClient::new().with_containers(nginx_pair());
        let target = TargetDescriptor {
            app_label: String::new(),
            names: vec!["ccc".to_owned()],
        };
        let targets = resolve_targets(&client, &target).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "redis-1");
    }

    #[test]
    fn validate_container_id_rejects_non_hex() {
        assert!(validate_container_id("abc123").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("abc;rm").is_err());
        assert!(validate_container_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn docker_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockDockerClient>();
        assert_send_sync::<BollardDockerClient>();
    }
}
