//! 대상 상태 확인
//!
//! [`HealthChecker`]는 대상 워크로드가 현재 정상인지 보고합니다.
//! [`DockerHealthChecker`]는 대상 기술자가 선택하는 컨테이너가 하나 이상 있고
//! 모두 running 상태일 때 정상으로 판단합니다.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use chaosrun_core::types::TargetDescriptor;

use crate::docker::{DockerClient, resolve_targets};
use crate::error::ExperimentError;

/// 대상 상태 확인기
pub trait HealthChecker: Send + Sync + 'static {
    /// 대상이 정상이면 `Ok(())`, 아니면 [`ExperimentError::HealthCheck`]를 반환합니다.
    fn check_health(
        &self,
        target: &TargetDescriptor,
    ) -> impl Future<Output = Result<(), ExperimentError>> + Send;
}

/// Docker 기반 상태 확인기
pub struct DockerHealthChecker<D: DockerClient> {
    docker: Arc<D>,
}

impl<D: DockerClient> DockerHealthChecker<D> {
    /// 새 상태 확인기를 생성합니다.
    pub fn new(docker: Arc<D>) -> Self {
        Self { docker }
    }
}

impl<D: DockerClient> HealthChecker for DockerHealthChecker<D> {
    async fn check_health(&self, target: &TargetDescriptor) -> Result<(), ExperimentError> {
        let containers = resolve_targets(self.docker.as_ref(), target)
            .await
            .map_err(|e| ExperimentError::HealthCheck {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        if containers.is_empty() {
            return Err(ExperimentError::HealthCheck {
                target: target.to_string(),
                reason: "no containers matched".to_owned(),
            });
        }

        let not_running: Vec<String> = containers
            .iter()
            .filter(|c| !c.is_running())
            .map(|c| format!("{} ({})", c.name, c.state))
            .collect();

        if !not_running.is_empty() {
            return Err(ExperimentError::HealthCheck {
                target: target.to_string(),
                reason: format!("not running: {}", not_running.join(", ")),
            });
        }

        debug!(
            target = %target,
            containers = containers.len(),
            "all target containers are running"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{MockDockerClient, sample_container};

    fn nginx_target() -> TargetDescriptor {
        TargetDescriptor {
            app_label: "app=nginx".to_owned(),
            names: Vec::new(),
        }
    }

    #[tokio::test]
    async fn healthy_when_all_running() {
        let docker = Arc::new(MockDockerClient::new().with_containers(vec![
            sample_container("aaa", "nginx-1", "nginx"),
            sample_container("bbb", "nginx-2", "nginx"),
        ]));
        let checker = DockerHealthChecker::new(docker);
        checker.check_health(&nginx_target()).await.unwrap();
    }

    #[tokio::test]
    async fn unhealthy_when_nothing_matches() {
        let docker = Arc::new(
            MockDockerClient::new().with_containers(vec![sample_container("ccc", "redis", "redis")]),
        );
        let checker = DockerHealthChecker::new(docker);
        let err = checker.check_health(&nginx_target()).await.unwrap_err();
        assert!(err.to_string().contains("no containers matched"));
    }

    #[tokio::test]
    async fn unhealthy_when_one_is_exited() {
        let mut stopped = sample_container("bbb", "nginx-2", "nginx");
        stopped.state = "exited".to_owned();
        let docker = Arc::new(MockDockerClient::new().with_containers(vec![
            sample_container("aaa", "nginx-1", "nginx"),
            stopped,
        ]));
        let checker = DockerHealthChecker::new(docker);
        let err = checker.check_health(&nginx_target()).await.unwrap_err();
        assert!(matches!(err, ExperimentError::HealthCheck { .. }));
        assert!(err.to_string().contains("nginx-2 (exited)"));
    }
}
