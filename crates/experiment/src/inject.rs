//! 카오스 주입 -- 대상 컨테이너 반복 종료
//!
//! [`Injector`]는 실제 장애 주입을 수행하는 협력자입니다.
//! [`ContainerKillInjector`]는 카오스 유지 시간 동안 주입 간격마다
//! 대상 컨테이너 일부를 종료(`SIGKILL`) 또는 정지하고, 매 라운드 후
//! 대상 집합이 다시 running 상태로 복구되는지 확인합니다.
//!
//! ```text
//! ramp ─> [select ─> terminate ─> await recovery ─> sleep(interval)]* ─> ramp
//!          └──────────────── until chaos_duration elapsed ─────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use chaosrun_core::metrics as m;
use chaosrun_core::types::{ExperimentDetails, Sequence, TargetDescriptor};

use crate::docker::{DockerClient, TargetContainer, resolve_targets};
use crate::error::ExperimentError;

/// 주입 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// 수행한 라운드 수
    pub rounds: u32,
    /// 종료한 컨테이너 이름 (종료 순서)
    pub terminated: Vec<String>,
}

/// 장애 주입기
pub trait Injector: Send + Sync + 'static {
    /// 대상에 장애를 주입합니다. 카오스 유지 시간은 주입기가 책임집니다.
    fn inject(
        &self,
        target: &TargetDescriptor,
        details: &ExperimentDetails,
    ) -> impl Future<Output = Result<InjectionReport, ExperimentError>> + Send;
}

/// 컨테이너 종료 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TerminateMode {
    Kill,
    Stop,
}

impl TerminateMode {
    fn from_force(force: bool) -> Self {
        if force { Self::Kill } else { Self::Stop }
    }
}

impl fmt::Display for TerminateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kill => write!(f, "kill"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// 주입기 실행 설정
#[derive(Debug, Clone)]
pub struct InjectorSettings {
    /// 단일 종료 액션 타임아웃
    pub action_timeout: Duration,
    /// 종료 액션 재시도 최대 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본 간격
    pub retry_backoff_base: Duration,
    /// 대상 복구 대기 최대 시간
    pub recovery_timeout: Duration,
    /// 복구 확인 주기
    pub recovery_poll_interval: Duration,
}

impl Default for InjectorSettings {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff_base: Duration::from_millis(500),
            recovery_timeout: Duration::from_secs(90),
            recovery_poll_interval: Duration::from_secs(2),
        }
    }
}

/// 영향받는 대상 수를 계산합니다 (최소 1, 최대 전체).
pub fn affected_count(total: usize, percentage: u32) -> usize {
    if total == 0 {
        return 0;
    }
    let perc = usize::try_from(percentage.min(100)).unwrap_or(100);
    (total * perc / 100).clamp(1, total)
}

/// Docker 컨테이너 종료 주입기
pub struct ContainerKillInjector<D: DockerClient> {
    docker: Arc<D>,
    settings: InjectorSettings,
}

impl<D: DockerClient> ContainerKillInjector<D> {
    /// 새 주입기를 생성합니다.
    pub fn new(docker: Arc<D>, settings: InjectorSettings) -> Self {
        Self { docker, settings }
    }

    /// 이번 라운드에 종료할 대상을 선택합니다.
    ///
    /// 라운드마다 시작 위치를 옮겨 같은 컨테이너만 반복 종료하지 않습니다.
    fn select_victims(
        candidates: &[TargetContainer],
        percentage: u32,
        round: u32,
    ) -> Vec<TargetContainer> {
        let count = affected_count(candidates.len(), percentage);
        if count == 0 {
            return Vec::new();
        }
        let offset = usize::try_from(round).unwrap_or(0) % candidates.len();
        candidates
            .iter()
            .cycle()
            .skip(offset)
            .take(count)
            .cloned()
            .collect()
    }

    /// 단일 라운드를 실행합니다.
    async fn run_round(
        &self,
        target: &TargetDescriptor,
        details: &ExperimentDetails,
        round: u32,
        report: &mut InjectionReport,
    ) -> Result<(), ExperimentError> {
        let candidates: Vec<TargetContainer> = resolve_targets(self.docker.as_ref(), target)
            .await?
            .into_iter()
            .filter(TargetContainer::is_running)
            .collect();

        if candidates.is_empty() {
            return Err(ExperimentError::TargetNotFound(target.to_string()));
        }

        let victims = Self::select_victims(&candidates, details.pods_affected_perc, round);
        let mode = TerminateMode::from_force(details.force);
        info!(
            round,
            candidates = candidates.len(),
            victims = victims.len(),
            sequence = %details.sequence,
            mode = %mode,
            "starting injection round"
        );

        match details.sequence {
            Sequence::Serial => {
                for victim in &victims {
                    self.terminate(victim, mode).await?;
                    report.terminated.push(victim.name.clone());
                    self.await_recovery(target).await?;
                }
            }
            Sequence::Parallel => {
                for victim in &victims {
                    self.terminate(victim, mode).await?;
                    report.terminated.push(victim.name.clone());
                }
                self.await_recovery(target).await?;
            }
        }

        Ok(())
    }

    /// 재시도 로직을 포함한 종료 액션 실행
    async fn terminate(
        &self,
        victim: &TargetContainer,
        mode: TerminateMode,
    ) -> Result<(), ExperimentError> {
        let mut last_error = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = self.settings.retry_backoff_base * attempt;
                warn!(
                    container = victim.name.as_str(),
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying terminate action"
                );
                tokio::time::sleep(backoff).await;
            }

            let action = async {
                match mode {
                    TerminateMode::Kill => self.docker.kill_container(&victim.id).await,
                    TerminateMode::Stop => self.docker.stop_container(&victim.id).await,
                }
            };

            match tokio::time::timeout(self.settings.action_timeout, action).await {
                Ok(Ok(())) => {
                    info!(container = victim.name.as_str(), mode = %mode, "terminated target container");
                    metrics::counter!(m::INJECTIONS_TOTAL, m::LABEL_RESULT => "success")
                        .increment(1);
                    metrics::counter!(m::TARGETS_KILLED_TOTAL).increment(1);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    last_error = Some(e);
                }
                Err(_elapsed) => {
                    last_error = Some(ExperimentError::InjectionFailed {
                        target: victim.name.clone(),
                        reason: format!("{mode} timed out"),
                    });
                }
            }
        }

        metrics::counter!(m::INJECTIONS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
        let err = last_error.unwrap_or_else(|| ExperimentError::InjectionFailed {
            target: victim.name.clone(),
            reason: "unknown error".to_owned(),
        });
        error!(container = victim.name.as_str(), error = %err, "terminate action failed");
        Err(err)
    }

    /// 대상 집합이 다시 running 상태가 될 때까지 기다립니다.
    async fn await_recovery(&self, target: &TargetDescriptor) -> Result<(), ExperimentError> {
        let deadline = Instant::now() + self.settings.recovery_timeout;
        loop {
            let last_state = match resolve_targets(self.docker.as_ref(), target).await {
                Ok(containers) if containers.is_empty() => "no containers matched".to_owned(),
                Ok(containers) => {
                    let pending: Vec<&str> = containers
                        .iter()
                        .filter(|c| !c.is_running())
                        .map(|c| c.name.as_str())
                        .collect();
                    if pending.is_empty() {
                        debug!(target = %target, "target containers recovered");
                        return Ok(());
                    }
                    format!("not running: {}", pending.join(", "))
                }
                Err(e) => e.to_string(),
            };

            if Instant::now() >= deadline {
                return Err(ExperimentError::InjectionFailed {
                    target: target.to_string(),
                    reason: format!(
                        "targets did not recover within {}s ({last_state})",
                        self.settings.recovery_timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(self.settings.recovery_poll_interval).await;
        }
    }
}

impl<D: DockerClient> Injector for ContainerKillInjector<D> {
    async fn inject(
        &self,
        target: &TargetDescriptor,
        details: &ExperimentDetails,
    ) -> Result<InjectionReport, ExperimentError> {
        if !details.ramp_time.is_zero() {
            info!(ramp_secs = details.ramp_time.as_secs(), "waiting for ramp time before injection");
            tokio::time::sleep(details.ramp_time).await;
        }

        let started = Instant::now();
        let mut report = InjectionReport::default();

        loop {
            self.run_round(target, details, report.rounds, &mut report)
                .await?;
            report.rounds += 1;

            let elapsed = started.elapsed();
            if elapsed >= details.chaos_duration {
                break;
            }
            let remaining = details.chaos_duration - elapsed;
            tokio::time::sleep(details.chaos_interval.min(remaining)).await;
            if started.elapsed() >= details.chaos_duration {
                break;
            }
        }

        if !details.ramp_time.is_zero() {
            info!(ramp_secs = details.ramp_time.as_secs(), "waiting for ramp time after injection");
            tokio::time::sleep(details.ramp_time).await;
        }

        info!(
            rounds = report.rounds,
            terminated = report.terminated.len(),
            "chaos injection completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{MockDockerClient, sample_container};

    fn details(sequence: Sequence, perc: u32) -> ExperimentDetails {
        ExperimentDetails {
            experiment_name: "pod-delete".to_owned(),
            engine_name: None,
            chaos_duration: Duration::from_secs(10),
            chaos_interval: Duration::from_secs(5),
            ramp_time: Duration::ZERO,
            default_health_check: true,
            force: true,
            sequence,
            pods_affected_perc: perc,
            target: nginx_target(),
        }
    }

    fn nginx_target() -> TargetDescriptor {
        TargetDescriptor {
            app_label: "app=nginx".to_owned(),
            names: Vec::new(),
        }
    }

    fn three_nginx() -> Vec<TargetContainer> {
        vec![
            sample_container("aaa", "nginx-1", "nginx"),
            sample_container("bbb", "nginx-2", "nginx"),
            sample_container("ccc", "nginx-3", "nginx"),
        ]
    }

    fn fast_settings() -> InjectorSettings {
        InjectorSettings {
            action_timeout: Duration::from_secs(1),
            max_retries: 1,
            retry_backoff_base: Duration::from_millis(10),
            recovery_timeout: Duration::from_secs(3),
            recovery_poll_interval: Duration::from_millis(500),
        }
    }

    #[test]
    fn affected_count_bounds() {
        assert_eq!(affected_count(0, 50), 0);
        assert_eq!(affected_count(4, 0), 1);
        assert_eq!(affected_count(4, 50), 2);
        assert_eq!(affected_count(4, 100), 4);
        assert_eq!(affected_count(3, 10), 1);
        assert_eq!(affected_count(3, 250), 3);
    }

    #[test]
    fn select_victims_rotates_by_round() {
        let candidates = three_nginx();
        let first = ContainerKillInjector::<MockDockerClient>::select_victims(&candidates, 0, 0);
        let second = ContainerKillInjector::<MockDockerClient>::select_victims(&candidates, 0, 1);
        assert_eq!(first[0].name, "nginx-1");
        assert_eq!(second[0].name, "nginx-2");
        let wrapped = ContainerKillInjector::<MockDockerClient>::select_victims(&candidates, 67, 2);
        let names: Vec<_> = wrapped.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["nginx-3", "nginx-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeats_rounds_for_chaos_duration() {
        let docker = Arc::new(MockDockerClient::new().with_containers(three_nginx()));
        let injector = ContainerKillInjector::new(Arc::clone(&docker), fast_settings());

        let report = injector
            .inject(&nginx_target(), &details(Sequence::Parallel, 0))
            .await
            .unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.terminated, vec!["nginx-1", "nginx-2"]);
        assert_eq!(docker.killed_ids(), vec!["aaa", "bbb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn serial_sequence_terminates_each_victim() {
        let docker = Arc::new(MockDockerClient::new().with_containers(three_nginx()));
        let injector = ContainerKillInjector::new(Arc::clone(&docker), fast_settings());
        let mut d = details(Sequence::Serial, 100);
        d.chaos_duration = Duration::from_secs(1);

        let report = injector.inject(&nginx_target(), &d).await.unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.terminated.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_when_no_target_matches() {
        let docker = Arc::new(
            MockDockerClient::new().with_containers(vec![sample_container("ddd", "redis", "redis")]),
        );
        let injector = ContainerKillInjector::new(docker, fast_settings());
        let err = injector
            .inject(&nginx_target(), &details(Sequence::Parallel, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExperimentError::TargetNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_after_retries_exhausted() {
        let docker = Arc::new(
            MockDockerClient::new()
                .with_containers(three_nginx())
                .with_failing_actions(),
        );
        let injector = ContainerKillInjector::new(Arc::clone(&docker), fast_settings());
        let err = injector
            .inject(&nginx_target(), &details(Sequence::Parallel, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExperimentError::InjectionFailed { .. }));
        assert!(docker.killed_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fails_when_targets_do_not_recover() {
        let docker = Arc::new(
            MockDockerClient::new()
                .with_containers(three_nginx())
                .without_restart(),
        );
        let injector = ContainerKillInjector::new(Arc::clone(&docker), fast_settings());
        let err = injector
            .inject(&nginx_target(), &details(Sequence::Parallel, 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not recover"));
        assert_eq!(docker.killed_ids(), vec!["aaa"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_time_waits_before_and_after() {
        let docker = Arc::new(MockDockerClient::new().with_containers(three_nginx()));
        let injector = ContainerKillInjector::new(docker, fast_settings());
        let mut d = details(Sequence::Parallel, 0);
        d.chaos_duration = Duration::from_secs(1);
        d.ramp_time = Duration::from_secs(4);

        let started = Instant::now();
        injector.inject(&nginx_target(), &d).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(9));
    }
}
