//! 실험 실행 설정
//!
//! [`LifecycleConfig`]는 core의 [`RunnerConfig`](chaosrun_core::config::RunnerConfig)를
//! 기반으로 컨트롤러, 중단 감시자, 주입기가 사용하는 실행 설정을 제공합니다.
//! [`experiment_details`]는 core의 실험 설정을 불변 [`ExperimentDetails`]로 변환합니다.
//!
//! # 사용 예시
//! ```ignore
//! use chaosrun_core::config::ChaosrunConfig;
//! use chaosrun_experiment::config::{LifecycleConfig, experiment_details};
//!
//! let core_config = ChaosrunConfig::default();
//! let config = LifecycleConfig::from_core(&core_config.runner);
//! let details = experiment_details(&core_config.experiment)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chaosrun_core::config::{ExperimentConfig, RunnerConfig};
use chaosrun_core::types::{ExperimentDetails, Sequence, TargetDescriptor};

use crate::error::ExperimentError;
use crate::inject::InjectorSettings;

/// 실험 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// 중단 신호 폴링 주기 (밀리초)
    pub abort_poll_interval_ms: u64,
    /// 종료 판정 저장 재시도 최대 횟수
    pub persist_retry_max_attempts: u32,
    /// 재시도 백오프 기본 간격 (밀리초)
    pub persist_retry_backoff_ms: u64,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 단일 종료 액션 타임아웃 (초)
    pub action_timeout_secs: u64,
    /// 종료 액션 재시도 최대 횟수
    pub action_retry_max_attempts: u32,
    /// 종료 후 대상 복구 대기 최대 시간 (초)
    pub recovery_timeout_secs: u64,
    /// 복구 확인 주기 (밀리초)
    pub recovery_poll_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            abort_poll_interval_ms: 1_000,
            persist_retry_max_attempts: 3,
            persist_retry_backoff_ms: 500,
            action_timeout_secs: 30,
            action_retry_max_attempts: 2,
            recovery_timeout_secs: 90,
            recovery_poll_interval_ms: 2_000,
        }
    }
}

/// 설정 상한값 상수
const MAX_ABORT_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_PERSIST_RETRY_ATTEMPTS: u32 = 10;
const MAX_RETRY_BACKOFF_MS: u64 = 30_000;
const MAX_ACTION_TIMEOUT_SECS: u64 = 300;
const MAX_ACTION_RETRY_ATTEMPTS: u32 = 10;
const MAX_RECOVERY_TIMEOUT_SECS: u64 = 1_800;

impl LifecycleConfig {
    /// core의 `RunnerConfig`에서 실행 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &RunnerConfig) -> Self {
        Self {
            abort_poll_interval_ms: core.abort_poll_interval_ms,
            persist_retry_max_attempts: core.persist_retry_max_attempts,
            persist_retry_backoff_ms: core.persist_retry_backoff_ms,
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.abort_poll_interval_ms == 0
            || self.abort_poll_interval_ms > MAX_ABORT_POLL_INTERVAL_MS
        {
            return Err(config_error(
                "abort_poll_interval_ms",
                format!("must be 1-{MAX_ABORT_POLL_INTERVAL_MS}"),
            ));
        }

        if self.persist_retry_max_attempts > MAX_PERSIST_RETRY_ATTEMPTS {
            return Err(config_error(
                "persist_retry_max_attempts",
                format!("must be 0-{MAX_PERSIST_RETRY_ATTEMPTS}"),
            ));
        }

        if self.persist_retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(config_error(
                "persist_retry_backoff_ms",
                format!("must be 0-{MAX_RETRY_BACKOFF_MS}"),
            ));
        }

        if self.action_timeout_secs == 0 || self.action_timeout_secs > MAX_ACTION_TIMEOUT_SECS {
            return Err(config_error(
                "action_timeout_secs",
                format!("must be 1-{MAX_ACTION_TIMEOUT_SECS}"),
            ));
        }

        if self.action_retry_max_attempts > MAX_ACTION_RETRY_ATTEMPTS {
            return Err(config_error(
                "action_retry_max_attempts",
                format!("must be 0-{MAX_ACTION_RETRY_ATTEMPTS}"),
            ));
        }

        if self.recovery_timeout_secs > MAX_RECOVERY_TIMEOUT_SECS {
            return Err(config_error(
                "recovery_timeout_secs",
                format!("must be 0-{MAX_RECOVERY_TIMEOUT_SECS}"),
            ));
        }

        if self.recovery_poll_interval_ms == 0 {
            return Err(config_error(
                "recovery_poll_interval_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// 중단 신호 폴링 주기
    pub fn abort_poll_interval(&self) -> Duration {
        Duration::from_millis(self.abort_poll_interval_ms)
    }

    /// 저장 재시도 백오프 기본 간격
    pub fn persist_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_retry_backoff_ms)
    }

    /// 주입기 설정을 생성합니다.
    pub fn injector_settings(&self) -> InjectorSettings {
        InjectorSettings {
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            max_retries: self.action_retry_max_attempts,
            retry_backoff_base: self.persist_retry_backoff(),
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            recovery_poll_interval: Duration::from_millis(self.recovery_poll_interval_ms),
        }
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> ExperimentError {
    ExperimentError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// core의 실험 설정을 불변 [`ExperimentDetails`]로 변환합니다.
///
/// 빈 `engine_name`은 엔진 바인딩 없음으로 해석합니다.
pub fn experiment_details(core: &ExperimentConfig) -> Result<ExperimentDetails, ExperimentError> {
    let sequence = core
        .sequence
        .parse::<Sequence>()
        .map_err(|reason| config_error("sequence", reason))?;

    let engine_name = match core.engine_name.trim() {
        "" => None,
        name => Some(name.to_owned()),
    };

    Ok(ExperimentDetails {
        experiment_name: core.name.clone(),
        engine_name,
        chaos_duration: Duration::from_secs(core.chaos_duration_secs),
        chaos_interval: Duration::from_secs(core.chaos_interval_secs),
        ramp_time: Duration::from_secs(core.ramp_time_secs),
        default_health_check: core.default_health_check,
        force: core.force,
        sequence,
        pods_affected_perc: core.pods_affected_perc,
        target: TargetDescriptor {
            app_label: core.app_label.clone(),
            names: core.target_pods.clone(),
        },
    })
}

/// 실행 설정 빌더
#[derive(Default)]
pub struct LifecycleConfigBuilder {
    config: LifecycleConfig,
}

impl LifecycleConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 중단 신호 폴링 주기(밀리초)를 설정합니다.
    pub fn abort_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.abort_poll_interval_ms = ms;
        self
    }

    /// 저장 재시도 최대 횟수를 설정합니다.
    pub fn persist_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.persist_retry_max_attempts = attempts;
        self
    }

    /// 저장 재시도 백오프 기본 간격(밀리초)을 설정합니다.
    pub fn persist_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.persist_retry_backoff_ms = ms;
        self
    }

    /// 종료 액션 타임아웃(초)을 설정합니다.
    pub fn action_timeout_secs(mut self, secs: u64) -> Self {
        self.config.action_timeout_secs = secs;
        self
    }

    /// 종료 액션 재시도 최대 횟수를 설정합니다.
    pub fn action_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.action_retry_max_attempts = attempts;
        self
    }

    /// 복구 대기 최대 시간(초)을 설정합니다.
    pub fn recovery_timeout_secs(mut self, secs: u64) -> Self {
        self.config.recovery_timeout_secs = secs;
        self
    }

    /// 복구 확인 주기(밀리초)를 설정합니다.
    pub fn recovery_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.recovery_poll_interval_ms = ms;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<LifecycleConfig, ExperimentError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
