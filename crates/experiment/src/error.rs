//! 실험 실행 에러 타입
//!
//! [`ExperimentError`]는 라이프사이클 컨트롤러와 외부 협력자(엔진 소스, 상태 확인,
//! 프로브, 주입기, 결과 저장소, 이벤트 싱크)에서 발생하는 모든 에러를 표현합니다.
//! `From<ExperimentError> for ChaosrunError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use chaosrun_core::error::{ChaosrunError, ConfigError, RunError, StorageError};
use chaosrun_core::types::ProbePhase;

/// 실험 실행 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// 엔진 바인딩 조회 실패
    #[error("engine binding '{binding}': {reason}")]
    EngineSource {
        /// 바인딩 이름
        binding: String,
        /// 실패 사유
        reason: String,
    },

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 대상을 찾을 수 없음
    #[error("no target matched: {0}")]
    TargetNotFound(String),

    /// 대상 상태 확인 실패
    #[error("health check failed for '{target}': {reason}")]
    HealthCheck {
        /// 대상 기술자
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로브 판정 실패
    #[error("probe '{probe}' failed in {phase}: {reason}")]
    ProbeFailed {
        /// 실행 시점
        phase: ProbePhase,
        /// 프로브 이름
        probe: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로브 실행 자체가 불가능함
    #[error("probe '{probe}' could not run: {reason}")]
    ProbeExecution {
        /// 프로브 이름
        probe: String,
        /// 실패 사유
        reason: String,
    },

    /// 카오스 주입 실패
    #[error("injection failed on '{target}': {reason}")]
    InjectionFailed {
        /// 대상 컨테이너
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 결과 레코드 저장 실패
    #[error("result persist failed: {0}")]
    Persist(String),

    /// 결과 식별자 중복 할당
    #[error("result identifier already assigned for '{0}'")]
    IdentifierAlreadyAssigned(String),

    /// 이벤트 발행 실패
    #[error("event emit failed: {0}")]
    Emit(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl ExperimentError {
    /// 결과 레코드에 기록되는 안정적인 에러 코드를 반환합니다.
    pub fn failure_code(&self) -> &'static str {
        match self {
            Self::EngineSource { .. } => "ENGINE_SOURCE_ERROR",
            Self::DockerApi(_) | Self::DockerConnection(_) => "DOCKER_API_ERROR",
            Self::TargetNotFound(_) => "TARGET_SELECTION_ERROR",
            Self::HealthCheck { .. } => "STATUS_CHECKS_ERROR",
            Self::ProbeFailed { .. } => "PROBE_FAILED",
            Self::ProbeExecution { .. } => "PROBE_EXECUTION_ERROR",
            Self::InjectionFailed { .. } => "CHAOS_INJECT_ERROR",
            Self::Persist(_) | Self::IdentifierAlreadyAssigned(_) => "CHAOS_RESULT_ERROR",
            Self::Emit(_) => "EVENT_EMIT_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}

impl From<ExperimentError> for ChaosrunError {
    fn from(err: ExperimentError) -> Self {
        match err {
            ExperimentError::Config { field, reason } => {
                ChaosrunError::Config(ConfigError::InvalidValue { field, reason })
            }
            ExperimentError::Persist(msg) => ChaosrunError::Storage(StorageError::Persist(msg)),
            ExperimentError::IdentifierAlreadyAssigned(_) => {
                ChaosrunError::Storage(StorageError::Persist(err.to_string()))
            }
            ExperimentError::ProbeFailed {
                phase: ProbePhase::PostChaos,
                ..
            } => ChaosrunError::Run(RunError::PostChaosCheck(err.to_string())),
            ExperimentError::HealthCheck { .. } | ExperimentError::ProbeFailed { .. } => {
                ChaosrunError::Run(RunError::PreChaosCheck(err.to_string()))
            }
            ExperimentError::InjectionFailed { target, reason } => {
                ChaosrunError::Run(RunError::Injection { target, reason })
            }
            ExperimentError::TargetNotFound(ref target) => {
                ChaosrunError::Run(RunError::Injection {
                    target: target.clone(),
                    reason: err.to_string(),
                })
            }
            ExperimentError::EngineSource { .. }
            | ExperimentError::DockerApi(_)
            | ExperimentError::DockerConnection(_)
            | ExperimentError::ProbeExecution { .. }
            | ExperimentError::Emit(_) => ChaosrunError::Run(RunError::Setup(err.to_string())),
        }
    }
}
