//! 설정 관리 -- chaosrun.toml 파싱 및 런타임 설정
//!
//! [`ChaosrunConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CHAOSRUN_EXPERIMENT_NAME=pod-delete` 형식)
//! 3. 러너 호환 환경변수 (`EXPERIMENT_NAME`, `TOTAL_CHAOS_DURATION` 등)
//! 4. 설정 파일 (`chaosrun.toml`)
//! 5. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), chaosrun_core::error::ChaosrunError> {
//! use chaosrun_core::config::ChaosrunConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ChaosrunConfig::load("chaosrun.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ChaosrunConfig::parse("[experiment]\nname = \"pod-delete\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChaosrunError, ConfigError};
use crate::types::Sequence;

/// chaosrun 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaosrunConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 실험 설정
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// 러너 설정
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// 설정 상한값 상수
const MAX_PERCENTAGE: u32 = 100;
const MAX_ABORT_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_PERSIST_RETRY_ATTEMPTS: u32 = 10;
const MAX_PERSIST_RETRY_BACKOFF_MS: u64 = 30_000;

impl ChaosrunConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ChaosrunError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ChaosrunError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChaosrunError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ChaosrunError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ChaosrunError> {
        toml::from_str(toml_str).map_err(|e| {
            ChaosrunError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 러너 호환 변수(`EXPERIMENT_NAME` 등)를 먼저 적용하고,
    /// `CHAOSRUN_{SECTION}_{FIELD}` 변수가 그 위에 우선 적용됩니다.
    pub fn apply_env_overrides(&mut self) {
        // Runner-pod compatible variables
        override_string(&mut self.experiment.name, "EXPERIMENT_NAME");
        override_string(&mut self.experiment.engine_name, "CHAOSENGINE");
        override_u64(
            &mut self.experiment.chaos_duration_secs,
            "TOTAL_CHAOS_DURATION",
        );
        override_u64(&mut self.experiment.chaos_interval_secs, "CHAOS_INTERVAL");
        override_u64(&mut self.experiment.ramp_time_secs, "RAMP_TIME");
        override_bool(&mut self.experiment.force, "FORCE");
        override_string(&mut self.experiment.sequence, "SEQUENCE");
        override_u32(
            &mut self.experiment.pods_affected_perc,
            "PODS_AFFECTED_PERC",
        );
        override_csv(&mut self.experiment.target_pods, "TARGET_PODS");
        override_string(&mut self.experiment.app_label, "APP_LABEL");
        override_bool(
            &mut self.experiment.default_health_check,
            "DEFAULT_HEALTH_CHECK",
        );

        // General
        override_string(&mut self.general.log_level, "CHAOSRUN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CHAOSRUN_GENERAL_LOG_FORMAT");

        // Experiment
        override_string(&mut self.experiment.name, "CHAOSRUN_EXPERIMENT_NAME");
        override_string(
            &mut self.experiment.engine_name,
            "CHAOSRUN_EXPERIMENT_ENGINE_NAME",
        );
        override_u64(
            &mut self.experiment.chaos_duration_secs,
            "CHAOSRUN_EXPERIMENT_CHAOS_DURATION_SECS",
        );
        override_u64(
            &mut self.experiment.chaos_interval_secs,
            "CHAOSRUN_EXPERIMENT_CHAOS_INTERVAL_SECS",
        );
        override_u64(
            &mut self.experiment.ramp_time_secs,
            "CHAOSRUN_EXPERIMENT_RAMP_TIME_SECS",
        );
        override_bool(&mut self.experiment.force, "CHAOSRUN_EXPERIMENT_FORCE");
        override_string(
            &mut self.experiment.sequence,
            "CHAOSRUN_EXPERIMENT_SEQUENCE",
        );
        override_u32(
            &mut self.experiment.pods_affected_perc,
            "CHAOSRUN_EXPERIMENT_PODS_AFFECTED_PERC",
        );
        override_csv(
            &mut self.experiment.target_pods,
            "CHAOSRUN_EXPERIMENT_TARGET_PODS",
        );
        override_string(
            &mut self.experiment.app_label,
            "CHAOSRUN_EXPERIMENT_APP_LABEL",
        );
        override_bool(
            &mut self.experiment.default_health_check,
            "CHAOSRUN_EXPERIMENT_DEFAULT_HEALTH_CHECK",
        );

        // Runner
        override_string(&mut self.runner.engine_dir, "CHAOSRUN_RUNNER_ENGINE_DIR");
        override_string(&mut self.runner.result_dir, "CHAOSRUN_RUNNER_RESULT_DIR");
        override_string(
            &mut self.runner.event_log_path,
            "CHAOSRUN_RUNNER_EVENT_LOG_PATH",
        );
        override_string(
            &mut self.runner.docker_socket,
            "CHAOSRUN_RUNNER_DOCKER_SOCKET",
        );
        override_u64(
            &mut self.runner.abort_poll_interval_ms,
            "CHAOSRUN_RUNNER_ABORT_POLL_INTERVAL_MS",
        );
        override_u32(
            &mut self.runner.persist_retry_max_attempts,
            "CHAOSRUN_RUNNER_PERSIST_RETRY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.runner.persist_retry_backoff_ms,
            "CHAOSRUN_RUNNER_PERSIST_RETRY_BACKOFF_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ChaosrunError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.experiment.name.trim().is_empty() {
            return Err(invalid("experiment.name", "must not be empty"));
        }

        if self.experiment.chaos_duration_secs == 0 {
            return Err(invalid(
                "experiment.chaos_duration_secs",
                "must be greater than 0",
            ));
        }

        if self.experiment.chaos_interval_secs == 0 {
            return Err(invalid(
                "experiment.chaos_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.experiment.pods_affected_perc > MAX_PERCENTAGE {
            return Err(invalid(
                "experiment.pods_affected_perc",
                format!("must be 0-{MAX_PERCENTAGE}"),
            ));
        }

        if let Err(reason) = self.experiment.sequence.parse::<Sequence>() {
            return Err(invalid("experiment.sequence", reason));
        }

        if self.experiment.app_label.is_empty() && self.experiment.target_pods.is_empty() {
            return Err(invalid(
                "experiment.app_label",
                "app_label or target_pods must be set",
            ));
        }

        if self.runner.abort_poll_interval_ms == 0
            || self.runner.abort_poll_interval_ms > MAX_ABORT_POLL_INTERVAL_MS
        {
            return Err(invalid(
                "runner.abort_poll_interval_ms",
                format!("must be 1-{MAX_ABORT_POLL_INTERVAL_MS}"),
            ));
        }

        if self.runner.persist_retry_max_attempts > MAX_PERSIST_RETRY_ATTEMPTS {
            return Err(invalid(
                "runner.persist_retry_max_attempts",
                format!("must be 0-{MAX_PERSIST_RETRY_ATTEMPTS}"),
            ));
        }

        if self.runner.persist_retry_backoff_ms > MAX_PERSIST_RETRY_BACKOFF_MS {
            return Err(invalid(
                "runner.persist_retry_backoff_ms",
                format!("must be 0-{MAX_PERSIST_RETRY_BACKOFF_MS}"),
            ));
        }

        if self.runner.result_dir.is_empty() {
            return Err(invalid("runner.result_dir", "must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ChaosrunError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 실험 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// 실험 이름
    pub name: String,
    /// 엔진 바인딩 이름 (빈 문자열이면 바인딩 없음)
    pub engine_name: String,
    /// 카오스 유지 시간 (초)
    pub chaos_duration_secs: u64,
    /// 반복 주입 간격 (초)
    pub chaos_interval_secs: u64,
    /// 주입 전후 대기 시간 (초)
    pub ramp_time_secs: u64,
    /// 기본 상태 확인 수행 여부
    pub default_health_check: bool,
    /// 강제 종료 여부
    pub force: bool,
    /// 주입 순서 (serial, parallel)
    pub sequence: String,
    /// 영향받는 대상 비율 (%)
    pub pods_affected_perc: u32,
    /// 명시적 대상 이름
    pub target_pods: Vec<String>,
    /// 대상 선택 레이블 (`key=value`)
    pub app_label: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "pod-delete".to_owned(),
            engine_name: String::new(),
            chaos_duration_secs: 15,
            chaos_interval_secs: 5,
            ramp_time_secs: 0,
            default_health_check: true,
            force: true,
            sequence: "parallel".to_owned(),
            pods_affected_perc: 0,
            target_pods: Vec::new(),
            app_label: "app=nginx".to_owned(),
        }
    }
}

/// 러너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// 엔진 바인딩 파일 디렉토리
    pub engine_dir: String,
    /// 결과 레코드 디렉토리
    pub result_dir: String,
    /// 이벤트 JSON lines 파일 경로 (빈 문자열이면 로그로만 출력)
    pub event_log_path: String,
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 중단 신호 폴링 주기 (밀리초)
    pub abort_poll_interval_ms: u64,
    /// 종료 판정 저장 재시도 최대 횟수
    pub persist_retry_max_attempts: u32,
    /// 재시도 백오프 기본 간격 (밀리초)
    pub persist_retry_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine_dir: "/etc/chaosrun/engines".to_owned(),
            result_dir: "/var/lib/chaosrun/results".to_owned(),
            event_log_path: String::new(),
            docker_socket: "/var/run/docker.sock".to_owned(),
            abort_poll_interval_ms: 1_000,
            persist_retry_max_attempts: 3,
            persist_retry_backoff_ms: 500,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = ChaosrunConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.experiment.name, "pod-delete");
        assert_eq!(config.experiment.chaos_duration_secs, 15);
        assert_eq!(config.experiment.chaos_interval_secs, 5);
        assert!(config.experiment.default_health_check);
        assert_eq!(config.runner.persist_retry_max_attempts, 3);
    }

    #[test]
    fn default_config_passes_validation() {
        ChaosrunConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = ChaosrunConfig::parse("").unwrap();
        assert_eq!(config.experiment.sequence, "parallel");
        assert_eq!(config.runner.abort_poll_interval_ms, 1_000);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let config = ChaosrunConfig::parse(
            r#"
            [experiment]
            name = "container-kill"
            engine_name = "nginx-chaos"
            chaos_duration_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.experiment.name, "container-kill");
        assert_eq!(config.experiment.engine_name, "nginx-chaos");
        assert_eq!(config.experiment.chaos_duration_secs, 60);
        assert_eq!(config.experiment.chaos_interval_secs, 5);
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = ChaosrunConfig::parse("[experiment\nname=").unwrap_err();
        assert!(matches!(
            err,
            ChaosrunError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = ChaosrunConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_empty_experiment_name() {
        let mut config = ChaosrunConfig::default();
        config.experiment.name = "  ".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_duration() {
        let mut config = ChaosrunConfig::default();
        config.experiment.chaos_duration_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chaos_duration_secs"));
    }

    #[test]
    fn validate_rejects_percentage_over_100() {
        let mut config = ChaosrunConfig::default();
        config.experiment.pods_affected_perc = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_sequence() {
        let mut config = ChaosrunConfig::default();
        config.experiment.sequence = "random".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn validate_requires_some_target() {
        let mut config = ChaosrunConfig::default();
        config.experiment.app_label.clear();
        assert!(config.validate().is_err());
        config.experiment.target_pods = vec!["web-1".to_owned()];
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_excessive_retries() {
        let mut config = ChaosrunConfig::default();
        config.runner.persist_retry_max_attempts = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = ChaosrunConfig::default();
        config.runner.abort_poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_runner_compatible_vars() {
        let mut config = ChaosrunConfig::default();
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("TOTAL_CHAOS_DURATION", "30");
            std::env::set_var("SEQUENCE", "serial");
            std::env::set_var("TARGET_PODS", "web-1, web-2");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("TOTAL_CHAOS_DURATION");
            std::env::remove_var("SEQUENCE");
            std::env::remove_var("TARGET_PODS");
        }
        assert_eq!(config.experiment.chaos_duration_secs, 30);
        assert_eq!(config.experiment.sequence, "serial");
        assert_eq!(config.experiment.target_pods, vec!["web-1", "web-2"]);
    }

    #[test]
    #[serial]
    fn env_override_prefixed_wins_over_compatible() {
        let mut config = ChaosrunConfig::default();
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("EXPERIMENT_NAME", "from-runner");
            std::env::set_var("CHAOSRUN_EXPERIMENT_NAME", "from-prefixed");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("EXPERIMENT_NAME");
            std::env::remove_var("CHAOSRUN_EXPERIMENT_NAME");
        }
        assert_eq!(config.experiment.name, "from-prefixed");
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = true;
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_CHAOSRUN_BOOL_BAD", "yes-please") };
        override_bool(&mut val, "TEST_CHAOSRUN_BOOL_BAD");
        assert!(val);
        unsafe { std::env::remove_var("TEST_CHAOSRUN_BOOL_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_CHAOSRUN_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = ChaosrunConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ChaosrunConfig::parse(&toml_str).unwrap();
        assert_eq!(config.experiment.app_label, parsed.experiment.app_label);
        assert_eq!(config.runner.result_dir, parsed.runner.result_dir);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = ChaosrunConfig::from_file("/nonexistent/path/chaosrun.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChaosrunError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
