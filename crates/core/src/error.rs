//! 에러 타입 -- 도메인별 에러 정의

/// chaosrun 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ChaosrunError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 실험 실행 단계 에러
    #[error("run error: {0}")]
    Run(#[from] RunError),

    /// 결과 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 실험 실행 단계 에러
///
/// 실험의 어느 단계에서 실패했는지를 구분합니다.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 결과 레코드 생성 전 준비 단계 실패
    #[error("setup failed: {0}")]
    Setup(String),

    /// 카오스 주입 전 상태 확인 실패
    #[error("pre-chaos check failed: {0}")]
    PreChaosCheck(String),

    /// 카오스 주입 실패
    #[error("chaos injection failed on '{target}': {reason}")]
    Injection { target: String, reason: String },

    /// 카오스 주입 후 상태 확인 실패
    #[error("post-chaos check failed: {0}")]
    PostChaosCheck(String),

    /// 외부 중단 신호
    #[error("aborted: {0}")]
    Aborted(String),
}

/// 결과 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 레코드 저장 실패
    #[error("persist failed: {0}")]
    Persist(String),

    /// 레코드 조회 실패
    #[error("load failed: {0}")]
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_top_level() {
        let err: ChaosrunError = ConfigError::InvalidValue {
            field: "experiment.name".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        assert!(matches!(err, ChaosrunError::Config(_)));
        assert!(err.to_string().contains("experiment.name"));
    }

    #[test]
    fn injection_error_display() {
        let err = RunError::Injection {
            target: "app=nginx".to_owned(),
            reason: "no containers matched".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("app=nginx"));
        assert!(msg.contains("no containers matched"));
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::Persist("disk full".to_owned());
        assert_eq!(err.to_string(), "persist failed: disk full");
    }
}
