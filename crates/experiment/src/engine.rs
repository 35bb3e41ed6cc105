//! 엔진 바인딩 소스 -- 실행 파라미터 조회 및 중단 신호 폴링
//!
//! 엔진 바인딩은 실험 실행을 요청한 외부 리소스입니다. 바인딩은 이번 실행에서
//! 사용할 프로브 목록과 대상 기술자를 제공하며, 바인딩이 삭제되거나
//! `abort = true`로 표시되면 실행을 중단해야 합니다.
//!
//! [`FileEngineSource`]는 `<engine_dir>/<binding>.toml` 파일을 바인딩으로 사용합니다.
//!
//! ```toml
//! abort = false
//!
//! [target]
//! app_label = "app=nginx"
//! names = []
//!
//! [[probes]]
//! name = "check-frontend"
//! mode = "Edge"
//! [probes.check]
//! type = "command"
//! command = "curl"
//! args = ["-sf", "http://localhost:8080/healthz"]
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use chaosrun_core::types::{ProbeSpec, TargetDescriptor};

use crate::error::ExperimentError;

/// 엔진 바인딩에서 가져온 실행 파라미터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunParameters {
    /// 이번 실행에 설정된 프로브
    pub probes: Vec<ProbeSpec>,
    /// 바인딩이 지정한 대상 (없으면 설정 파일의 대상을 유지)
    pub target: Option<TargetDescriptor>,
}

/// 엔진 바인딩 소스
pub trait EngineSource: Send + Sync + 'static {
    /// 바인딩에서 실행 파라미터(프로브, 대상)를 가져옵니다.
    fn fetch_run_parameters(
        &self,
        binding: &str,
    ) -> impl Future<Output = Result<RunParameters, ExperimentError>> + Send;

    /// 바인딩에 중단 신호가 있는지 확인합니다.
    fn poll_abort_signal(
        &self,
        binding: &str,
    ) -> impl Future<Output = Result<bool, ExperimentError>> + Send;
}

/// 바인딩 파일 형식
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineBinding {
    /// 중단 요청 여부
    pub abort: bool,
    /// 대상 기술자
    pub target: Option<TargetDescriptor>,
    /// 프로브 목록
    pub probes: Vec<ProbeSpec>,
}

/// TOML 파일 기반 엔진 소스
pub struct FileEngineSource {
    dir: PathBuf,
}

impl FileEngineSource {
    /// 바인딩 파일 디렉토리로 엔진 소스를 생성합니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 바인딩 파일 경로를 반환합니다.
    pub fn binding_path(&self, binding: &str) -> PathBuf {
        self.dir.join(format!("{binding}.toml"))
    }

    async fn load(&self, binding: &str, path: &Path) -> Result<EngineBinding, ExperimentError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExperimentError::EngineSource {
                binding: binding.to_owned(),
                reason: format!("{}: {e}", path.display()),
            }
        })?;
        toml::from_str(&content).map_err(|e| ExperimentError::EngineSource {
            binding: binding.to_owned(),
            reason: format!("invalid binding file: {e}"),
        })
    }
}

fn validate_binding_name(binding: &str) -> Result<(), ExperimentError> {
    let valid = !binding.is_empty()
        && binding
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !binding.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ExperimentError::EngineSource {
            binding: binding.to_owned(),
            reason: "binding name must be alphanumeric with '-', '_' or '.'".to_owned(),
        })
    }
}

impl EngineSource for FileEngineSource {
    async fn fetch_run_parameters(&self, binding: &str) -> Result<RunParameters, ExperimentError> {
        validate_binding_name(binding)?;
        let path = self.binding_path(binding);
        let parsed = self.load(binding, &path).await?;
        debug!(
            binding,
            probes = parsed.probes.len(),
            "loaded engine binding"
        );
        Ok(RunParameters {
            probes: parsed.probes,
            target: parsed.target,
        })
    }

    async fn poll_abort_signal(&self, binding: &str) -> Result<bool, ExperimentError> {
        validate_binding_name(binding)?;
        let path = self.binding_path(binding);
        match tokio::fs::try_exists(&path).await {
            Ok(false) => {
                debug!(binding, "engine binding removed");
                return Ok(true);
            }
            Ok(true) => {}
            Err(e) => {
                return Err(ExperimentError::EngineSource {
                    binding: binding.to_owned(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(self.load(binding, &path).await?.abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosrun_core::types::ProbeMode;

    const BINDING: &str = r#"
abort = false

[target]
app_label = "app=web"
names = ["web-1"]

[[probes]]
name = "check-frontend"
mode = "SOT"
[probes.check]
type = "command"
command = "true"
"#;

    #[tokio::test]
    async fn fetch_run_parameters_reads_binding() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nginx-chaos.toml"), BINDING).unwrap();

        let source = FileEngineSource::new(dir.path());
        let params = source.fetch_run_parameters("nginx-chaos").await.unwrap();
        assert_eq!(params.probes.len(), 1);
        assert_eq!(params.probes[0].mode, ProbeMode::StartOfTest);
        let target = params.target.unwrap();
        assert_eq!(target.app_label, "app=web");
        assert_eq!(target.names, vec!["web-1".to_owned()]);
    }

    #[tokio::test]
    async fn fetch_missing_binding_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileEngineSource::new(dir.path());
        let err = source.fetch_run_parameters("missing").await.unwrap_err();
        assert!(matches!(err, ExperimentError::EngineSource { .. }));
    }

    #[tokio::test]
    async fn empty_binding_has_no_probes_or_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bare.toml"), "").unwrap();
        let source = FileEngineSource::new(dir.path());
        let params = source.fetch_run_parameters("bare").await.unwrap();
        assert_eq!(params, RunParameters::default());
    }

    #[tokio::test]
    async fn abort_signal_on_flag_or_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nginx-chaos.toml");
        std::fs::write(&path, BINDING).unwrap();

        let source = FileEngineSource::new(dir.path());
        assert!(!source.poll_abort_signal("nginx-chaos").await.unwrap());

        std::fs::write(&path, "abort = true\n").unwrap();
        assert!(source.poll_abort_signal("nginx-chaos").await.unwrap());

        std::fs::remove_file(&path).unwrap();
        assert!(source.poll_abort_signal("nginx-chaos").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_path_traversal_binding_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileEngineSource::new(dir.path());
        assert!(source.fetch_run_parameters("../etc/passwd").await.is_err());
        assert!(source.poll_abort_signal(".hidden").await.is_err());
    }
}
