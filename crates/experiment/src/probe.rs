//! 프로브 실행 -- 주입 전후 검증 프로브
//!
//! [`ProbeRunner`]는 한 시점(`PreChaos`/`PostChaos`)에 설정된 프로브를 실행하고
//! 각 프로브의 결과를 실행 순서대로 반환합니다. 판정 실패는 `passed = false`인
//! [`ProbeOutcome`]으로 보고하며, `Err`는 러너 자체가 동작할 수 없을 때만 반환합니다.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

use chaosrun_core::metrics as m;
use chaosrun_core::types::{ProbeCheck, ProbeOutcome, ProbePhase, ProbeSpec, TargetDescriptor};

use crate::error::ExperimentError;

/// 프로브 실행기
pub trait ProbeRunner: Send + Sync + 'static {
    /// 주어진 시점의 프로브를 순서대로 실행합니다.
    fn run_probes(
        &self,
        target: &TargetDescriptor,
        phase: ProbePhase,
        probes: &[ProbeSpec],
    ) -> impl Future<Output = Result<Vec<ProbeOutcome>, ExperimentError>> + Send;
}

/// 명령 실행 기반 프로브 실행기
///
/// 프로브 명령에는 `CHAOSRUN_TARGET_LABEL`과 `CHAOSRUN_PROBE_PHASE`
/// 환경변수가 전달됩니다.
#[derive(Debug, Default, Clone)]
pub struct CommandProbeRunner;

impl CommandProbeRunner {
    /// 새 실행기를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    async fn run_one(
        &self,
        target: &TargetDescriptor,
        phase: ProbePhase,
        probe: &ProbeSpec,
    ) -> ProbeOutcome {
        let ProbeCheck::Command {
            command,
            args,
            expected_exit_code,
            stdout_contains,
            timeout_secs,
        } = &probe.check;

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .env("CHAOSRUN_TARGET_LABEL", &target.app_label)
            .env("CHAOSRUN_PROBE_PHASE", phase.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(*timeout_secs);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ProbeOutcome::failed(
                    &probe.name,
                    phase,
                    format!("failed to spawn '{command}': {e}"),
                );
            }
            Err(_elapsed) => {
                return ProbeOutcome::failed(
                    &probe.name,
                    phase,
                    format!("timed out after {timeout_secs}s"),
                );
            }
        };

        let code = output.status.code();
        if code != Some(*expected_exit_code) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ProbeOutcome::failed(
                &probe.name,
                phase,
                format!(
                    "exit code {} (expected {expected_exit_code}): {}",
                    code.map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                    stderr.trim()
                ),
            );
        }

        if let Some(needle) = stdout_contains {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.contains(needle.as_str()) {
                return ProbeOutcome::failed(
                    &probe.name,
                    phase,
                    format!("stdout does not contain '{needle}'"),
                );
            }
        }

        ProbeOutcome::passed(&probe.name, phase)
    }
}

impl ProbeRunner for CommandProbeRunner {
    async fn run_probes(
        &self,
        target: &TargetDescriptor,
        phase: ProbePhase,
        probes: &[ProbeSpec],
    ) -> Result<Vec<ProbeOutcome>, ExperimentError> {
        let mut outcomes = Vec::with_capacity(probes.len());
        for probe in probes {
            let outcome = self.run_one(target, phase, probe).await;
            if outcome.passed {
                debug!(probe = %probe.name, %phase, "probe passed");
            } else {
                warn!(
                    probe = %probe.name,
                    %phase,
                    detail = outcome.detail.as_deref().unwrap_or_default(),
                    "probe failed"
                );
                metrics::counter!(m::PROBE_FAILURES_TOTAL, m::LABEL_PROBE_PHASE => phase.to_string())
                    .increment(1);
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// 첫 번째 실패한 프로브를 [`ExperimentError::ProbeFailed`]로 변환합니다.
pub fn first_failure(outcomes: &[ProbeOutcome]) -> Option<ExperimentError> {
    outcomes.iter().find(|o| !o.passed).map(|o| ExperimentError::ProbeFailed {
        phase: o.phase,
        probe: o.probe_name.clone(),
        reason: o.detail.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosrun_core::types::ProbeMode;

    fn command_probe(name: &str, command: &str, args: &[&str]) -> ProbeSpec {
        ProbeSpec {
            name: name.to_owned(),
            mode: ProbeMode::Edge,
            check: ProbeCheck::Command {
                command: command.to_owned(),
                args: args.iter().map(|a| (*a).to_owned()).collect(),
                expected_exit_code: 0,
                stdout_contains: None,
                timeout_secs: 5,
            },
        }
    }

    #[test]
    fn first_failure_picks_earliest_failed() {
        let outcomes = vec![
            ProbeOutcome::passed("a", ProbePhase::PreChaos),
            ProbeOutcome::failed("b", ProbePhase::PreChaos, "exit 1"),
            ProbeOutcome::failed("c", ProbePhase::PreChaos, "exit 2"),
        ];
        match first_failure(&outcomes) {
            Some(ExperimentError::ProbeFailed { probe, reason, .. }) => {
                assert_eq!(probe, "b");
                assert_eq!(reason, "exit 1");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(first_failure(&outcomes[..1]).is_none());
    }

    #[tokio::test]
    async fn empty_probe_set_yields_no_outcomes() {
        let runner = CommandProbeRunner::new();
        let outcomes = runner
            .run_probes(&TargetDescriptor::default(), ProbePhase::PreChaos, &[])
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_pass_and_fail() {
        let runner = CommandProbeRunner::new();
        let probes = vec![
            command_probe("ok", "true", &[]),
            command_probe("bad", "false", &[]),
        ];
        let outcomes = runner
            .run_probes(&TargetDescriptor::default(), ProbePhase::PostChaos, &probes)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
        assert_eq!(outcomes[1].phase, ProbePhase::PostChaos);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_checks_stdout() {
        let runner = CommandProbeRunner::new();
        let mut probe = command_probe("echo", "echo", &["ready"]);
        let ProbeCheck::Command {
            stdout_contains, ..
        } = &mut probe.check;
        *stdout_contains = Some("ready".to_owned());
        let outcomes = runner
            .run_probes(&TargetDescriptor::default(), ProbePhase::PreChaos, &[probe.clone()])
            .await
            .unwrap();
        assert!(outcomes[0].passed);

        let ProbeCheck::Command {
            stdout_contains, ..
        } = &mut probe.check;
        *stdout_contains = Some("not-there".to_owned());
        let outcomes = runner
            .run_probes(&TargetDescriptor::default(), ProbePhase::PreChaos, &[probe])
            .await
            .unwrap();
        assert!(!outcomes[0].passed);
    }

    #[tokio::test]
    async fn missing_command_fails_probe() {
        let runner = CommandProbeRunner::new();
        let probes = vec![command_probe(
            "missing",
            "/nonexistent/chaosrun-probe-binary",
            &[],
        )];
        let outcomes = runner
            .run_probes(&TargetDescriptor::default(), ProbePhase::PreChaos, &probes)
            .await
            .unwrap();
        assert!(!outcomes[0].passed);
        assert!(outcomes[0].detail.as_deref().unwrap().contains("failed to spawn"));
    }
}
