//! 도메인 타입 -- 실험 실행 전반에서 사용되는 공통 타입
//!
//! 실험 설정([`ExperimentDetails`]), 실행 컨텍스트([`ChaosDetails`]),
//! 결과 레코드([`ResultDetails`])와 이들을 구성하는 열거형을 정의합니다.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// 실험 판정
///
/// `Awaited`에서 시작하여 종료 값(`Passed`, `Failed`, `Stopped`) 중 하나로
/// 정확히 한 번 전이합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// 판정 대기 중
    #[default]
    Awaited,
    /// 통과
    Passed,
    /// 실패
    Failed,
    /// 외부 중단
    Stopped,
}

impl Verdict {
    /// 종료 판정인지 여부를 반환합니다.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Awaited)
    }

    /// 요약 메시지에 사용하는 소문자 표기를 반환합니다.
    pub fn as_lowercase(self) -> &'static str {
        match self {
            Self::Awaited => "awaited",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Awaited => write!(f, "Awaited"),
            Self::Passed => write!(f, "Passed"),
            Self::Failed => write!(f, "Failed"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// 실행 단계
///
/// `Init → PreChaosCheck → Inject → PostChaosCheck → Done` 순서로만 진행합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    #[default]
    Init,
    PreChaosCheck,
    Inject,
    PostChaosCheck,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::PreChaosCheck => write!(f, "pre-chaos-check"),
            Self::Inject => write!(f, "inject"),
            Self::PostChaosCheck => write!(f, "post-chaos-check"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// 프로브 실행 시점
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbePhase {
    PreChaos,
    PostChaos,
}

impl fmt::Display for ProbePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreChaos => write!(f, "PreChaos"),
            Self::PostChaos => write!(f, "PostChaos"),
        }
    }
}

/// 프로브 모드 -- 어느 시점에 프로브를 실행할지 결정합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMode {
    /// 카오스 주입 전 (start of test)
    #[serde(rename = "SOT")]
    StartOfTest,
    /// 카오스 주입 후 (end of test)
    #[serde(rename = "EOT")]
    EndOfTest,
    /// 주입 전후 모두
    Edge,
}

impl ProbeMode {
    /// 주어진 시점에 이 모드의 프로브를 실행해야 하는지 반환합니다.
    pub fn runs_in(self, phase: ProbePhase) -> bool {
        match self {
            Self::StartOfTest => phase == ProbePhase::PreChaos,
            Self::EndOfTest => phase == ProbePhase::PostChaos,
            Self::Edge => true,
        }
    }
}

/// 프로브 검사 방식
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeCheck {
    /// 명령을 실행하고 종료 코드와 출력을 검사합니다.
    Command {
        /// 실행할 프로그램
        command: String,
        /// 프로그램 인자
        #[serde(default)]
        args: Vec<String>,
        /// 기대 종료 코드
        #[serde(default)]
        expected_exit_code: i32,
        /// 표준 출력에 포함되어야 하는 문자열
        #[serde(default)]
        stdout_contains: Option<String>,
        /// 실행 제한 시간 (초)
        #[serde(default = "default_probe_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_probe_timeout_secs() -> u64 {
    10
}

/// 프로브 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// 프로브 이름
    pub name: String,
    /// 실행 모드
    pub mode: ProbeMode,
    /// 검사 방식
    pub check: ProbeCheck,
}

/// 단일 프로브 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// 프로브 이름
    pub probe_name: String,
    /// 실행 시점
    pub phase: ProbePhase,
    /// 통과 여부
    pub passed: bool,
    /// 진단 정보
    pub detail: Option<String>,
}

impl ProbeOutcome {
    /// 통과한 프로브 결과를 생성합니다.
    pub fn passed(probe_name: impl Into<String>, phase: ProbePhase) -> Self {
        Self {
            probe_name: probe_name.into(),
            phase,
            passed: true,
            detail: None,
        }
    }

    /// 실패한 프로브 결과를 생성합니다.
    pub fn failed(
        probe_name: impl Into<String>,
        phase: ProbePhase,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            probe_name: probe_name.into(),
            phase,
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// 카오스 대상 기술자
///
/// `app_label`(`key=value`)로 대상 집합을 선택하고,
/// `names`가 비어 있지 않으면 해당 이름으로 대상을 한정합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// 대상 선택 레이블 (예: `app=nginx`)
    #[serde(default)]
    pub app_label: String,
    /// 명시적 대상 이름 목록
    #[serde(default)]
    pub names: Vec<String>,
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.names.is_empty() {
            write!(f, "label={}", self.app_label)
        } else {
            write!(f, "label={} names={}", self.app_label, self.names.join(","))
        }
    }
}

/// 다수 대상에 대한 주입 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sequence {
    /// 한 번에 하나씩
    #[default]
    Serial,
    /// 한 번에 모두
    Parallel,
}

impl FromStr for Sequence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown sequence '{other}', expected serial or parallel")),
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// 실험 정적 설정
///
/// 초기화 이후 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct ExperimentDetails {
    /// 실험 이름 (예: `pod-delete`)
    pub experiment_name: String,
    /// 엔진 바인딩 이름 (없으면 단독 실행)
    pub engine_name: Option<String>,
    /// 카오스 유지 시간
    pub chaos_duration: Duration,
    /// 반복 주입 간격
    pub chaos_interval: Duration,
    /// 주입 전후 대기 시간
    pub ramp_time: Duration,
    /// 기본 상태 확인 수행 여부
    pub default_health_check: bool,
    /// 강제 종료 여부 (false면 graceful stop)
    pub force: bool,
    /// 다수 대상 주입 순서
    pub sequence: Sequence,
    /// 영향받는 대상 비율 (0이면 1개)
    pub pods_affected_perc: u32,
    /// 설정 파일에서 지정한 대상
    pub target: TargetDescriptor,
}

impl ExperimentDetails {
    /// 엔진 바인딩이 설정되어 있는지 반환합니다.
    pub fn has_engine(&self) -> bool {
        self.engine_name.is_some()
    }

    /// 결과 레코드 이름을 반환합니다 (`<engine>-<experiment>`).
    pub fn result_name(&self) -> String {
        match &self.engine_name {
            Some(engine) => format!("{engine}-{}", self.experiment_name),
            None => self.experiment_name.clone(),
        }
    }
}

/// 실행 컨텍스트
///
/// 라이프사이클 컨트롤러가 단독으로 소유하며, 중단 감시자는 스냅샷만 관찰합니다.
#[derive(Debug, Clone)]
pub struct ChaosDetails {
    /// 실험 이름
    pub experiment_name: String,
    /// 엔진 바인딩 이름
    pub engine_name: Option<String>,
    /// 현재 단계
    phase: Phase,
    /// 대상 기술자
    pub target: TargetDescriptor,
    /// 기본 상태 확인 적용 여부
    pub default_health_check: bool,
    /// 이번 실행에 설정된 프로브 목록
    pub probes: Vec<ProbeSpec>,
}

impl ChaosDetails {
    /// 실험 설정에서 실행 컨텍스트를 초기화합니다.
    pub fn new(details: &ExperimentDetails) -> Self {
        Self {
            experiment_name: details.experiment_name.clone(),
            engine_name: details.engine_name.clone(),
            phase: Phase::Init,
            target: details.target.clone(),
            default_health_check: details.default_health_check,
            probes: Vec::new(),
        }
    }

    /// 현재 단계를 반환합니다.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 다음 단계로 진행합니다.
    ///
    /// 이전 단계로의 전이는 무시하고 `false`를 반환합니다.
    pub fn advance(&mut self, next: Phase) -> bool {
        if next < self.phase {
            return false;
        }
        self.phase = next;
        true
    }

    /// 주어진 시점에 실행할 프로브 목록을 반환합니다.
    pub fn probes_for(&self, phase: ProbePhase) -> Vec<ProbeSpec> {
        self.probes
            .iter()
            .filter(|p| p.mode.runs_in(phase))
            .cloned()
            .collect()
    }
}

/// 결과 레코드 단계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultPhase {
    /// 실행 중
    #[default]
    Running,
    /// 완료됨
    Completed,
    /// 중단됨
    Stopped,
}

impl fmt::Display for ResultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// 실험 결과 레코드
///
/// 실행당 정확히 하나 존재하며, 식별자는 한 번 할당되면 바뀌지 않습니다.
/// `verdict`는 확정된 판정만 담고, 주입 성공 후의 잠정 판정은
/// `tentative_verdict`에 따로 보관합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDetails {
    /// 레코드 이름
    pub name: String,
    /// 고유 식별자
    uid: Option<String>,
    /// 확정 판정
    pub verdict: Verdict,
    /// 잠정 판정
    pub tentative_verdict: Option<Verdict>,
    /// 레코드 단계
    pub phase: ResultPhase,
    /// 프로브 결과 (실행 순서)
    pub probe_outcomes: Vec<ProbeOutcome>,
    /// 실패한 단계 설명
    pub fail_step: Option<String>,
    /// 실패 에러 코드
    pub error_code: Option<String>,
    /// 실행 시작 시각
    pub started_at: SystemTime,
    /// 실행 종료 시각
    pub ended_at: Option<SystemTime>,
}

impl ResultDetails {
    /// 새 결과 레코드를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: None,
            verdict: Verdict::Awaited,
            tentative_verdict: None,
            phase: ResultPhase::Running,
            probe_outcomes: Vec::new(),
            fail_step: None,
            error_code: None,
            started_at: SystemTime::now(),
            ended_at: None,
        }
    }

    /// 할당된 식별자를 반환합니다.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// 식별자를 할당합니다. 이미 할당되어 있으면 `false`를 반환하고 변경하지 않습니다.
    pub fn set_uid(&mut self, uid: impl Into<String>) -> bool {
        if self.uid.is_some() {
            return false;
        }
        self.uid = Some(uid.into());
        true
    }

    /// 종료 판정이 확정되었는지 반환합니다.
    pub fn is_terminal(&self) -> bool {
        self.verdict.is_terminal()
    }

    /// 프로브 성공률(%)을 반환합니다. 실행된 프로브가 없으면 `None`.
    pub fn probe_success_percentage(&self) -> Option<u8> {
        let total = self.probe_outcomes.len();
        if total == 0 {
            return None;
        }
        let passed = self.probe_outcomes.iter().filter(|o| o.passed).count();
        u8::try_from(passed * 100 / total).ok()
    }
}
