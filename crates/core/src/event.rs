//! 이벤트 레코드 -- 단계 전이를 외부에 알리는 관찰용 기록
//!
//! [`EventDetails`]는 한 번의 발행에만 사용되는 일회성 레코드입니다.
//! 발행할 때마다 [`EventDetails::for_result`] 또는 [`EventDetails::for_engine`]으로
//! 새로 만들며, 의미가 다른 발행 사이에 재사용하지 않습니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{ChaosDetails, ResultDetails, Verdict};

// --- 이벤트 사유 상수 ---

/// 판정 대기 이벤트
pub const REASON_AWAITED: &str = "Awaited";
/// 주입 전 상태 확인 이벤트
pub const REASON_PRE_CHAOS_CHECK: &str = "PreChaosCheck";
/// 주입 후 상태 확인 이벤트
pub const REASON_POST_CHAOS_CHECK: &str = "PostChaosCheck";
/// 통과 판정 이벤트
pub const REASON_PASS: &str = "Pass";
/// 실패 판정 이벤트
pub const REASON_FAIL: &str = "Fail";
/// 중단 판정 이벤트
pub const REASON_STOPPED: &str = "Stopped";
/// 실험 요약 이벤트
pub const REASON_SUMMARY: &str = "Summary";
/// 카오스 주입 이벤트
pub const REASON_CHAOS_INJECT: &str = "ChaosInject";

/// 이벤트 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// 이벤트가 부착되는 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventResource {
    /// 결과 레코드
    ChaosResult,
    /// 엔진 바인딩
    ChaosEngine,
}

impl fmt::Display for EventResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChaosResult => write!(f, "ChaosResult"),
            Self::ChaosEngine => write!(f, "ChaosEngine"),
        }
    }
}

/// 단일 관찰 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetails {
    /// 이벤트 고유 ID
    pub id: String,
    /// 사유 (예: `PreChaosCheck`)
    pub reason: String,
    /// 메시지
    pub message: String,
    /// 심각도
    pub severity: EventSeverity,
    /// 대상 리소스 종류
    pub resource: EventResource,
    /// 대상 리소스 이름
    pub resource_name: String,
    /// 대상 리소스 식별자 (할당된 경우)
    pub resource_uid: Option<String>,
    /// 발생 시각
    pub timestamp: SystemTime,
}

impl EventDetails {
    /// 결과 레코드에 부착되는 이벤트를 생성합니다.
    pub fn for_result(
        reason: impl Into<String>,
        message: impl Into<String>,
        severity: EventSeverity,
        result: &ResultDetails,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reason: reason.into(),
            message: message.into(),
            severity,
            resource: EventResource::ChaosResult,
            resource_name: result.name.clone(),
            resource_uid: result.uid().map(str::to_owned),
            timestamp: SystemTime::now(),
        }
    }

    /// 엔진 바인딩에 부착되는 이벤트를 생성합니다.
    ///
    /// 엔진 바인딩이 없는 실행에서는 실험 이름을 리소스 이름으로 사용합니다.
    pub fn for_engine(
        reason: impl Into<String>,
        message: impl Into<String>,
        severity: EventSeverity,
        chaos: &ChaosDetails,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reason: reason.into(),
            message: message.into(),
            severity,
            resource: EventResource::ChaosEngine,
            resource_name: chaos
                .engine_name
                .clone()
                .unwrap_or_else(|| chaos.experiment_name.clone()),
            resource_uid: None,
            timestamp: SystemTime::now(),
        }
    }
}

impl fmt::Display for EventDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} {}: {}",
            self.severity, self.resource, self.resource_name, self.reason, self.message,
        )
    }
}

/// 판정에 대응하는 결과 이벤트 사유와 심각도를 반환합니다.
pub fn verdict_event(verdict: Verdict) -> (&'static str, EventSeverity) {
    match verdict {
        Verdict::Passed => (REASON_PASS, EventSeverity::Normal),
        Verdict::Stopped => (REASON_STOPPED, EventSeverity::Warning),
        Verdict::Failed => (REASON_FAIL, EventSeverity::Warning),
        Verdict::Awaited => (REASON_AWAITED, EventSeverity::Normal),
    }
}

/// 결과 이벤트 메시지를 생성합니다 (`experiment: <name>, Result: <verdict>`).
pub fn verdict_message(experiment_name: &str, verdict: Verdict) -> String {
    format!("experiment: {experiment_name}, Result: {verdict}")
}

/// 엔진 요약 이벤트 메시지를 생성합니다 (`<name> experiment has been <verdict>`).
pub fn summary_message(experiment_name: &str, verdict: Verdict) -> String {
    format!(
        "{experiment_name} experiment has been {}",
        verdict.as_lowercase()
    )
}

/// 상태 확인 이벤트 메시지를 생성합니다.
///
/// - 기본 확인 수행 + 프로브 없음: `default_msg`
/// - 기본 확인 수행 + 프로브 결과: `default_msg, Probes: <status>`
/// - 기본 확인 미수행 + 프로브 없음: `Skipped the default checks`
/// - 기본 확인 미수행 + 프로브 결과: `Probes: <status>`
pub fn status_message(default_check: bool, default_msg: &str, probe_status: Option<&str>) -> String {
    match (default_check, probe_status) {
        (true, None) => default_msg.to_owned(),
        (true, Some(status)) => format!("{default_msg}, Probes: {status}"),
        (false, None) => "Skipped the default checks".to_owned(),
        (false, Some(status)) => format!("Probes: {status}"),
    }
}
