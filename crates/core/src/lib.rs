//! chaosrun 공통 크레이트
//!
//! 실험 실행에 필요한 에러, 설정, 도메인 타입, 이벤트 레코드,
//! 메트릭 이름을 정의합니다. 실행 로직은 `chaosrun-experiment`에 있습니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ChaosrunError, ConfigError, RunError, StorageError};

// 설정
pub use config::ChaosrunConfig;

// 이벤트
pub use event::{EventDetails, EventResource, EventSeverity};

// 도메인 타입
pub use types::{
    ChaosDetails, ExperimentDetails, Phase, ProbeCheck, ProbeMode, ProbeOutcome, ProbePhase,
    ProbeSpec, ResultDetails, ResultPhase, Sequence, TargetDescriptor, Verdict,
};
