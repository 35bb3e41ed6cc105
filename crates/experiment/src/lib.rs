#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`error`]: 도메인 에러 타입 (`ExperimentError`)
//! - [`config`]: 실행 설정 (`LifecycleConfig`, 빌더)
//! - [`docker`]: Docker API 추상화 (`DockerClient` trait, `BollardDockerClient`)
//! - [`engine`]: 엔진 바인딩 (`EngineSource` trait, `FileEngineSource`)
//! - [`health`]: 대상 상태 확인 (`HealthChecker` trait, `DockerHealthChecker`)
//! - [`probe`]: 프로브 실행 (`ProbeRunner` trait, `CommandProbeRunner`)
//! - [`inject`]: 장애 주입 (`Injector` trait, `ContainerKillInjector`)
//! - [`recorder`]: 결과 기록 (`ResultRecorder`, `ResultStore` trait)
//! - [`publisher`]: 이벤트 발행 (`EventPublisher`, `EventSink` trait)
//! - [`abort`]: 중단 감시자 (`AbortWatcher`)
//! - [`lifecycle`]: 메인 오케스트레이터 (`LifecycleController`, `LifecycleControllerBuilder`)
//!
//! # 아키텍처
//!
//! ```text
//! LifecycleController ── watch<ChaosDetails> ──> AbortWatcher
//!        |                                           |
//!   pre-chaos check                        abort flag / signal
//!   inject                                           |
//!   post-chaos check                                 |
//!        |                                           |
//!        └────────> ResultRecorder <─────────────────┘
//!                (finalize_if_not_terminal)
//!                        |
//!                   ResultStore
//! ```

pub mod abort;
pub mod config;
pub mod docker;
pub mod engine;
pub mod error;
pub mod health;
pub mod inject;
pub mod lifecycle;
pub mod probe;
pub mod publisher;
pub mod recorder;

// --- Public API Re-exports ---

// Lifecycle (main orchestrator)
pub use lifecycle::{LifecycleController, LifecycleControllerBuilder};

// Configuration
pub use config::{LifecycleConfig, LifecycleConfigBuilder, experiment_details};

// Error
pub use error::ExperimentError;

// Docker API
pub use docker::{BollardDockerClient, DockerClient, TargetContainer};

// Collaborators
pub use engine::{EngineSource, FileEngineSource, RunParameters};
pub use health::{DockerHealthChecker, HealthChecker};
pub use inject::{ContainerKillInjector, InjectionReport, Injector, InjectorSettings};
pub use probe::{CommandProbeRunner, ProbeRunner};

// Result & events
pub use publisher::{EventPublisher, EventSink, JsonLinesEventSink, TracingEventSink};
pub use recorder::{
    FileResultStore, FinalizeOutcome, MemoryResultStore, RecordTag, ResultRecord, ResultRecorder,
    ResultStore,
};

// Abort watcher
pub use abort::{AbortWatcher, AbortWatcherHandle, WatcherExit};
