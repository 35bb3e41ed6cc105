//! 메트릭 상수 및 설명 등록
//!
//! 실험 실행 관련 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않은 경우 호출은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `chaosrun_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(chaosrun_core::metrics::EXPERIMENT_RUNS_TOTAL,
//!     chaosrun_core::metrics::LABEL_VERDICT => "passed").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 판정 레이블 키 (passed, failed, stopped)
pub const LABEL_VERDICT: &str = "verdict";

/// 프로브 시점 레이블 키 (PreChaos, PostChaos)
pub const LABEL_PROBE_PHASE: &str = "phase";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 실험 메트릭 ───────────────────────────────────────────────────

/// 종료 판정별 실험 실행 수 (counter, label: verdict)
pub const EXPERIMENT_RUNS_TOTAL: &str = "chaosrun_experiment_runs_total";

/// 실험 실행 소요 시간 (histogram, 초)
pub const EXPERIMENT_DURATION_SECONDS: &str = "chaosrun_experiment_duration_seconds";

/// 카오스 주입 시도 수 (counter, label: result)
pub const INJECTIONS_TOTAL: &str = "chaosrun_injections_total";

/// 종료된 대상 수 (counter)
pub const TARGETS_KILLED_TOTAL: &str = "chaosrun_targets_killed_total";

/// 실패한 프로브 수 (counter, label: phase)
pub const PROBE_FAILURES_TOTAL: &str = "chaosrun_probe_failures_total";

/// 결과 저장 실패 수 (counter)
pub const RESULT_PERSIST_FAILURES_TOTAL: &str = "chaosrun_result_persist_failures_total";

/// 발행 실패한 이벤트 수 (counter)
pub const EVENT_EMIT_FAILURES_TOTAL: &str = "chaosrun_event_emit_failures_total";

/// 모든 메트릭 이름 목록
pub const ALL_METRIC_NAMES: [&str; 7] = [
    EXPERIMENT_RUNS_TOTAL,
    EXPERIMENT_DURATION_SECONDS,
    INJECTIONS_TOTAL,
    TARGETS_KILLED_TOTAL,
    PROBE_FAILURES_TOTAL,
    RESULT_PERSIST_FAILURES_TOTAL,
    EVENT_EMIT_FAILURES_TOTAL,
];

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        EXPERIMENT_RUNS_TOTAL,
        "Total number of experiment runs by terminal verdict"
    );
    describe_histogram!(
        EXPERIMENT_DURATION_SECONDS,
        "Wall-clock duration of an experiment run in seconds"
    );
    describe_counter!(
        INJECTIONS_TOTAL,
        "Total number of chaos injection attempts"
    );
    describe_counter!(
        TARGETS_KILLED_TOTAL,
        "Total number of target instances terminated"
    );
    describe_counter!(
        PROBE_FAILURES_TOTAL,
        "Total number of failed verification probes"
    );
    describe_counter!(
        RESULT_PERSIST_FAILURES_TOTAL,
        "Total number of failed result record writes"
    );
    describe_counter!(
        EVENT_EMIT_FAILURES_TOTAL,
        "Total number of events that could not be emitted"
    );
}
