//! 라이프사이클 컨트롤러 -- 실험 한 번의 전체 단계 진행
//!
//! [`LifecycleController`]는 주입 전 확인, 장애 주입, 주입 후 확인, 결과 확정을
//! 순서대로 진행하며, 어느 단계가 실패하더라도 정확히 하나의 종료 판정을 남깁니다.
//!
//! # 실행 순서
//! ```text
//!  1. setup            엔진 바인딩에서 프로브/대상 조회 (실패 시 레코드 없이 종료)
//!  2. upsert(SOT)      결과 레코드 생성
//!  3. identifier       결과 식별자 할당
//!  4. Awaited 이벤트
//!  5. AbortWatcher 시작
//!  6. pre-chaos        상태 확인 -> 프로브 -> 상태 이벤트
//!  7. inject           Phase = Inject, 장애 주입
//!  8. tentative Pass   Phase = PostChaosCheck
//!  9. post-chaos       상태 확인 -> 프로브 -> 상태 이벤트
//! 10. complete(EOT)    종료 판정 확정
//! 11. 판정 이벤트 + (엔진 바인딩이 있으면) 요약 이벤트
//! ```
//!
//! 2단계 이후의 실패는 모두 실패 확정 경로로 모이며, 중단 감시자와 같은
//! "종료되지 않았으면 설정 후 저장" 연산을 사용하므로 먼저 기록한 쪽이 이깁니다.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use chaosrun_core::event::{
    EventDetails, EventSeverity, REASON_AWAITED, REASON_CHAOS_INJECT, REASON_POST_CHAOS_CHECK,
    REASON_PRE_CHAOS_CHECK, REASON_SUMMARY, status_message, summary_message, verdict_event,
    verdict_message,
};
use chaosrun_core::types::{ChaosDetails, ExperimentDetails, Phase, ProbePhase, Verdict};

use crate::abort::AbortWatcher;
use crate::config::LifecycleConfig;
use crate::engine::EngineSource;
use crate::error::ExperimentError;
use crate::health::HealthChecker;
use crate::inject::Injector;
use crate::probe::{ProbeRunner, first_failure};
use crate::publisher::{EventPublisher, EventSink};
use crate::recorder::{FinalizeOutcome, RecordTag, ResultRecorder, ResultStore};

const STEP_CREATE_RESULT: &str = "Failed to create the chaos result (SOT)";
const STEP_ASSIGN_IDENTIFIER: &str = "Failed to assign the chaos result identifier";
const STEP_INJECT: &str = "Failed inside the chaos injection";
const STEP_UPDATE_RESULT: &str = "Failed to update the chaos result (EOT)";

const AUT_RUNNING: &str = "AUT: Running";
const AUT_NOT_RUNNING: &str = "AUT: Not Running";
const PROBES_SUCCESSFUL: &str = "Successful";
const PROBES_UNSUCCESSFUL: &str = "Unsuccessful";

fn phase_label(phase: ProbePhase) -> &'static str {
    match phase {
        ProbePhase::PreChaos => "pre-chaos",
        ProbePhase::PostChaos => "post-chaos",
    }
}

fn check_reason(phase: ProbePhase) -> &'static str {
    match phase {
        ProbePhase::PreChaos => REASON_PRE_CHAOS_CHECK,
        ProbePhase::PostChaos => REASON_POST_CHAOS_CHECK,
    }
}

/// 실패한 단계와 원인
struct StepFailure {
    error: ExperimentError,
    step: String,
}

impl StepFailure {
    fn new(error: ExperimentError, step: impl Into<String>) -> Self {
        Self {
            error,
            step: step.into(),
        }
    }
}

/// 실험 라이프사이클 컨트롤러
///
/// # 사용 예시
/// ```ignore
/// let controller = LifecycleControllerBuilder::new()
///     .config(config)
///     .details(details)
///     .engine_source(engine)
///     .health_checker(health)
///     .probe_runner(probes)
///     .injector(injector)
///     .result_store(store)
///     .event_sink(sink)
///     .build()?;
///
/// let verdict = controller.run().await?;
/// ```
pub struct LifecycleController<E, H, P, I, S, K>
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    config: LifecycleConfig,
    details: ExperimentDetails,
    engine: Arc<E>,
    health: Arc<H>,
    probes: Arc<P>,
    injector: Arc<I>,
    recorder: Arc<ResultRecorder<S>>,
    publisher: Arc<EventPublisher<K>>,
    /// 러너가 전달한 종료 신호
    signal: CancellationToken,
    /// 중단 감시자가 `Stopped`를 확정하면 취소됨
    aborted: CancellationToken,
}

impl<E, H, P, I, S, K> LifecycleController<E, H, P, I, S, K>
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    /// 실험 설정을 반환합니다.
    pub fn details(&self) -> &ExperimentDetails {
        &self.details
    }

    /// 결과 기록기를 반환합니다.
    pub fn recorder(&self) -> &Arc<ResultRecorder<S>> {
        &self.recorder
    }

    /// 중단 확정 시 취소되는 토큰을 반환합니다.
    pub fn aborted_token(&self) -> CancellationToken {
        self.aborted.clone()
    }

    /// 실험을 한 번 실행합니다.
    ///
    /// 모든 결과는 결과 레코드와 이벤트로 외부에 남습니다. 반환값은 실행이 끝난
    /// 시점의 판정이며, `Err`는 결과 레코드가 만들어지기 전의 준비 단계 실패뿐입니다.
    pub async fn run(&self) -> Result<Verdict, ExperimentError> {
        let span = info_span!(
            "experiment",
            name = %self.details.experiment_name,
            engine = self.details.engine_name.as_deref().unwrap_or("-"),
            uid = tracing::field::Empty,
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<Verdict, ExperimentError> {
        info!(target = %self.details.target, "experiment run started");

        let chaos = self.prepare().await.inspect_err(|e| {
            error!(error = %e, "setup failed before the result record was created");
        })?;
        let (chaos_tx, chaos_rx) = watch::channel(chaos);

        if let Err(e) = self.recorder.upsert(RecordTag::Start).await {
            self.fail_run(&chaos_tx, StepFailure::new(e, STEP_CREATE_RESULT))
                .await;
            return Ok(self.finish(&chaos_tx).await);
        }

        match self.recorder.assign_identifier().await {
            Ok(uid) => {
                tracing::Span::current().record("uid", uid.as_str());
            }
            Err(e) => {
                self.fail_run(&chaos_tx, StepFailure::new(e, STEP_ASSIGN_IDENTIFIER))
                    .await;
                return Ok(self.finish(&chaos_tx).await);
            }
        }

        let result = self.recorder.snapshot().await;
        self.publisher
            .emit(EventDetails::for_result(
                REASON_AWAITED,
                verdict_message(&self.details.experiment_name, Verdict::Awaited),
                EventSeverity::Normal,
                &result,
            ))
            .await;

        let watcher = AbortWatcher::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.recorder),
            Arc::clone(&self.publisher),
            chaos_rx,
            self.config.abort_poll_interval(),
            self.signal.clone(),
            self.aborted.clone(),
        )
        .spawn();

        if let Err(failure) = self.run_phases(&chaos_tx).await {
            self.fail_run(&chaos_tx, failure).await;
        }

        let exit = watcher.stop().await;
        debug!(?exit, "abort watcher released");
        Ok(self.finish(&chaos_tx).await)
    }

    /// 실행 컨텍스트를 초기화하고, 엔진 바인딩이 있으면 실행 파라미터를 가져옵니다.
    async fn prepare(&self) -> Result<ChaosDetails, ExperimentError> {
        let mut chaos = ChaosDetails::new(&self.details);
        let Some(binding) = self.details.engine_name.as_deref() else {
            return Ok(chaos);
        };

        let params = self.engine.fetch_run_parameters(binding).await?;
        chaos.probes = params.probes;
        if let Some(target) = params.target {
            if !target.app_label.is_empty() || !target.names.is_empty() {
                chaos.target = target;
            }
        }
        info!(
            binding,
            probes = chaos.probes.len(),
            target = %chaos.target,
            "loaded run parameters from engine binding"
        );
        Ok(chaos)
    }

    /// 확인, 주입, 확인, 확정, 판정 이벤트 순서로 진행합니다.
    ///
    /// 중단 감시자가 먼저 종료 판정을 확정했으면 남은 단계를 건너뜁니다.
    async fn run_phases(&self, chaos: &watch::Sender<ChaosDetails>) -> Result<(), StepFailure> {
        advance(chaos, Phase::PreChaosCheck);
        if self.halted() {
            return Ok(());
        }
        self.verify(chaos, ProbePhase::PreChaos).await?;

        if self.halted() {
            return Ok(());
        }
        advance(chaos, Phase::Inject);
        let snapshot = chaos.borrow().clone();
        if self.details.has_engine() {
            self.publisher
                .emit(EventDetails::for_engine(
                    REASON_CHAOS_INJECT,
                    format!(
                        "Injecting {} chaos on target {}",
                        self.details.experiment_name, snapshot.target
                    ),
                    EventSeverity::Normal,
                    &snapshot,
                ))
                .await;
        }
        let report = self
            .injector
            .inject(&snapshot.target, &self.details)
            .await
            .map_err(|e| StepFailure::new(e, STEP_INJECT))?;
        info!(
            rounds = report.rounds,
            terminated = report.terminated.len(),
            "chaos injected"
        );

        self.recorder.mark_tentative(Verdict::Passed).await;
        advance(chaos, Phase::PostChaosCheck);

        if self.halted() {
            return Ok(());
        }
        self.verify(chaos, ProbePhase::PostChaos).await?;

        match self.recorder.complete().await {
            Ok(FinalizeOutcome::Committed { .. }) => {}
            Ok(FinalizeOutcome::AlreadyTerminal) => {
                debug!("result finalized elsewhere, skipping verdict events");
                return Ok(());
            }
            Err(e) => return Err(StepFailure::new(e, STEP_UPDATE_RESULT)),
        }

        let result = self.recorder.snapshot().await;
        let (reason, severity) = verdict_event(result.verdict);
        self.publisher
            .emit(EventDetails::for_result(
                reason,
                verdict_message(&self.details.experiment_name, result.verdict),
                severity,
                &result,
            ))
            .await;
        if self.details.has_engine() {
            let snapshot = chaos.borrow().clone();
            self.publisher
                .emit(EventDetails::for_engine(
                    REASON_SUMMARY,
                    summary_message(&self.details.experiment_name, result.verdict),
                    severity,
                    &snapshot,
                ))
                .await;
        }
        Ok(())
    }

    /// 한 시점의 상태 확인과 프로브를 수행합니다.
    ///
    /// 상태 확인이 프로브보다 먼저이며, 프로브는 하나 이상 설정된 경우에만 실행합니다.
    async fn verify(
        &self,
        chaos: &watch::Sender<ChaosDetails>,
        phase: ProbePhase,
    ) -> Result<(), StepFailure> {
        let snapshot = chaos.borrow().clone();
        let label = phase_label(phase);
        let reason = check_reason(phase);

        if snapshot.default_health_check {
            if let Err(e) = self.health.check_health(&snapshot.target).await {
                self.publisher
                    .emit(EventDetails::for_engine(
                        reason,
                        AUT_NOT_RUNNING,
                        EventSeverity::Warning,
                        &snapshot,
                    ))
                    .await;
                return Err(StepFailure::new(
                    e,
                    format!(
                        "[{label}]: Failed to verify that the AUT (Application Under Test) is in running state"
                    ),
                ));
            }
            info!(phase = label, "target is healthy");
        }

        let probes = snapshot.probes_for(phase);
        let mut probe_status = None;
        if !probes.is_empty() {
            let probe_step = format!("[{label}]: Failed while running probes");
            let failed_message = status_message(
                snapshot.default_health_check,
                AUT_RUNNING,
                Some(PROBES_UNSUCCESSFUL),
            );

            let outcomes = match self.probes.run_probes(&snapshot.target, phase, &probes).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    self.emit_check(reason, &failed_message, EventSeverity::Warning, &snapshot)
                        .await;
                    return Err(StepFailure::new(e, probe_step));
                }
            };
            self.recorder.record_probe_outcomes(&outcomes).await;

            if let Some(e) = first_failure(&outcomes) {
                self.emit_check(reason, &failed_message, EventSeverity::Warning, &snapshot)
                    .await;
                return Err(StepFailure::new(e, probe_step));
            }
            info!(phase = label, probes = outcomes.len(), "probes passed");
            probe_status = Some(PROBES_SUCCESSFUL);
        }

        let message = status_message(snapshot.default_health_check, AUT_RUNNING, probe_status);
        self.emit_check(reason, &message, EventSeverity::Normal, &snapshot)
            .await;
        Ok(())
    }

    async fn emit_check(
        &self,
        reason: &str,
        message: &str,
        severity: EventSeverity,
        chaos: &ChaosDetails,
    ) {
        self.publisher
            .emit(EventDetails::for_engine(reason, message, severity, chaos))
            .await;
    }

    /// 실패 확정 경로
    ///
    /// 종료되지 않았으면 `Failed`로 확정하고 저장한 뒤 실패 이벤트를 발행합니다.
    /// 이미 종료 판정이 있으면 아무것도 하지 않습니다.
    async fn fail_run(&self, chaos: &watch::Sender<ChaosDetails>, failure: StepFailure) {
        let code = failure.error.failure_code();
        error!(
            step = %failure.step,
            code,
            error = %failure.error,
            "experiment step failed"
        );

        let outcome = self
            .recorder
            .finalize_if_not_terminal(Verdict::Failed, &failure.step, Some(code))
            .await;
        if outcome == FinalizeOutcome::AlreadyTerminal {
            debug!("result already terminal, failure not recorded");
            return;
        }

        let result = self.recorder.snapshot().await;
        let (reason, severity) = verdict_event(Verdict::Failed);
        self.publisher
            .emit(EventDetails::for_result(
                reason,
                verdict_message(&self.details.experiment_name, Verdict::Failed),
                severity,
                &result,
            ))
            .await;
        if self.details.has_engine() {
            let snapshot = chaos.borrow().clone();
            self.publisher
                .emit(EventDetails::for_engine(
                    REASON_SUMMARY,
                    summary_message(&self.details.experiment_name, Verdict::Failed),
                    EventSeverity::Warning,
                    &snapshot,
                ))
                .await;
        }
    }

    fn halted(&self) -> bool {
        let halted = self.recorder.is_terminal();
        if halted {
            debug!("result already terminal, skipping remaining steps");
        }
        halted
    }

    async fn finish(&self, chaos: &watch::Sender<ChaosDetails>) -> Verdict {
        advance(chaos, Phase::Done);
        let verdict = self.recorder.verdict().await;
        info!(%verdict, "experiment run finished");
        verdict
    }
}

fn advance(chaos: &watch::Sender<ChaosDetails>, next: Phase) {
    chaos.send_modify(|c| {
        if !c.advance(next) {
            debug!(current = %c.phase(), requested = %next, "phase regression ignored");
        }
    });
}

/// 라이프사이클 컨트롤러 빌더
pub struct LifecycleControllerBuilder<E, H, P, I, S, K>
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    config: LifecycleConfig,
    details: Option<ExperimentDetails>,
    engine: Option<Arc<E>>,
    health: Option<Arc<H>>,
    probes: Option<Arc<P>>,
    injector: Option<Arc<I>>,
    store: Option<Arc<S>>,
    sink: Option<Arc<K>>,
    signal: CancellationToken,
}

impl<E, H, P, I, S, K> LifecycleControllerBuilder<E, H, P, I, S, K>
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: LifecycleConfig::default(),
            details: None,
            engine: None,
            health: None,
            probes: None,
            injector: None,
            store: None,
            sink: None,
            signal: CancellationToken::new(),
        }
    }

    /// 실행 설정을 지정합니다.
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// 실험 설정을 지정합니다.
    pub fn details(mut self, details: ExperimentDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// 엔진 바인딩 소스를 설정합니다.
    pub fn engine_source(mut self, engine: Arc<E>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 상태 확인기를 설정합니다.
    pub fn health_checker(mut self, health: Arc<H>) -> Self {
        self.health = Some(health);
        self
    }

    /// 프로브 실행기를 설정합니다.
    pub fn probe_runner(mut self, probes: Arc<P>) -> Self {
        self.probes = Some(probes);
        self
    }

    /// 주입기를 설정합니다.
    pub fn injector(mut self, injector: Arc<I>) -> Self {
        self.injector = Some(injector);
        self
    }

    /// 결과 저장소를 설정합니다.
    pub fn result_store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 이벤트 싱크를 설정합니다.
    pub fn event_sink(mut self, sink: Arc<K>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 외부 종료 신호 토큰을 설정합니다 (SIGINT/SIGTERM 등).
    pub fn termination_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    /// 컨트롤러를 빌드합니다.
    pub fn build(self) -> Result<LifecycleController<E, H, P, I, S, K>, ExperimentError> {
        self.config.validate()?;

        let details = required(self.details, "details")?;
        let store = required(self.store, "result_store")?;
        let sink = required(self.sink, "event_sink")?;

        let recorder = Arc::new(ResultRecorder::new(
            store,
            &details,
            self.config.persist_retry_max_attempts,
            self.config.persist_retry_backoff(),
        ));
        let publisher = Arc::new(EventPublisher::new(sink));

        Ok(LifecycleController {
            engine: required(self.engine, "engine_source")?,
            health: required(self.health, "health_checker")?,
            probes: required(self.probes, "probe_runner")?,
            injector: required(self.injector, "injector")?,
            config: self.config,
            details,
            recorder,
            publisher,
            signal: self.signal,
            aborted: CancellationToken::new(),
        })
    }
}

impl<E, H, P, I, S, K> Default for LifecycleControllerBuilder<E, H, P, I, S, K>
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    fn default() -> Self {
        Self::new()
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ExperimentError> {
    value.ok_or_else(|| ExperimentError::Config {
        field: field.to_owned(),
        reason: format!("{field} must be provided"),
    })
}
