//! 중단 감시 -- 외부 중단 신호 감지 및 강제 종료 판정
//!
//! [`AbortWatcher`]는 실행당 한 번 시작되는 백그라운드 태스크입니다.
//! 정해진 주기로 엔진 바인딩의 중단 신호를 확인하고, 러너가 전달한 종료 신호
//! 토큰도 함께 감시합니다. 중단을 감지하면 컨트롤러와 같은 배타 접근 지점을 거쳐
//! 판정을 `Stopped`로 확정하고, 중단 이벤트를 발행한 뒤 `aborted` 토큰을 취소합니다.
//!
//! 컨트롤러가 먼저 종료 판정을 기록했다면 다음 폴링에서 이를 확인하고
//! 이벤트 없이 조용히 종료합니다. 진행 중인 협력자 호출을 취소하지는 않습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chaosrun_core::event::{
    EventDetails, EventSeverity, REASON_SUMMARY, summary_message, verdict_event, verdict_message,
};
use chaosrun_core::types::{ChaosDetails, Verdict};

use crate::engine::EngineSource;
use crate::publisher::{EventPublisher, EventSink};
use crate::recorder::{FinalizeOutcome, ResultRecorder, ResultStore};

/// 중단 시 기록되는 실패 단계
pub const STOPPED_FAIL_STEP: &str = "Chaos injection stopped!";

/// 중단 시 기록되는 에러 코드
pub const STOPPED_ERROR_CODE: &str = "EXPERIMENT_ABORTED";

/// 감시자 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// 중단 신호를 감지하고 `Stopped`로 확정함
    Stopped,
    /// 이미 종료 판정이 있어 조용히 종료함
    AlreadyTerminal,
    /// 컨트롤러가 감시를 해제함
    Shutdown,
}

/// 중단 감시자
pub struct AbortWatcher<E: EngineSource, S: ResultStore, K: EventSink> {
    engine: Arc<E>,
    recorder: Arc<ResultRecorder<S>>,
    publisher: Arc<EventPublisher<K>>,
    /// 실행 컨텍스트 관찰용 (읽기 전용)
    chaos: watch::Receiver<ChaosDetails>,
    poll_interval: Duration,
    /// 러너가 전달한 종료 신호
    signal: CancellationToken,
    /// 중단 확정 시 취소되는 토큰
    aborted: CancellationToken,
}

/// 실행 중인 감시자 핸들
pub struct AbortWatcherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<WatcherExit>,
}

impl AbortWatcherHandle {
    /// 감시를 해제하고 감시자 종료 사유를 반환합니다.
    pub async fn stop(self) -> WatcherExit {
        self.shutdown.cancel();
        self.join().await
    }

    /// 감시자가 스스로 종료할 때까지 기다립니다.
    pub async fn join(self) -> WatcherExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "abort watcher task failed");
                WatcherExit::Shutdown
            }
        }
    }
}

impl<E: EngineSource, S: ResultStore, K: EventSink> AbortWatcher<E, S, K> {
    /// 새 감시자를 생성합니다.
    pub fn new(
        engine: Arc<E>,
        recorder: Arc<ResultRecorder<S>>,
        publisher: Arc<EventPublisher<K>>,
        chaos: watch::Receiver<ChaosDetails>,
        poll_interval: Duration,
        signal: CancellationToken,
        aborted: CancellationToken,
    ) -> Self {
        Self {
            engine,
            recorder,
            publisher,
            chaos,
            poll_interval,
            signal,
            aborted,
        }
    }

    /// 감시 태스크를 시작합니다.
    pub fn spawn(self) -> AbortWatcherHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        AbortWatcherHandle { shutdown, task }
    }

    async fn run(self, shutdown: CancellationToken) -> WatcherExit {
        let binding = self.chaos.borrow().engine_name.clone();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            binding = binding.as_deref().unwrap_or("-"),
            poll_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "abort watcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("abort watcher shut down");
                    return WatcherExit::Shutdown;
                }
                _ = self.signal.cancelled() => {
                    return self.force_stop("termination signal received").await;
                }
                _ = ticker.tick() => {}
            }

            if self.recorder.is_terminal() {
                debug!("result already terminal, abort watcher exiting");
                return WatcherExit::AlreadyTerminal;
            }

            let Some(binding) = binding.as_deref() else {
                continue;
            };
            match self.engine.poll_abort_signal(binding).await {
                Ok(true) => return self.force_stop("engine binding aborted").await,
                Ok(false) => {}
                Err(e) => warn!(binding, error = %e, "failed to poll abort signal"),
            }
        }
    }

    /// 판정을 `Stopped`로 확정하고 중단 이벤트를 발행합니다.
    async fn force_stop(&self, cause: &str) -> WatcherExit {
        let chaos = self.chaos.borrow().clone();
        warn!(cause, phase = %chaos.phase(), "abort detected, stopping experiment");

        let outcome = self
            .recorder
            .finalize_if_not_terminal(Verdict::Stopped, STOPPED_FAIL_STEP, Some(STOPPED_ERROR_CODE))
            .await;
        if outcome == FinalizeOutcome::AlreadyTerminal {
            debug!("result already terminal, abort ignored");
            return WatcherExit::AlreadyTerminal;
        }

        let result = self.recorder.snapshot().await;
        let (reason, severity) = verdict_event(Verdict::Stopped);
        self.publisher
            .emit(EventDetails::for_result(
                reason,
                verdict_message(&chaos.experiment_name, Verdict::Stopped),
                severity,
                &result,
            ))
            .await;
        if chaos.engine_name.is_some() {
            self.publisher
                .emit(EventDetails::for_engine(
                    REASON_SUMMARY,
                    summary_message(&chaos.experiment_name, Verdict::Stopped),
                    EventSeverity::Warning,
                    &chaos,
                ))
                .await;
        }

        self.aborted.cancel();
        WatcherExit::Stopped
    }
}
