//! 결과 기록 -- 결과 레코드 저장 및 종료 판정 전이
//!
//! [`ResultRecorder`]는 실행당 하나뿐인 [`ResultDetails`]를 소유하고,
//! 판정 전이를 단일 배타 접근 지점(`Mutex`)으로 보호합니다.
//! 라이프사이클 컨트롤러와 중단 감시자는 모두 이 지점을 거쳐
//! "종료되지 않았으면 X로 설정하고 저장" 연산을 수행하며, 먼저 종료 판정을
//! 기록한 쪽이 이깁니다.
//!
//! # 종료 판정 경로
//! ```text
//! complete()                  -- 정상 완료: 저장 성공 시에만 확정
//! finalize_if_not_terminal()  -- 실패/중단: 메모리에 먼저 확정, 저장은 재시도 후 best-effort
//! ```
//!
//! 레코드의 저장 형식은 [`ResultStore`] 구현이 소유합니다.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use chaosrun_core::metrics as m;
use chaosrun_core::types::{
    ExperimentDetails, ProbeOutcome, ResultDetails, ResultPhase, Verdict,
};

use crate::error::ExperimentError;

/// 결과 레코드 저장 시점 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordTag {
    /// 실행 시작 (start of test)
    Start,
    /// 실행 종료 (end of test)
    End,
}

impl fmt::Display for RecordTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "SOT"),
            Self::End => write!(f, "EOT"),
        }
    }
}

/// 같은 이름의 결과 레코드에 누적되는 실행 이력
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistory {
    /// 통과한 실행 수
    pub passed_runs: u64,
    /// 실패한 실행 수
    pub failed_runs: u64,
    /// 중단된 실행 수
    pub stopped_runs: u64,
}

impl RunHistory {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Passed => self.passed_runs += 1,
            Verdict::Failed => self.failed_runs += 1,
            Verdict::Stopped => self.stopped_runs += 1,
            Verdict::Awaited => {}
        }
    }
}

/// 저장되는 결과 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// 레코드 이름 (`<engine>-<experiment>`)
    pub name: String,
    /// 고유 식별자 (저장소가 최초 저장 시 할당)
    pub uid: Option<String>,
    /// 실험 이름
    pub experiment: String,
    /// 엔진 바인딩 이름
    pub engine: Option<String>,
    /// 레코드 단계
    pub phase: ResultPhase,
    /// 판정
    pub verdict: Verdict,
    /// 실패 단계
    pub fail_step: Option<String>,
    /// 에러 코드
    pub error_code: Option<String>,
    /// 프로브 성공률 (%)
    pub probe_success_percentage: Option<u8>,
    /// 프로브 결과
    pub probe_outcomes: Vec<ProbeOutcome>,
    /// 실행 시작 시각
    pub started_at: SystemTime,
    /// 실행 종료 시각
    pub ended_at: Option<SystemTime>,
    /// 실행 이력
    #[serde(default)]
    pub history: RunHistory,
}

impl ResultRecord {
    /// 메모리상의 결과 레코드에서 저장용 레코드를 만듭니다.
    pub fn from_details(result: &ResultDetails, experiment: &str, engine: Option<&str>) -> Self {
        Self {
            name: result.name.clone(),
            uid: result.uid().map(str::to_owned),
            experiment: experiment.to_owned(),
            engine: engine.map(str::to_owned),
            phase: result.phase,
            verdict: result.verdict,
            fail_step: result.fail_step.clone(),
            error_code: result.error_code.clone(),
            probe_success_percentage: result.probe_success_percentage(),
            probe_outcomes: result.probe_outcomes.clone(),
            started_at: result.started_at,
            ended_at: result.ended_at,
            history: RunHistory::default(),
        }
    }
}

/// 기존 레코드와 새 레코드를 합칩니다.
///
/// 이력과 식별자는 기존 레코드에서 이어받고, 종료 태그로 저장되는
/// 종료 판정은 이력에 한 번 더해집니다.
pub fn merge_record(
    existing: Option<&ResultRecord>,
    incoming: &ResultRecord,
    tag: RecordTag,
) -> ResultRecord {
    let mut merged = incoming.clone();
    if let Some(existing) = existing {
        merged.history = existing.history.clone();
        if merged.uid.is_none() {
            merged.uid = existing.uid.clone();
        }
    }
    if tag == RecordTag::End && merged.verdict.is_terminal() {
        merged.history.record(merged.verdict);
    }
    if merged.uid.is_none() {
        merged.uid = Some(uuid::Uuid::new_v4().to_string());
    }
    merged
}

/// 결과 저장소
pub trait ResultStore: Send + Sync + 'static {
    /// 레코드를 생성하거나 갱신합니다.
    fn persist(
        &self,
        record: &ResultRecord,
        tag: RecordTag,
    ) -> impl Future<Output = Result<(), ExperimentError>> + Send;

    /// 저장된 레코드의 식별자를 조회합니다.
    fn fetch_identifier(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<String, ExperimentError>> + Send;

    /// 저장된 레코드를 조회합니다.
    fn load(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ResultRecord>, ExperimentError>> + Send;
}

/// JSON 파일 기반 결과 저장소 (`<dir>/<name>.json`)
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    /// 레코드 디렉토리로 저장소를 생성합니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, ExperimentError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(ExperimentError::Persist(format!(
                "invalid result name '{name}'"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl ResultStore for FileResultStore {
    async fn persist(&self, record: &ResultRecord, tag: RecordTag) -> Result<(), ExperimentError> {
        let path = self.record_path(&record.name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ExperimentError::Persist(format!("{}: {e}", self.dir.display())))?;

        let existing = self.load(&record.name).await?;
        let merged = merge_record(existing.as_ref(), record, tag);
        let body = serde_json::to_vec_pretty(&merged)
            .map_err(|e| ExperimentError::Persist(format!("serialize failed: {e}")))?;

        // Write-then-rename keeps readers from seeing a torn record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| ExperimentError::Persist(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ExperimentError::Persist(format!("{}: {e}", path.display())))?;

        debug!(name = %merged.name, %tag, verdict = %merged.verdict, "result record written");
        Ok(())
    }

    async fn fetch_identifier(&self, name: &str) -> Result<String, ExperimentError> {
        self.load(name)
            .await?
            .and_then(|r| r.uid)
            .ok_or_else(|| ExperimentError::Persist(format!("result '{name}' has no identifier")))
    }

    async fn load(&self, name: &str) -> Result<Option<ResultRecord>, ExperimentError> {
        let path = self.record_path(name)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ExperimentError::Persist(format!("{}: {e}", path.display())));
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| ExperimentError::Persist(format!("{}: {e}", path.display())))
    }
}

/// 메모리 기반 결과 저장소
///
/// 성공한 저장을 순서대로 기록하며, 저장/식별자 조회 실패를 주입할 수 있습니다.
#[derive(Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<String, ResultRecord>>,
    writes: Mutex<Vec<(RecordTag, ResultRecord)>>,
    fail_plan: Mutex<Option<(RecordTag, u32)>>,
    attempts: AtomicU32,
    fail_identifier: AtomicBool,
}

impl MemoryResultStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 `tag`로 저장되는 요청 `count`개를 실패시킵니다.
    pub async fn fail_persists(&self, tag: RecordTag, count: u32) {
        *self.fail_plan.lock().await = Some((tag, count));
    }

    /// 식별자 조회를 실패시킵니다.
    pub fn fail_identifier_lookup(&self) {
        self.fail_identifier.store(true, Ordering::SeqCst);
    }

    /// 성공한 저장 기록을 반환합니다.
    pub async fn writes(&self) -> Vec<(RecordTag, ResultRecord)> {
        self.writes.lock().await.clone()
    }

    /// 실패를 포함한 저장 시도 횟수를 반환합니다.
    pub fn persist_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ResultStore for MemoryResultStore {
    async fn persist(&self, record: &ResultRecord, tag: RecordTag) -> Result<(), ExperimentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut plan = self.fail_plan.lock().await;
            if let Some((fail_tag, remaining)) = plan.as_mut() {
                if *fail_tag == tag && *remaining > 0 {
                    *remaining -= 1;
                    return Err(ExperimentError::Persist(format!(
                        "injected {tag} persist failure"
                    )));
                }
            }
        }

        let mut records = self.records.lock().await;
        let merged = merge_record(records.get(&record.name), record, tag);
        records.insert(merged.name.clone(), merged.clone());
        self.writes.lock().await.push((tag, merged));
        Ok(())
    }

    async fn fetch_identifier(&self, name: &str) -> Result<String, ExperimentError> {
        if self.fail_identifier.load(Ordering::SeqCst) {
            return Err(ExperimentError::Persist(format!(
                "injected identifier lookup failure for '{name}'"
            )));
        }
        self.records
            .lock()
            .await
            .get(name)
            .and_then(|r| r.uid.clone())
            .ok_or_else(|| ExperimentError::Persist(format!("result '{name}' has no identifier")))
    }

    async fn load(&self, name: &str) -> Result<Option<ResultRecord>, ExperimentError> {
        Ok(self.records.lock().await.get(name).cloned())
    }
}

/// 종료 판정 기록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// 이 호출이 종료 판정을 확정함
    Committed {
        /// 저장소 반영 여부
        persisted: bool,
    },
    /// 이미 다른 경로가 종료 판정을 확정함
    AlreadyTerminal,
}

/// 결과 기록기
pub struct ResultRecorder<S: ResultStore> {
    store: Arc<S>,
    experiment_name: String,
    engine_name: Option<String>,
    /// 판정 전이의 단일 배타 접근 지점
    result: Mutex<ResultDetails>,
    /// 잠금 없이 확인하는 종료 여부
    terminal: AtomicBool,
    max_retries: u32,
    retry_backoff_base: Duration,
}

impl<S: ResultStore> ResultRecorder<S> {
    /// 새 기록기를 생성합니다.
    ///
    /// `max_retries`와 `retry_backoff_base`는 종료 판정 저장에만 적용됩니다.
    pub fn new(
        store: Arc<S>,
        details: &ExperimentDetails,
        max_retries: u32,
        retry_backoff_base: Duration,
    ) -> Self {
        Self {
            store,
            experiment_name: details.experiment_name.clone(),
            engine_name: details.engine_name.clone(),
            result: Mutex::new(ResultDetails::new(details.result_name())),
            terminal: AtomicBool::new(false),
            max_retries,
            retry_backoff_base,
        }
    }

    /// 종료 판정이 확정되었는지 반환합니다.
    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// 현재 결과 레코드의 복사본을 반환합니다.
    pub async fn snapshot(&self) -> ResultDetails {
        self.result.lock().await.clone()
    }

    /// 현재 판정을 반환합니다.
    pub async fn verdict(&self) -> Verdict {
        self.result.lock().await.verdict
    }

    /// 결과 레코드를 저장합니다 (재시도 없음).
    ///
    /// 이미 종료 판정이 확정되었으면 종료 레코드를 덮어쓰지 않고 건너뜁니다.
    pub async fn upsert(&self, tag: RecordTag) -> Result<(), ExperimentError> {
        let result = self.result.lock().await;
        if result.is_terminal() {
            debug!(%tag, "result already terminal, skipping upsert");
            return Ok(());
        }
        let record = self.record_of(&result);
        self.store.persist(&record, tag).await?;
        debug!(name = %record.name, %tag, "result record upserted");
        Ok(())
    }

    /// 저장소에서 식별자를 가져와 한 번만 할당합니다.
    pub async fn assign_identifier(&self) -> Result<String, ExperimentError> {
        let mut result = self.result.lock().await;
        if result.uid().is_some() {
            return Err(ExperimentError::IdentifierAlreadyAssigned(
                result.name.clone(),
            ));
        }
        let uid = self.store.fetch_identifier(&result.name).await?;
        result.set_uid(uid.clone());
        info!(name = %result.name, uid = %uid, "result identifier assigned");
        Ok(uid)
    }

    /// 프로브 결과를 실행 순서대로 추가합니다.
    pub async fn record_probe_outcomes(&self, outcomes: &[ProbeOutcome]) {
        let mut result = self.result.lock().await;
        if result.is_terminal() {
            return;
        }
        result.probe_outcomes.extend_from_slice(outcomes);
    }

    /// 잠정 판정을 기록합니다. 확정 판정은 바뀌지 않습니다.
    pub async fn mark_tentative(&self, verdict: Verdict) {
        let mut result = self.result.lock().await;
        if !result.is_terminal() {
            result.tentative_verdict = Some(verdict);
        }
    }

    /// 정상 완료 경로의 종료 판정을 기록합니다.
    ///
    /// 잠정 판정(없으면 `Passed`)으로 종료 레코드를 저장하고, 저장에 성공한 경우에만
    /// 메모리상의 판정을 확정합니다. 저장 실패 시 판정은 `Awaited`로 남으므로
    /// 호출자는 실패 확정 경로로 이어갈 수 있습니다.
    pub async fn complete(&self) -> Result<FinalizeOutcome, ExperimentError> {
        let mut result = self.result.lock().await;
        if result.is_terminal() {
            return Ok(FinalizeOutcome::AlreadyTerminal);
        }

        let mut candidate = result.clone();
        candidate.verdict = candidate.tentative_verdict.take().unwrap_or(Verdict::Passed);
        candidate.phase = ResultPhase::Completed;
        candidate.ended_at = Some(SystemTime::now());

        let record = self.record_of(&candidate);
        self.persist_with_retry(&record, RecordTag::End).await?;

        *result = candidate;
        self.terminal.store(true, Ordering::Release);
        record_run_metrics(&result);
        info!(name = %result.name, verdict = %result.verdict, "result finalized");
        Ok(FinalizeOutcome::Committed { persisted: true })
    }

    /// 종료되지 않았으면 `verdict`로 확정하고 저장합니다.
    ///
    /// 실패/중단 경로에서 사용하며, 여러 번 호출해도 종료 판정은 한 번만 기록됩니다.
    /// 판정은 메모리에 먼저 확정되고, 저장은 재시도 후에도 실패하면 로그만 남깁니다.
    pub async fn finalize_if_not_terminal(
        &self,
        verdict: Verdict,
        fail_step: &str,
        error_code: Option<&str>,
    ) -> FinalizeOutcome {
        let mut result = self.result.lock().await;
        if result.is_terminal() {
            debug!(
                name = %result.name,
                current = %result.verdict,
                requested = %verdict,
                "result already terminal, finalize skipped"
            );
            return FinalizeOutcome::AlreadyTerminal;
        }

        result.verdict = verdict;
        result.tentative_verdict = None;
        result.fail_step = Some(fail_step.to_owned());
        result.error_code = error_code.map(str::to_owned);
        result.phase = if verdict == Verdict::Stopped {
            ResultPhase::Stopped
        } else {
            ResultPhase::Completed
        };
        result.ended_at = Some(SystemTime::now());
        self.terminal.store(true, Ordering::Release);
        record_run_metrics(&result);

        let record = self.record_of(&result);
        let persisted = match self.persist_with_retry(&record, RecordTag::End).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    name = %result.name,
                    verdict = %verdict,
                    error = %e,
                    "failed to persist terminal verdict, record may be stale"
                );
                false
            }
        };

        info!(name = %result.name, verdict = %verdict, persisted, "result finalized");
        FinalizeOutcome::Committed { persisted }
    }

    fn record_of(&self, result: &ResultDetails) -> ResultRecord {
        ResultRecord::from_details(result, &self.experiment_name, self.engine_name.as_deref())
    }

    /// 선형 백오프 재시도를 포함한 종료 레코드 저장
    async fn persist_with_retry(
        &self,
        record: &ResultRecord,
        tag: RecordTag,
    ) -> Result<(), ExperimentError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_base * attempt;
                warn!(
                    name = %record.name,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying result persist"
                );
                tokio::time::sleep(backoff).await;
            }

            match self.store.persist(record, tag).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }

        metrics::counter!(m::RESULT_PERSIST_FAILURES_TOTAL).increment(1);
        Err(last_error
            .unwrap_or_else(|| ExperimentError::Persist("unknown error".to_owned())))
    }
}

fn record_run_metrics(result: &ResultDetails) {
    metrics::counter!(m::EXPERIMENT_RUNS_TOTAL, m::LABEL_VERDICT => result.verdict.as_lowercase())
        .increment(1);
    if let Ok(elapsed) = result.started_at.elapsed() {
        metrics::histogram!(m::EXPERIMENT_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosrun_core::types::{ProbePhase, Sequence, TargetDescriptor};

    fn details(engine: Option<&str>) -> ExperimentDetails {
        ExperimentDetails {
            experiment_name: "pod-delete".to_owned(),
            engine_name: engine.map(str::to_owned),
            chaos_duration: Duration::from_secs(15),
            chaos_interval: Duration::from_secs(5),
            ramp_time: Duration::ZERO,
            default_health_check: true,
            force: true,
            sequence: Sequence::Parallel,
            pods_affected_perc: 0,
            target: TargetDescriptor::default(),
        }
    }

    fn recorder(store: Arc<MemoryResultStore>) -> ResultRecorder<MemoryResultStore> {
        ResultRecorder::new(
            store,
            &details(Some("nginx-chaos")),
            2,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn start_persist_assigns_identifier() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.upsert(RecordTag::Start).await.unwrap();
        let uid = recorder.assign_identifier().await.unwrap();

        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, RecordTag::Start);
        assert_eq!(writes[0].1.uid.as_deref(), Some(uid.as_str()));
        assert_eq!(writes[0].1.name, "nginx-chaos-pod-delete");
        assert_eq!(writes[0].1.phase, ResultPhase::Running);
    }

    #[tokio::test]
    async fn identifier_is_assigned_once() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(store);
        recorder.upsert(RecordTag::Start).await.unwrap();
        recorder.assign_identifier().await.unwrap();
        let err = recorder.assign_identifier().await.unwrap_err();
        assert!(matches!(err, ExperimentError::IdentifierAlreadyAssigned(_)));
    }

    #[tokio::test]
    async fn complete_commits_tentative_verdict() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.upsert(RecordTag::Start).await.unwrap();
        recorder.mark_tentative(Verdict::Passed).await;
        assert!(!recorder.is_terminal());

        let outcome = recorder.complete().await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::Committed { persisted: true });
        assert!(recorder.is_terminal());
        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.verdict, Verdict::Passed);
        assert_eq!(snapshot.phase, ResultPhase::Completed);
        assert!(snapshot.ended_at.is_some());

        let writes = store.writes().await;
        assert_eq!(writes.last().unwrap().1.history.passed_runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_leaves_verdict_open_when_persist_fails() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.mark_tentative(Verdict::Passed).await;
        store.fail_persists(RecordTag::End, 10).await;

        assert!(recorder.complete().await.is_err());
        assert!(!recorder.is_terminal());
        assert_eq!(recorder.verdict().await, Verdict::Awaited);
        // first attempt + two retries
        assert_eq!(store.persist_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_retries_transient_persist_failure() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.mark_tentative(Verdict::Passed).await;
        store.fail_persists(RecordTag::End, 1).await;

        let outcome = recorder.complete().await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::Committed { persisted: true });
        assert_eq!(store.persist_attempts(), 2);
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.upsert(RecordTag::Start).await.unwrap();

        let first = recorder
            .finalize_if_not_terminal(Verdict::Failed, "inject", Some("CHAOS_INJECT_ERROR"))
            .await;
        let second = recorder
            .finalize_if_not_terminal(Verdict::Failed, "inject", Some("CHAOS_INJECT_ERROR"))
            .await;
        assert_eq!(first, FinalizeOutcome::Committed { persisted: true });
        assert_eq!(second, FinalizeOutcome::AlreadyTerminal);

        let end_writes: Vec<_> = store
            .writes()
            .await
            .into_iter()
            .filter(|(tag, _)| *tag == RecordTag::End)
            .collect();
        assert_eq!(end_writes.len(), 1);
        assert_eq!(end_writes[0].1.verdict, Verdict::Failed);
        assert_eq!(end_writes[0].1.error_code.as_deref(), Some("CHAOS_INJECT_ERROR"));
    }

    #[tokio::test]
    async fn finalize_does_not_override_completed_run() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.mark_tentative(Verdict::Passed).await;
        recorder.complete().await.unwrap();

        let outcome = recorder
            .finalize_if_not_terminal(Verdict::Stopped, "Chaos injection stopped!", None)
            .await;
        assert_eq!(outcome, FinalizeOutcome::AlreadyTerminal);
        assert_eq!(recorder.verdict().await, Verdict::Passed);
    }

    #[tokio::test]
    async fn stopped_verdict_sets_stopped_phase() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder.mark_tentative(Verdict::Passed).await;
        recorder
            .finalize_if_not_terminal(Verdict::Stopped, "Chaos injection stopped!", None)
            .await;
        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.phase, ResultPhase::Stopped);
        assert_eq!(snapshot.tentative_verdict, None);
        assert_eq!(recorder.complete().await.unwrap(), FinalizeOutcome::AlreadyTerminal);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_commits_in_memory_when_persist_fails() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        store.fail_persists(RecordTag::End, 10).await;

        let outcome = recorder
            .finalize_if_not_terminal(Verdict::Failed, "post-chaos check", None)
            .await;
        assert_eq!(outcome, FinalizeOutcome::Committed { persisted: false });
        assert!(recorder.is_terminal());
        assert_eq!(recorder.verdict().await, Verdict::Failed);
    }

    #[tokio::test]
    async fn probe_outcomes_are_frozen_after_terminal() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(store);
        recorder
            .record_probe_outcomes(&[ProbeOutcome::passed("a", ProbePhase::PreChaos)])
            .await;
        recorder
            .finalize_if_not_terminal(Verdict::Failed, "x", None)
            .await;
        recorder
            .record_probe_outcomes(&[ProbeOutcome::passed("b", ProbePhase::PostChaos)])
            .await;
        assert_eq!(recorder.snapshot().await.probe_outcomes.len(), 1);
    }

    #[tokio::test]
    async fn upsert_after_terminal_is_skipped() {
        let store = Arc::new(MemoryResultStore::new());
        let recorder = recorder(Arc::clone(&store));
        recorder
            .finalize_if_not_terminal(Verdict::Stopped, "stopped", None)
            .await;
        recorder.upsert(RecordTag::Start).await.unwrap();
        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, RecordTag::End);
    }

    #[test]
    fn merge_keeps_history_and_uid() {
        let mut previous = ResultRecord::from_details(
            &ResultDetails::new("nginx-chaos-pod-delete"),
            "pod-delete",
            Some("nginx-chaos"),
        );
        previous.uid = Some("uid-1".to_owned());
        previous.history.failed_runs = 2;

        let mut incoming = previous.clone();
        incoming.uid = None;
        incoming.history = RunHistory::default();
        incoming.verdict = Verdict::Passed;

        let merged = merge_record(Some(&previous), &incoming, RecordTag::End);
        assert_eq!(merged.uid.as_deref(), Some("uid-1"));
        assert_eq!(merged.history.failed_runs, 2);
        assert_eq!(merged.history.passed_runs, 1);

        let started = merge_record(Some(&previous), &incoming, RecordTag::Start);
        assert_eq!(started.history.passed_runs, 0);
    }

    #[tokio::test]
    async fn file_store_round_trip_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileResultStore::new(dir.path().join("results")));

        for verdict in [Verdict::Passed, Verdict::Failed] {
            let recorder = ResultRecorder::new(
                Arc::clone(&store),
                &details(Some("nginx-chaos")),
                0,
                Duration::ZERO,
            );
            recorder.upsert(RecordTag::Start).await.unwrap();
            recorder.assign_identifier().await.unwrap();
            if verdict == Verdict::Passed {
                recorder.mark_tentative(Verdict::Passed).await;
                recorder.complete().await.unwrap();
            } else {
                recorder.finalize_if_not_terminal(verdict, "x", None).await;
            }
        }

        let record = store.load("nginx-chaos-pod-delete").await.unwrap().unwrap();
        assert_eq!(record.verdict, Verdict::Failed);
        assert_eq!(record.history.passed_runs, 1);
        assert_eq!(record.history.failed_runs, 1);
        assert!(record.uid.is_some());
    }

    #[tokio::test]
    async fn file_store_rejects_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path());
        assert!(store.load("../escape").await.is_err());
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
