//! 이벤트 발행 -- 단계 전이를 알리는 부수 채널
//!
//! [`EventPublisher`]는 fire-and-forget 방식으로 동작합니다. 싱크 실패는
//! 로그와 메트릭으로만 남고 호출자에게 전파되지 않으므로, 이벤트 발행은
//! 판정이나 제어 흐름에 영향을 주지 않습니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chaosrun_core::event::{EventDetails, EventSeverity};
use chaosrun_core::metrics as m;

use crate::error::ExperimentError;

/// 이벤트 싱크
pub trait EventSink: Send + Sync + 'static {
    /// 이벤트 하나를 전달합니다.
    fn emit(&self, event: &EventDetails)
    -> impl Future<Output = Result<(), ExperimentError>> + Send;
}

/// `tracing` 로그로 이벤트를 출력하는 싱크
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    async fn emit(&self, event: &EventDetails) -> Result<(), ExperimentError> {
        match event.severity {
            EventSeverity::Normal => info!(
                event_id = %event.id,
                reason = %event.reason,
                resource = %event.resource,
                resource_name = %event.resource_name,
                "{}", event.message
            ),
            EventSeverity::Warning => warn!(
                event_id = %event.id,
                reason = %event.reason,
                resource = %event.resource,
                resource_name = %event.resource_name,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// JSON lines 파일에 이벤트를 추가하는 싱크
pub struct JsonLinesEventSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonLinesEventSink {
    /// 파일을 append 모드로 엽니다 (없으면 생성).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ExperimentError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExperimentError::Emit(format!("{}: {e}", parent.display())))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ExperimentError::Emit(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonLinesEventSink {
    async fn emit(&self, event: &EventDetails) -> Result<(), ExperimentError> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| ExperimentError::Emit(format!("serialize failed: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| ExperimentError::Emit(format!("{}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| ExperimentError::Emit(format!("{}: {e}", self.path.display())))
    }
}

/// 이벤트 발행기
pub struct EventPublisher<K: EventSink> {
    sink: Arc<K>,
}

impl<K: EventSink> EventPublisher<K> {
    /// 새 발행기를 생성합니다.
    pub fn new(sink: Arc<K>) -> Self {
        Self { sink }
    }

    /// 이벤트를 발행합니다. 실패는 기록만 하고 무시합니다.
    pub async fn emit(&self, event: EventDetails) {
        match self.sink.emit(&event).await {
            Ok(()) => debug!(reason = %event.reason, event_id = %event.id, "event emitted"),
            Err(e) => {
                warn!(
                    reason = %event.reason,
                    event_id = %event.id,
                    error = %e,
                    "failed to emit event"
                );
                metrics::counter!(m::EVENT_EMIT_FAILURES_TOTAL).increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosrun_core::event::REASON_AWAITED;
    use chaosrun_core::types::ResultDetails;

    struct FailingSink;

    impl EventSink for FailingSink {
        async fn emit(&self, _event: &EventDetails) -> Result<(), ExperimentError> {
            Err(ExperimentError::Emit("sink down".to_owned()))
        }
    }

    fn awaited_event() -> EventDetails {
        EventDetails::for_result(
            REASON_AWAITED,
            "experiment: pod-delete, Result: Awaited",
            EventSeverity::Normal,
            &ResultDetails::new("pod-delete"),
        )
    }

    #[tokio::test]
    async fn publisher_swallows_sink_failures() {
        let publisher = EventPublisher::new(Arc::new(FailingSink));
        publisher.emit(awaited_event()).await;
    }

    #[tokio::test]
    async fn tracing_sink_accepts_events() {
        let sink = TracingEventSink;
        sink.emit(&awaited_event()).await.unwrap();
    }

    #[tokio::test]
    async fn json_lines_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").join("events.jsonl");
        let sink = JsonLinesEventSink::open(&path).await.unwrap();

        sink.emit(&awaited_event()).await.unwrap();
        sink.emit(&awaited_event()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: EventDetails = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.reason, REASON_AWAITED);
    }
}
