//! Event sink selection.
//!
//! Events go to a JSON lines file when `runner.event_log_path` is set,
//! otherwise to the tracing log.

use chaosrun_core::config::RunnerConfig;
use chaosrun_core::event::EventDetails;
use chaosrun_experiment::{EventSink, ExperimentError, JsonLinesEventSink, TracingEventSink};

/// Event sink configured for this run.
pub enum RunnerEventSink {
    /// Structured log output.
    Tracing(TracingEventSink),
    /// Append-only JSON lines file.
    JsonLines(JsonLinesEventSink),
}

impl RunnerEventSink {
    /// Builds the sink described by the `[runner]` section.
    pub async fn from_config(config: &RunnerConfig) -> Result<Self, ExperimentError> {
        if config.event_log_path.is_empty() {
            return Ok(Self::Tracing(TracingEventSink));
        }
        let sink = JsonLinesEventSink::open(&config.event_log_path).await?;
        tracing::info!(path = %config.event_log_path, "writing events to JSON lines file");
        Ok(Self::JsonLines(sink))
    }
}

impl EventSink for RunnerEventSink {
    async fn emit(&self, event: &EventDetails) -> Result<(), ExperimentError> {
        match self {
            Self::Tracing(sink) => sink.emit(event).await,
            Self::JsonLines(sink) => sink.emit(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_path_selects_tracing_sink() {
        let config = RunnerConfig::default();
        let sink = RunnerEventSink::from_config(&config).await.unwrap();
        assert!(matches!(sink, RunnerEventSink::Tracing(_)));
    }

    #[tokio::test]
    async fn path_selects_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            event_log_path: dir.path().join("events.jsonl").display().to_string(),
            ..RunnerConfig::default()
        };
        let sink = RunnerEventSink::from_config(&config).await.unwrap();
        assert!(matches!(sink, RunnerEventSink::JsonLines(_)));
    }
}
