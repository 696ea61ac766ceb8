//! `tracing`-backed implementation of the [`Logger`] port.

use crate::ports::{LogLevel, Logger, Progress};
use crate::record::Record;

/// Forwards pipeline log lines to `tracing` with structured fields.
///
/// Every event carries `worker` (`main` outside the pool), `progress` (empty
/// unless a counter was passed) and `extra` (a JSON object, or empty). The
/// subscriber installed by the binary decides filtering and format.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

/// Serialize the extra fields as one JSON object for the `extra` field.
fn render_extra(extra: Option<&Record>) -> String {
    extra
        .and_then(|e| serde_json::to_string(e).ok())
        .unwrap_or_default()
}

impl Logger for TracingLogger {
    fn log(
        &self,
        message: &str,
        level: LogLevel,
        progress: Option<&Progress>,
        extra: Option<&Record>,
        worker_id: Option<&str>,
    ) {
        let worker = worker_id.unwrap_or("main");
        let progress = progress.map(|p| p.to_string()).unwrap_or_default();
        let extra = render_extra(extra);
        match level {
            LogLevel::Debug => {
                tracing::debug!(worker, progress = %progress, extra = %extra, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(worker, progress = %progress, extra = %extra, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(worker, progress = %progress, extra = %extra, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(worker, progress = %progress, extra = %extra, "{}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;

    #[test]
    fn extra_renders_as_json_object() {
        let mut extra = Record::new();
        extra.insert("ticker".into(), Scalar::Text("PETR4".into()));
        extra.insert("value".into(), Scalar::Real(35.5));
        assert_eq!(
            render_extra(Some(&extra)),
            r#"{"ticker":"PETR4","value":35.5}"#
        );
        assert_eq!(render_extra(None), "");
    }

    #[test]
    fn logging_without_subscriber_is_silent() {
        TracingLogger.log("hello", LogLevel::Error, None, None, Some("W1"));
    }
}
