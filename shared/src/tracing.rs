use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::{Level, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Sets the parent of the current span from whatever carrier the caller
/// received (gRPC metadata, http headers).
pub fn set_parent_from(carrier: &dyn Extractor) {
    let propagator = TraceContextPropagator::new();
    let parent_cx = propagator.extract(carrier);
    Span::current().set_parent(parent_cx)
}

pub async fn record_error<
    T,
    E: std::fmt::Display,
    F: FnOnce() -> R,
    R: std::future::Future<Output = Result<T, E>>,
>(
    level: Level,
    func: F,
) -> Result<T, E> {
    record_error_by(|_| level, func).await
}

/// Like [`record_error`] but picks the level from the error itself.
pub async fn record_error_by<
    T,
    E: std::fmt::Display,
    L: FnOnce(&E) -> Level,
    F: FnOnce() -> R,
    R: std::future::Future<Output = Result<T, E>>,
>(
    level_of: L,
    func: F,
) -> Result<T, E> {
    let result = func().await;
    if let Err(ref e) = result {
        insert_error_fields(level_of(e), e);
    }
    result
}

pub fn insert_error_fields(level: Level, error: impl std::fmt::Display) {
    Span::current().record("error", &tracing::field::display("true"));
    Span::current().record("error.level", &tracing::field::display(level));
    Span::current().record("error.message", &tracing::field::display(error));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_error_passes_the_result_through() {
        let ok: Result<u32, String> = record_error(Level::WARN, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            record_error(Level::ERROR, || async { Err("boom".to_string()) }).await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn record_error_by_asks_for_the_level_only_on_error() {
        let mut asked = false;
        let ok: Result<u32, String> = record_error_by(
            |_| {
                asked = true;
                Level::WARN
            },
            || async { Ok(1) },
        )
        .await;
        assert_eq!(ok, Ok(1));
        assert!(!asked);

        let err: Result<u32, String> = record_error_by(
            |e: &String| {
                if e.starts_with("bad input") {
                    Level::WARN
                } else {
                    Level::ERROR
                }
            },
            || async { Err("bad input: price".to_string()) },
        )
        .await;
        assert!(err.is_err());
    }
}
