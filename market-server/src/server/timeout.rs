use tonic::Request;

use std::time::Duration;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The time a call may spend in the store: the client's `grpc-timeout`
/// when it is tighter than the server default.
pub fn request_deadline<T>(request: &Request<T>, default: Duration) -> Duration {
    request
        .metadata()
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
        .map(|client| client.min(default))
        .unwrap_or(default)
}

// "TimeoutValue TimeoutUnit" with at most 8 digits
fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if raw.len() < 2 || raw.len() > 9 {
        return None;
    }
    let (value, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = value.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(value * 60 * 60),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(duration)
}
