use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::error::{NetworkError, Result};
use crate::events::ShadowEventSink;
use crate::shadow::{ConnectRequest, ShadowConnector, ShadowLink};

/// Jitter fraction applied to each delay (±10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Retry schedule for network-B connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }
}

/// Connect with exponential backoff and jitter.
///
/// Schedule: base → 2×base → 4×base … capped at `policy.max`, for at most
/// `policy.max_attempts` tries. Fatal errors (see [`NetworkError::is_fatal`])
/// are returned immediately without retrying; exhausting the attempts returns
/// the last retryable error.
pub async fn connect_with_backoff(
    connector: &dyn ShadowConnector,
    request: &ConnectRequest,
    events: &ShadowEventSink,
    policy: &BackoffPolicy,
) -> Result<Arc<dyn ShadowLink>> {
    let mut delay = policy.base;
    let mut last_err = NetworkError::ConnectionFailed("no connect attempt made".to_string());

    for attempt in 1..=policy.max_attempts {
        match connector.connect(request.clone(), events.clone()).await {
            Ok(link) => {
                info!(nick = %request.nick, attempt, "network-B connection registered");
                return Ok(link);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if attempt == policy.max_attempts => return Err(e),
            Err(e) => {
                let total = delay + jitter(delay);
                warn!(
                    nick = %request.nick,
                    attempt,
                    max = policy.max_attempts,
                    error = %e,
                    retry_after_ms = total.as_millis() as u64,
                    "network-B connect failed, retrying with backoff"
                );
                last_err = e;
                sleep(total).await;
                delay = (delay * 2).min(policy.max);
            }
        }
    }

    Err(last_err)
}

/// Return a jitter offset in `0 … JITTER_FRACTION * base`.
///
/// Derived from the current wall-clock nanos; good enough to de-synchronise
/// many shadows reconnecting after the same outage.
fn jitter(base: Duration) -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter_ms = (base.as_millis() as f64 * JITTER_FRACTION) as u64;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(nanos as u64 % max_jitter_ms)
}
