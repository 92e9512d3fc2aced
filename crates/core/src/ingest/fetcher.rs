use crate::ingest::provider::MarketDataClient;
use crate::ingest::types::{FailureKind, FetchFailure, RawFetchResult, UpstreamError};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RATE_LIMIT_BACKOFF_SECS: u64 = 10;
const DEFAULT_TIMEOUT_BACKOFF_SECS: u64 = 5;
const DEFAULT_EMPTY_RESPONSE_DELAY_SECS: u64 = 10;
const DEFAULT_PACING_MIN_SECS: u64 = 3;
const DEFAULT_PACING_MAX_SECS: u64 = 7;

/// Source of wall-clock delays. Swapped for a virtual clock in tests.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);

    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Delay inserted before every upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacingPolicy {
    None,
    Fixed(Duration),
    Uniform { min: Duration, max: Duration },
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::Uniform {
            min: Duration::from_secs(DEFAULT_PACING_MIN_SECS),
            max: Duration::from_secs(DEFAULT_PACING_MAX_SECS),
        }
    }
}

impl PacingPolicy {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let min = parse_secs(&get, "FETCH_PACING_MIN_SECS").unwrap_or(DEFAULT_PACING_MIN_SECS);
        let max = parse_secs(&get, "FETCH_PACING_MAX_SECS").unwrap_or(DEFAULT_PACING_MAX_SECS);
        match (min, max) {
            (0, 0) => PacingPolicy::None,
            (min, max) if max <= min => PacingPolicy::Fixed(Duration::from_secs(min)),
            (min, max) => PacingPolicy::Uniform {
                min: Duration::from_secs(min),
                max: Duration::from_secs(max),
            },
        }
    }

    pub fn next_delay(&self) -> Duration {
        match self {
            PacingPolicy::None => Duration::ZERO,
            PacingPolicy::Fixed(d) => *d,
            PacingPolicy::Uniform { min, max } => {
                if max <= min {
                    return *min;
                }
                let lo = min.as_millis() as u64;
                let hi = max.as_millis() as u64;
                Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upstream attempts per ticker, at least 1.
    pub max_retries: u32,
    pub rate_limit_base: Duration,
    pub timeout_base: Duration,
    pub empty_response_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_base: Duration::from_secs(DEFAULT_RATE_LIMIT_BACKOFF_SECS),
            timeout_base: Duration::from_secs(DEFAULT_TIMEOUT_BACKOFF_SECS),
            empty_response_delay: Duration::from_secs(DEFAULT_EMPTY_RESPONSE_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let max_retries = get("FETCH_MAX_RETRIES")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES)
            .max(1);
        let secs = |name: &str, default: u64| {
            Duration::from_secs(parse_secs(&get, name).unwrap_or(default))
        };

        Self {
            max_retries,
            rate_limit_base: secs("FETCH_RATE_LIMIT_BACKOFF_SECS", DEFAULT_RATE_LIMIT_BACKOFF_SECS),
            timeout_base: secs("FETCH_TIMEOUT_BACKOFF_SECS", DEFAULT_TIMEOUT_BACKOFF_SECS),
            empty_response_delay: secs(
                "FETCH_EMPTY_RESPONSE_DELAY_SECS",
                DEFAULT_EMPTY_RESPONSE_DELAY_SECS,
            ),
        }
    }

    /// Wait after a failed attempt (1-based), or `None` when the kind is not retried.
    pub fn backoff(&self, kind: FailureKind, attempt: u32) -> Option<Duration> {
        match kind {
            FailureKind::RateLimited => Some(self.rate_limit_base * attempt),
            FailureKind::Timeout => Some(self.timeout_base * attempt),
            FailureKind::EmptyResponse => Some(self.empty_response_delay),
            FailureKind::Other | FailureKind::DeadlineExceeded => None,
        }
    }
}

/// Wraps a [`MarketDataClient`] with pacing, bounded retries and kind-specific backoff.
pub struct ResilientFetcher {
    client: Arc<dyn MarketDataClient>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    pacing: PacingPolicy,
}

impl ResilientFetcher {
    pub fn new(client: Arc<dyn MarketDataClient>, retry: RetryPolicy, pacing: PacingPolicy) -> Self {
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            retry,
            pacing,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    pub fn now(&self) -> Instant {
        self.sleeper.now()
    }

    /// Fetches one ticker. Always yields exactly one of success or failure.
    ///
    /// A backoff is taken after every retryable failure, the last one included. Any
    /// delay that would run past `deadline` ends the ticker instead.
    pub async fn fetch(&self, ticker: &str, deadline: Option<Instant>) -> RawFetchResult {
        let max_retries = self.retry.max_retries.max(1);
        let mut attempts: u32 = 0;
        let mut last: Option<(FailureKind, String)> = None;

        for attempt in 1..=max_retries {
            if !self.wait(self.pacing.next_delay(), deadline).await {
                tracing::warn!(ticker, attempt, "run deadline reached before upstream call");
                break;
            }

            attempts = attempt;
            tracing::info!(ticker, attempt, max_retries, "fetching market data");

            let err = match self.client.get(ticker).await {
                Ok(payload) if !payload.is_empty() => return RawFetchResult::Success(payload),
                Ok(_) => UpstreamError::Empty,
                Err(err) => err,
            };

            let kind = err.kind();
            let Some(backoff) = self.retry.backoff(kind, attempt) else {
                tracing::warn!(ticker, attempt, error = %err, "market data fetch failed; not retrying");
                return RawFetchResult::Failure(FetchFailure {
                    kind,
                    attempts,
                    detail: err.to_string(),
                });
            };

            tracing::warn!(
                ticker,
                attempt,
                ?backoff,
                %kind,
                error = %err,
                "market data fetch failed; backing off"
            );
            last = Some((kind, err.to_string()));

            if !self.wait(backoff, deadline).await {
                tracing::warn!(ticker, attempt, "run deadline reached; abandoning retries");
                break;
            }
        }

        let (kind, detail) = last.unwrap_or_else(|| {
            (
                FailureKind::DeadlineExceeded,
                "run deadline reached before any attempt".to_string(),
            )
        });
        tracing::warn!(ticker, attempts, %kind, "giving up on ticker");
        RawFetchResult::Failure(FetchFailure {
            kind,
            attempts,
            detail,
        })
    }

    /// Sleeps for `delay` unless that would reach the deadline. Returns false when it would.
    async fn wait(&self, delay: Duration, deadline: Option<Instant>) -> bool {
        if let Some(deadline) = deadline {
            if self.sleeper.now() + delay >= deadline {
                return false;
            }
        }
        if !delay.is_zero() {
            self.sleeper.sleep(delay).await;
        }
        true
    }
}

fn parse_secs(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    get(name).and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Payload;
    use crate::test_support::{fundamentals, ScriptedClient, VirtualClock};
    use std::collections::HashMap;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            rate_limit_base: Duration::from_secs(10),
            timeout_base: Duration::from_secs(5),
            empty_response_delay: Duration::from_secs(10),
        }
    }

    fn fetcher(client: &Arc<ScriptedClient>, clock: &Arc<VirtualClock>) -> ResilientFetcher {
        ResilientFetcher::new(client.clone(), policy(), PacingPolicy::None)
            .with_sleeper(clock.clone())
    }

    #[tokio::test]
    async fn rate_limited_every_attempt_backs_off_linearly() {
        let client = Arc::new(ScriptedClient::new().script(
            "CCC",
            vec![
                Err(UpstreamError::RateLimited),
                Err(UpstreamError::RateLimited),
                Err(UpstreamError::RateLimited),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());

        let res = fetcher(&client, &clock).fetch("CCC", None).await;

        let RawFetchResult::Failure(failure) = res else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.attempts, 3);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
        assert_eq!(client.calls_for("CCC"), 3);
    }

    #[tokio::test]
    async fn other_errors_are_never_retried() {
        let client = Arc::new(ScriptedClient::new().script(
            "ZZZ",
            vec![
                Err(UpstreamError::Other("symbol not found".into())),
                Ok(fundamentals(serde_json::json!({"pegRatio": 1.0}))),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());

        let res = fetcher(&client, &clock).fetch("ZZZ", None).await;

        assert!(matches!(
            res,
            RawFetchResult::Failure(FetchFailure { kind: FailureKind::Other, attempts: 1, .. })
        ));
        assert_eq!(client.calls_for("ZZZ"), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn recovers_after_timeout_and_empty_response() {
        let good = fundamentals(serde_json::json!({"pegRatio": 1.2}));
        let client = Arc::new(ScriptedClient::new().script(
            "AAA",
            vec![
                Err(UpstreamError::Timeout("read timed out".into())),
                Ok(Payload::History(Vec::new())),
                Ok(good.clone()),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());

        let res = fetcher(&client, &clock).fetch("AAA", None).await;

        assert_eq!(res, RawFetchResult::Success(good));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn failure_carries_last_kind() {
        let client = Arc::new(ScriptedClient::new().script(
            "MIX",
            vec![
                Err(UpstreamError::RateLimited),
                Err(UpstreamError::Timeout("slow".into())),
                Err(UpstreamError::Empty),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());

        let res = fetcher(&client, &clock).fetch("MIX", None).await;

        let RawFetchResult::Failure(failure) = res else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::EmptyResponse);
        assert_eq!(failure.attempts, 3);
    }

    #[tokio::test]
    async fn pacing_precedes_every_call() {
        let client = Arc::new(ScriptedClient::new().script(
            "AAA",
            vec![
                Err(UpstreamError::Empty),
                Ok(fundamentals(serde_json::json!({"pegRatio": 1.2}))),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());
        let fetcher = ResilientFetcher::new(
            client.clone(),
            policy(),
            PacingPolicy::Fixed(Duration::from_secs(4)),
        )
        .with_sleeper(clock.clone());

        let res = fetcher.fetch("AAA", None).await;

        assert!(matches!(res, RawFetchResult::Success(_)));
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(4),
                Duration::from_secs(10),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn deadline_abandons_remaining_retries() {
        let client = Arc::new(ScriptedClient::new().script(
            "CCC",
            vec![
                Err(UpstreamError::RateLimited),
                Err(UpstreamError::RateLimited),
                Err(UpstreamError::RateLimited),
            ],
        ));
        let clock = Arc::new(VirtualClock::new());
        let deadline = clock.now() + Duration::from_secs(25);

        let res = fetcher(&client, &clock).fetch("CCC", Some(deadline)).await;

        let RawFetchResult::Failure(failure) = res else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.attempts, 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn past_deadline_makes_no_call() {
        let client = Arc::new(ScriptedClient::new());
        let clock = Arc::new(VirtualClock::new());
        let deadline = clock.now();

        let res = fetcher(&client, &clock).fetch("LATE", Some(deadline)).await;

        assert!(matches!(
            res,
            RawFetchResult::Failure(FetchFailure {
                kind: FailureKind::DeadlineExceeded,
                attempts: 0,
                ..
            })
        ));
        assert_eq!(client.calls_for("LATE"), 0);
    }

    #[test]
    fn rate_limit_backoff_strictly_increases() {
        let p = policy();
        let waits: Vec<Duration> = (1..=5)
            .filter_map(|a| p.backoff(FailureKind::RateLimited, a))
            .collect();
        assert!(waits.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(p.backoff(FailureKind::Other, 1), None);
        assert_eq!(p.backoff(FailureKind::DeadlineExceeded, 1), None);
        assert_eq!(p.backoff(FailureKind::EmptyResponse, 3), Some(Duration::from_secs(10)));
    }

    #[test]
    fn uniform_pacing_stays_in_range() {
        let pacing = PacingPolicy::Uniform {
            min: Duration::from_secs(3),
            max: Duration::from_secs(7),
        };
        for _ in 0..100 {
            let d = pacing.next_delay();
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(7));
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn pacing_defaults_to_three_to_seven_seconds() {
        assert_eq!(PacingPolicy::from_lookup(lookup(&[])), PacingPolicy::default());
    }

    #[test]
    fn zero_pacing_bounds_disable_pacing() {
        let pacing = PacingPolicy::from_lookup(lookup(&[
            ("FETCH_PACING_MIN_SECS", "0"),
            ("FETCH_PACING_MAX_SECS", "0"),
        ]));
        assert_eq!(pacing, PacingPolicy::None);
        assert_eq!(pacing.next_delay(), Duration::ZERO);
    }

    #[test]
    fn collapsed_pacing_range_is_fixed() {
        let pacing = PacingPolicy::from_lookup(lookup(&[
            ("FETCH_PACING_MIN_SECS", "4"),
            ("FETCH_PACING_MAX_SECS", "2"),
        ]));
        assert_eq!(pacing, PacingPolicy::Fixed(Duration::from_secs(4)));
    }

    #[test]
    fn pacing_range_from_env_is_uniform() {
        let pacing = PacingPolicy::from_lookup(lookup(&[
            ("FETCH_PACING_MIN_SECS", "1"),
            ("FETCH_PACING_MAX_SECS", "2"),
        ]));
        assert_eq!(
            pacing,
            PacingPolicy::Uniform {
                min: Duration::from_secs(1),
                max: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn zero_max_retries_is_clamped_to_one() {
        let p = RetryPolicy::from_lookup(lookup(&[("FETCH_MAX_RETRIES", "0")]));
        assert_eq!(p.max_retries, 1);
    }

    #[test]
    fn retry_settings_fall_back_to_defaults_on_garbage() {
        let p = RetryPolicy::from_lookup(lookup(&[
            ("FETCH_MAX_RETRIES", "many"),
            ("FETCH_RATE_LIMIT_BACKOFF_SECS", "2"),
        ]));
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.rate_limit_base, Duration::from_secs(2));
        assert_eq!(p.timeout_base, Duration::from_secs(5));
    }
}
