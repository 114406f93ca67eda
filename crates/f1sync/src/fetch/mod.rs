//! Upstream reads with retry, rate-limit handling and throttling
//!
//! [`Fetcher::fetch`] never fails: when the retry budget runs out it logs and
//! returns an absent payload, which callers treat as "no data this cycle".

use crate::config::FetchConfig;
use crate::error::Result;
use crate::model::EntityType;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub mod policy;
pub mod sleeper;

pub use policy::{Backoff, RetryPolicy, Step};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

/// Ordered query-string filters, e.g. `meeting_key=1253`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.0.push((name.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&joined.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Succeeded,
    Exhausted { last_error: String },
}

/// How a fetch went, independent of what it returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Requests that counted against the retry budget
    pub attempts: u32,
    /// 429 responses waited out
    pub rate_limit_waits: u32,
    pub status: FetchStatus,
}

impl FetchOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == FetchStatus::Succeeded
    }
}

/// Payload plus outcome. `records` is `None` only when the fetch was exhausted.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub records: Option<Vec<Value>>,
    pub outcome: FetchOutcome,
}

impl Fetched {
    /// Records, or an empty list when nothing could be fetched
    pub fn into_records(self) -> Vec<Value> {
        self.records.unwrap_or_default()
    }
}

/// Anything that can answer entity queries; the graph walker depends on this
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, entity: EntityType, params: &QueryParams) -> Fetched;
}

enum AttemptError {
    RateLimited(Option<Duration>),
    Failed(String),
}

/// HTTP client for the OpenF1 API
pub struct Fetcher {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("f1sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            RetryPolicy::from_config(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, url: &str, params: &QueryParams) -> std::result::Result<Vec<Value>, AttemptError> {
        let response = self
            .client
            .get(url)
            .query(params.pairs())
            .send()
            .await
            .map_err(|e| AttemptError::Failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let hint = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(policy::parse_retry_after);
            return Err(AttemptError::RateLimited(hint));
        }
        if !status.is_success() {
            return Err(AttemptError::Failed(format!("HTTP error: {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Failed(format!("invalid JSON body: {}", e)))?;

        match body {
            Value::Array(records) => Ok(records),
            other => {
                warn!(url, body = %other, "Expected a JSON array, treating as no records");
                Ok(Vec::new())
            },
        }
    }

    async fn fetch_with_retry(&self, entity: EntityType, params: &QueryParams) -> Fetched {
        let url = format!("{}/{}", self.base_url, entity.api_path());
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;

        let result = loop {
            match self.attempt(&url, params).await {
                Ok(records) => break Ok(records),
                Err(AttemptError::RateLimited(hint)) => {
                    match self.policy.after_rate_limit(rate_limit_waits, hint) {
                        Step::Wait(wait) => {
                            rate_limit_waits += 1;
                            info!(%entity, %params, wait_secs = wait.as_secs_f64(), "Rate limited, waiting");
                            self.sleeper.sleep(wait).await;
                        },
                        Step::GiveUp => {
                            break Err(format!("still rate limited after {} waits", rate_limit_waits))
                        },
                    }
                },
                Err(AttemptError::Failed(reason)) => {
                    failures += 1;
                    warn!(
                        %entity,
                        %params,
                        attempt = failures,
                        max_attempts = self.policy.max_attempts,
                        error = %reason,
                        "Fetch attempt failed"
                    );
                    match self.policy.after_failure(failures) {
                        Step::Wait(wait) => self.sleeper.sleep(wait).await,
                        Step::GiveUp => break Err(reason),
                    }
                },
            }
        };

        let attempts = match &result {
            Ok(_) => failures + 1,
            Err(_) => failures,
        };

        match result {
            Ok(records) => {
                debug!(%entity, %params, records = records.len(), attempts, "Fetched");
                Fetched {
                    records: Some(records),
                    outcome: FetchOutcome {
                        attempts,
                        rate_limit_waits,
                        status: FetchStatus::Succeeded,
                    },
                }
            },
            Err(last_error) => {
                error!(%entity, %params, attempts, error = %last_error, "Giving up on fetch");
                Fetched {
                    records: None,
                    outcome: FetchOutcome {
                        attempts,
                        rate_limit_waits,
                        status: FetchStatus::Exhausted { last_error },
                    },
                }
            },
        }
    }
}

#[async_trait]
impl RecordSource for Fetcher {
    #[instrument(skip(self, params), fields(params = %params))]
    async fn fetch(&self, entity: EntityType, params: &QueryParams) -> Fetched {
        let fetched = self.fetch_with_retry(entity, params).await;
        self.sleeper.sleep(self.policy.throttle).await;
        fetched
    }
}
