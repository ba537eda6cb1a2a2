use std::collections::BTreeMap;
use std::error::Error as _;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};
use url::Url;

use super::{ProbeRequest, ProbeResponse, ResponseBody, TransportError, TransportErrorKind};
use crate::config::{ApiKeyPlacement, AuthConfig, TransportConfig, USER_AGENT};
use crate::error::ProbeError;

/// Global pacing: at most one send per `min_interval`.
///
/// Holding the lock across the wait serializes callers, so pacing stays correct even if
/// probes are ever issued concurrently.
pub struct RateLimiter {
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last_sent = self.last_sent.lock().await;
        if let Some(previous) = *last_sent {
            match previous.checked_add(self.min_interval) {
                Some(next_slot) if next_slot > Instant::now() => sleep_until(next_slot).await,
                Some(_) => {}
                None => sleep(self.min_interval).await,
            }
        }
        *last_sent = Some(Instant::now());
    }
}

/// Executes probe requests with timeout, retry and rate limiting. Never fails: every
/// outcome, including transport errors, is a `ProbeResponse`.
pub struct TransportClient {
    client: reqwest::Client,
    config: TransportConfig,
    auth: Option<AuthConfig>,
    limiter: RateLimiter,
}

impl TransportClient {
    pub fn new(config: TransportConfig, auth: Option<AuthConfig>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .build()?;
        let limiter = RateLimiter::new(config.min_interval());

        Ok(Self {
            client,
            config,
            auth,
            limiter,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 2xx and 4xx return at once; 5xx and transport errors are retried with linear
    /// backoff until `retries` is spent.
    pub async fn send(&self, request: &ProbeRequest) -> ProbeResponse {
        let max_attempts = self.config.retries.saturating_add(1);
        let mut last_failure: Option<(TransportError, f64)> = None;

        for attempt in 1..=max_attempts {
            self.limiter.acquire().await;
            debug!(
                "{} {} (attempt {}/{})",
                request.method, request.url, attempt, max_attempts
            );

            let retry_left = attempt < max_attempts;
            match self.attempt(request).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    let server_error = matches!(response.status, Some(s) if (500..600).contains(&s));
                    if !(server_error && retry_left) {
                        return response;
                    }
                    warn!(
                        "{} {} returned {:?}, retrying",
                        request.method, request.url, response.status
                    );
                }
                Err((error, latency_ms)) => {
                    if retry_left {
                        warn!(
                            "{} {} failed ({}), retrying",
                            request.method, request.url, error.message
                        );
                    }
                    last_failure = Some((error, latency_ms));
                }
            }

            if retry_left {
                sleep(self.config.retry_delay(attempt)).await;
            }
        }

        let (error, latency_ms) = last_failure.unwrap_or_else(|| {
            (
                TransportError {
                    kind: TransportErrorKind::Other,
                    message: "no attempt was made".to_string(),
                },
                0.0,
            )
        });
        warn!(
            "{} {} gave up after {} attempt(s): {}",
            request.method, request.url, max_attempts, error.message
        );
        ProbeResponse::transport_failure(error, latency_ms, max_attempts)
    }

    async fn attempt(
        &self,
        request: &ProbeRequest,
    ) -> Result<ProbeResponse, (TransportError, f64)> {
        let url = self.request_url(request).map_err(|e| {
            (
                TransportError {
                    kind: TransportErrorKind::Other,
                    message: e.to_string(),
                },
                0.0,
            )
        })?;

        let mut builder = self
            .client
            .request(request.method.to_reqwest(), url)
            .timeout(self.config.timeout());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.omits_auth() {
            builder = self.apply_auth(builder);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_payload());
        }

        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_secs_f64() * 1000.0;

        let response = builder
            .send()
            .await
            .map_err(|e| (classify(&e), elapsed_ms(started)))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| (classify(&e), elapsed_ms(started)))?;

        Ok(ProbeResponse {
            status: Some(status),
            headers,
            body: ResponseBody::from_bytes(&bytes),
            latency_ms: elapsed_ms(started),
            timed_out: false,
            error: None,
            attempts: 1,
        })
    }

    /// The only place where credentials meet a request.
    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(AuthConfig::Bearer { token }) => builder.bearer_auth(token),
            Some(AuthConfig::ApiKey {
                key,
                placement: ApiKeyPlacement::Header(header),
            }) => builder.header(header.as_str(), key.as_str()),
            Some(AuthConfig::Basic { username, password }) => {
                builder.basic_auth(username, password.as_ref())
            }
            // Query keys are added to the URL.
            Some(AuthConfig::ApiKey {
                placement: ApiKeyPlacement::Query(_),
                ..
            })
            | None => builder,
        }
    }

    fn request_url(&self, request: &ProbeRequest) -> Result<Url, ProbeError> {
        let mut url = Url::parse(&request.url)?;

        let mut pairs: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(AuthConfig::ApiKey {
            key,
            placement: ApiKeyPlacement::Query(param),
        }) = &self.auth
        {
            if !request.omits_auth() {
                pairs.push((param.as_str(), key.as_str()));
            }
        }

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}

fn classify(error: &reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };

    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    TransportError { kind, message }
}
