use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Conformance prober: checks that a live API behaves as its OpenAPI document says.
#[derive(Parser, Debug, Clone)]
#[command(name = "conformance-prober")]
pub struct CliArgs {
    /// Path to the normalized API document (JSON)
    #[arg(short = 's', long = "spec")]
    pub spec_file: PathBuf,

    /// Base URL of the live server (overrides the document's base URL)
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Retries after the first attempt (5xx and transport failures only)
    #[arg(long = "retries", default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Base delay for linear retry backoff, in milliseconds
    #[arg(long = "retry-delay-ms", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Global request rate limit
    #[arg(long = "rps", default_value_t = DEFAULT_REQUESTS_PER_SECOND)]
    pub requests_per_second: f64,

    /// Allow malformation tests against DELETE/PUT/PATCH operations without a body
    #[arg(long = "sandbox")]
    pub sandbox: bool,

    /// Only run the baseline request for each operation
    #[arg(long = "skip-malformations")]
    pub skip_malformations: bool,

    /// Bearer token sent as `Authorization: Bearer <token>`
    #[arg(long = "bearer-token")]
    pub bearer_token: Option<String>,

    /// API key value
    #[arg(long = "api-key")]
    pub api_key: Option<String>,

    /// Header carrying the API key
    #[arg(long = "api-key-header", default_value = DEFAULT_API_KEY_HEADER)]
    pub api_key_header: String,

    /// Send the API key as this query parameter instead of a header
    #[arg(long = "api-key-query")]
    pub api_key_query: Option<String>,

    /// Basic auth username
    #[arg(long = "basic-user")]
    pub basic_user: Option<String>,

    /// Basic auth password
    #[arg(long = "basic-password")]
    pub basic_password: Option<String>,
}

// Transport constants
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;
pub const USER_AGENT: &str = concat!("conformance-prober/", env!("CARGO_PKG_VERSION"));

// Auth constants
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub requests_per_second: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Minimum spacing between two sends; zero when rate limiting is off, saturating
    /// for rates too small to represent.
    pub fn min_interval(&self) -> Duration {
        if self.requests_per_second > 0.0 && self.requests_per_second.is_finite() {
            Duration::try_from_secs_f64(1.0 / self.requests_per_second)
                .unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(attempt as u64))
    }
}

/// Where an API key travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "in", content = "name", rename_all = "lowercase")]
pub enum ApiKeyPlacement {
    Header(String),
    Query(String),
}

/// Credentials attached to every request except `missing-auth` probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
        placement: ApiKeyPlacement,
    },
    Basic {
        username: String,
        password: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub base_url: String,
    pub transport: TransportConfig,
    pub auth: Option<AuthConfig>,
    pub sandbox: bool,
    pub include_malformations: bool,
}

impl ProberConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: TransportConfig::default(),
            auth: None,
            sandbox: false,
            include_malformations: true,
        }
    }

    /// Build the runtime config. `fallback_base_url` comes from the API document and is
    /// used only when no `--base-url` was given.
    pub fn from_args(args: &CliArgs, fallback_base_url: Option<&str>) -> Option<Self> {
        let base_url = args
            .base_url
            .clone()
            .or_else(|| fallback_base_url.map(str::to_string))?;

        Some(ProberConfig {
            base_url,
            transport: TransportConfig {
                timeout_ms: args.timeout_ms,
                retries: args.retries,
                retry_delay_ms: args.retry_delay_ms,
                requests_per_second: args.requests_per_second,
            },
            auth: auth_from_args(args),
            sandbox: args.sandbox,
            include_malformations: !args.skip_malformations,
        })
    }
}

/// Bearer wins over API key, API key over basic auth.
fn auth_from_args(args: &CliArgs) -> Option<AuthConfig> {
    if let Some(token) = &args.bearer_token {
        return Some(AuthConfig::Bearer {
            token: token.clone(),
        });
    }
    if let Some(key) = &args.api_key {
        let placement = match &args.api_key_query {
            Some(param) => ApiKeyPlacement::Query(param.clone()),
            None => ApiKeyPlacement::Header(args.api_key_header.clone()),
        };
        return Some(AuthConfig::ApiKey {
            key: key.clone(),
            placement,
        });
    }
    args.basic_user.as_ref().map(|username| AuthConfig::Basic {
        username: username.clone(),
        password: args.basic_password.clone(),
    })
}
