use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use axum::http::HeaderValue;
use ipnetwork::IpNetwork;
use url::Url;

const MEMORY_STORE: &str = ":memory:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

impl Env {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("staging") => Env::Staging,
            Some("production") => Env::Production,
            _ => Env::Dev,
        }
    }

    /// Read early so logging can be set up before the rest of the config.
    pub fn from_env() -> Self {
        Env::parse(std::env::var("ENVIRONMENT").ok().as_deref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostSourceKind {
    Mock,
    Remote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct RemotePostsConfig {
    pub base_url: Url,
    pub page_size: usize,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub env: Env,
    pub bind_addr: SocketAddr,
    pub post_source: PostSourceKind,
    pub posts_api: RemotePostsConfig,
    pub comments_store: StoreLocation,
    /// Caps the in-process store; appends past it fail like a full disk.
    pub comments_memory_limit: Option<usize>,
    pub submit_delay: Duration,
    pub comment_rate_limit_per_minute: NonZeroU32,
    pub allowed_origin: Option<HeaderValue>,
    /// Proxies whose `X-Forwarded-For` entries are believed. Empty means the
    /// header is ignored and the socket address identifies the client.
    pub trusted_proxies: Vec<IpNetwork>,
}

#[derive(Debug, thiserror::Error)]
#[error("Environment variable `{key}` is invalid: {reason}")]
pub struct ConfigError {
    key: &'static str,
    reason: String,
}

fn invalid(key: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError {
        key,
        reason: reason.to_string(),
    }
}

/// Parses `key` if it is set, falling back to `default` otherwise.
fn parsed_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) if !val.trim().is_empty() => val.trim().parse().map_err(|e| invalid(key, e)),
        _ => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env::parse(lookup("ENVIRONMENT").as_deref());

        let bind_addr = parsed_var(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let post_source = match lookup("POST_SOURCE").as_deref() {
            None | Some("") | Some("mock") => PostSourceKind::Mock,
            Some("remote") => PostSourceKind::Remote,
            Some(other) => {
                return Err(invalid(
                    "POST_SOURCE",
                    format!("expected `mock` or `remote`, got `{other}`"),
                ));
            }
        };

        let base_url = parsed_var(
            &lookup,
            "POSTS_API_BASE_URL",
            Url::parse("https://jsonplaceholder.typicode.com")
                .map_err(|e| invalid("POSTS_API_BASE_URL", e))?,
        )?;
        let page_size: usize = parsed_var(&lookup, "POSTS_PAGE_SIZE", 5)?;
        if page_size == 0 {
            return Err(invalid("POSTS_PAGE_SIZE", "must be at least 1"));
        }
        let timeout_secs: u64 = parsed_var(&lookup, "POSTS_FETCH_TIMEOUT_SECS", 10)?;

        let comments_store = match lookup("COMMENTS_STORE_PATH") {
            Some(path) if path.trim() == MEMORY_STORE => StoreLocation::Memory,
            Some(path) if !path.trim().is_empty() => StoreLocation::File(path.trim().into()),
            _ => StoreLocation::File("blog_comments.json".into()),
        };

        let comments_memory_limit = match lookup("COMMENTS_MEMORY_LIMIT") {
            Some(limit) if !limit.trim().is_empty() => Some(
                limit
                    .trim()
                    .parse()
                    .map_err(|e| invalid("COMMENTS_MEMORY_LIMIT", e))?,
            ),
            _ => None,
        };

        let delay_ms: u64 = parsed_var(&lookup, "COMMENT_SUBMIT_DELAY_MS", 500)?;
        let comment_rate_limit_per_minute = parsed_var(
            &lookup,
            "COMMENT_RATE_LIMIT_PER_MINUTE",
            NonZeroU32::new(10).ok_or_else(|| invalid("COMMENT_RATE_LIMIT_PER_MINUTE", "zero"))?,
        )?;

        let allowed_origin = match lookup("ALLOWED_ORIGIN") {
            Some(origin) if !origin.trim().is_empty() => Some(
                HeaderValue::from_str(origin.trim()).map_err(|e| invalid("ALLOWED_ORIGIN", e))?,
            ),
            _ => None,
        };

        let trusted_proxies = lookup("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.parse::<IpNetwork>().map_err(|e| invalid("TRUSTED_PROXIES", e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServerConfig {
            env,
            bind_addr,
            post_source,
            posts_api: RemotePostsConfig {
                base_url,
                page_size,
                timeout: Duration::from_secs(timeout_secs),
            },
            comments_store,
            comments_memory_limit,
            submit_delay: Duration::from_millis(delay_ms),
            comment_rate_limit_per_minute,
            allowed_origin,
            trusted_proxies,
        })
    }

    pub fn new_from_env() -> Self {
        match Self::from_lookup(|key| std::env::var(key).ok()) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{e}");
                std::process::exit(1)
            }
        }
    }
}
