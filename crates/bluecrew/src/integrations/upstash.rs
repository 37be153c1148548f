//! Sliding-window counter in Upstash Redis, driven over its REST API.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{error_body, trim_base};
use crate::config::UpstashConfig;
use crate::intake::rate_limit::{BackendVerdict, RateLimitBackend, RateLimitError, RateLimitPolicy};

/// Atomic sliding log: trim, count, maybe add, and report ms until the oldest hit expires.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local allowed = 0
if redis.call('ZCARD', key) < limit then
  redis.call('ZADD', key, now, ARGV[4])
  allowed = 1
end
redis.call('PEXPIRE', key, window)
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local reset = window
if oldest[2] then
  reset = tonumber(oldest[2]) + window - now
end
return {allowed, reset}
"#;

const KEY_PREFIX: &str = "bluecrew:ratelimit";

pub struct UpstashRateLimiter {
    http: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UpstashReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashRateLimiter {
    pub fn new(http: reqwest::Client, config: &UpstashConfig) -> Self {
        Self {
            http,
            url: trim_base(&config.url).to_string(),
            token: config.token.clone(),
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

fn parse_verdict(reply: UpstashReply) -> Result<BackendVerdict, RateLimitError> {
    if let Some(error) = reply.error {
        return Err(RateLimitError::Protocol(error));
    }
    let values = reply
        .result
        .as_ref()
        .and_then(Value::as_array)
        .ok_or_else(|| RateLimitError::Protocol("missing result array".to_string()))?;

    let allowed = values.first().and_then(Value::as_i64);
    let reset_ms = values.get(1).and_then(Value::as_i64);
    match (allowed, reset_ms) {
        (Some(allowed), Some(reset_ms)) => Ok(BackendVerdict {
            allowed: allowed == 1,
            reset_after: Duration::from_millis(reset_ms.max(0) as u64),
        }),
        _ => Err(RateLimitError::Protocol(format!(
            "unexpected result: {}",
            Value::Array(values.clone())
        ))),
    }
}

#[async_trait]
impl RateLimitBackend for UpstashRateLimiter {
    fn name(&self) -> &'static str {
        "upstash"
    }

    async fn hit(
        &self,
        key: &str,
        policy: RateLimitPolicy,
    ) -> Result<BackendVerdict, RateLimitError> {
        let command = json!([
            "EVAL",
            SLIDING_WINDOW_SCRIPT,
            "1",
            format!("{KEY_PREFIX}:{key}"),
            now_millis().to_string(),
            policy.window.as_millis().to_string(),
            policy.max_requests.to_string(),
            Uuid::new_v4().to_string(),
        ]);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|error| RateLimitError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateLimitError::Transport(format!(
                "status {status}: {}",
                error_body(response).await
            )));
        }

        let reply: UpstashReply = response
            .json()
            .await
            .map_err(|error| RateLimitError::Protocol(error.to_string()))?;
        parse_verdict(reply)
    }
}
