//! Per-client sliding-window rate limiting for the public endpoints.
//!
//! The limiter fails open: when no backend is configured, or the backend
//! errors, requests are allowed and a single warning is logged for the
//! lifetime of the process.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::RateLimitConfig;

/// Endpoint family a request is counted against. Each has its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePurpose {
    Candidate,
    Client,
    JobApplication,
    SignUrl,
}

impl RatePurpose {
    pub const fn prefix(self) -> &'static str {
        match self {
            RatePurpose::Candidate => "candidate",
            RatePurpose::Client => "client",
            RatePurpose::JobApplication => "job-application",
            RatePurpose::SignUrl => "sign-url",
        }
    }

    pub fn key(self, client_ip: &str) -> String {
        format!("{}:{}", self.prefix(), client_ip)
    }
}

impl fmt::Display for RatePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests.max(1),
            window: Duration::from_secs(config.window_seconds.max(1)),
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 8,
            window: Duration::from_secs(60),
        }
    }
}

/// Verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub key: String,
    pub allowed: bool,
    pub reset_seconds: u64,
}

/// Raw answer from a counting backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendVerdict {
    pub allowed: bool,
    pub reset_after: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit backend unreachable: {0}")]
    Transport(String),
    #[error("rate limit backend returned an unexpected reply: {0}")]
    Protocol(String),
}

/// Check-and-increment against a shared sliding-window counter.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn hit(&self, key: &str, policy: RateLimitPolicy)
        -> Result<BackendVerdict, RateLimitError>;
}

/// Process-wide limiter handle. Build it once at startup and share it.
pub struct RateLimiter {
    backend: Option<Arc<dyn RateLimitBackend>>,
    policy: RateLimitPolicy,
    trust_proxy_headers: bool,
    warned: AtomicBool,
}

impl RateLimiter {
    pub fn new(backend: Option<Arc<dyn RateLimitBackend>>, policy: RateLimitPolicy) -> Self {
        Self {
            backend,
            policy,
            trust_proxy_headers: false,
            warned: AtomicBool::new(false),
        }
    }

    /// Count callers by `X-Forwarded-For`/`X-Real-IP` instead of the socket peer.
    /// Only safe when a proxy in front overwrites those headers.
    pub fn trusting_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Address a request is counted against.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_ip(headers, peer, self.trust_proxy_headers)
    }

    /// A limiter with no backend; every request is allowed.
    pub fn disabled(policy: RateLimitPolicy) -> Self {
        Self::new(None, policy)
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub async fn check(&self, purpose: RatePurpose, client_ip: &str) -> RateLimitDecision {
        let key = purpose.key(client_ip);

        let Some(backend) = &self.backend else {
            self.warn_once("no rate limit backend configured");
            return self.open(key);
        };

        match backend.hit(&key, self.policy).await {
            Ok(verdict) => {
                if !verdict.allowed {
                    tracing::info!(purpose = %purpose, "rate limit exceeded");
                }
                RateLimitDecision {
                    key,
                    allowed: verdict.allowed,
                    reset_seconds: ceil_seconds(verdict.reset_after),
                }
            }
            Err(error) => {
                self.warn_once(&error.to_string());
                self.open(key)
            }
        }
    }

    /// True once the fail-open warning has been emitted.
    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }

    fn open(&self, key: String) -> RateLimitDecision {
        RateLimitDecision {
            key,
            allowed: true,
            reset_seconds: 0,
        }
    }

    fn warn_once(&self, reason: &str) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(reason, "rate limiting disabled, allowing requests");
        }
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Sliding log kept in process memory. Only suitable for single-instance deployments.
///
/// Keys idle for a whole window are swept at most once per window, so the map
/// stays bounded by the callers seen in the last window.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    hits: DashMap<String, VecDeque<Instant>>,
    last_sweep: Mutex<Option<Instant>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_at(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> BackendVerdict {
        let verdict = self.record(key, policy, now);
        self.sweep(now, policy.window);
        verdict
    }

    fn record(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> BackendVerdict {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        let log = entry.value_mut();

        while let Some(oldest) = log.front() {
            if now.duration_since(*oldest) >= policy.window {
                log.pop_front();
            } else {
                break;
            }
        }

        let allowed = log.len() < policy.max_requests as usize;
        if allowed {
            log.push_back(now);
        }

        let reset_after = log
            .front()
            .map(|oldest| policy.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(policy.window);

        BackendVerdict {
            allowed,
            reset_after,
        }
    }

    // Must run with no entry guard held; `retain` locks every shard.
    fn sweep(&self, now: Instant, window: Duration) {
        let due = match self.last_sweep.lock() {
            Ok(mut last) => {
                let fresh = last.is_some_and(|at| now.saturating_duration_since(at) < window);
                if !fresh {
                    *last = Some(now);
                }
                !fresh
            }
            Err(_) => false,
        };
        if due {
            self.hits.retain(|_, log| {
                log.back()
                    .is_some_and(|latest| now.saturating_duration_since(*latest) < window)
            });
        }
    }

    /// Number of caller keys currently held.
    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn hit(
        &self,
        key: &str,
        policy: RateLimitPolicy,
    ) -> Result<BackendVerdict, RateLimitError> {
        Ok(self.hit_at(key, policy, Instant::now()))
    }
}

/// Caller address. Forwarding headers are client-controlled, so they are read only
/// when `trust_proxy_headers` is set; otherwise the socket peer is used.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    let peer_ip = || peer.map(|addr| addr.ip().to_string());
    if !trust_proxy_headers {
        return peer_ip().unwrap_or_else(|| "unknown".to_string());
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(peer_ip)
        .unwrap_or_else(|| "unknown".to_string())
}
