use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub supabase: Option<SupabaseConfig>,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
    pub email: EmailConfig,
    pub identity: IdentityConfig,
    pub admin: AdminConfig,
    pub replication: Option<ReplicationConfig>,
    pub error_webhook_url: Option<String>,
    pub forms: FormsConfig,
    pub company: CompanyProfile,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let json_logs = optional_var("APP_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let supabase = match (
            optional_var("SUPABASE_URL"),
            optional_var("SUPABASE_SERVICE_ROLE_KEY"),
        ) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => None,
        };

        let upstash = match (
            optional_var("UPSTASH_REDIS_REST_URL"),
            optional_var("UPSTASH_REDIS_REST_TOKEN"),
        ) {
            (Some(url), Some(token)) => Some(UpstashConfig {
                url: url.trim_end_matches('/').to_string(),
                token,
            }),
            _ => None,
        };

        let replication = optional_var("REPLICATION_URL").map(|url| ReplicationConfig {
            url: url.trim_end_matches('/').to_string(),
            api_key: optional_var("REPLICATION_API_KEY"),
        });

        let company = CompanyProfile {
            name: optional_var("COMPANY_NAME").unwrap_or_else(|| "Bluecrew AS".to_string()),
            org_number: optional_var("COMPANY_ORG_NUMBER"),
            address: optional_var("COMPANY_ADDRESS").unwrap_or_else(|| "Norge".to_string()),
            contact_email: optional_var("COMPANY_CONTACT_EMAIL")
                .unwrap_or_else(|| "post@bluecrew.no".to_string()),
            privacy_url: optional_var("COMPANY_PRIVACY_URL")
                .unwrap_or_else(|| "https://bluecrew.no/personvern".to_string()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                json: json_logs,
            },
            supabase,
            storage: StorageConfig {
                bucket: optional_var("STORAGE_BUCKET")
                    .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                signed_url_ttl_seconds: number_var("SIGNED_URL_TTL_SECONDS", 600)?,
            },
            rate_limit: RateLimitConfig {
                upstash,
                in_memory: flag_var("RATE_LIMIT_IN_MEMORY", false)?,
                trust_proxy_headers: flag_var("TRUST_PROXY_HEADERS", false)?,
                max_requests: number_var("RATE_LIMIT_MAX", 8)?,
                window_seconds: number_var("RATE_LIMIT_WINDOW_SECONDS", 60)?,
            },
            email: EmailConfig {
                api_key: optional_var("RESEND_API_KEY"),
                from: optional_var("EMAIL_FROM"),
                to: optional_var("EMAIL_TO")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|address| !address.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                disabled: flag_var("EMAIL_DISABLED", false)?,
            },
            identity: IdentityConfig {
                client_id: optional_var("VIPPS_CLIENT_ID"),
                client_secret: optional_var("VIPPS_CLIENT_SECRET"),
                subscription_key: optional_var("VIPPS_SUBSCRIPTION_KEY"),
                session_url: optional_var("IDENTITY_SESSION_URL"),
                login_path: optional_var("IDENTITY_LOGIN_PATH")
                    .unwrap_or_else(|| "/api/vipps/login".to_string()),
                verification_optional: flag_var("IDENTITY_VERIFICATION_OPTIONAL", false)?,
            },
            admin: AdminConfig {
                sign_token: optional_var("ADMIN_SIGN_TOKEN"),
                debug_key: optional_var("DEBUG_KEY"),
            },
            replication,
            error_webhook_url: optional_var("ERROR_WEBHOOK_URL"),
            forms: FormsConfig {
                candidate_form_certs_required: flag_var("CANDIDATE_FORM_CERTS_REQUIRED", false)?,
                candidate_self_service_certs_required: flag_var(
                    "CANDIDATE_SELF_SERVICE_CERTS_REQUIRED",
                    true,
                )?,
            },
            company,
        })
    }
}

/// The configuration `load` produces with an empty environment.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                json: false,
            },
            supabase: None,
            storage: StorageConfig {
                bucket: DEFAULT_BUCKET.to_string(),
                signed_url_ttl_seconds: 600,
            },
            rate_limit: RateLimitConfig {
                upstash: None,
                in_memory: false,
                trust_proxy_headers: false,
                max_requests: 8,
                window_seconds: 60,
            },
            email: EmailConfig {
                api_key: None,
                from: None,
                to: Vec::new(),
                disabled: false,
            },
            identity: IdentityConfig {
                client_id: None,
                client_secret: None,
                subscription_key: None,
                session_url: None,
                login_path: "/api/vipps/login".to_string(),
                verification_optional: false,
            },
            admin: AdminConfig {
                sign_token: None,
                debug_key: None,
            },
            replication: None,
            error_webhook_url: None,
            forms: FormsConfig {
                candidate_form_certs_required: false,
                candidate_self_service_certs_required: true,
            },
            company: CompanyProfile {
                name: "Bluecrew AS".to_string(),
                org_number: None,
                address: "Norge".to_string(),
                contact_email: "post@bluecrew.no".to_string(),
                privacy_url: "https://bluecrew.no/personvern".to_string(),
            },
        }
    }
}

pub const DEFAULT_BUCKET: &str = "candidates-private";

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn flag_var(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = optional_var(key) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key, value: raw }),
    }
}

fn number_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
}

/// Managed Postgres/object-store project credentials.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub signed_url_ttl_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct UpstashConfig {
    pub url: String,
    pub token: String,
}

/// Submission rate-limit policy and the backend holding the counters.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub upstash: Option<UpstashConfig>,
    /// Single-instance deployments may count in process instead of in Redis.
    pub in_memory: bool,
    /// Set only behind a proxy that overwrites `X-Forwarded-For`.
    pub trust_proxy_headers: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub subscription_key: Option<String>,
    pub session_url: Option<String>,
    pub login_path: String,
    /// Soft mode: forms render and submit without a verified session.
    pub verification_optional: bool,
}

impl IdentityConfig {
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.subscription_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub sign_token: Option<String>,
    pub debug_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// Per-entry-point document requirements for candidate registration.
#[derive(Debug, Clone, Copy)]
pub struct FormsConfig {
    pub candidate_form_certs_required: bool,
    pub candidate_self_service_certs_required: bool,
}

/// Organisation details printed in the footer of every outgoing email.
#[derive(Debug, Clone)]
pub struct CompanyProfile {
    pub name: String,
    pub org_number: Option<String>,
    pub address: String,
    pub contact_email: String,
    pub privacy_url: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { key: &'static str, value: String },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be true/false (found '{value}')")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive number (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
