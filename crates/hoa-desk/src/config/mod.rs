use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Longest accepted bearer-token lifetime (ten years).
pub const MAX_TOKEN_TTL_HOURS: i64 = 87_600;

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
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub billing: BillingConfig,
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

        let data_path = match env::var("HOA_DATA_PATH") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => Some(PathBuf::from("storage/hoa-desk.json")),
        };

        let storage = StorageConfig {
            data_path,
            root: env::var("HOA_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("storage/app/public")),
            public_url: env::var("HOA_PUBLIC_URL").unwrap_or_else(|_| "/storage".to_string()),
            max_upload_bytes: numeric_var("HOA_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        };

        let bootstrap_admin = match (env::var("HOA_ADMIN_EMAIL"), env::var("HOA_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.trim().is_empty() => Some(BootstrapAdmin {
                name: env::var("HOA_ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        let auth = AuthConfig {
            token_ttl_hours: bounded_var("HOA_TOKEN_TTL_HOURS", 168, 1, MAX_TOKEN_TTL_HOURS)?,
            bootstrap_admin,
        };

        let billing = BillingConfig {
            invoice_prefix: env::var("HOA_INVOICE_PREFIX").unwrap_or_else(|_| "INV".to_string()),
            invoice_due_days: numeric_var("HOA_INVOICE_DUE_DAYS", 15)?,
            late_fee_bps: numeric_var("HOA_LATE_FEE_BPS", 500)?,
            penalty_grace_days: numeric_var("HOA_PENALTY_GRACE_DAYS", 0)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            auth,
            billing,
        })
    }
}

fn numeric_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(default),
    }
}

fn bounded_var(key: &'static str, default: i64, min: i64, max: i64) -> Result<i64, ConfigError> {
    let value = numeric_var(key, default)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange { key, min, max })
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
}

/// Where records and uploaded files live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// JSON snapshot of the database; `None` keeps everything in memory.
    pub data_path: Option<PathBuf>,
    /// Root of the public disk.
    pub root: PathBuf,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Credentials for the first administrator, created when no admin exists yet.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Invoice numbering, due dates and late-payment penalties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    pub invoice_prefix: String,
    pub invoice_due_days: u32,
    /// Late penalty in basis points of the invoice amount.
    pub late_fee_bps: u32,
    pub penalty_grace_days: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            invoice_due_days: 15,
            late_fee_bps: 500,
            penalty_grace_days: 0,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    OutOfRange { key: &'static str, min: i64, max: i64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative whole number")
            }
            ConfigError::OutOfRange { key, min, max } => {
                write!(f, "{key} must be between {min} and {max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
