use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// If set, stored objects are served as `{public_base_url}/{key}`.
    /// Otherwise a presigned URL is returned instead.
    pub public_base_url: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub max_image_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    pub restore_model: String,
    pub colorize_model: String,
    pub poll_max_attempts: u32,
    pub poll_initial_delay_ms: u64,
    pub poll_backoff_step_ms: u64,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub replicate: ReplicateConfig,
    /// Free pipeline runs per non-premium user.
    pub trial_limit: i32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "qudely".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "qudely-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "restored-images".into()),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL").ok(),
            signed_url_ttl_secs: env_or("SIGNED_URL_TTL_SECS", 60 * 60 * 24),
            max_image_bytes: env_or("MAX_IMAGE_BYTES", 5 * 1024 * 1024),
        };
        let replicate = ReplicateConfig {
            api_token: std::env::var("REPLICATE_API_TOKEN")?,
            base_url: std::env::var("REPLICATE_BASE_URL")
                .unwrap_or_else(|_| "https://api.replicate.com".into()),
            restore_model: std::env::var("RESTORE_MODEL")
                .unwrap_or_else(|_| "flux-kontext-apps/restore-image".into()),
            colorize_model: std::env::var("COLORIZE_MODEL")
                .unwrap_or_else(|_| "tomekkora/deoldify".into()),
            poll_max_attempts: env_or("POLL_MAX_ATTEMPTS", 30),
            poll_initial_delay_ms: env_or("POLL_INITIAL_DELAY_MS", 1500),
            poll_backoff_step_ms: env_or("POLL_BACKOFF_STEP_MS", 500),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 60),
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            replicate,
            trial_limit: env_or("TRIAL_LIMIT", 2),
        })
    }
}
