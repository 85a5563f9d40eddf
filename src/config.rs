use anyhow::Context;
use serde::Deserialize;

/// Deployment environment; drives cookie attributes and error verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => AppEnv::Production,
            _ => AppEnv::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == AppEnv::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3/MinIO settings for the audio sample bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: AppEnv,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cors_origin: String,
    /// Report unknown usernames and wrong passwords as different errors on login.
    pub login_distinct_errors: bool,
    pub storage: Option<StorageConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET")
                .context("ACCESS_TOKEN_SECRET is not set")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")
                .context("REFRESH_TOKEN_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "voiceauth"),
            audience: env_or("JWT_AUDIENCE", "voiceauth-users"),
            access_ttl_minutes: env_i64("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_i64("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 10),
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
        );
        anyhow::ensure!(
            jwt.access_ttl_minutes > 0 && jwt.refresh_ttl_minutes > 0,
            "token TTLs must be positive"
        );

        let storage = match (std::env::var("S3_ENDPOINT"), std::env::var("S3_BUCKET")) {
            (Ok(endpoint), Ok(bucket)) => Some(StorageConfig {
                endpoint,
                bucket,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
                region: env_or("S3_REGION", "us-east-1"),
            }),
            _ => None,
        };

        Ok(Self {
            env: AppEnv::parse(&env_or("APP_ENV", "development")),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt,
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            login_distinct_errors: env_bool("LOGIN_DISTINCT_ERRORS"),
            storage,
        })
    }

    /// Configuration for tests and local experiments: in-memory backends, dev cookies.
    pub fn for_tests() -> Self {
        Self {
            env: AppEnv::Development,
            database_url: None,
            jwt: JwtConfig {
                access_secret: "test-access-secret".into(),
                refresh_secret: "test-refresh-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                access_ttl_minutes: 15,
                refresh_ttl_minutes: 60 * 24 * 10,
            },
            cors_origin: "http://localhost:5173".into(),
            login_distinct_errors: false,
            storage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_parses_loosely() {
        assert_eq!(AppEnv::parse("production"), AppEnv::Production);
        assert_eq!(AppEnv::parse(" PROD "), AppEnv::Production);
        assert_eq!(AppEnv::parse("development"), AppEnv::Development);
        assert_eq!(AppEnv::parse("staging"), AppEnv::Development);
    }

    #[test]
    fn test_config_uses_distinct_secrets() {
        let cfg = AppConfig::for_tests();
        assert_ne!(cfg.jwt.access_secret, cfg.jwt.refresh_secret);
        assert_eq!(cfg.jwt.access_ttl_minutes, 15);
        assert_eq!(cfg.jwt.refresh_ttl_minutes, 14_400);
    }
}
