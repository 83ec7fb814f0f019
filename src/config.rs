use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Fixed window from creation to forced expiry.
    pub message_ttl: chrono::Duration,
    /// Wait after detected full delivery before the payload is removed,
    /// absorbing the delivering client's local persistence lag.
    pub deletion_grace: Duration,
    pub sweep_interval: Duration,
    pub sweep_batch_size: i64,
    pub s3: Option<S3Config>,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let port = env_parse("PORT", 3000u16);

        let ttl_days: i64 = env_parse("MESSAGE_TTL_DAYS", 7);
        if ttl_days <= 0 {
            return Err(AppError::Config("MESSAGE_TTL_DAYS must be positive".into()));
        }
        let deletion_grace = Duration::from_secs(env_parse("DELETION_GRACE_SECS", 30u64));
        let sweep_interval = Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 3600u64));
        let sweep_batch_size: i64 = env_parse("SWEEP_BATCH_SIZE", 200);
        if sweep_batch_size <= 0 {
            return Err(AppError::Config("SWEEP_BATCH_SIZE must be positive".into()));
        }

        let s3 = match env::var("S3_BUCKET") {
            Ok(bucket) if !bucket.trim().is_empty() => Some(S3Config {
                bucket,
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
                access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            port,
            message_ttl: chrono::Duration::days(ttl_days),
            deletion_grace,
            sweep_interval,
            sweep_batch_size,
            s3,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3000,
            message_ttl: chrono::Duration::days(7),
            deletion_grace: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(3600),
            sweep_batch_size: 200,
            s3: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = Config::test_defaults();
        assert_eq!(cfg.message_ttl, chrono::Duration::days(7));
        assert_eq!(cfg.deletion_grace, Duration::from_secs(30));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        // key that is never set
        assert_eq!(env_parse("CHAT_SERVICE_TEST_UNSET_KEY", 42u64), 42);
    }
}
