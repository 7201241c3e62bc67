use std::env;

use anyhow::{Context, bail};

/// Shortest accepted JWT secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub ai: Option<AiConfig>,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup, so that tests do
    /// not have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = var("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match var("APP_PORT") {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("APP_PORT is not a valid port: {p}"))?,
            None => 3000,
        };

        let jwt = JwtConfig {
            secret: validate_jwt_secret(var("JWT_SECRET"))?,
            ttl_hours: parse_or(var("JWT_TTL_HOURS"), "JWT_TTL_HOURS", 24)?,
        };
        if jwt.ttl_hours <= 0 {
            bail!("JWT_TTL_HOURS must be positive");
        }

        let ai = match var("AI_API_KEY") {
            Some(api_key) => {
                let max_attempts = parse_or(var("AI_MAX_ATTEMPTS"), "AI_MAX_ATTEMPTS", 3)?;
                if max_attempts == 0 {
                    bail!("AI_MAX_ATTEMPTS must be at least 1");
                }
                Some(AiConfig {
                    api_key,
                    base_url: var("AI_BASE_URL")
                        .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                        .trim_end_matches('/')
                        .to_string(),
                    chat_model: var("AI_CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                    embedding_model: var("AI_EMBEDDING_MODEL")
                        .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                    max_attempts,
                })
            }
            None => {
                tracing::warn!("AI_API_KEY not set, generation and chat endpoints are disabled");
                None
            }
        };

        let mail = match (var("MAIL_API_URL"), var("MAIL_API_KEY"), var("MAIL_SENDER")) {
            (Some(api_url), Some(api_key), Some(sender)) => Some(MailConfig {
                api_url,
                api_key,
                sender,
            }),
            (None, None, None) => {
                tracing::warn!("mail relay not configured, newsletter sending is disabled");
                None
            }
            _ => bail!("MAIL_API_URL, MAIL_API_KEY and MAIL_SENDER must be set together"),
        };

        Ok(Self {
            database_url,
            host,
            port,
            cors_origin: var("CORS_ORIGIN"),
            jwt,
            ai,
            mail,
        })
    }
}

fn validate_jwt_secret(secret: Option<String>) -> anyhow::Result<String> {
    let secret = secret.context("JWT_SECRET is not set")?;
    if secret.len() < MIN_JWT_SECRET_LEN {
        bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes long");
    }
    Ok(secret)
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn jwt_secret_is_mandatory() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/pharmia")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/pharmia"),
            ("JWT_SECRET", "secret"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/pharmia"),
            ("JWT_SECRET", SECRET),
        ])
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.jwt.ttl_hours, 24);
        assert!(config.ai.is_none());
        assert!(config.mail.is_none());
    }

    #[test]
    fn ai_settings_are_read_when_key_present() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/pharmia"),
            ("JWT_SECRET", SECRET),
            ("AI_API_KEY", "sk-test"),
            ("AI_BASE_URL", "http://localhost:8080/v1/"),
        ])
        .unwrap();
        let ai = config.ai.unwrap();
        assert_eq!(ai.base_url, "http://localhost:8080/v1");
        assert_eq!(ai.max_attempts, 3);
        assert_eq!(ai.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn partial_mail_settings_are_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/pharmia"),
            ("JWT_SECRET", SECRET),
            ("MAIL_API_URL", "https://mail.example.com/send"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MAIL_API_URL"));
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/pharmia"),
                ("JWT_SECRET", SECRET),
                ("APP_PORT", "not-a-port"),
            ])
            .is_err()
        );
    }
}
