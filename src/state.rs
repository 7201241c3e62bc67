use std::sync::Arc;

use crate::{
    ai::{AiClient, AiError, OpenAiClient, RetryPolicy},
    config::{AppConfig, JwtConfig},
    db::{DbPool, OrmConn, pool_of},
    error::{AppError, AppResult},
    mail::{HttpMailer, Mailer},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub jwt: JwtConfig,
    pub ai: Option<Arc<dyn AiClient>>,
    pub ai_retry: RetryPolicy,
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    pub fn from_config(orm: OrmConn, config: &AppConfig) -> anyhow::Result<Self> {
        let ai: Option<Arc<dyn AiClient>> = match &config.ai {
            Some(ai) => Some(Arc::new(OpenAiClient::new(ai)?)),
            None => None,
        };
        let mailer: Option<Arc<dyn Mailer>> = match &config.mail {
            Some(mail) => Some(Arc::new(HttpMailer::new(mail.clone())?)),
            None => None,
        };
        let ai_retry = config
            .ai
            .as_ref()
            .map(|ai| RetryPolicy::new(ai.max_attempts))
            .unwrap_or_default();

        Ok(Self {
            pool: pool_of(&orm),
            orm,
            jwt: config.jwt.clone(),
            ai,
            ai_retry,
            mailer,
        })
    }

    pub fn ai(&self) -> AppResult<&dyn AiClient> {
        self.ai
            .as_deref()
            .ok_or(AppError::Ai(AiError::NotConfigured))
    }

    pub fn mailer(&self) -> AppResult<&dyn Mailer> {
        self.mailer
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("mail delivery is not configured".into()))
    }
}
