//! Runtime configuration, read from the environment once at startup and
//! handed down explicitly. Secrets are only demanded by the operations
//! that need them, so a local run with no database and no mail token can
//! still browse and rank.

use std::path::PathBuf;

use crate::error::{AwardsError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Primary record store; absent means local-file storage only.
    pub database_url: Option<String>,
    /// Root for the local store and the fallback files.
    pub data_dir: PathBuf,
    /// Shared evaluator secret gating lock and review actions.
    pub evaluator_password: Option<String>,
    /// Postmark server token for submission notifications.
    pub postmark_token: Option<String>,
    /// Fixed sender/recipient address for the awards office.
    pub awards_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: read_env("DATABASE_URL"),
            data_dir: read_env("AWARDS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("awards-data")),
            evaluator_password: read_env("EVALUATOR_PASSWORD"),
            postmark_token: read_env("POSTMARK_API_TOKEN"),
            awards_email: read_env("AWARDS_EMAIL"),
        }
    }

    pub fn postmark_token(&self) -> Result<&str> {
        self.postmark_token.as_deref().ok_or_else(|| {
            AwardsError::Config(
                "POSTMARK_API_TOKEN is not set; submissions cannot be emailed".to_string(),
            )
        })
    }

    pub fn awards_email(&self) -> Result<&str> {
        self.awards_email.as_deref().ok_or_else(|| {
            AwardsError::Config(
                "AWARDS_EMAIL is not set; configure the awards office address".to_string(),
            )
        })
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
