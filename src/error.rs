use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArenaError {
    #[error("invalid Riot ID: {0} (expected Name#TAG)")]
    InvalidRiotId(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("request failed, {status}{}", body_suffix(.body))]
    RequestFailed { status: u16, body: String },

    #[error("unexpected response payload: {0}")]
    Decode(String),

    #[error("account not found: {0}")]
    IdentityNotFound(String),

    #[error("no player loaded; run a sync first")]
    NoActiveSession,

    #[error("sync superseded by a newer request")]
    Superseded,

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl ArenaError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ArenaError::Http(_) | ArenaError::RequestFailed { .. } | ArenaError::Decode(_)
        )
    }
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(", {body}")
    }
}

/// Single line of status text shown to the user for a failed operation.
pub fn status_message(error: &ArenaError) -> String {
    match error {
        ArenaError::RequestFailed { status: 429, .. } => {
            "Rate limited by the match service, try again in a minute.".to_string()
        }
        ArenaError::IdentityNotFound(name) => format!("No account found for {name}."),
        ArenaError::Superseded => "Sync cancelled, a newer search replaced it.".to_string(),
        other => other.to_string(),
    }
}
