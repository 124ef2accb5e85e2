use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LamError {
    #[error("account already exists: {0}")]
    DuplicateAccount(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("{0}")]
    RemoteLookup(String),

    #[error("{message}")]
    RemoteStatus { status: u16, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("account registry has not been hydrated yet")]
    NotHydrated,

    #[error("invalid Riot ID (expected GameName#TAG): {0}")]
    InvalidRiotId(String),

    #[error("invalid account line (expected username--gamename#tag--password): {0}")]
    InvalidDescriptor(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("password is required")]
    MissingPassword,

    #[error("missing Riot API key (set RIOT_API_KEY or api_key in lam.json)")]
    MissingApiKey,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl LamError {
    /// Transport and status failures coming back from the Riot API.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            LamError::RemoteLookup(_) | LamError::RemoteStatus { .. }
        )
    }

    /// Stable category name, used in import reports and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            LamError::DuplicateAccount(_) => "DuplicateAccount",
            LamError::AccountNotFound(_) => "AccountNotFound",
            LamError::RemoteLookup(_) | LamError::RemoteStatus { .. } => "RemoteLookupFailure",
            LamError::Storage(_) | LamError::NotHydrated => "StorageFailure",
            LamError::InvalidRiotId(_)
            | LamError::InvalidDescriptor(_)
            | LamError::InvalidRegion(_)
            | LamError::InvalidUsername(_)
            | LamError::MissingPassword => "InvalidInput",
            LamError::MissingApiKey | LamError::ConfigRead(_) | LamError::ConfigParse(_) => {
                "Configuration"
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LamError::AccountNotFound(_) | LamError::RemoteStatus { status: 404, .. }
        )
    }
}
