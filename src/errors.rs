use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in bwstate.
#[derive(Debug, Error)]
pub enum BwStateError {
    // --- Store errors ---
    #[error("Invalid item reference: '{0}' (expected `id:<uuid>` or `name:<name>`)")]
    InvalidReference(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("More than one item matches {0}")]
    AmbiguousMatch(String),

    #[error("Encryption of states is not supported, the vault already encrypts them")]
    UnsupportedEncryption,

    #[error("State metadata is not supported")]
    UnsupportedMetadata,

    #[error("Cannot decode {0}")]
    DecodeError(String),

    // --- Variable errors ---
    #[error("{0}")]
    ValidationError(String),

    #[error("Ref '{reference}' cannot be resolved")]
    UnresolvableRef { reference: String },

    #[error("Cyclic variable reference: {0}")]
    CyclicReference(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Variable '{label}': {source}")]
    Variable {
        label: String,
        #[source]
        source: Box<BwStateError>,
    },

    // --- Vault CLI errors ---
    #[error("Vault call failed: {0}")]
    ExternalCallFailure(String),

    #[error("Vault session rejected: {0} — run `bw unlock` (or `bw login`) and export BW_SESSION")]
    SessionInvalid(String),

    #[error("Not logged in to the vault — run `bw login` first")]
    NotLoggedIn,

    // --- Config errors ---
    #[error("Config file {}: {message}", path.display())]
    ConfigError { path: PathBuf, message: String },

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Child process exited with code {0}")]
    ChildProcessFailed(i32),

    #[error("Backend server error: {0}")]
    ServerError(String),
}

impl BwStateError {
    /// Returns `true` for `NotFound`, also when wrapped by a variable failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Variable { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Wrap this error with the label of the variable that failed.
    pub fn for_variable(self, label: &str) -> Self {
        match self {
            already @ Self::Variable { .. } => already,
            other => Self::Variable {
                label: label.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Convenience type alias for bwstate results.
pub type Result<T> = std::result::Result<T, BwStateError>;
