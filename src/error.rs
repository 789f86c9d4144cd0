use thiserror::Error;

/// Errors raised by a transfer session
///
/// "Already exists" and "not found" are not errors here; they are reported
/// through [`crate::transport::Provisioned`] and [`crate::transport::Fetched`].
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote I/O error: {0}")]
    RemoteIo(String),

    #[error("Local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransferError::Connection(_))
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Failure of an upload job, tagged with the step that failed
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not connect to remote store: {0}")]
    Connect(#[source] TransferError),

    #[error("Could not create remote folder `{path}`: {source}")]
    Provision {
        path: String,
        #[source]
        source: TransferError,
    },

    #[error("Could not upload `{path}`: {source}")]
    Upload {
        path: String,
        #[source]
        source: TransferError,
    },
}

impl StoreError {
    /// The underlying transfer error
    pub fn transfer_error(&self) -> &TransferError {
        match self {
            StoreError::Connect(source)
            | StoreError::Provision { source, .. }
            | StoreError::Upload { source, .. } => source,
        }
    }

    /// True when the remote store could not be reached or refused the login
    pub fn is_connection(&self) -> bool {
        self.transfer_error().is_connection()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Invalid identity `{0}` in access list seed")]
    InvalidIdentity(String),
}

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
